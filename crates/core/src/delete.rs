//! Batched image deletion.

use crate::error::{Error, Result};
use crate::registry::{BATCH_SIZE_CEILING, Registry};
use crate::types::{Digest, ImageFailure};
use serde::Serialize;
use tracing::debug;

/// Totals of one repository's deletion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeletionReport {
    /// Digests handed to the deleter.
    pub requested: usize,
    /// Digests the registry confirmed as deleted.
    pub deleted: usize,
    /// Digests the registry refused or could not find.
    pub failed: usize,
    /// One entry per refused digest.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<ImageFailure>,
    /// No request was sent.
    pub dry_run: bool,
}

impl DeletionReport {
    /// Number of images a dry run would have deleted; zero for real runs.
    #[must_use]
    pub const fn would_delete(&self) -> usize {
        if self.dry_run { self.requested } else { 0 }
    }
}

/// Delete `digests` from `repository` in batches of `batch_size`.
///
/// In dry-run mode no request is made and the report only carries the
/// requested count. Otherwise every batch result is tallied: per-digest
/// failures are counted and kept, while a failed request stops the remaining
/// batches and returns [`Error::DeleteAborted`] with the totals so far.
pub async fn delete_images(
    registry: &dyn Registry,
    repository: &str,
    digests: &[Digest],
    batch_size: usize,
    dry_run: bool,
) -> Result<DeletionReport> {
    let mut report = DeletionReport {
        requested: digests.len(),
        dry_run,
        ..DeletionReport::default()
    };

    if dry_run {
        debug!(
            repository,
            count = digests.len(),
            "Dry run: would delete orphaned images"
        );
        return Ok(report);
    }

    let batch_size = batch_size.clamp(1, BATCH_SIZE_CEILING);
    for (index, batch) in digests.chunks(batch_size).enumerate() {
        let outcome = registry
            .batch_delete_images(repository, batch)
            .await
            .map_err(|source| Error::DeleteAborted {
                repository: repository.to_string(),
                deleted: report.deleted,
                failed: report.failed,
                source,
            })?;

        debug!(
            repository,
            batch = index + 1,
            deleted = outcome.deleted.len(),
            failed = outcome.failures.len(),
            "Delete batch finished"
        );
        for failure in &outcome.failures {
            debug!(
                repository,
                digest = %failure.digest,
                code = %failure.code,
                reason = %failure.reason,
                "Image could not be deleted"
            );
        }

        report.deleted += outcome.deleted.len();
        report.failed += outcome.failures.len();
        report.failures.extend(outcome.failures);
    }

    debug!(
        repository,
        deleted = report.deleted,
        failed = report.failed,
        "Deleted orphaned images"
    );
    Ok(report)
}
