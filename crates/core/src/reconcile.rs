//! Orphan reconciliation: untagged digests minus every child of a tagged
//! manifest.

use crate::config::CleanConfig;
use crate::error::Result;
use crate::images::ImageSet;
use crate::manifest::extract_children;
use crate::registry::{BATCH_SIZE_CEILING, Registry};
use crate::types::Digest;
use futures::stream::{self, StreamExt};
use std::collections::BTreeSet;
use tracing::{debug, trace};

/// How tagged manifests are fetched during reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileOptions {
    /// Tagged digests per manifest request, at most [`BATCH_SIZE_CEILING`].
    pub batch_size: usize,
    /// Manifest requests in flight at once.
    pub fetch_concurrency: usize,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            batch_size: BATCH_SIZE_CEILING,
            fetch_concurrency: 1,
        }
    }
}

impl From<&CleanConfig> for ReconcileOptions {
    fn from(config: &CleanConfig) -> Self {
        Self {
            batch_size: config.manifest_batch_size,
            fetch_concurrency: config.manifest_fetch_concurrency,
        }
    }
}

/// Compute the orphan set of one repository.
///
/// Tagged digests are split into ordered chunks of `options.batch_size` and
/// up to `options.fetch_concurrency` chunks are fetched at once. Each chunk's
/// children are removed from a working copy of the untagged set as results
/// arrive; only this loop touches the working set, so it shrinks
/// monotonically and completion order does not change the result.
///
/// Any chunk failure aborts reconciliation for the repository.
pub async fn reconcile_orphans(
    registry: &dyn Registry,
    repository: &str,
    images: &ImageSet,
    options: ReconcileOptions,
) -> Result<BTreeSet<Digest>> {
    let mut orphans = images.untagged.clone();
    if orphans.is_empty() {
        return Ok(orphans);
    }

    let tagged: Vec<Digest> = images.tagged.iter().cloned().collect();
    let batch_size = options.batch_size.clamp(1, BATCH_SIZE_CEILING);
    let owned_chunks: Vec<Vec<Digest>> = tagged
        .chunks(batch_size)
        .map(<[Digest]>::to_vec)
        .collect();
    let mut chunks = stream::iter(owned_chunks)
        .map(|chunk| async move { extract_children(registry, repository, &chunk).await })
        .buffer_unordered(options.fetch_concurrency.max(1));

    let mut reachable = 0usize;
    while let Some(children) = chunks.next().await {
        let children = children?;
        let before = orphans.len();
        for child in &children {
            orphans.remove(child);
        }
        reachable += before - orphans.len();
        trace!(
            repository,
            children = children.len(),
            removed = before - orphans.len(),
            remaining = orphans.len(),
            "Applied manifest chunk"
        );
    }

    debug!(
        repository,
        untagged = images.untagged.len(),
        reachable,
        orphans = orphans.len(),
        "Reconciled orphans"
    );
    Ok(orphans)
}
