//! Child digest extraction from tagged manifests.

use crate::error::{Error, Result};
use crate::registry::{BATCH_SIZE_CEILING, Registry};
use crate::types::Digest;
use serde::Deserialize;
use std::collections::HashSet;
use tracing::trace;

/// The part of an image index or manifest list this crate reads.
///
/// Single-platform manifests have no `manifests` array and parse to an
/// empty child list.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ManifestDocument {
    #[serde(default)]
    manifests: Vec<Descriptor>,
}

#[derive(Debug, Deserialize)]
struct Descriptor {
    digest: Digest,
}

/// Parse one manifest body and return the child digests it references.
fn parse_children(body: &str) -> serde_json::Result<Vec<Digest>> {
    let document: ManifestDocument = serde_json::from_str(body)?;
    Ok(document
        .manifests
        .into_iter()
        .map(|descriptor| descriptor.digest)
        .collect())
}

/// Fetch the manifests of `digests` in one batched call and return every
/// child digest they reference, in response order.
///
/// The caller chunks its input: more than [`BATCH_SIZE_CEILING`] digests is
/// rejected before any remote call. A body that is not a manifest document
/// fails the whole call, as does a requested digest whose manifest the
/// registry could not return.
pub async fn extract_children(
    registry: &dyn Registry,
    repository: &str,
    digests: &[Digest],
) -> Result<Vec<Digest>> {
    if digests.len() > BATCH_SIZE_CEILING {
        return Err(Error::BatchTooLarge {
            requested: digests.len(),
            limit: BATCH_SIZE_CEILING,
        });
    }
    if digests.is_empty() {
        return Ok(Vec::new());
    }

    let batch = registry
        .batch_get_manifests(repository, digests)
        .await
        .map_err(|source| Error::FetchManifests {
            repository: repository.to_string(),
            source,
        })?;

    if let Some(failure) = batch.failures.into_iter().next() {
        return Err(Error::ManifestUnavailable {
            repository: repository.to_string(),
            digest: failure.digest,
            code: failure.code,
            reason: failure.reason,
        });
    }

    let mut returned = HashSet::with_capacity(batch.manifests.len());
    let mut children = Vec::new();
    for manifest in batch.manifests {
        let found = parse_children(&manifest.body).map_err(|source| Error::ManifestParse {
            repository: repository.to_string(),
            digest: manifest.digest.clone(),
            source,
        })?;
        trace!(
            repository,
            digest = %manifest.digest,
            children = found.len(),
            "Parsed manifest"
        );
        children.extend(found);
        returned.insert(manifest.digest);
    }

    if let Some(missing) = digests.iter().find(|digest| !returned.contains(*digest)) {
        return Err(Error::ManifestUnavailable {
            repository: repository.to_string(),
            digest: missing.clone(),
            code: "MissingFromResponse".to_string(),
            reason: "registry returned neither a manifest nor a failure".to_string(),
        });
    }

    Ok(children)
}
