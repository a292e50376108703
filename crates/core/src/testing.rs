//! In-memory registry used by unit tests.

use crate::error::RegistryError;
use crate::registry::{BATCH_SIZE_CEILING, Registry};
use crate::types::{
    BatchDeleteOutcome, Digest, IMAGE_NOT_FOUND, ImageFailure, ImageId, Manifest, ManifestBatch, Page,
};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

const SINGLE_PLATFORM_MANIFEST: &str =
    r#"{"schemaVersion":2,"mediaType":"application/vnd.oci.image.manifest.v1+json","layers":[]}"#;

/// Builds an OCI index body referencing `children`.
pub fn index_manifest(children: &[&str]) -> String {
    let manifests: Vec<serde_json::Value> = children
        .iter()
        .map(|digest| {
            serde_json::json!({
                "mediaType": "application/vnd.oci.image.manifest.v1+json",
                "digest": digest,
                "size": 1024,
                "platform": {"architecture": "amd64", "os": "linux"}
            })
        })
        .collect();
    serde_json::json!({
        "schemaVersion": 2,
        "mediaType": "application/vnd.oci.image.index.v1+json",
        "manifests": manifests
    })
    .to_string()
}

/// Snapshot of how often each remote call was made.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub list_repositories: usize,
    pub list_images: usize,
    pub batch_get: usize,
    pub batch_delete: usize,
}

#[derive(Default)]
struct State {
    images: BTreeMap<String, Vec<ImageId>>,
    calls: CallCounts,
    get_batches: Vec<Vec<Digest>>,
    delete_batches: Vec<Vec<Digest>>,
    transient_list_failures: HashMap<String, usize>,
    delete_requests: HashMap<String, usize>,
}

/// Registry double with scripted failures.
#[derive(Default)]
pub struct FakeRegistry {
    page_size: Option<usize>,
    manifests: HashMap<String, HashMap<Digest, String>>,
    missing_manifests: HashSet<(String, Digest)>,
    list_failures: HashSet<String>,
    list_repositories_failure: bool,
    manifest_fetch_failures: HashSet<String>,
    delete_request_failures: HashMap<String, usize>,
    delete_item_failures: HashMap<(String, Digest), String>,
    state: Mutex<State>,
}

impl FakeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = Some(page_size);
        self
    }

    pub fn with_repository(self, name: &str, images: Vec<ImageId>) -> Self {
        self.state
            .lock()
            .unwrap()
            .images
            .insert(name.to_string(), images);
        self
    }

    pub fn with_manifest(mut self, repository: &str, digest: &str, body: impl Into<String>) -> Self {
        self.manifests
            .entry(repository.to_string())
            .or_default()
            .insert(Digest::new(digest), body.into());
        self
    }

    pub fn with_index(self, repository: &str, digest: &str, children: &[&str]) -> Self {
        self.with_manifest(repository, digest, index_manifest(children))
    }

    pub fn with_missing_manifest(mut self, repository: &str, digest: &str) -> Self {
        self.missing_manifests
            .insert((repository.to_string(), Digest::new(digest)));
        self
    }

    pub fn with_list_failure(mut self, repository: &str) -> Self {
        self.list_failures.insert(repository.to_string());
        self
    }

    pub fn with_list_repositories_failure(mut self) -> Self {
        self.list_repositories_failure = true;
        self
    }

    pub fn with_transient_list_failures(self, repository: &str, count: usize) -> Self {
        self.state
            .lock()
            .unwrap()
            .transient_list_failures
            .insert(repository.to_string(), count);
        self
    }

    pub fn with_manifest_fetch_failure(mut self, repository: &str) -> Self {
        self.manifest_fetch_failures.insert(repository.to_string());
        self
    }

    /// The delete request number `after_batches` (0-based) fails outright.
    pub fn with_delete_request_failure(mut self, repository: &str, after_batches: usize) -> Self {
        self.delete_request_failures
            .insert(repository.to_string(), after_batches);
        self
    }

    pub fn with_delete_item_failure(mut self, repository: &str, digest: &str, code: &str) -> Self {
        self.delete_item_failures
            .insert((repository.to_string(), Digest::new(digest)), code.to_string());
        self
    }

    pub fn calls(&self) -> CallCounts {
        self.state.lock().unwrap().calls
    }

    pub fn get_batches(&self) -> Vec<Vec<Digest>> {
        self.state.lock().unwrap().get_batches.clone()
    }

    pub fn delete_batches(&self) -> Vec<Vec<Digest>> {
        self.state.lock().unwrap().delete_batches.clone()
    }

    pub fn images(&self, repository: &str) -> Vec<ImageId> {
        self.state
            .lock()
            .unwrap()
            .images
            .get(repository)
            .cloned()
            .unwrap_or_default()
    }

    fn paginate<T: Clone>(&self, items: &[T], next_token: Option<String>) -> Page<T> {
        let start: usize = next_token.map_or(0, |token| token.parse().unwrap());
        let page_size = self.page_size.unwrap_or(usize::MAX);
        let end = start.saturating_add(page_size).min(items.len());
        let page = items[start..end].to_vec();
        if end < items.len() {
            Page::with_next(page, end.to_string())
        } else {
            Page::last(page)
        }
    }
}

#[async_trait]
impl Registry for FakeRegistry {
    async fn list_repositories_page(
        &self,
        next_token: Option<String>,
    ) -> Result<Page<String>, RegistryError> {
        let names: Vec<String> = {
            let mut state = self.state.lock().unwrap();
            state.calls.list_repositories += 1;
            state.images.keys().cloned().collect()
        };
        if self.list_repositories_failure {
            return Err(RegistryError::permanent("DescribeRepositories", "access denied")
                .with_code("AccessDeniedException"));
        }
        Ok(self.paginate(&names, next_token))
    }

    async fn list_images_page(
        &self,
        repository: &str,
        next_token: Option<String>,
    ) -> Result<Page<ImageId>, RegistryError> {
        let images = {
            let mut state = self.state.lock().unwrap();
            state.calls.list_images += 1;
            if let Some(remaining) = state.transient_list_failures.get_mut(repository) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(RegistryError::transient("ListImages", "throttled")
                        .with_code("ThrottlingException"));
                }
            }
            state.images.get(repository).cloned()
        };
        // With paging enabled the first page succeeds so the abort happens mid-listing.
        if self.list_failures.contains(repository)
            && (next_token.is_some() || self.page_size.is_none())
        {
            return Err(RegistryError::permanent("ListImages", "connection reset"));
        }
        let images = images.ok_or_else(|| {
            RegistryError::permanent("ListImages", format!("repository {repository} not found"))
                .with_code("RepositoryNotFoundException")
        })?;
        Ok(self.paginate(&images, next_token))
    }

    async fn batch_get_manifests(
        &self,
        repository: &str,
        digests: &[Digest],
    ) -> Result<ManifestBatch, RegistryError> {
        {
            let mut state = self.state.lock().unwrap();
            state.calls.batch_get += 1;
            state.get_batches.push(digests.to_vec());
        }
        assert!(digests.len() <= BATCH_SIZE_CEILING, "batch get over ceiling");
        if self.manifest_fetch_failures.contains(repository) {
            return Err(RegistryError::permanent("BatchGetImage", "internal error"));
        }

        let mut batch = ManifestBatch::default();
        for digest in digests {
            if self
                .missing_manifests
                .contains(&(repository.to_string(), digest.clone()))
            {
                batch.failures.push(ImageFailure::new(
                    digest.clone(),
                    IMAGE_NOT_FOUND,
                    "Requested image not found",
                ));
                continue;
            }
            let body = self
                .manifests
                .get(repository)
                .and_then(|manifests| manifests.get(digest))
                .cloned()
                .unwrap_or_else(|| SINGLE_PLATFORM_MANIFEST.to_string());
            batch.manifests.push(Manifest {
                digest: digest.clone(),
                body,
            });
        }
        Ok(batch)
    }

    async fn batch_delete_images(
        &self,
        repository: &str,
        digests: &[Digest],
    ) -> Result<BatchDeleteOutcome, RegistryError> {
        let mut state = self.state.lock().unwrap();
        state.calls.batch_delete += 1;
        let request_number = {
            let counter = state.delete_requests.entry(repository.to_string()).or_default();
            *counter += 1;
            *counter - 1
        };
        assert!(digests.len() <= BATCH_SIZE_CEILING, "batch delete over ceiling");

        if self.delete_request_failures.get(repository) == Some(&request_number) {
            return Err(RegistryError::permanent("BatchDeleteImage", "access denied")
                .with_code("AccessDeniedException"));
        }
        state.delete_batches.push(digests.to_vec());

        let mut outcome = BatchDeleteOutcome::default();
        for digest in digests {
            if let Some(code) = self
                .delete_item_failures
                .get(&(repository.to_string(), digest.clone()))
            {
                outcome.failures.push(ImageFailure::new(
                    digest.clone(),
                    code.clone(),
                    "refused by registry",
                ));
                continue;
            }
            let images = state.images.entry(repository.to_string()).or_default();
            let before = images.len();
            images.retain(|image| &image.digest != digest);
            if images.len() < before {
                outcome.deleted.push(digest.clone());
            } else {
                outcome.failures.push(ImageFailure::new(
                    digest.clone(),
                    IMAGE_NOT_FOUND,
                    "Requested image not found",
                ));
            }
        }
        Ok(outcome)
    }
}
