//! The registry API consumed by the cleanup pipeline.
//!
//! Implementors provide one method per remote call. Pagination, chunking and
//! retries are handled by the pipeline, so implementations stay thin wrappers
//! around whatever SDK talks to the registry.

use crate::config::RetryConfig;
use crate::error::RegistryError;
use crate::retry::retry_with_backoff;
use crate::types::{BatchDeleteOutcome, Digest, ImageId, ManifestBatch, Page};
use async_trait::async_trait;
use std::sync::Arc;

/// Maximum number of digests the registry accepts in one batched get or delete.
pub const BATCH_SIZE_CEILING: usize = 100;

/// Remote registry operations.
#[async_trait]
pub trait Registry: Send + Sync {
    /// Fetch one page of repository names.
    async fn list_repositories_page(
        &self,
        next_token: Option<String>,
    ) -> Result<Page<String>, RegistryError>;

    /// Fetch one page of a repository's image listing.
    async fn list_images_page(
        &self,
        repository: &str,
        next_token: Option<String>,
    ) -> Result<Page<ImageId>, RegistryError>;

    /// Fetch manifest bodies for up to [`BATCH_SIZE_CEILING`] digests.
    async fn batch_get_manifests(
        &self,
        repository: &str,
        digests: &[Digest],
    ) -> Result<ManifestBatch, RegistryError>;

    /// Delete up to [`BATCH_SIZE_CEILING`] images by digest.
    async fn batch_delete_images(
        &self,
        repository: &str,
        digests: &[Digest],
    ) -> Result<BatchDeleteOutcome, RegistryError>;
}

#[async_trait]
impl<R: Registry + ?Sized> Registry for Arc<R> {
    async fn list_repositories_page(
        &self,
        next_token: Option<String>,
    ) -> Result<Page<String>, RegistryError> {
        (**self).list_repositories_page(next_token).await
    }

    async fn list_images_page(
        &self,
        repository: &str,
        next_token: Option<String>,
    ) -> Result<Page<ImageId>, RegistryError> {
        (**self).list_images_page(repository, next_token).await
    }

    async fn batch_get_manifests(
        &self,
        repository: &str,
        digests: &[Digest],
    ) -> Result<ManifestBatch, RegistryError> {
        (**self).batch_get_manifests(repository, digests).await
    }

    async fn batch_delete_images(
        &self,
        repository: &str,
        digests: &[Digest],
    ) -> Result<BatchDeleteOutcome, RegistryError> {
        (**self).batch_delete_images(repository, digests).await
    }
}

/// Wraps a registry so every call is retried on transient errors.
#[derive(Debug, Clone)]
pub struct RetryingRegistry<R> {
    inner: R,
    config: RetryConfig,
}

impl<R: Registry> RetryingRegistry<R> {
    /// Wrap `inner` with the given retry policy.
    #[must_use]
    pub fn new(inner: R, config: RetryConfig) -> Self {
        Self { inner, config }
    }

    /// The wrapped registry.
    #[must_use]
    pub fn inner(&self) -> &R {
        &self.inner
    }
}

#[async_trait]
impl<R: Registry> Registry for RetryingRegistry<R> {
    async fn list_repositories_page(
        &self,
        next_token: Option<String>,
    ) -> Result<Page<String>, RegistryError> {
        retry_with_backoff(&self.config, "DescribeRepositories", || {
            self.inner.list_repositories_page(next_token.clone())
        })
        .await
    }

    async fn list_images_page(
        &self,
        repository: &str,
        next_token: Option<String>,
    ) -> Result<Page<ImageId>, RegistryError> {
        retry_with_backoff(&self.config, "ListImages", || {
            self.inner.list_images_page(repository, next_token.clone())
        })
        .await
    }

    async fn batch_get_manifests(
        &self,
        repository: &str,
        digests: &[Digest],
    ) -> Result<ManifestBatch, RegistryError> {
        retry_with_backoff(&self.config, "BatchGetImage", || {
            self.inner.batch_get_manifests(repository, digests)
        })
        .await
    }

    async fn batch_delete_images(
        &self,
        repository: &str,
        digests: &[Digest],
    ) -> Result<BatchDeleteOutcome, RegistryError> {
        // A resent batch sees digests removed by an attempt whose response
        // was lost as ImageNotFound.
        let mut attempts = 0usize;
        retry_with_backoff(&self.config, "BatchDeleteImage", || {
            attempts += 1;
            let resent = attempts > 1;
            let request = self.inner.batch_delete_images(repository, digests);
            async move {
                let outcome = request.await?;
                Ok::<_, RegistryError>(if resent {
                    outcome.with_missing_as_deleted()
                } else {
                    outcome
                })
            }
        })
        .await
    }
}
