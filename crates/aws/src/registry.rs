//! [`Registry`] implementation on the Amazon ECR API.

use crate::error::classify_sdk_error;
use async_trait::async_trait;
use aws_sdk_ecr::Client;
use aws_sdk_ecr::types::{self as ecr, ImageIdentifier};
use ecr_cleaner_core::{
    BatchDeleteOutcome, Digest, ImageFailure, ImageId, Manifest, ManifestBatch, Page, Registry,
    RegistryError,
};
use tracing::warn;

/// Manifest media types requested from `BatchGetImage`.
///
/// Without them ECR may convert an index to a single-platform manifest,
/// hiding its children.
pub const ACCEPTED_MEDIA_TYPES: &[&str] = &[
    "application/vnd.oci.image.index.v1+json",
    "application/vnd.docker.distribution.manifest.list.v2+json",
    "application/vnd.oci.image.manifest.v1+json",
    "application/vnd.docker.distribution.manifest.v2+json",
    "application/vnd.docker.distribution.manifest.v1+json",
    "application/vnd.docker.distribution.manifest.v1+prettyjws",
];

/// Largest page ECR returns for repository and image listings.
const MAX_PAGE_SIZE: i32 = 1000;

/// Failure code used when ECR omits one.
const UNKNOWN_FAILURE: &str = "Unknown";

/// Amazon ECR registry.
#[derive(Debug, Clone)]
pub struct EcrRegistry {
    client: Client,
}

impl EcrRegistry {
    /// Wrap an ECR client.
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn image_ids(digests: &[Digest]) -> Vec<ImageIdentifier> {
        digests
            .iter()
            .map(|digest| ImageIdentifier::builder().image_digest(digest.as_str()).build())
            .collect()
    }
}

fn image_failure(failure: &ecr::ImageFailure) -> ImageFailure {
    let digest = failure
        .image_id()
        .and_then(ImageIdentifier::image_digest)
        .unwrap_or_default();
    ImageFailure::new(
        digest,
        failure
            .failure_code()
            .map_or(UNKNOWN_FAILURE, |code| code.as_str()),
        failure.failure_reason().unwrap_or_default(),
    )
}

#[async_trait]
impl Registry for EcrRegistry {
    async fn list_repositories_page(
        &self,
        next_token: Option<String>,
    ) -> Result<Page<String>, RegistryError> {
        let response = self
            .client
            .describe_repositories()
            .set_next_token(next_token)
            .max_results(MAX_PAGE_SIZE)
            .send()
            .await
            .map_err(|e| classify_sdk_error("DescribeRepositories", &e))?;

        Ok(Page {
            items: response
                .repositories()
                .iter()
                .filter_map(|repository| repository.repository_name())
                .map(str::to_string)
                .collect(),
            next_token: response.next_token().map(str::to_string),
        })
    }

    async fn list_images_page(
        &self,
        repository: &str,
        next_token: Option<String>,
    ) -> Result<Page<ImageId>, RegistryError> {
        let response = self
            .client
            .list_images()
            .repository_name(repository)
            .set_next_token(next_token)
            .max_results(MAX_PAGE_SIZE)
            .send()
            .await
            .map_err(|e| classify_sdk_error("ListImages", &e))?;

        let mut items = Vec::with_capacity(response.image_ids().len());
        for image in response.image_ids() {
            let Some(digest) = image.image_digest() else {
                warn!(repository, tag = ?image.image_tag(), "Skipping image without a digest");
                continue;
            };
            items.push(ImageId {
                digest: Digest::new(digest),
                tag: image.image_tag().map(str::to_string),
            });
        }

        Ok(Page {
            items,
            next_token: response.next_token().map(str::to_string),
        })
    }

    async fn batch_get_manifests(
        &self,
        repository: &str,
        digests: &[Digest],
    ) -> Result<ManifestBatch, RegistryError> {
        let response = self
            .client
            .batch_get_image()
            .repository_name(repository)
            .set_image_ids(Some(Self::image_ids(digests)))
            .set_accepted_media_types(Some(
                ACCEPTED_MEDIA_TYPES.iter().map(|t| (*t).to_string()).collect(),
            ))
            .send()
            .await
            .map_err(|e| classify_sdk_error("BatchGetImage", &e))?;

        let mut batch = ManifestBatch::default();
        for image in response.images() {
            let digest = image
                .image_id()
                .and_then(ImageIdentifier::image_digest)
                .unwrap_or_default();
            match image.image_manifest() {
                Some(body) => batch.manifests.push(Manifest {
                    digest: Digest::new(digest),
                    body: body.to_string(),
                }),
                None => batch.failures.push(ImageFailure::new(
                    digest,
                    "MissingManifest",
                    "BatchGetImage returned no manifest body",
                )),
            }
        }
        batch
            .failures
            .extend(response.failures().iter().map(image_failure));
        Ok(batch)
    }

    async fn batch_delete_images(
        &self,
        repository: &str,
        digests: &[Digest],
    ) -> Result<BatchDeleteOutcome, RegistryError> {
        let response = self
            .client
            .batch_delete_image()
            .repository_name(repository)
            .set_image_ids(Some(Self::image_ids(digests)))
            .send()
            .await
            .map_err(|e| classify_sdk_error("BatchDeleteImage", &e))?;

        Ok(BatchDeleteOutcome {
            deleted: response
                .image_ids()
                .iter()
                .filter_map(ImageIdentifier::image_digest)
                .map(Digest::new)
                .collect(),
            failures: response.failures().iter().map(image_failure).collect(),
        })
    }
}
