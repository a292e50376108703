//! Orphan image detection and cleanup for container registries.
//!
//! A repository's untagged images are orphans once no tagged manifest list
//! references them as a child. This crate computes that set per repository
//! and deletes it in registry-sized batches, fanning out across repositories
//! with bounded concurrency.
//!
//! The pipeline for one repository is:
//!
//! 1. [`images::resolve_image_set`] pages through the image listing.
//! 2. [`reconcile::reconcile_orphans`] fetches tagged manifests in chunks and
//!    removes every referenced child from the untagged set.
//! 3. [`delete::delete_images`] removes what is left, or reports it in dry-run mode.
//!
//! [`orchestrator::clean_repositories`] runs that pipeline for many
//! repositories and aggregates the failures.

pub mod config;
pub mod delete;
pub mod error;
pub mod images;
pub mod manifest;
pub mod orchestrator;
pub mod reconcile;
pub mod registry;
pub mod repositories;
pub mod retry;
pub mod types;

#[cfg(test)]
mod testing;

pub use config::{CleanConfig, RepositorySelection, RetryConfig};
pub use delete::{DeletionReport, delete_images};
pub use error::{Error, RegistryError, RepositoryFailure, Result};
pub use images::{ImageSet, resolve_image_set};
pub use manifest::extract_children;
pub use orchestrator::{CleanReport, LogLevel, LogRecord, RepositoryOutcome, clean_repositories};
pub use reconcile::{ReconcileOptions, reconcile_orphans};
pub use registry::{BATCH_SIZE_CEILING, Registry, RetryingRegistry};
pub use repositories::{filter_by_pattern, list_repositories, resolve_repositories};
pub use types::{
    BatchDeleteOutcome, Digest, IMAGE_NOT_FOUND, ImageFailure, ImageId, Manifest, ManifestBatch,
    Page,
};
