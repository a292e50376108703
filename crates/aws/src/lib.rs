//! Amazon ECR backend for ecr-cleaner
//!
//! - [`session`] loads credentials and region and resolves the caller identity
//! - [`registry`] implements [`ecr_cleaner_core::Registry`] on the ECR API
//! - [`error`] maps SDK failures onto retryable and permanent registry errors

pub mod error;
pub mod registry;
pub mod session;

// Re-export main types for convenience
pub use error::{AwsError, classify_sdk_error};
pub use registry::{ACCEPTED_MEDIA_TYPES, EcrRegistry};
pub use session::{AwsOptions, AwsSession, CallerIdentity, load_session};
