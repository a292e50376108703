//! Error types for registry cleanup.
//!
//! [`RegistryError`] describes a failed remote call and knows whether it is
//! worth retrying. [`Error`] adds the pipeline context (which repository,
//! which digest) and is what every public operation returns.

use crate::types::Digest;
use miette::Diagnostic;
use thiserror::Error;

/// Result type for cleanup operations.
pub type Result<T> = std::result::Result<T, Error>;

/// A failed call against the registry API.
#[derive(Error, Debug, Clone, Diagnostic, PartialEq, Eq)]
pub enum RegistryError {
    /// Timeouts, dispatch failures, throttling and server-side faults.
    #[error("{operation} failed with a transient error: {message}")]
    #[diagnostic(
        code(ecr_cleaner::registry::transient),
        help("The request may succeed if retried later")
    )]
    Transient {
        /// Registry operation that failed
        operation: String,
        /// Service error code, when the registry supplied one
        code: Option<String>,
        /// Error message
        message: String,
    },

    /// Errors that will not go away by retrying (not found, access denied).
    #[error("{operation} failed: {message}")]
    #[diagnostic(code(ecr_cleaner::registry::permanent))]
    Permanent {
        /// Registry operation that failed
        operation: String,
        /// Service error code, when the registry supplied one
        code: Option<String>,
        /// Error message
        message: String,
    },

    /// A transient failure persisted through every retry attempt.
    #[error("{operation} still failing after {attempts} attempts: {message}")]
    #[diagnostic(
        code(ecr_cleaner::registry::retry_exhausted),
        help("Raise --max-retries or lower --max-concurrency if the registry is throttling")
    )]
    RetryExhausted {
        /// Registry operation that failed
        operation: String,
        /// Number of attempts made
        attempts: usize,
        /// Last error message seen
        message: String,
    },
}

impl RegistryError {
    /// Create a transient error.
    #[must_use]
    pub fn transient(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transient {
            operation: operation.into(),
            code: None,
            message: message.into(),
        }
    }

    /// Create a permanent error.
    #[must_use]
    pub fn permanent(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Permanent {
            operation: operation.into(),
            code: None,
            message: message.into(),
        }
    }

    /// Create a retry exhausted error.
    #[must_use]
    pub fn retry_exhausted(
        operation: impl Into<String>,
        attempts: usize,
        message: impl Into<String>,
    ) -> Self {
        Self::RetryExhausted {
            operation: operation.into(),
            attempts,
            message: message.into(),
        }
    }

    /// Attach a service error code.
    #[must_use]
    pub fn with_code(self, code: impl Into<String>) -> Self {
        let code = Some(code.into());
        match self {
            Self::Transient {
                operation, message, ..
            } => Self::Transient {
                operation,
                code,
                message,
            },
            Self::Permanent {
                operation, message, ..
            } => Self::Permanent {
                operation,
                code,
                message,
            },
            other @ Self::RetryExhausted { .. } => other,
        }
    }

    /// Whether retrying the call may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    /// Service error code, if any.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Transient { code, .. } | Self::Permanent { code, .. } => code.as_deref(),
            Self::RetryExhausted { .. } => None,
        }
    }
}

/// Errors produced by the cleanup pipeline.
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// Repository enumeration failed.
    #[error("Failed to list repositories")]
    #[diagnostic(code(ecr_cleaner::list_repositories))]
    ListRepositories {
        /// Underlying registry error
        #[source]
        #[diagnostic_source]
        source: RegistryError,
    },

    /// Image listing failed part-way through pagination.
    #[error("Failed to list images for repository {repository}")]
    #[diagnostic(code(ecr_cleaner::list_images))]
    ListImages {
        /// Repository being listed
        repository: String,
        /// Underlying registry error
        #[source]
        #[diagnostic_source]
        source: RegistryError,
    },

    /// The batched manifest request failed as a whole.
    #[error("Failed to fetch manifests for repository {repository}")]
    #[diagnostic(code(ecr_cleaner::fetch_manifests))]
    FetchManifests {
        /// Repository being reconciled
        repository: String,
        /// Underlying registry error
        #[source]
        #[diagnostic_source]
        source: RegistryError,
    },

    /// The registry could not return the manifest of a tagged image.
    #[error("Manifest {digest} in repository {repository} is unavailable: {code} - {reason}")]
    #[diagnostic(
        code(ecr_cleaner::manifest_unavailable),
        help("Children of this image cannot be determined; the repository was skipped to avoid deleting referenced images")
    )]
    ManifestUnavailable {
        /// Repository being reconciled
        repository: String,
        /// Digest of the tagged image
        digest: Digest,
        /// Registry failure code
        code: String,
        /// Registry failure reason
        reason: String,
    },

    /// A manifest body was not a valid JSON document.
    #[error("Failed to parse manifest {digest} in repository {repository}")]
    #[diagnostic(code(ecr_cleaner::manifest_parse))]
    ManifestParse {
        /// Repository being reconciled
        repository: String,
        /// Digest of the tagged image
        digest: Digest,
        /// JSON error
        #[source]
        source: serde_json::Error,
    },

    /// A delete request failed outright; earlier batches may have been applied.
    #[error(
        "Failed to delete images from repository {repository} ({deleted} deleted, {failed} failed before the error)"
    )]
    #[diagnostic(code(ecr_cleaner::delete_aborted))]
    DeleteAborted {
        /// Repository being cleaned
        repository: String,
        /// Images deleted before the failing request
        deleted: usize,
        /// Per-item failures seen before the failing request
        failed: usize,
        /// Underlying registry error
        #[source]
        #[diagnostic_source]
        source: RegistryError,
    },

    /// The repository pattern is not a valid regular expression.
    #[error("Invalid repository pattern '{pattern}'")]
    #[diagnostic(
        code(ecr_cleaner::invalid_pattern),
        help("Patterns use Rust regex syntax and match anywhere in the repository name")
    )]
    InvalidPattern {
        /// Pattern as supplied
        pattern: String,
        /// Regex compile error
        #[source]
        source: regex::Error,
    },

    /// More digests were passed to a batched call than the registry accepts.
    #[error("Batch of {requested} digests exceeds the registry limit of {limit}")]
    #[diagnostic(code(ecr_cleaner::batch_too_large))]
    BatchTooLarge {
        /// Digests in the batch
        requested: usize,
        /// Maximum allowed
        limit: usize,
    },

    /// Configuration values are out of range.
    #[error("Invalid configuration: {message}")]
    #[diagnostic(code(ecr_cleaner::invalid_config))]
    InvalidConfig {
        /// What is wrong
        message: String,
    },

    /// A repository pipeline panicked.
    #[error("Cleanup of repository {repository} panicked: {message}")]
    #[diagnostic(code(ecr_cleaner::pipeline_panicked))]
    PipelinePanicked {
        /// Repository whose pipeline panicked
        repository: String,
        /// Panic payload, if it was a string
        message: String,
    },

    /// One or more repository pipelines failed.
    #[error(
        "Cleanup failed for {} of {total} repositories: {}",
        .failures.len(),
        failed_repository_list(.failures)
    )]
    #[diagnostic(
        code(ecr_cleaner::cleanup_failed),
        help("Other repositories were processed normally; re-running recomputes orphans from current registry state")
    )]
    CleanupFailed {
        /// Repositories processed in total
        total: usize,
        /// Every failed repository with its cause
        #[related]
        failures: Vec<RepositoryFailure>,
    },
}

impl Error {
    /// Create an invalid configuration error.
    #[must_use]
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Whether the error stems from user input rather than the registry.
    #[must_use]
    pub const fn is_usage_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidPattern { .. } | Self::InvalidConfig { .. } | Self::BatchTooLarge { .. }
        )
    }
}

/// A repository whose pipeline failed, with the cause.
#[derive(Error, Debug, Diagnostic)]
#[error("Repository {repository} failed")]
pub struct RepositoryFailure {
    /// Repository name
    pub repository: String,
    /// What went wrong
    #[source]
    #[diagnostic_source]
    pub error: Error,
}

impl RepositoryFailure {
    /// Pair a repository with its error.
    #[must_use]
    pub fn new(repository: impl Into<String>, error: Error) -> Self {
        Self {
            repository: repository.into(),
            error,
        }
    }
}

fn failed_repository_list(failures: &[RepositoryFailure]) -> String {
    failures
        .iter()
        .map(|failure| format!("{} ({})", failure.repository, failure.error))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transient_errors_are_retryable() {
        assert!(RegistryError::transient("ListImages", "timeout").is_retryable());
        assert!(!RegistryError::permanent("ListImages", "denied").is_retryable());
        assert!(!RegistryError::retry_exhausted("ListImages", 3, "timeout").is_retryable());
    }

    #[test]
    fn test_with_code() {
        let err = RegistryError::permanent("ListImages", "missing")
            .with_code("RepositoryNotFoundException");
        assert_eq!(err.code(), Some("RepositoryNotFoundException"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_cleanup_failed_lists_every_repository() {
        let err = Error::CleanupFailed {
            total: 3,
            failures: vec![
                RepositoryFailure::new(
                    "alpha",
                    Error::ListImages {
                        repository: "alpha".to_string(),
                        source: RegistryError::permanent("ListImages", "denied"),
                    },
                ),
                RepositoryFailure::new("beta", Error::invalid_config("bad")),
            ],
        };
        let message = err.to_string();
        assert!(message.starts_with("Cleanup failed for 2 of 3 repositories"));
        assert!(message.contains("alpha (Failed to list images for repository alpha)"));
        assert!(message.contains("beta (Invalid configuration: bad)"));
    }

    #[test]
    fn test_usage_errors() {
        assert!(Error::invalid_config("zero").is_usage_error());
        assert!(
            !Error::ListRepositories {
                source: RegistryError::transient("DescribeRepositories", "timeout"),
            }
            .is_usage_error()
        );
    }
}
