//! Run configuration.
//!
//! Built once by the caller and passed by reference through the pipeline;
//! nothing here is mutated after validation.

use crate::error::{Error, Result};
use crate::registry::BATCH_SIZE_CEILING;
use serde::{Deserialize, Serialize};

/// Which repositories a run should touch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "value", rename_all = "lowercase")]
pub enum RepositorySelection {
    /// Every repository in the registry.
    All,
    /// An explicit list of repository names.
    Names(Vec<String>),
    /// Repositories whose name matches a regular expression.
    Pattern(String),
}

/// Retry configuration with exponential backoff
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of attempts per call (1 disables retries)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,

    /// Initial backoff duration in milliseconds
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Maximum backoff duration in milliseconds
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Backoff multiplier
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

impl RetryConfig {
    /// A configuration that makes exactly one attempt.
    #[must_use]
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }
}

/// Parameters shared by every repository pipeline in a cleanup run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CleanConfig {
    /// Compute and report orphans without deleting anything
    #[serde(default)]
    pub dry_run: bool,

    /// Repositories processed at the same time
    #[serde(default = "default_max_concurrent_repositories")]
    pub max_concurrent_repositories: usize,

    /// Tagged digests per manifest fetch
    #[serde(default = "default_batch_size")]
    pub manifest_batch_size: usize,

    /// Manifest fetches in flight per repository
    #[serde(default = "default_manifest_fetch_concurrency")]
    pub manifest_fetch_concurrency: usize,

    /// Digests per delete request
    #[serde(default = "default_batch_size")]
    pub delete_batch_size: usize,

    /// Retry policy for registry calls
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for CleanConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            max_concurrent_repositories: default_max_concurrent_repositories(),
            manifest_batch_size: default_batch_size(),
            manifest_fetch_concurrency: default_manifest_fetch_concurrency(),
            delete_batch_size: default_batch_size(),
            retry: RetryConfig::default(),
        }
    }
}

impl CleanConfig {
    /// Set dry-run mode.
    #[must_use]
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Set the number of repositories processed at once.
    #[must_use]
    pub fn with_max_concurrent_repositories(mut self, limit: usize) -> Self {
        self.max_concurrent_repositories = limit;
        self
    }

    /// Set the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Check that every limit is usable.
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_repositories == 0 {
            return Err(Error::invalid_config(
                "max_concurrent_repositories must be at least 1",
            ));
        }
        if self.manifest_fetch_concurrency == 0 {
            return Err(Error::invalid_config(
                "manifest_fetch_concurrency must be at least 1",
            ));
        }
        for (name, size) in [
            ("manifest_batch_size", self.manifest_batch_size),
            ("delete_batch_size", self.delete_batch_size),
        ] {
            if size == 0 || size > BATCH_SIZE_CEILING {
                return Err(Error::invalid_config(format!(
                    "{name} must be between 1 and {BATCH_SIZE_CEILING}, got {size}"
                )));
            }
        }
        if self.retry.max_attempts == 0 {
            return Err(Error::invalid_config("retry.max_attempts must be at least 1"));
        }
        if self.retry.backoff_multiplier < 1.0 {
            return Err(Error::invalid_config(
                "retry.backoff_multiplier must be at least 1.0",
            ));
        }
        Ok(())
    }
}

// Default value functions

fn default_max_attempts() -> usize {
    4
}

fn default_initial_backoff_ms() -> u64 {
    200
}

fn default_max_backoff_ms() -> u64 {
    5000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_max_concurrent_repositories() -> usize {
    8
}

fn default_manifest_fetch_concurrency() -> usize {
    4
}

const fn default_batch_size() -> usize {
    BATCH_SIZE_CEILING
}
