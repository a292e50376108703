use crate::tracing::{LogLevel, TracingFormat};
use clap::{ArgGroup, Args, Parser, Subcommand};
use ecr_cleaner_aws::{AwsError, AwsOptions};
use ecr_cleaner_core::{CleanConfig, RepositorySelection, RetryConfig};
use miette::{Diagnostic, Report};
use serde::{Deserialize, Serialize};
use std::io::{self, Write};
use thiserror::Error;

/// Exit codes for the CLI application
pub const EXIT_OK: i32 = 0;
/// CLI or configuration error exit code
pub const EXIT_CLI: i32 = 2;
/// Registry or cleanup failure exit code
pub const EXIT_CLEANUP: i32 = 3;

/// CLI-specific error types with proper exit code mapping
#[derive(Error, Debug, Diagnostic)]
pub enum CliError {
    /// CLI or configuration error (exit code 2)
    #[error("CLI/configuration error: {message}")]
    #[diagnostic(code(ecr_cleaner::cli::config))]
    Config {
        /// The error message
        message: String,
        /// Optional help text
        #[help]
        help: Option<String>,
    },

    /// Failure reported by the cleanup pipeline
    #[error(transparent)]
    #[diagnostic(transparent)]
    Cleanup(#[from] ecr_cleaner_core::Error),

    /// AWS session setup failed
    #[error(transparent)]
    #[diagnostic(transparent)]
    Aws(#[from] AwsError),
}

impl CliError {
    /// Create a new configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            help: None,
        }
    }

    /// Create a new configuration error with help text
    #[must_use]
    pub fn config_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            help: Some(help.into()),
        }
    }

    /// Short machine-readable category used in JSON output
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match exit_code_for(self) {
            EXIT_CLI => "config",
            _ => "cleanup",
        }
    }
}

/// Map CLI error to appropriate exit code
#[must_use]
pub const fn exit_code_for(err: &CliError) -> i32 {
    match err {
        CliError::Config { .. } | CliError::Aws(AwsError::MissingRegion) => EXIT_CLI,
        CliError::Cleanup(inner) if inner.is_usage_error() => EXIT_CLI,
        CliError::Cleanup(_) | CliError::Aws(_) => EXIT_CLEANUP,
    }
}

/// Render error appropriately based on JSON flag
#[allow(clippy::print_stdout, clippy::print_stderr)]
pub fn render_error(err: CliError, json_mode: bool) {
    if json_mode {
        let error_envelope = ErrorEnvelope::new(serde_json::json!({
            "code": err.kind(),
            "message": err.to_string()
        }));

        match serde_json::to_string(&error_envelope) {
            Ok(json) => println!("{json}"),
            Err(_) => eprintln!("Error serializing error response"),
        }
    } else {
        // Use miette for human-friendly error display
        let report = Report::new(err);
        eprintln!("{report:?}");
        // Ensure output is flushed before potential process exit
        let _ = io::stderr().flush();
    }
}

/// Success response envelope for JSON output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OkEnvelope<T> {
    /// Status indicator - always "ok" for success
    pub status: &'static str,
    /// The actual data payload
    pub data: T,
}

impl<T> OkEnvelope<T> {
    /// Create a new success envelope
    #[must_use]
    pub const fn new(data: T) -> Self {
        Self { status: "ok", data }
    }
}

/// Error response envelope for JSON output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope<E> {
    /// Status indicator - always "error" for failures
    pub status: &'static str,
    /// The error details
    pub error: E,
}

impl<E> ErrorEnvelope<E> {
    /// Create a new error envelope
    #[must_use]
    pub const fn new(error: E) -> Self {
        Self {
            status: "error",
            error,
        }
    }
}

/// Delete orphaned images from Amazon ECR repositories.
///
/// An untagged image is an orphan when no tagged manifest list in its
/// repository references it.
#[derive(Parser, Debug)]
#[command(name = "ecr-cleaner")]
#[command(about = "Delete orphaned untagged images from Amazon ECR repositories")]
#[command(version)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Logging verbosity level.
    #[arg(
        short = 'L',
        long,
        global = true,
        help = "Set logging level",
        default_value = "info",
        env = "ECR_CLEANER_LEVEL",
        value_enum
    )]
    pub level: LogLevel,

    /// Log output format.
    #[arg(
        long,
        global = true,
        help = "Log output format",
        default_value = "compact",
        env = "ECR_CLEANER_LOG_FORMAT",
        value_enum
    )]
    pub log_format: TracingFormat,

    /// Emit JSON envelope on stdout.
    #[arg(long, global = true, help = "Emit JSON envelope on stdout")]
    pub json: bool,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Delete untagged images no tagged manifest list references.
    #[command(about = "Delete untagged images no tagged manifest list references")]
    Clean(CleanArgs),
}

/// Arguments of the `clean` subcommand.
#[derive(Args, Debug, Clone, PartialEq, Eq)]
#[command(group(
    ArgGroup::new("selection")
        .required(true)
        .args(["all", "repositories", "pattern"])
))]
pub struct CleanArgs {
    /// Clean every repository in the registry.
    #[arg(long, short = 'a', help = "Clean every repository in the registry")]
    pub all: bool,

    /// Comma-separated repository names.
    #[arg(
        long,
        short = 'r',
        value_delimiter = ',',
        value_name = "NAMES",
        help = "Comma-separated list of repositories to clean"
    )]
    pub repositories: Vec<String>,

    /// Regular expression matched anywhere in repository names.
    #[arg(
        long,
        short = 'p',
        value_name = "REGEX",
        help = "Clean repositories whose name matches this regular expression"
    )]
    pub pattern: Option<String>,

    /// Report orphans without deleting them.
    #[arg(
        long,
        short = 'd',
        env = "ECR_CLEANER_DRY_RUN",
        help = "Report orphaned images without deleting them"
    )]
    pub dry_run: bool,

    /// AWS region.
    #[arg(long, env = "ECR_CLEANER_REGION", help = "AWS region (defaults to the SDK chain)")]
    pub region: Option<String>,

    /// AWS shared config profile.
    #[arg(long, env = "ECR_CLEANER_PROFILE", help = "AWS profile to load credentials from")]
    pub profile: Option<String>,

    /// Repositories processed at the same time.
    #[arg(
        long,
        default_value_t = 8,
        env = "ECR_CLEANER_MAX_CONCURRENCY",
        help = "Repositories processed at the same time"
    )]
    pub max_concurrency: usize,

    /// Manifest requests in flight per repository.
    #[arg(
        long,
        default_value_t = 4,
        env = "ECR_CLEANER_MANIFEST_CONCURRENCY",
        help = "Manifest requests in flight per repository"
    )]
    pub manifest_concurrency: usize,

    /// Retries for throttled or failed registry calls.
    #[arg(
        long,
        default_value_t = 3,
        env = "ECR_CLEANER_MAX_RETRIES",
        help = "Retries for throttled or temporarily failing registry calls"
    )]
    pub max_retries: usize,
}

impl CleanArgs {
    /// The repository selection these arguments describe.
    #[must_use]
    pub fn selection(&self) -> RepositorySelection {
        if self.all {
            RepositorySelection::All
        } else if let Some(pattern) = &self.pattern {
            RepositorySelection::Pattern(pattern.clone())
        } else {
            RepositorySelection::Names(self.repositories.clone())
        }
    }

    /// Run configuration built from the flags; not yet validated.
    #[must_use]
    pub fn config(&self) -> CleanConfig {
        CleanConfig {
            manifest_fetch_concurrency: self.manifest_concurrency,
            ..CleanConfig::default()
        }
        .with_dry_run(self.dry_run)
        .with_max_concurrent_repositories(self.max_concurrency)
        .with_retry(RetryConfig {
            max_attempts: self.max_retries.saturating_add(1),
            ..RetryConfig::default()
        })
    }

    /// AWS session overrides.
    #[must_use]
    pub fn aws_options(&self) -> AwsOptions {
        AwsOptions {
            region: self.region.clone(),
            profile: self.profile.clone(),
        }
    }
}

/// Parse command line arguments.
#[must_use]
pub fn parse() -> Cli {
    Cli::parse()
}
