//! Concurrent cleanup across repositories.
//!
//! Each repository runs its own pipeline (resolve, reconcile, delete) as a
//! tokio task. At most [`CleanConfig::max_concurrent_repositories`] pipelines
//! hold a permit at once. Pipelines share no mutable state: they report log
//! records and their final outcome over a channel, and a single collector
//! owns buffering, ordering and aggregation.

use crate::config::CleanConfig;
use crate::delete::{DeletionReport, delete_images};
use crate::error::{Error, RepositoryFailure, Result};
use crate::images::resolve_image_set;
use crate::reconcile::{ReconcileOptions, reconcile_orphans};
use crate::registry::Registry;
use crate::types::Digest;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Severity of a buffered log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Detail useful when debugging a run
    Debug,
    /// Normal progress
    Info,
    /// Something was skipped or refused
    Warn,
    /// A repository failed
    Error,
}

/// A log line produced during a run, held back until the run finishes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogRecord {
    /// Repository the record belongs to; `None` for run-level records.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
    /// Severity
    pub level: LogLevel,
    /// Message text
    pub message: String,
}

impl LogRecord {
    fn run(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            repository: None,
            level,
            message: message.into(),
        }
    }

    /// Write the record through `tracing`.
    pub fn emit(&self) {
        let repository = self.repository.as_deref().unwrap_or("-");
        match self.level {
            LogLevel::Debug => debug!(repository, "{}", self.message),
            LogLevel::Info => info!(repository, "{}", self.message),
            LogLevel::Warn => warn!(repository, "{}", self.message),
            LogLevel::Error => error!(repository, "{}", self.message),
        }
    }
}

/// What happened to one repository whose pipeline completed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepositoryOutcome {
    /// Repository name
    pub repository: String,
    /// Distinct tagged digests
    pub tagged: usize,
    /// Untagged digests before reconciliation
    pub untagged: usize,
    /// Untagged digests no tagged manifest references
    pub orphans: BTreeSet<Digest>,
    /// Deletion totals; `None` when there was nothing to delete
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deletion: Option<DeletionReport>,
}

/// Result of a cleanup run over many repositories.
#[derive(Debug, Default)]
pub struct CleanReport {
    /// Whether the run was a dry run
    pub dry_run: bool,
    /// Successful repositories, sorted by name
    pub outcomes: Vec<RepositoryOutcome>,
    /// Failed repositories, sorted by name
    pub failures: Vec<RepositoryFailure>,
    /// Buffered log records; run-level first, then grouped by repository
    pub logs: Vec<LogRecord>,
}

impl CleanReport {
    /// Repositories processed, successful or not.
    #[must_use]
    pub fn total(&self) -> usize {
        self.outcomes.len() + self.failures.len()
    }

    /// Whether no repository failed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Orphans found across successful repositories.
    #[must_use]
    pub fn orphans(&self) -> usize {
        self.outcomes.iter().map(|outcome| outcome.orphans.len()).sum()
    }

    /// Images deleted across successful repositories.
    #[must_use]
    pub fn deleted(&self) -> usize {
        self.deletions().map(|report| report.deleted).sum()
    }

    /// Per-image delete failures across successful repositories.
    #[must_use]
    pub fn failed_deletes(&self) -> usize {
        self.deletions().map(|report| report.failed).sum()
    }

    fn deletions(&self) -> impl Iterator<Item = &DeletionReport> {
        self.outcomes
            .iter()
            .filter_map(|outcome| outcome.deletion.as_ref())
    }

    /// Write every buffered record through `tracing`, in order.
    pub fn emit_logs(&self) {
        for record in &self.logs {
            record.emit();
        }
    }

    /// Turn the report into an error if any repository failed.
    pub fn into_result(self) -> Result<Vec<RepositoryOutcome>> {
        if self.failures.is_empty() {
            Ok(self.outcomes)
        } else {
            Err(Error::CleanupFailed {
                total: self.total(),
                failures: self.failures,
            })
        }
    }
}

enum PipelineEvent {
    Log(LogRecord),
    Finished {
        repository: String,
        result: Result<RepositoryOutcome>,
    },
}

/// Sends a pipeline's log records to the collector.
struct PipelineLog {
    repository: String,
    events: mpsc::UnboundedSender<PipelineEvent>,
}

impl PipelineLog {
    fn record(&self, level: LogLevel, message: impl Into<String>) {
        // The collector outlives every pipeline; a send can only fail after
        // the run is over.
        let _ = self.events.send(PipelineEvent::Log(LogRecord {
            repository: Some(self.repository.clone()),
            level,
            message: message.into(),
        }));
    }
}

/// Clean every repository in `repositories` concurrently.
///
/// One repository failing never stops the others; failures are collected
/// in the report, which [`CleanReport::into_result`] turns into an aggregate
/// error. Only an invalid `config` fails the call itself, before any work
/// starts.
pub async fn clean_repositories(
    registry: Arc<dyn Registry>,
    repositories: Vec<String>,
    config: &CleanConfig,
) -> Result<CleanReport> {
    config.validate()?;

    let (events, receiver) = mpsc::unbounded_channel();
    let mut run_logs = Vec::new();
    if repositories.is_empty() {
        run_logs.push(LogRecord::run(LogLevel::Info, "No repositories to clean"));
    } else {
        run_logs.push(LogRecord::run(
            LogLevel::Info,
            format!(
                "Cleaning {} repositories (dry run: {}, concurrency: {})",
                repositories.len(),
                config.dry_run,
                config.max_concurrent_repositories
            ),
        ));
    }

    let spawn_all = spawn_pipelines(registry, repositories, config, events);
    let ((), mut report) = tokio::join!(spawn_all, collect(receiver));

    report.dry_run = config.dry_run;
    run_logs.append(&mut report.logs);
    report.logs = run_logs;
    Ok(report)
}

async fn spawn_pipelines(
    registry: Arc<dyn Registry>,
    repositories: Vec<String>,
    config: &CleanConfig,
    events: mpsc::UnboundedSender<PipelineEvent>,
) {
    let semaphore = Arc::new(Semaphore::new(config.max_concurrent_repositories));
    let config = Arc::new(config.clone());
    let mut join_set = JoinSet::new();
    let mut task_repositories = HashMap::new();

    for repository in repositories {
        let registry = Arc::clone(&registry);
        let semaphore = Arc::clone(&semaphore);
        let config = Arc::clone(&config);
        let log = PipelineLog {
            repository: repository.clone(),
            events: events.clone(),
        };

        let handle = join_set.spawn(async move {
            let _permit = semaphore.acquire().await;
            let result = run_pipeline(registry.as_ref(), &config, &log).await;
            let _ = log.events.send(PipelineEvent::Finished {
                repository: log.repository.clone(),
                result,
            });
        });
        task_repositories.insert(handle.id(), repository);
    }

    while let Some(joined) = join_set.join_next_with_id().await {
        let Err(join_error) = joined else { continue };
        let repository = task_repositories
            .remove(&join_error.id())
            .unwrap_or_default();
        let message = if join_error.is_panic() {
            panic_message(join_error.into_panic())
        } else {
            join_error.to_string()
        };
        let _ = events.send(PipelineEvent::Finished {
            repository: repository.clone(),
            result: Err(Error::PipelinePanicked {
                repository,
                message,
            }),
        });
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|message| (*message).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

async fn collect(mut receiver: mpsc::UnboundedReceiver<PipelineEvent>) -> CleanReport {
    let mut report = CleanReport::default();

    while let Some(event) = receiver.recv().await {
        match event {
            PipelineEvent::Log(record) => report.logs.push(record),
            PipelineEvent::Finished { repository, result } => match result {
                Ok(outcome) => report.outcomes.push(outcome),
                Err(error) => {
                    report.logs.push(LogRecord {
                        repository: Some(repository.clone()),
                        level: LogLevel::Error,
                        message: format!("Cleanup failed: {error}"),
                    });
                    report.failures.push(RepositoryFailure::new(repository, error));
                }
            },
        }
    }

    // Stable sort keeps each repository's records in emission order.
    report
        .logs
        .sort_by(|a, b| a.repository.cmp(&b.repository));
    report
        .outcomes
        .sort_by(|a, b| a.repository.cmp(&b.repository));
    report
        .failures
        .sort_by(|a, b| a.repository.cmp(&b.repository));
    report
}

async fn run_pipeline(
    registry: &dyn Registry,
    config: &CleanConfig,
    log: &PipelineLog,
) -> Result<RepositoryOutcome> {
    let repository = log.repository.as_str();

    let images = resolve_image_set(registry, repository).await?;
    log.record(
        LogLevel::Info,
        format!(
            "Found {} tagged and {} untagged images",
            images.tagged.len(),
            images.untagged.len()
        ),
    );

    let orphans = reconcile_orphans(
        registry,
        repository,
        &images,
        ReconcileOptions::from(config),
    )
    .await?;

    let mut outcome = RepositoryOutcome {
        repository: repository.to_string(),
        tagged: images.tagged.len(),
        untagged: images.untagged.len(),
        orphans,
        deletion: None,
    };

    if outcome.orphans.is_empty() {
        log.record(LogLevel::Info, "No orphaned images");
        return Ok(outcome);
    }

    log.record(
        LogLevel::Info,
        format!("Found {} orphaned images", outcome.orphans.len()),
    );
    for digest in &outcome.orphans {
        log.record(LogLevel::Debug, format!("Orphan {digest}"));
    }

    let digests: Vec<Digest> = outcome.orphans.iter().cloned().collect();
    let deletion = delete_images(
        registry,
        repository,
        &digests,
        config.delete_batch_size,
        config.dry_run,
    )
    .await?;

    if deletion.dry_run {
        log.record(
            LogLevel::Info,
            format!("Dry run: would delete {} images", deletion.would_delete()),
        );
    } else {
        log.record(
            LogLevel::Info,
            format!(
                "Deleted {} images, {} failed",
                deletion.deleted, deletion.failed
            ),
        );
        for failure in &deletion.failures {
            log.record(LogLevel::Warn, format!("Failed to delete {failure}"));
        }
    }

    outcome.deletion = Some(deletion);
    Ok(outcome)
}
