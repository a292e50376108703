//! The `clean` command.

use crate::cli::{CleanArgs, CliError};
use ecr_cleaner_aws::load_session;
use ecr_cleaner_core::{
    CleanConfig, CleanReport, Registry, RepositoryOutcome, RepositorySelection, RetryingRegistry,
    clean_repositories, filter_by_pattern, resolve_repositories,
};
use serde::Serialize;
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{info, warn};

/// Check everything that needs no network before touching AWS.
fn preflight(args: &CleanArgs) -> Result<(RepositorySelection, CleanConfig), CliError> {
    let config = args.config();
    config.validate().map_err(|e| {
        CliError::config_with_help(
            e.to_string(),
            "--max-concurrency and --manifest-concurrency must be at least 1",
        )
    })?;
    let selection = args.selection();
    if let RepositorySelection::Pattern(pattern) = &selection {
        filter_by_pattern(Vec::new(), pattern)?;
    }
    Ok((selection, config))
}

/// Load AWS credentials, then resolve and clean the selected repositories.
pub async fn execute(args: &CleanArgs) -> Result<CleanReport, CliError> {
    let (selection, config) = preflight(args)?;

    let session = load_session(&args.aws_options()).await?;
    match session.caller_identity().await {
        Ok(identity) => info!(
            account = %identity.account,
            arn = %identity.arn,
            region = %identity.region,
            "Using AWS identity"
        ),
        Err(e) => warn!(region = session.region(), error = %e, "Could not resolve AWS identity"),
    }

    let registry = Arc::new(RetryingRegistry::new(
        session.registry(),
        config.retry.clone(),
    ));
    run(registry, &selection, &config).await
}

/// Resolve `selection` against `registry` and clean the result.
pub async fn run(
    registry: Arc<dyn Registry>,
    selection: &RepositorySelection,
    config: &CleanConfig,
) -> Result<CleanReport, CliError> {
    let repositories = resolve_repositories(registry.as_ref(), selection).await?;
    let report = clean_repositories(registry, repositories, config).await?;
    report.emit_logs();
    Ok(report)
}

/// One failed repository in the JSON summary.
#[derive(Debug, Serialize)]
pub struct FailureSummary {
    /// Repository name
    pub repository: String,
    /// Error message including its cause chain
    pub error: String,
}

/// Machine-readable summary of a run.
#[derive(Debug, Serialize)]
pub struct RunSummary<'a> {
    /// Whether deletions were skipped
    pub dry_run: bool,
    /// Repositories processed
    pub repositories: usize,
    /// Orphans found
    pub orphans: usize,
    /// Images deleted
    pub deleted: usize,
    /// Images the registry refused to delete
    pub failed_deletes: usize,
    /// Per-repository results
    pub outcomes: &'a [RepositoryOutcome],
    /// Failed repositories
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<FailureSummary>,
}

impl<'a> RunSummary<'a> {
    /// Summarise a finished run.
    #[must_use]
    pub fn from_report(report: &'a CleanReport) -> Self {
        Self {
            dry_run: report.dry_run,
            repositories: report.total(),
            orphans: report.orphans(),
            deleted: report.deleted(),
            failed_deletes: report.failed_deletes(),
            outcomes: &report.outcomes,
            failures: report
                .failures
                .iter()
                .map(|failure| FailureSummary {
                    repository: failure.repository.clone(),
                    error: error_chain(&failure.error),
                })
                .collect(),
        }
    }
}

fn error_chain(error: &dyn std::error::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        let _ = write!(message, ": {cause}");
        source = cause.source();
    }
    message
}

/// Human-readable summary: one line per repository, then totals.
#[must_use]
pub fn render_text(report: &CleanReport) -> String {
    let mut out = String::new();
    if report.total() == 0 {
        out.push_str("No repositories to clean\n");
        return out;
    }

    for outcome in &report.outcomes {
        let _ = write!(
            out,
            "{}: {} tagged, {} untagged, {} orphaned",
            outcome.repository,
            outcome.tagged,
            outcome.untagged,
            outcome.orphans.len()
        );
        match &outcome.deletion {
            Some(deletion) if deletion.dry_run => {
                let _ = write!(out, ", would delete {}", deletion.would_delete());
            }
            Some(deletion) => {
                let _ = write!(
                    out,
                    ", {} deleted, {} failed",
                    deletion.deleted, deletion.failed
                );
            }
            None => {}
        }
        out.push('\n');
    }
    for failure in &report.failures {
        let _ = writeln!(
            out,
            "{}: FAILED - {}",
            failure.repository,
            error_chain(&failure.error)
        );
    }

    let _ = write!(
        out,
        "Total: {} repositories, {} orphaned",
        report.total(),
        report.orphans()
    );
    if report.dry_run {
        out.push_str(" (dry run, nothing deleted)");
    } else {
        let _ = write!(
            out,
            ", {} deleted, {} failed to delete",
            report.deleted(),
            report.failed_deletes()
        );
    }
    if !report.failures.is_empty() {
        let _ = write!(out, ", {} repositories failed", report.failures.len());
    }
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ecr_cleaner_core::{
        BatchDeleteOutcome, Digest, ImageId, ManifestBatch, Page, RegistryError,
    };
    use std::collections::BTreeMap;

    /// Registry where every tagged image is single-platform.
    struct StaticRegistry {
        repositories: BTreeMap<String, Vec<ImageId>>,
    }

    impl StaticRegistry {
        fn new() -> Self {
            let mut repositories = BTreeMap::new();
            repositories.insert(
                "api".to_string(),
                vec![ImageId::tagged("idx", "v1"), ImageId::untagged("old")],
            );
            repositories.insert("web".to_string(), vec![ImageId::tagged("w", "v2")]);
            Self { repositories }
        }
    }

    #[async_trait]
    impl Registry for StaticRegistry {
        async fn list_repositories_page(
            &self,
            _next_token: Option<String>,
        ) -> Result<Page<String>, RegistryError> {
            Ok(Page::last(self.repositories.keys().cloned().collect()))
        }

        async fn list_images_page(
            &self,
            repository: &str,
            _next_token: Option<String>,
        ) -> Result<Page<ImageId>, RegistryError> {
            self.repositories
                .get(repository)
                .cloned()
                .map(Page::last)
                .ok_or_else(|| {
                    RegistryError::permanent("ListImages", "repository not found")
                        .with_code("RepositoryNotFoundException")
                })
        }

        async fn batch_get_manifests(
            &self,
            _repository: &str,
            digests: &[Digest],
        ) -> Result<ManifestBatch, RegistryError> {
            Ok(ManifestBatch {
                manifests: digests
                    .iter()
                    .map(|digest| ecr_cleaner_core::Manifest {
                        digest: digest.clone(),
                        body: r#"{"schemaVersion":2,"layers":[]}"#.to_string(),
                    })
                    .collect(),
                failures: Vec::new(),
            })
        }

        async fn batch_delete_images(
            &self,
            _repository: &str,
            digests: &[Digest],
        ) -> Result<BatchDeleteOutcome, RegistryError> {
            Ok(BatchDeleteOutcome {
                deleted: digests.to_vec(),
                failures: Vec::new(),
            })
        }
    }

    fn names(values: &[&str]) -> RepositorySelection {
        RepositorySelection::Names(values.iter().map(ToString::to_string).collect())
    }

    #[tokio::test]
    async fn test_run_cleans_selected_repositories() {
        let report = run(
            Arc::new(StaticRegistry::new()),
            &RepositorySelection::All,
            &CleanConfig::default(),
        )
        .await
        .unwrap();

        assert_eq!(report.total(), 2);
        assert_eq!(report.deleted(), 1);
        let text = render_text(&report);
        assert!(text.contains("api: 1 tagged, 1 untagged, 1 orphaned, 1 deleted, 0 failed"));
        assert!(text.contains("web: 1 tagged, 0 untagged, 0 orphaned\n"));
        assert!(text.ends_with("Total: 2 repositories, 1 orphaned, 1 deleted, 0 failed to delete\n"));
    }

    #[tokio::test]
    async fn test_dry_run_summary() {
        let config = CleanConfig::default().with_dry_run(true);
        let report = run(Arc::new(StaticRegistry::new()), &names(&["api"]), &config)
            .await
            .unwrap();

        let text = render_text(&report);
        assert!(text.contains("would delete 1"));
        assert!(text.contains("(dry run, nothing deleted)"));
    }

    #[tokio::test]
    async fn test_failed_repository_in_summary() {
        let report = run(
            Arc::new(StaticRegistry::new()),
            &names(&["api", "missing"]),
            &CleanConfig::default(),
        )
        .await
        .unwrap();

        let text = render_text(&report);
        assert!(text.contains("missing: FAILED - Failed to list images for repository missing"));
        assert!(text.contains("1 repositories failed"));

        let summary = RunSummary::from_report(&report);
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["repositories"], 2);
        assert_eq!(json["failures"][0]["repository"], "missing");
        assert!(
            json["failures"][0]["error"]
                .as_str()
                .unwrap()
                .contains("repository not found")
        );
    }

    #[tokio::test]
    async fn test_nothing_selected() {
        let report = run(
            Arc::new(StaticRegistry::new()),
            &RepositorySelection::Pattern("^nope$".to_string()),
            &CleanConfig::default(),
        )
        .await
        .unwrap();

        assert_eq!(render_text(&report), "No repositories to clean\n");
        assert!(report.into_result().is_ok());
    }

    #[test]
    fn test_preflight_rejects_bad_pattern() {
        let args = CleanArgs {
            all: false,
            repositories: Vec::new(),
            pattern: Some("(".to_string()),
            dry_run: false,
            region: None,
            profile: None,
            max_concurrency: 8,
            manifest_concurrency: 4,
            max_retries: 3,
        };
        let err = preflight(&args).unwrap_err();
        assert_eq!(crate::cli::exit_code_for(&err), crate::cli::EXIT_CLI);
    }

    #[test]
    fn test_preflight_rejects_zero_concurrency() {
        let args = CleanArgs {
            all: true,
            repositories: Vec::new(),
            pattern: None,
            dry_run: false,
            region: None,
            profile: None,
            max_concurrency: 0,
            manifest_concurrency: 4,
            max_retries: 3,
        };
        let err = preflight(&args).unwrap_err();
        assert_eq!(crate::cli::exit_code_for(&err), crate::cli::EXIT_CLI);
        let CliError::Config { message, help } = err else {
            panic!("expected a configuration error");
        };
        assert!(message.contains("max_concurrent_repositories"));
        assert!(help.unwrap().contains("--max-concurrency"));
    }
}
