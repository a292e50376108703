//! ecr-cleaner binary
//!
//! Deletes untagged images that no tagged manifest list references from
//! Amazon ECR repositories.

// CLI binary needs to output to stdout/stderr - this is intentional
#![allow(clippy::print_stdout, clippy::print_stderr)]

use ecr_cleaner::cli::{
    self, CliError, Commands, EXIT_CLEANUP, EXIT_OK, ErrorEnvelope, OkEnvelope, exit_code_for,
    render_error,
};
use ecr_cleaner::commands::clean::{self, RunSummary};
use ecr_cleaner::tracing::{TracingConfig, init_tracing};

/// Main entry point
fn main() {
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("Application panicked: {panic_info}");
        eprintln!("Internal error occurred. Run with RUST_LOG=debug for more information.");
    }));

    let cli = cli::parse();

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Fatal error: Failed to create tokio runtime: {e}");
            std::process::exit(1);
        }
    };

    let exit_code = rt.block_on(run(cli));
    std::process::exit(exit_code);
}

async fn run(cli: cli::Cli) -> i32 {
    if let Err(e) = init_tracing(TracingConfig {
        format: cli.log_format,
        level: cli.level.into(),
        filter: None,
    }) {
        eprintln!("{e:?}");
        return cli::EXIT_CLI;
    }

    let json = cli.json;
    let result = match cli.command {
        Commands::Clean(args) => run_clean(&args, json).await,
    };

    match result {
        Ok(code) => code,
        Err(err) => {
            let code = exit_code_for(&err);
            render_error(err, json);
            code
        }
    }
}

async fn run_clean(args: &cli::CleanArgs, json: bool) -> Result<i32, CliError> {
    let report = clean::execute(args).await?;

    if !json {
        print!("{}", clean::render_text(&report));
        report.into_result()?;
        return Ok(EXIT_OK);
    }

    let summary = RunSummary::from_report(&report);
    let (out, code) = if report.is_success() {
        (serde_json::to_string(&OkEnvelope::new(summary)), EXIT_OK)
    } else {
        // Failed runs still carry the per-repository summary.
        let envelope = ErrorEnvelope::new(serde_json::json!({
            "code": "cleanup",
            "message": format!(
                "Cleanup failed for {} of {} repositories",
                report.failures.len(),
                report.total()
            ),
            "summary": summary,
        }));
        (serde_json::to_string(&envelope), EXIT_CLEANUP)
    };
    let out = out.map_err(|e| CliError::config(format!("Failed to serialize summary: {e}")))?;
    println!("{out}");
    Ok(code)
}
