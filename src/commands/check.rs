//! # Check Command
//!
//! Resolves the change set, runs the lint service, renders the report in
//! the requested format and hands the verdict back to `main` for the exit
//! code.

use anyhow::{Context, Result};
use colored::Colorize;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::cli::{CheckArgs, OutputFormat};
use crate::config::{load_lint_config, LintConfig};
use crate::domain::{Diagnostic, Violation};
use crate::infrastructure::GitClient;
use crate::observability::{EventMetadata, LintTracker};
use crate::services::{change_set, ChangeSetSource, LintOutcome, LintReport, LintService};
use crate::ui;

/// Run `fkguard check`
pub async fn execute(args: CheckArgs, config_path: Option<PathBuf>, verbose: bool) -> Result<LintOutcome> {
    let mut config =
        load_lint_config(config_path.as_deref()).context("Failed to load configuration")?;
    apply_overrides(&mut config, &args);
    debug!("Effective configuration: {:?}", config);

    let source = ChangeSetSource::from_args(args.files.clone(), args.base.clone());
    let files = change_set::discover(&source, &config)
        .await
        .context("Failed to resolve the change set")?;

    let git_sha = GitClient::new().get_sha().await.ok();
    let metadata = EventMetadata::new(repository_name(), git_sha);
    let tracker = LintTracker::start(
        metadata,
        config.schema_path.display().to_string(),
        files.len(),
        config.emit_events,
    );

    let service = LintService::new(&config, verbose);
    let report = match service.run(&files).await {
        Ok(report) => report,
        Err(e) => {
            tracker.fail(e.to_string()).await;
            return Err(e).context("Lint run failed");
        }
    };

    match args.format {
        OutputFormat::Text => print_text(&report),
        OutputFormat::Json => println!("{}", render_json(&report)?),
        OutputFormat::Github => print!("{}", render_github(&report)),
    }

    tracker
        .complete(report.violations.len(), report.diagnostics.len(), &report.stats)
        .await;
    info!(
        "Lint finished in {:.2}s",
        report.duration.as_secs_f64()
    );

    Ok(report.outcome())
}

/// Command-line flags win over file values
fn apply_overrides(config: &mut LintConfig, args: &CheckArgs) {
    if let Some(ref schema) = args.schema {
        config.schema_path = schema.clone();
    }
    if let Some(ref dir) = args.migrations_dir {
        config.migrations_dir = dir.clone();
    }
    if let Some(order) = args.order {
        config.file_order = order;
    }
    if let Some(scope) = args.scope {
        config.report_scope = scope;
    }
    if args.emit_events {
        config.emit_events = true;
    }
}

/// `GITHUB_REPOSITORY`, else the working directory's name
fn repository_name() -> String {
    if let Ok(repo) = std::env::var("GITHUB_REPOSITORY") {
        if !repo.is_empty() {
            return repo;
        }
    }
    std::env::current_dir()
        .ok()
        .and_then(|dir| dir.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "unknown".to_string())
}

fn print_text(report: &LintReport) {
    ui::print_header("Foreign key index check");

    let version = report
        .schema_version
        .as_deref()
        .map(|v| format!(" (version {})", v))
        .unwrap_or_default();
    ui::print_info(&format!(
        "Schema {}{}, {} migration files, {} foreign keys",
        report.schema.display(),
        version,
        report.files.len(),
        report.stats.foreign_keys
    ));

    if !report.diagnostics.is_empty() {
        println!();
        ui::print_warning(&format!("{} diagnostics", report.diagnostics.len()));
        for diagnostic in &report.diagnostics {
            ui::print_diagnostic(diagnostic);
        }
    }

    println!();
    match report.outcome() {
        LintOutcome::Clean => ui::print_success("All foreign keys are indexed"),
        LintOutcome::Violations(count) => {
            for violation in &report.violations {
                ui::print_violation(violation);
            }
            println!();
            println!(
                "{}",
                format!("Found {} unindexed foreign keys", count).bright_red().bold()
            );
        }
    }
}

#[derive(Serialize)]
struct JsonViolation<'a> {
    #[serde(flatten)]
    violation: &'a Violation,
    suggestion: String,
}

#[derive(Serialize)]
struct JsonReport<'a> {
    outcome: &'static str,
    schema: &'a Path,
    schema_version: Option<&'a str>,
    files: &'a [PathBuf],
    violations: Vec<JsonViolation<'a>>,
    diagnostics: &'a [Diagnostic],
    stats: &'a crate::analysis::ReconcileStats,
    duration_secs: f64,
}

fn render_json(report: &LintReport) -> Result<String> {
    let document = JsonReport {
        outcome: match report.outcome() {
            LintOutcome::Clean => "clean",
            LintOutcome::Violations(_) => "violations",
        },
        schema: &report.schema,
        schema_version: report.schema_version.as_deref(),
        files: &report.files,
        violations: report
            .violations
            .iter()
            .map(|violation| JsonViolation {
                violation,
                suggestion: violation.suggestion(),
            })
            .collect(),
        diagnostics: &report.diagnostics,
        stats: &report.stats,
        duration_secs: report.duration.as_secs_f64(),
    };
    serde_json::to_string_pretty(&document).context("Failed to serialize report")
}

/// GitHub Actions workflow commands, one per line
fn render_github(report: &LintReport) -> String {
    let mut output = String::new();

    for violation in &report.violations {
        output.push_str(&format!(
            "::error file={},line={},title=Missing index on {}.{}::{}\n",
            violation.location.file.display(),
            violation.location.line,
            violation.table,
            violation.column,
            escape_annotation(&violation.format())
        ));
    }

    for diagnostic in &report.diagnostics {
        let position = if diagnostic.location.line > 0 {
            format!(
                "file={},line={}",
                diagnostic.location.file.display(),
                diagnostic.location.line
            )
        } else {
            format!("file={}", diagnostic.location.file.display())
        };
        output.push_str(&format!(
            "::warning {},title={}::{}\n",
            position,
            diagnostic.kind.name(),
            escape_annotation(&diagnostic.message)
        ));
    }

    output
}

/// Workflow command data must not contain raw `%`, CR or LF
fn escape_annotation(text: &str) -> String {
    text.replace('%', "%25")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}
