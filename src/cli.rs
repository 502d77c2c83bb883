//! CLI definitions for fkguard
//!
//! This module contains all CLI argument parsing structures using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::config::{FileOrder, ReportScope};

#[derive(Parser)]
#[command(
    name = "fkguard",
    version,
    about = "Find foreign-key columns without a supporting index in Rails migrations",
    long_about = "Statically reads migration files and db/schema.rb, folds every column and index\noperation in order, and reports foreign-key columns that no index covers.\nMigration files are never executed."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging and parse-skip diagnostics
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file (default: .fkguard.yaml if present)
    #[arg(long, global = true, env = "FKGUARD_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Check a change set of migrations for unindexed foreign keys
    Check(CheckArgs),
}

#[derive(clap::Args, Debug, Clone, Default)]
pub struct CheckArgs {
    /// Migration files to check (default: changed files, or the whole directory)
    pub files: Vec<PathBuf>,

    /// Canonical schema snapshot
    #[arg(long)]
    pub schema: Option<PathBuf>,

    /// Directory holding migration files
    #[arg(long)]
    pub migrations_dir: Option<PathBuf>,

    /// Check files changed since the merge base with this git ref
    #[arg(long, env = "FKGUARD_BASE")]
    pub base: Option<String>,

    /// Order in which change-set files are folded
    #[arg(long, value_enum)]
    pub order: Option<FileOrder>,

    /// Report only changed columns or every unindexed foreign key
    #[arg(long, value_enum)]
    pub scope: Option<ReportScope>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Emit FKGUARD_EVENT lines on stderr
    #[arg(long)]
    pub emit_events: bool,
}

/// Report rendering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Colored human-readable report
    #[default]
    Text,
    /// One JSON document on stdout
    Json,
    /// GitHub Actions workflow annotations
    Github,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_check_with_flags() {
        let cli = Cli::try_parse_from([
            "fkguard",
            "-v",
            "check",
            "--schema",
            "db/schema.rb",
            "--order",
            "timestamp",
            "--scope",
            "all",
            "--format",
            "json",
            "db/migrate/1_a.rb",
            "db/migrate/2_b.rb",
        ])
        .unwrap();

        assert!(cli.verbose);
        let Commands::Check(args) = cli.command;
        assert_eq!(args.files.len(), 2);
        assert_eq!(args.schema, Some(PathBuf::from("db/schema.rb")));
        assert_eq!(args.order, Some(FileOrder::Timestamp));
        assert_eq!(args.scope, Some(ReportScope::All));
        assert_eq!(args.format, OutputFormat::Json);
        assert!(!args.emit_events);
    }

    #[test]
    fn test_check_defaults() {
        let cli = Cli::try_parse_from(["fkguard", "check"]).unwrap();
        let Commands::Check(args) = cli.command;
        assert!(args.files.is_empty());
        assert_eq!(args.format, OutputFormat::Text);
        assert!(args.order.is_none());
    }

    #[test]
    fn test_rejects_unknown_format() {
        assert!(Cli::try_parse_from(["fkguard", "check", "--format", "xml"]).is_err());
    }
}
