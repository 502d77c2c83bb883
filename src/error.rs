//! Centralized error types for fkguard
//!
//! Uses thiserror for typed errors that can be matched on,
//! while still being compatible with anyhow for propagation.
//! Per-file and per-line problems never become errors; they are
//! diagnostics on the report.

use thiserror::Error;

/// A run that could not produce a verdict
#[derive(Error, Debug)]
pub enum LintError {
    #[error("Schema snapshot not found: {path}")]
    SnapshotMissing { path: String },

    #[error("Schema snapshot {path} could not be read: {message}")]
    SnapshotUnreadable { path: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Git error: {0}")]
    Git(#[from] GitError),

    #[error("Migrations directory {path} could not be scanned: {message}")]
    MigrationsUnreadable { path: String, message: String },
}

/// Git operation errors
#[derive(Error, Debug)]
pub enum GitError {
    #[error("Not a git repository")]
    NotARepository,

    #[error("Failed to get git SHA: {0}")]
    ShaFailed(String),

    #[error("Git command failed: {command}: {message}")]
    CommandFailed { command: String, message: String },

    #[error("Unknown git ref: {reference}")]
    UnknownRef { reference: String },
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Required configuration missing: {field}")]
    MissingField { field: String },

    #[error("Invalid configuration value for {field}: {value}")]
    InvalidValue { field: String, value: String },

    #[error("Config file not found: {path}")]
    FileNotFound { path: String },

    #[error("Failed to parse config: {message}")]
    ParseError { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_error_display() {
        let err = LintError::SnapshotMissing {
            path: "db/schema.rb".to_string(),
        };
        assert!(err.to_string().contains("db/schema.rb"));
    }

    #[test]
    fn test_error_conversion() {
        let config_err = ConfigError::FileNotFound {
            path: ".fkguard.yaml".to_string(),
        };
        let lint_err: LintError = config_err.into();
        assert!(matches!(lint_err, LintError::Config(_)));

        let lint_err: LintError = GitError::NotARepository.into();
        assert!(matches!(lint_err, LintError::Git(_)));
    }
}
