//! # Configuration
//!
//! `.fkguard.yaml` in the working directory, or the file given with
//! `--config`. Every field has a default, so the file is optional unless
//! named explicitly. Command-line flags override file values.
//!
//! ```yaml
//! schema_path: db/schema.rb
//! migrations_dir: db/migrate
//! ignored_columns: ["*.tenant_id"]
//! report_scope: changed
//! ```

mod lint;

pub use lint::{FileOrder, LintConfig, ReportScope};

use std::path::Path;
use tracing::debug;

use crate::error::ConfigError;

/// File looked up when `--config` is not given
pub const DEFAULT_CONFIG_FILE: &str = ".fkguard.yaml";

/// Load and validate the lint configuration.
///
/// An explicit path must exist; the default file may be absent, in which
/// case every field takes its default.
pub fn load_lint_config(explicit: Option<&Path>) -> Result<LintConfig, ConfigError> {
    let path = explicit.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));

    if !path.exists() {
        if explicit.is_some() {
            return Err(ConfigError::FileNotFound {
                path: path.display().to_string(),
            });
        }
        debug!("No {} found, using defaults", DEFAULT_CONFIG_FILE);
        return Ok(LintConfig::default());
    }

    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ParseError {
        message: format!("failed to read {}: {}", path.display(), e),
    })?;
    let config = parse_lint_config(&content).map_err(|e| match e {
        ConfigError::ParseError { message } => ConfigError::ParseError {
            message: format!("{}: {}", path.display(), message),
        },
        other => other,
    })?;

    debug!("Loaded configuration from {}", path.display());
    Ok(config)
}

/// Parse and validate configuration text
pub fn parse_lint_config(content: &str) -> Result<LintConfig, ConfigError> {
    // An empty file is a valid, all-defaults configuration
    if content.trim().is_empty() {
        return Ok(LintConfig::default());
    }

    let config: LintConfig = serde_yaml::from_str(content).map_err(|e| ConfigError::ParseError {
        message: e.to_string(),
    })?;
    config.validate()?;
    Ok(config)
}
