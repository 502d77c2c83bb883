//! Lint run configuration.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::analysis::ReconcileOptions;
use crate::error::ConfigError;

/// Total order imposed on change-set files before folding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FileOrder {
    /// Path order
    #[default]
    Lexical,
    /// Numeric migration timestamp prefix, then path
    Timestamp,
    /// Order the files were given in
    Given,
}

/// Which violations make it into the report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ReportScope {
    /// Only columns a change-set file declared, retyped or renamed
    #[default]
    Changed,
    /// Every unindexed foreign key, snapshot included
    All,
}

/// Contents of `.fkguard.yaml`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LintConfig {
    /// Canonical schema snapshot
    #[serde(default = "default_schema_path")]
    pub schema_path: PathBuf,

    /// Directory holding migration files
    #[serde(default = "default_migrations_dir")]
    pub migrations_dir: PathBuf,

    /// Column name suffix marking a foreign key
    #[serde(default = "default_foreign_key_suffix")]
    pub foreign_key_suffix: String,

    /// Glob patterns or exact file names left out of directory scans
    #[serde(default)]
    pub excluded_files: Vec<String>,

    /// Skip migrations whose timestamp prefix is below this
    #[serde(default)]
    pub check_after: Option<u64>,

    /// `table.column` or `*.column` entries that are never reported
    #[serde(default)]
    pub ignored_columns: Vec<String>,

    #[serde(default)]
    pub file_order: FileOrder,

    #[serde(default)]
    pub report_scope: ReportScope,

    /// Treat `references` columns as indexed unless they say `index: false`
    #[serde(default)]
    pub references_indexed_by_default: bool,

    /// Print FKGUARD_EVENT lines for CI log parsing
    #[serde(default)]
    pub emit_events: bool,
}

fn default_schema_path() -> PathBuf {
    PathBuf::from("db/schema.rb")
}

fn default_migrations_dir() -> PathBuf {
    PathBuf::from("db/migrate")
}

fn default_foreign_key_suffix() -> String {
    "_id".to_string()
}

impl Default for LintConfig {
    fn default() -> Self {
        Self {
            schema_path: default_schema_path(),
            migrations_dir: default_migrations_dir(),
            foreign_key_suffix: default_foreign_key_suffix(),
            excluded_files: Vec::new(),
            check_after: None,
            ignored_columns: Vec::new(),
            file_order: FileOrder::default(),
            report_scope: ReportScope::default(),
            references_indexed_by_default: false,
            emit_events: false,
        }
    }
}

impl LintConfig {
    /// Validate field values
    ///
    /// # Errors
    /// Returns error on an empty suffix or path, a malformed exclusion glob,
    /// or an ignored column that is not `table.column`
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.foreign_key_suffix.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "foreign_key_suffix".to_string(),
                value: self.foreign_key_suffix.clone(),
            });
        }

        if self.schema_path.as_os_str().is_empty() {
            return Err(ConfigError::MissingField {
                field: "schema_path".to_string(),
            });
        }

        if self.migrations_dir.as_os_str().is_empty() {
            return Err(ConfigError::MissingField {
                field: "migrations_dir".to_string(),
            });
        }

        for pattern in &self.excluded_files {
            if glob::Pattern::new(pattern).is_err() {
                return Err(ConfigError::InvalidValue {
                    field: "excluded_files".to_string(),
                    value: pattern.clone(),
                });
            }
        }

        for entry in &self.ignored_columns {
            let valid = matches!(
                entry.split_once('.'),
                Some((table, column)) if !table.is_empty() && !column.is_empty() && !column.contains('.')
            );
            if !valid {
                return Err(ConfigError::InvalidValue {
                    field: "ignored_columns".to_string(),
                    value: entry.clone(),
                });
            }
        }

        Ok(())
    }

    pub fn reconcile_options(&self) -> ReconcileOptions {
        ReconcileOptions {
            foreign_key_suffix: self.foreign_key_suffix.clone(),
            references_indexed_by_default: self.references_indexed_by_default,
            scope: self.report_scope,
            ignored_columns: self.ignored_columns.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_yaml() {
        let config: LintConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config.schema_path, PathBuf::from("db/schema.rb"));
        assert_eq!(config.migrations_dir, PathBuf::from("db/migrate"));
        assert_eq!(config.foreign_key_suffix, "_id");
        assert_eq!(config.file_order, FileOrder::Lexical);
        assert_eq!(config.report_scope, ReportScope::Changed);
        assert!(!config.references_indexed_by_default);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
schema_path: db/structure_schema.rb
migrations_dir: db/migrations
excluded_files:
  - "*_data.rb"
  - 20200101000000_legacy.rb
check_after: 20230101000000
ignored_columns:
  - "*.tenant_id"
  - albums.external_id
file_order: timestamp
report_scope: all
references_indexed_by_default: true
"#;
        let config: LintConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.excluded_files.len(), 2);
        assert_eq!(config.check_after, Some(20230101000000));
        assert_eq!(config.file_order, FileOrder::Timestamp);
        assert_eq!(config.report_scope, ReportScope::All);
        assert!(config.validate().is_ok());

        let options = config.reconcile_options();
        assert!(options.references_indexed_by_default);
        assert_eq!(options.ignored_columns.len(), 2);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = LintConfig {
            foreign_key_suffix: " ".to_string(),
            ..LintConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { field, .. }) if field == "foreign_key_suffix"
        ));

        let config = LintConfig {
            ignored_columns: vec!["tenant_id".to_string()],
            ..LintConfig::default()
        };
        assert!(config.validate().is_err());

        let config = LintConfig {
            excluded_files: vec!["[".to_string()],
            ..LintConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_scope_is_rejected() {
        assert!(serde_yaml::from_str::<LintConfig>("report_scope: some").is_err());
    }
}
