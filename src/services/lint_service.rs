//! Lint service - runs the analysis over a change set
//!
//! Reads the snapshot and every change-set file, extracts each file on its
//! own task, and reconciles once all partial results are in. Only a missing
//! or unreadable snapshot fails the run; an unreadable change-set file is a
//! diagnostic.

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::analysis::{
    extract_file, snapshot, ExtractedFile, ReconcileStats, Reconciler, SnapshotFacts,
};
use crate::config::LintConfig;
use crate::domain::{Diagnostic, Violation};
use crate::error::LintError;

/// A file's path and contents
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceText {
    pub path: PathBuf,
    pub text: String,
}

impl SourceText {
    pub fn new(path: impl Into<PathBuf>, text: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            text: text.into(),
        }
    }
}

/// The verdict of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LintOutcome {
    Clean,
    Violations(usize),
}

/// Everything a reporter needs
#[derive(Debug, Clone, Serialize)]
pub struct LintReport {
    pub schema: PathBuf,
    pub schema_version: Option<String>,
    /// Change-set files in fold order
    pub files: Vec<PathBuf>,
    pub violations: Vec<Violation>,
    pub diagnostics: Vec<Diagnostic>,
    pub stats: ReconcileStats,
    #[serde(skip)]
    pub duration: Duration,
}

impl LintReport {
    pub fn outcome(&self) -> LintOutcome {
        if self.violations.is_empty() {
            LintOutcome::Clean
        } else {
            LintOutcome::Violations(self.violations.len())
        }
    }

    pub fn is_clean(&self) -> bool {
        self.outcome() == LintOutcome::Clean
    }
}

/// Service for linting migrations against the schema snapshot
pub struct LintService {
    schema_path: PathBuf,
    reconciler: Reconciler,
    verbose: bool,
}

impl LintService {
    /// Create a lint service from configuration
    pub fn new(config: &LintConfig, verbose: bool) -> Self {
        Self {
            schema_path: config.schema_path.clone(),
            reconciler: Reconciler::new(config.reconcile_options()),
            verbose,
        }
    }

    /// Analyze texts already in memory.
    ///
    /// `change_set` is folded in the order given.
    pub fn analyze(
        &self,
        snapshot: Option<&SourceText>,
        change_set: &[SourceText],
    ) -> Result<LintReport, LintError> {
        let start = Instant::now();
        let snapshot = snapshot.ok_or_else(|| LintError::SnapshotMissing {
            path: self.schema_path.display().to_string(),
        })?;

        let facts = snapshot::extract(&snapshot.path, &snapshot.text, self.verbose);
        let extracted = change_set
            .iter()
            .map(|source| extract_file(&source.path, &source.text, self.verbose))
            .collect();

        Ok(self.reconcile(&snapshot.path, facts, extracted, start))
    }

    /// Read and lint `files`, folded in the order given
    pub async fn run(&self, files: &[PathBuf]) -> Result<LintReport, LintError> {
        let start = Instant::now();
        info!(
            "Linting {} migration files against {}",
            files.len(),
            self.schema_path.display()
        );

        let text = read_snapshot(&self.schema_path).await?;
        let facts = snapshot::extract(&self.schema_path, &text, self.verbose);
        debug!(
            "Snapshot: {} tables, {} indexes, version {}",
            facts.tables.len(),
            facts.index_count(),
            facts.version.as_deref().unwrap_or("unknown")
        );

        let handles: Vec<_> = files
            .iter()
            .cloned()
            .map(|path| {
                let verbose = self.verbose;
                let task_path = path.clone();
                let handle = tokio::spawn(async move {
                    match tokio::fs::read_to_string(&task_path).await {
                        Ok(text) => extract_file(&task_path, &text, verbose),
                        Err(e) => {
                            warn!("Failed to read {}: {}", task_path.display(), e);
                            ExtractedFile::unreadable(&task_path, format!("failed to read: {}", e))
                        }
                    }
                });
                (path, handle)
            })
            .collect();

        let mut extracted = Vec::with_capacity(handles.len());
        for (path, handle) in handles {
            let file = match handle.await {
                Ok(file) => file,
                Err(e) => ExtractedFile::unreadable(&path, format!("extraction aborted: {}", e)),
            };
            debug!(
                "{}: {} events, {} diagnostics",
                path.display(),
                file.events.len(),
                file.diagnostics.len()
            );
            extracted.push(file);
        }

        Ok(self.reconcile(&self.schema_path, facts, extracted, start))
    }

    fn reconcile(
        &self,
        schema: &Path,
        facts: SnapshotFacts,
        extracted: Vec<ExtractedFile>,
        start: Instant,
    ) -> LintReport {
        let result = self.reconciler.reconcile(&facts, &extracted);
        info!(
            "Checked {} foreign keys across {} columns: {} violations",
            result.stats.foreign_keys,
            result.stats.columns_tracked,
            result.violations.len()
        );
        for diagnostic in &result.diagnostics {
            debug!("{}", diagnostic.format());
        }

        LintReport {
            schema: schema.to_path_buf(),
            schema_version: facts.version,
            files: extracted.into_iter().map(|file| file.path).collect(),
            violations: result.violations,
            diagnostics: result.diagnostics,
            stats: result.stats,
            duration: start.elapsed(),
        }
    }
}

async fn read_snapshot(path: &Path) -> Result<String, LintError> {
    tokio::fs::read_to_string(path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            LintError::SnapshotMissing {
                path: path.display().to_string(),
            }
        } else {
            LintError::SnapshotUnreadable {
                path: path.display().to_string(),
                message: e.to_string(),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DiagnosticKind;

    const SCHEMA: &str = r#"
ActiveRecord::Schema[7.1].define(version: 2024_01_01_000000) do
  create_table "albums", force: :cascade do |t|
    t.string "title"
  end
end
"#;

    fn service() -> LintService {
        LintService::new(&LintConfig::default(), false)
    }

    #[test]
    fn test_analyze_requires_snapshot() {
        let result = service().analyze(None, &[]);
        assert!(matches!(result, Err(LintError::SnapshotMissing { .. })));
    }

    #[test]
    fn test_analyze_in_memory() {
        let snapshot = SourceText::new("db/schema.rb", SCHEMA);
        let change_set = vec![
            SourceText::new(
                "db/migrate/1_add.rb",
                "add_column :albums, :comment_id, :string\n",
            ),
            SourceText::new(
                "db/migrate/2_change.rb",
                "change_column :albums, :comment_id, :bigint\n",
            ),
        ];

        let report = service().analyze(Some(&snapshot), &change_set).unwrap();
        assert_eq!(report.outcome(), LintOutcome::Violations(1));
        assert_eq!(report.schema_version.as_deref(), Some("20240101000000"));
        assert_eq!(report.files.len(), 2);
        assert_eq!(report.stats.files, 2);
    }

    #[tokio::test]
    async fn test_run_reads_files_and_tolerates_failures() {
        let dir = tempfile::tempdir().unwrap();
        let schema = dir.path().join("schema.rb");
        std::fs::write(&schema, SCHEMA).unwrap();
        let good = dir.path().join("1_add.rb");
        std::fs::write(
            &good,
            "add_column :albums, :comment_id, :bigint\nadd_index :albums, :comment_id\n",
        )
        .unwrap();
        let missing = dir.path().join("2_missing.rb");

        let config = LintConfig {
            schema_path: schema,
            ..LintConfig::default()
        };
        let report = LintService::new(&config, false)
            .run(&[good.clone(), missing.clone()])
            .await
            .unwrap();

        assert!(report.is_clean());
        assert_eq!(report.files, vec![good, missing]);
        assert_eq!(report.diagnostics.len(), 1);
        assert_eq!(report.diagnostics[0].kind, DiagnosticKind::FileReadFailure);
    }

    #[tokio::test]
    async fn test_run_without_snapshot_fails() {
        let dir = tempfile::tempdir().unwrap();
        let config = LintConfig {
            schema_path: dir.path().join("schema.rb"),
            ..LintConfig::default()
        };

        let result = LintService::new(&config, false).run(&[]).await;
        assert!(matches!(result, Err(LintError::SnapshotMissing { .. })));
    }

    #[tokio::test]
    async fn test_run_matches_analyze() {
        let dir = tempfile::tempdir().unwrap();
        let schema = dir.path().join("schema.rb");
        std::fs::write(&schema, SCHEMA).unwrap();
        let migration = dir.path().join("1_add.rb");
        let text = "create_table :comments do |t|\n  t.references :album\nend\n";
        std::fs::write(&migration, text).unwrap();

        let config = LintConfig {
            schema_path: schema.clone(),
            ..LintConfig::default()
        };
        let service = LintService::new(&config, false);

        let from_disk = service.run(&[migration.clone()]).await.unwrap();
        let in_memory = service
            .analyze(
                Some(&SourceText::new(&schema, SCHEMA)),
                &[SourceText::new(&migration, text)],
            )
            .unwrap();

        assert_eq!(from_disk.violations, in_memory.violations);
        assert_eq!(from_disk.violations[0].column, "album_id");
    }
}
