//! Change-set discovery
//!
//! Decides which migration files a run looks at and in what order. Files
//! come from the command line, from `git diff` against a base ref, or from a
//! scan of the migrations directory, in that order of preference.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use glob::Pattern;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::config::{FileOrder, LintConfig};
use crate::error::LintError;
use crate::infrastructure::GitClient;

/// Where the change set comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeSetSource {
    /// Exactly these files
    Explicit(Vec<PathBuf>),
    /// Files changed since the merge base with this ref
    GitDiff { base: String },
    /// Every migration in the migrations directory
    Directory,
}

impl ChangeSetSource {
    pub fn from_args(files: Vec<PathBuf>, base: Option<String>) -> Self {
        if !files.is_empty() {
            Self::Explicit(files)
        } else if let Some(base) = base {
            Self::GitDiff { base }
        } else {
            Self::Directory
        }
    }
}

/// Resolve the change set and put it in fold order
pub async fn discover(source: &ChangeSetSource, config: &LintConfig) -> Result<Vec<PathBuf>, LintError> {
    let mut files = match source {
        ChangeSetSource::Explicit(files) => files.clone(),
        ChangeSetSource::GitDiff { base } => {
            let changed = GitClient::new()
                .changed_files(base, &config.migrations_dir)
                .await?;
            info!("{} files changed since {}", changed.len(), base);
            changed
                .into_iter()
                .filter(|path| is_migration(path) && !should_exclude_file(path, config))
                .collect()
        }
        ChangeSetSource::Directory => scan_directory(&config.migrations_dir, config)?,
    };

    // The snapshot is never part of the change set
    files.retain(|path| path != &config.schema_path);
    dedup_in_place(&mut files);
    arrange(config.file_order, &mut files);

    debug!("Change set: {:?}", files);
    Ok(files)
}

fn scan_directory(dir: &Path, config: &LintConfig) -> Result<Vec<PathBuf>, LintError> {
    if !dir.exists() {
        info!("Migrations directory {} not found", dir.display());
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    let mut excluded = 0;
    for entry in WalkDir::new(dir).follow_links(true) {
        let entry = entry.map_err(|e| LintError::MigrationsUnreadable {
            path: dir.display().to_string(),
            message: e.to_string(),
        })?;
        let path = entry.path();
        if !entry.file_type().is_file() || !is_migration(path) {
            continue;
        }
        if should_exclude_file(path, config) {
            excluded += 1;
            continue;
        }
        files.push(path.to_path_buf());
    }

    if excluded > 0 {
        info!(
            "Found {} migration files ({} excluded by config)",
            files.len(),
            excluded
        );
    } else {
        info!("Found {} migration files", files.len());
    }

    Ok(files)
}

fn is_migration(path: &Path) -> bool {
    path.extension().map_or(false, |ext| ext == "rb")
}

/// Check if a file should be left out of the change set
pub fn should_exclude_file(file_path: &Path, config: &LintConfig) -> bool {
    let filename = file_path.file_name().and_then(|n| n.to_str()).unwrap_or("");

    // Check check_after threshold
    if let (Some(threshold), Some(prefix)) = (config.check_after, timestamp_prefix(file_path)) {
        if prefix < threshold {
            return true;
        }
    }

    // Check excluded_files patterns
    for pattern in &config.excluded_files {
        // Try as glob pattern first
        if let Ok(glob_pattern) = Pattern::new(pattern) {
            if glob_pattern.matches(filename) {
                return true;
            }
        }
        // Fall back to exact match
        if filename == pattern {
            return true;
        }
    }

    false
}

/// Numeric prefix of a migration file name (`20240101120000_add_x.rb`)
pub fn timestamp_prefix(path: &Path) -> Option<u64> {
    let filename = path.file_name()?.to_str()?;
    let digits: String = filename.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

/// Sort files into the configured fold order
pub fn arrange(order: FileOrder, files: &mut [PathBuf]) {
    match order {
        FileOrder::Lexical => files.sort(),
        // Files without a timestamp go last
        FileOrder::Timestamp => files.sort_by(|a, b| {
            let key = |p: &PathBuf| (timestamp_prefix(p).is_none(), timestamp_prefix(p));
            key(a).cmp(&key(b)).then_with(|| a.cmp(b))
        }),
        FileOrder::Given => {}
    }
}

fn dedup_in_place(files: &mut Vec<PathBuf>) {
    let mut seen = HashSet::new();
    files.retain(|path| seen.insert(path.clone()));
}
