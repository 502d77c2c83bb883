//! Static analysis of migration sources
//!
//! Text goes in, events come out: [`source`] produces logical lines
//! (with [`lexer`] keeping literals out of the way),
//! [`syntax`] parses them as calls, [`blocks`] tracks which table a statement
//! belongs to, and the [`columns`] and [`indexes`] extractors turn calls into
//! [`SchemaEvent`]s. [`snapshot`] does the same for `schema.rb`, and
//! [`reconciler`] folds every event into the violation list.

pub mod blocks;
pub mod columns;
pub mod indexes;
pub mod lexer;
pub mod reconciler;
pub mod scanner;
pub mod snapshot;
pub mod source;
pub mod syntax;

use std::path::{Path, PathBuf};

use crate::domain::{Diagnostic, DiagnosticKind, Location, SchemaEvent};
use scanner::{Scanned, Scanner};

pub use reconciler::{ReconcileOptions, ReconcileStats, Reconciler};
pub use snapshot::SnapshotFacts;

/// Everything extracted from one change-set file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedFile {
    pub path: PathBuf,
    /// Column and index events, in file order
    pub events: Vec<SchemaEvent>,
    pub diagnostics: Vec<Diagnostic>,
}

impl ExtractedFile {
    /// A file that could not be read contributes no events
    pub fn unreadable(path: &Path, message: impl Into<String>) -> Self {
        Self {
            path: path.to_path_buf(),
            events: Vec::new(),
            diagnostics: vec![Diagnostic::new(
                DiagnosticKind::FileReadFailure,
                Location::new(path, 0),
                message,
            )],
        }
    }
}

/// Run both extractors over one file in a single pass
pub fn extract_file(path: &Path, text: &str, verbose: bool) -> ExtractedFile {
    let mut file = ExtractedFile {
        path: path.to_path_buf(),
        events: Vec::new(),
        diagnostics: Vec::new(),
    };

    for item in Scanner::new(path, text, verbose) {
        match item {
            Scanned::Event(event) => file.events.push(event),
            Scanned::Diagnostic(diagnostic) => file.diagnostics.push(diagnostic),
        }
    }

    file
}
