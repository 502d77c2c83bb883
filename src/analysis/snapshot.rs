//! Schema snapshot extractor
//!
//! `db/schema.rb` uses the same table-block syntax as migrations, so both
//! extractors run over it unchanged. On top of that the snapshot records
//! table order and the schema version, and every declaration carrying
//! `index: true` becomes an explicit single-column index.

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;

use super::scanner::{Scanned, Scanner};
use crate::domain::{Diagnostic, IndexDeclaration, SchemaEvent, TableDefinition};

static SCHEMA_VERSION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"define\(\s*version:\s*([0-9_]+)\s*\)").unwrap());

/// Everything the snapshot contributes to reconciliation
#[derive(Debug, Clone, Default)]
pub struct SnapshotFacts {
    /// `ActiveRecord::Schema.define(version: ...)`, underscores removed
    pub version: Option<String>,
    /// Tables in snapshot order
    pub tables: Vec<TableDefinition>,
    pub events: Vec<SchemaEvent>,
    pub diagnostics: Vec<Diagnostic>,
}

impl SnapshotFacts {
    pub fn index_count(&self) -> usize {
        self.events
            .iter()
            .filter(|e| e.is_index_operation())
            .count()
    }
}

/// Extract the snapshot facts from `schema.rb` text
pub fn extract(path: &Path, text: &str, verbose: bool) -> SnapshotFacts {
    let mut facts = SnapshotFacts {
        version: SCHEMA_VERSION
            .captures(text)
            .map(|caps| caps[1].replace('_', "")),
        ..SnapshotFacts::default()
    };

    for item in Scanner::new(path, text, verbose) {
        match item {
            Scanned::Event(event) => {
                if let SchemaEvent::TableDefined(table) = &event {
                    facts.tables.push(table.clone());
                }
                let inline = match &event {
                    SchemaEvent::ColumnDeclared(decl) if decl.declared_with_inline_index() => {
                        Some(SchemaEvent::IndexAdded(IndexDeclaration {
                            table: decl.table.clone(),
                            columns: vec![decl.column.clone()],
                            location: decl.location.clone(),
                        }))
                    }
                    _ => None,
                };
                facts.events.push(event);
                facts.events.extend(inline);
            }
            Scanned::Diagnostic(diagnostic) => facts.diagnostics.push(diagnostic),
        }
    }

    facts
}
