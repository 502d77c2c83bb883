//! Index-operation extractor
//!
//! `add_index :table, :col` and `add_index :table, [:a, :b]` anywhere, and
//! `t.index ...` inside a table block (the form `schema.rb` uses). Options
//! such as `unique:` or `name:` do not matter for coverage and are ignored.

use std::path::Path;

use super::scanner::{Interpretation, Scanned, Scanner, StatementContext};
use super::syntax::{Call, Value};
use crate::domain::{DiagnosticKind, IndexDeclaration, Location, SchemaEvent};

/// Index events of one file, in file order
pub fn operations<'a>(path: &Path, text: &'a str) -> impl Iterator<Item = SchemaEvent> + Clone + 'a {
    Scanner::new(path, text, false).filter_map(|item| match item {
        Scanned::Event(event) if event.is_index_operation() => Some(event),
        _ => None,
    })
}

/// Interpret one statement
pub fn interpret(call: &Call, ctx: &StatementContext<'_>) -> Interpretation {
    match ctx.table {
        Some(frame) if call.has_receiver(&frame.var) && call.method == "index" => {
            index_statement(&frame.name, call.positional_at(0), &ctx.location)
        }
        _ if call.receiver.is_none() && call.method == "add_index" => match call.name_at(0) {
            Some(table) => index_statement(table, call.positional_at(1), &ctx.location),
            None => Interpretation::malformed(&ctx.location, "add_index without a table name"),
        },
        _ => Interpretation::unrecognized(),
    }
}

fn index_statement(table: &str, columns: Option<&Value>, location: &Location) -> Interpretation {
    let Some(columns) = columns else {
        return Interpretation::malformed(location, "index without columns");
    };

    match columns.as_names() {
        Some(names) if !names.is_empty() && names.iter().all(|n| is_column_name(n)) => {
            Interpretation::recognized().with_event(SchemaEvent::IndexAdded(IndexDeclaration {
                table: table.to_string(),
                columns: names.into_iter().map(str::to_string).collect(),
                location: location.clone(),
            }))
        }
        Some(names) if names.is_empty() => {
            Interpretation::malformed(location, "index with an empty column list")
        }
        _ => Interpretation::diagnosed(
            DiagnosticKind::UnsupportedIndexExpression,
            location,
            format!("index on {} is not a plain column list", table),
        ),
    }
}

fn is_column_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}
