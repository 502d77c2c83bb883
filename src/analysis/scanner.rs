//! Per-file scanner
//!
//! Drives the logical line reader and the block stack, hands every statement
//! to the column and index interpreters, and yields what they found in file
//! order. The scanner is an iterator, so a scan is lazy; cloning it before
//! the first `next()` gives an independent restart.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use super::blocks::{is_block_end, keyword_block, BlockStack, KeywordBlock, TableFrame, TableMode};
use super::source::{LogicalLine, LogicalLines};
use super::syntax::{opens_block, parse_call};
use super::{columns, indexes};
use crate::domain::{Diagnostic, DiagnosticKind, Location, SchemaEvent};

/// Longest statement excerpt quoted in a diagnostic
const EXCERPT_LEN: usize = 80;

/// Item produced by a scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scanned {
    Event(SchemaEvent),
    Diagnostic(Diagnostic),
}

/// What an interpreter made of one statement
#[derive(Debug, Default)]
pub struct Interpretation {
    /// The statement matched a form this interpreter understands
    pub recognized: bool,
    pub events: Vec<SchemaEvent>,
    pub diagnostics: Vec<Diagnostic>,
    /// Table block opened by this statement's `do`
    pub opens_table: Option<(String, TableMode)>,
}

impl Interpretation {
    pub fn unrecognized() -> Self {
        Self::default()
    }

    pub fn recognized() -> Self {
        Self {
            recognized: true,
            ..Self::default()
        }
    }

    pub fn with_event(mut self, event: SchemaEvent) -> Self {
        self.events.push(event);
        self
    }

    pub fn with_events(mut self, events: impl IntoIterator<Item = SchemaEvent>) -> Self {
        self.events.extend(events);
        self
    }

    pub fn opening(mut self, table: impl Into<String>, mode: TableMode) -> Self {
        self.opens_table = Some((table.into(), mode));
        self
    }

    /// Recognized statement that is missing something it needs
    pub fn malformed(location: &Location, message: impl Into<String>) -> Self {
        Self::diagnosed(DiagnosticKind::MalformedDeclaration, location, message)
    }

    pub fn diagnosed(kind: DiagnosticKind, location: &Location, message: impl Into<String>) -> Self {
        Self {
            recognized: true,
            diagnostics: vec![Diagnostic::new(kind, location.clone(), message)],
            ..Self::default()
        }
    }
}

/// Where a statement sits
#[derive(Debug)]
pub struct StatementContext<'a> {
    pub location: Location,
    /// Innermost enclosing table block
    pub table: Option<&'a TableFrame>,
}

/// Lazy scan of one source text
#[derive(Debug, Clone)]
pub struct Scanner<'a> {
    path: PathBuf,
    lines: LogicalLines<'a>,
    blocks: BlockStack,
    pending: VecDeque<Scanned>,
    verbose: bool,
    finished: bool,
}

impl<'a> Scanner<'a> {
    /// `verbose` surfaces statements that matched nothing as `ParseSkip`
    pub fn new(path: impl AsRef<Path>, text: &'a str, verbose: bool) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lines: LogicalLines::new(text),
            blocks: BlockStack::new(),
            pending: VecDeque::new(),
            verbose,
            finished: false,
        }
    }

    fn step(&mut self, line: LogicalLine) {
        if line.cut_short {
            let excerpt: String = line.text.chars().take(EXCERPT_LEN).collect();
            self.pending.push_back(Scanned::Diagnostic(Diagnostic::new(
                DiagnosticKind::MalformedDeclaration,
                Location::new(&self.path, line.line),
                format!("statement never closes, read up to here: {}", excerpt),
            )));
        }

        if is_block_end(&line.text) {
            self.blocks.pop();
            return;
        }

        if let Some(keyword) = keyword_block(&line.text) {
            match keyword {
                KeywordBlock::Rollback => self.blocks.push_rollback(),
                KeywordBlock::Other => self.blocks.push_other(),
            }
            return;
        }

        let location = Location::new(&self.path, line.line);
        let Some(call) = parse_call(&line.text) else {
            if opens_block(&line.text) {
                self.blocks.push_other();
            }
            self.skip(location, &line.text);
            return;
        };

        let ctx = StatementContext {
            location,
            table: self.blocks.current_table(),
        };
        let column_ops = columns::interpret(&call, &ctx);
        let index_ops = indexes::interpret(&call, &ctx);
        let location = ctx.location;

        let recognized = column_ops.recognized || index_ops.recognized;
        let opens_table = column_ops.opens_table.clone();

        if !self.blocks.in_rollback() {
            for interpretation in [column_ops, index_ops] {
                self.pending
                    .extend(interpretation.events.into_iter().map(Scanned::Event));
                self.pending
                    .extend(interpretation.diagnostics.into_iter().map(Scanned::Diagnostic));
            }
        }

        if call.block.is_some() {
            self.blocks.open_call_block(&call, opens_table, line.line);
        } else if !recognized {
            self.skip(location, &line.text);
        }
    }

    fn skip(&mut self, location: Location, text: &str) {
        if !self.verbose {
            return;
        }
        let excerpt: String = text.chars().take(EXCERPT_LEN).collect();
        self.pending.push_back(Scanned::Diagnostic(Diagnostic::new(
            DiagnosticKind::ParseSkip,
            location,
            format!("unrecognized statement: {}", excerpt),
        )));
    }

    fn finish(&mut self) {
        self.finished = true;
        let unterminated: Vec<Diagnostic> = self
            .blocks
            .open_tables()
            .map(|table| {
                Diagnostic::new(
                    DiagnosticKind::UnterminatedBlock,
                    Location::new(&self.path, table.opened_at),
                    format!("block for table '{}' is never closed", table.name),
                )
            })
            .collect();
        self.pending
            .extend(unterminated.into_iter().map(Scanned::Diagnostic));
    }
}

impl Iterator for Scanner<'_> {
    type Item = Scanned;

    fn next(&mut self) -> Option<Scanned> {
        loop {
            if let Some(item) = self.pending.pop_front() {
                return Some(item);
            }
            if self.finished {
                return None;
            }
            match self.lines.next() {
                Some(line) => self.step(line),
                None => self.finish(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(text: &str, verbose: bool) -> Vec<Scanned> {
        Scanner::new("db/migrate/1_test.rb", text, verbose).collect()
    }

    #[test]
    fn test_rollback_statements_are_ignored() {
        let text = r#"
class AddCommentToAlbums < ActiveRecord::Migration[5.2]
  def up
    add_column :albums, :comment_id, :bigint
  end

  def down
    add_column :albums, :legacy_id, :bigint
  end
end
"#;
        let items = scan(text, false);
        assert_eq!(items.len(), 1);
        assert!(matches!(
            &items[0],
            Scanned::Event(SchemaEvent::ColumnDeclared(d)) if d.column == "comment_id"
        ));
    }

    #[test]
    fn test_reversible_down_block_is_ignored() {
        let text = r#"
def change
  reversible do |dir|
    dir.up do
      change_column :albums, :comment_id, :bigint
    end
    dir.down do
      change_column :albums, :comment_id, :string
    end
  end
end
"#;
        let items = scan(text, false);
        assert_eq!(items.len(), 1);
        assert!(matches!(
            &items[0],
            Scanned::Event(SchemaEvent::ColumnRetyped(c)) if c.new_kind == crate::domain::ColumnKind::Bigint
        ));
    }

    #[test]
    fn test_parse_skip_only_when_verbose() {
        let text = "execute \"UPDATE albums SET x = 1\"\n";
        assert!(scan(text, false).is_empty());

        let items = scan(text, true);
        assert_eq!(items.len(), 1);
        assert!(matches!(
            &items[0],
            Scanned::Diagnostic(d) if d.kind == DiagnosticKind::ParseSkip && d.location.line == 1
        ));
    }

    #[test]
    fn test_unterminated_table_block() {
        let text = "create_table :albums do |t|\n  t.bigint :comment_id\n";
        let items = scan(text, false);
        assert!(items.iter().any(|i| matches!(
            i,
            Scanned::Event(SchemaEvent::ColumnDeclared(d)) if d.table == "albums"
        )));
        assert!(matches!(
            items.last(),
            Some(Scanned::Diagnostic(d)) if d.kind == DiagnosticKind::UnterminatedBlock && d.location.line == 1
        ));
    }

    #[test]
    fn test_unparsed_do_block_keeps_table_context() {
        let text = r#"
create_table :albums do |t|
  Widget.registry.each do |name|
    puts name
  end
  t.bigint :comment_id
end
"#;
        let items = scan(text, false);
        assert!(items.iter().any(|i| matches!(
            i,
            Scanned::Event(SchemaEvent::ColumnDeclared(d)) if d.table == "albums" && d.column == "comment_id"
        )));
    }

    #[test]
    fn test_literals_do_not_hide_declarations() {
        let text = r#"
say %q(don't panic)
NAMES = %w(o'reilly)
slug = title.gsub(/'/, '')
add_column :albums, :comment_id, :bigint
add_column :albums, :artist_id, :bigint
"#;
        let items = scan(text, false);
        let columns: Vec<&str> = items
            .iter()
            .filter_map(|i| match i {
                Scanned::Event(SchemaEvent::ColumnDeclared(d)) => Some(d.column.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(columns, vec!["comment_id", "artist_id"]);
        assert!(items.iter().all(|i| matches!(i, Scanned::Event(_))));
    }

    #[test]
    fn test_unclosed_statement_is_diagnosed() {
        let text = "execute(\"SELECT 1\"\nadd_column :albums, :comment_id, :bigint\n";
        let items = scan(text, false);
        assert!(matches!(
            &items[0],
            Scanned::Diagnostic(d) if d.kind == DiagnosticKind::MalformedDeclaration && d.location.line == 1
        ));
        assert!(matches!(
            &items[1],
            Scanned::Event(SchemaEvent::ColumnDeclared(d)) if d.column == "comment_id" && d.location.line == 2
        ));
    }

    #[test]
    fn test_semicolon_separated_statements() {
        let text = "add_column :albums, :comment_id, :bigint; add_index :albums, :comment_id\n";
        let items = scan(text, false);
        assert_eq!(items.len(), 2);
        assert!(matches!(&items[0], Scanned::Event(SchemaEvent::ColumnDeclared(_))));
        assert!(matches!(&items[1], Scanned::Event(SchemaEvent::IndexAdded(_))));
    }

    #[test]
    fn test_scan_is_restartable() {
        let scanner = Scanner::new("a.rb", "add_index :albums, :comment_id\n", false);
        let first: Vec<_> = scanner.clone().collect();
        let second: Vec<_> = scanner.collect();
        assert_eq!(first, second);
        assert_eq!(first.len(), 1);
    }
}
