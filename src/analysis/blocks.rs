//! Block tracking
//!
//! One state machine per file. The only state the extractors need is the
//! table whose block encloses the current statement, plus whether the
//! statement sits in a rollback (`def down`, `dir.down do`). Blocks are
//! entered on `do` or a keyword opener and left on `end`, never on
//! indentation.

use super::syntax::Call;

/// Keywords that open a block closed by `end` when they start a statement
const KEYWORD_OPENERS: &[&str] = &[
    "class", "module", "def", "if", "unless", "case", "while", "until", "begin", "for",
];

/// How a table block was opened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableMode {
    /// `create_table`, `create_join_table`
    Create,
    /// `change_table`
    Change,
}

/// The table a `do |t|` block is about
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableFrame {
    pub name: String,
    /// Block parameter used as receiver inside the block (`t`)
    pub var: String,
    pub mode: TableMode,
    /// Line the block was opened on
    pub opened_at: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Frame {
    Table(TableFrame),
    Rollback,
    Other,
}

/// Stack of open blocks in one file
#[derive(Debug, Clone, Default)]
pub struct BlockStack {
    frames: Vec<Frame>,
}

impl BlockStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Innermost enclosing table block
    pub fn current_table(&self) -> Option<&TableFrame> {
        self.frames.iter().rev().find_map(|frame| match frame {
            Frame::Table(table) => Some(table),
            _ => None,
        })
    }

    /// Whether any enclosing block describes a rollback
    pub fn in_rollback(&self) -> bool {
        self.frames.iter().any(|frame| matches!(frame, Frame::Rollback))
    }

    pub fn push_table(&mut self, table: TableFrame) {
        self.frames.push(Frame::Table(table));
    }

    pub fn push_rollback(&mut self) {
        self.frames.push(Frame::Rollback);
    }

    pub fn push_other(&mut self) {
        self.frames.push(Frame::Other);
    }

    /// Close the innermost block; a stray `end` is ignored
    pub fn pop(&mut self) {
        self.frames.pop();
    }

    /// Table blocks still open, outermost first
    pub fn open_tables(&self) -> impl Iterator<Item = &TableFrame> {
        self.frames.iter().filter_map(|frame| match frame {
            Frame::Table(table) => Some(table),
            _ => None,
        })
    }

    /// Push the frame for a call that carries a `do` block.
    ///
    /// `table` is the table named by the call when it is a table block
    /// opener (`create_table :albums do |t|`).
    pub fn open_call_block(&mut self, call: &Call, table: Option<(String, TableMode)>, line: usize) {
        if let Some((name, mode)) = table {
            let var = call
                .block
                .as_ref()
                .and_then(|b| b.params.first().cloned())
                .unwrap_or_else(|| "t".to_string());
            self.push_table(TableFrame {
                name,
                var,
                mode,
                opened_at: line,
            });
        } else if call.method == "down" {
            self.push_rollback();
        } else {
            self.push_other();
        }
    }
}

/// `end`, `end.freeze`, `end)`, `end;` ...
pub fn is_block_end(text: &str) -> bool {
    let text = text.trim();
    match text.strip_prefix("end") {
        Some(rest) => !rest.starts_with(|c: char| c.is_ascii_alphanumeric() || c == '_'),
        None => false,
    }
}

/// Classification of a statement that starts with a block keyword
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeywordBlock {
    /// `def down` / `def self.down`
    Rollback,
    Other,
}

/// Recognize `class ...`, `def ...`, `if ...` statements that open a block.
///
/// One-liners closed on the same line (`def up; end`) and endless methods
/// (`def name = value`) do not open anything.
pub fn keyword_block(text: &str) -> Option<KeywordBlock> {
    let text = text.trim();
    let word: String = text
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect();
    if !KEYWORD_OPENERS.contains(&word.as_str()) {
        return None;
    }
    let rest = &text[word.len()..];
    if !(rest.is_empty() || rest.starts_with(char::is_whitespace) || rest.starts_with('(')) {
        return None;
    }
    if ends_with_word(text, "end") {
        return None;
    }

    if word == "def" {
        let signature = rest.trim();
        if signature.contains(" = ") || signature.ends_with('=') {
            return None;
        }
        let name = signature.trim_start_matches("self.");
        let name: String = name
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
            .collect();
        if name == "down" {
            return Some(KeywordBlock::Rollback);
        }
    }

    Some(KeywordBlock::Other)
}

fn ends_with_word(text: &str, word: &str) -> bool {
    match text.strip_suffix(word) {
        Some(before) => before.is_empty() || before.ends_with(|c: char| c == ';' || c.is_whitespace()),
        None => false,
    }
}
