//! Logical line reader
//!
//! Migration statements are matched one logical line at a time. A logical
//! line is a physical line with its comment removed, joined with the lines
//! that continue it (trailing comma or backslash, or brackets left open),
//! then split on top-level `;`. Heredoc bodies and `=begin`/`=end` blocks
//! never produce logical lines.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::VecDeque;
use std::iter::{Enumerate, Peekable};
use std::str::Lines;

use super::lexer::{bracket_depth, split_outside, walk_code, Flow};

/// Upper bound on physical lines folded into one statement. Keeps a
/// truncated file with an unclosed bracket from swallowing the rest.
pub const MAX_JOINED_LINES: usize = 32;

/// Heads that only ever begin a statement
static STATEMENT_HEAD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?:end(?:\s|$)|def\s|(?:add|remove|change|create|drop|rename)_[a-z_]+(?:\s|\(|$)|[a-z_][a-z0-9_]*\.(?:references|belongs_to|index|column|bigint|integer|string|text)(?:\s|\(|$))",
    )
    .unwrap()
});

/// One statement's worth of source text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalLine {
    /// 1-based number of the first physical line
    pub line: usize,
    pub text: String,
    /// Still open when joining stopped, either at the line cap or at a line
    /// that starts a statement of its own
    pub cut_short: bool,
}

/// Iterator over the logical lines of a source text
#[derive(Debug, Clone)]
pub struct LogicalLines<'a> {
    lines: Peekable<Enumerate<Lines<'a>>>,
    heredoc_terminators: Vec<String>,
    in_block_comment: bool,
    /// Remaining `;`-separated statements of the last joined line
    split: VecDeque<LogicalLine>,
    done: bool,
}

impl<'a> LogicalLines<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            lines: text.lines().enumerate().peekable(),
            heredoc_terminators: Vec::new(),
            in_block_comment: false,
            split: VecDeque::new(),
            done: false,
        }
    }

    /// Fold physical lines into the next statement, before `;` splitting
    fn next_joined(&mut self) -> Option<LogicalLine> {
        let mut buffer = String::new();
        let mut start_line = 0;
        let mut joined = 0;
        let mut cut_short = false;

        while !self.done {
            let Some(&(idx, raw)) = self.lines.peek() else {
                self.done = true;
                break;
            };

            let plain_line = !self.in_block_comment && self.heredoc_terminators.is_empty();
            if !buffer.is_empty() && plain_line && starts_statement(raw) {
                cut_short = true;
                break;
            }
            self.lines.next();

            if self.in_block_comment {
                if raw.starts_with("=end") {
                    self.in_block_comment = false;
                }
                continue;
            }

            if let Some(terminator) = self.heredoc_terminators.first() {
                if raw.trim() == terminator.as_str() {
                    self.heredoc_terminators.remove(0);
                }
                continue;
            }

            if raw.starts_with("=begin") {
                self.in_block_comment = true;
                continue;
            }

            if raw.trim() == "__END__" {
                self.done = true;
                break;
            }

            let (code, heredocs) = strip_line(raw);
            self.heredoc_terminators.extend(heredocs);

            let code = code.trim();
            if code.is_empty() {
                if buffer.is_empty() {
                    continue;
                }
                // Blank line inside a continuation: keep folding
                joined += 1;
                if joined < MAX_JOINED_LINES {
                    continue;
                }
                cut_short = true;
                break;
            }

            if buffer.is_empty() {
                start_line = idx + 1;
            } else {
                buffer.push(' ');
            }
            buffer.push_str(code.trim_end_matches('\\').trim_end());
            joined += 1;

            if !continues(code, &buffer) {
                break;
            }
            if joined >= MAX_JOINED_LINES {
                cut_short = true;
                break;
            }
        }

        if buffer.is_empty() {
            None
        } else {
            Some(LogicalLine {
                line: start_line,
                text: buffer,
                cut_short,
            })
        }
    }
}

impl Iterator for LogicalLines<'_> {
    type Item = LogicalLine;

    fn next(&mut self) -> Option<LogicalLine> {
        loop {
            if let Some(line) = self.split.pop_front() {
                return Some(line);
            }

            let joined = self.next_joined()?;
            let mut statements: Vec<LogicalLine> = split_outside(&joined.text, ';')
                .into_iter()
                .map(|text| LogicalLine {
                    line: joined.line,
                    text: text.to_string(),
                    cut_short: false,
                })
                .collect();
            if let Some(first) = statements.first_mut() {
                first.cut_short = joined.cut_short;
            }
            self.split.extend(statements);
        }
    }
}

/// Whether the statement in `buffer` goes on past the physical line `last`
fn continues(last: &str, buffer: &str) -> bool {
    last.ends_with(',') || last.ends_with('\\') || bracket_depth(buffer) > 0
}

/// Whether a physical line opens a statement of its own and so cannot be
/// the tail of the one before
fn starts_statement(raw: &str) -> bool {
    STATEMENT_HEAD.is_match(raw.trim_start())
}

/// Remove a trailing `#` comment and replace heredoc openers with `""`.
///
/// Returns the code part of the line and the terminators of any heredocs
/// opened on it, in the order their bodies follow.
fn strip_line(raw: &str) -> (String, Vec<String>) {
    let mut code = String::with_capacity(raw.len());
    let mut heredocs = Vec::new();
    let mut copied = 0;
    let mut cut = raw.len();

    walk_code(raw, |i, c| match c {
        '#' => {
            cut = i;
            Flow::Stop
        }
        '<' if raw[i..].starts_with("<<") => match heredoc_opener(&raw[i..]) {
            Some((terminator, consumed)) => {
                code.push_str(&raw[copied..i]);
                code.push_str("\"\"");
                copied = i + consumed;
                heredocs.push(terminator);
                Flow::SkipTo(copied)
            }
            None => Flow::Continue,
        },
        _ => Flow::Continue,
    });
    code.push_str(&raw[copied..cut.max(copied)]);

    (code, heredocs)
}

/// Parse `<<~SQL`, `<<-SQL`, `<<SQL` or a quoted terminator at the start of
/// `text`. Returns the terminator and the number of bytes consumed.
fn heredoc_opener(text: &str) -> Option<(String, usize)> {
    let rest = &text[2..];
    let (rest, mut consumed) = match rest.chars().next() {
        Some('~') | Some('-') => (&rest[1..], 3),
        _ => (rest, 2),
    };

    let (quote, body) = match rest.chars().next() {
        Some(q @ ('\'' | '"')) => (Some(q), &rest[1..]),
        _ => (None, rest),
    };

    let ident: String = body
        .chars()
        .take_while(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || *c == '_')
        .collect();
    if ident.is_empty() || !ident.starts_with(|c: char| c.is_ascii_uppercase() || c == '_') {
        return None;
    }

    consumed += ident.chars().count();
    if let Some(q) = quote {
        if !body[ident.len()..].starts_with(q) {
            return None;
        }
        consumed += 2;
    }

    Some((ident, consumed))
}
