//! Lint results
//!
//! Violations are the verdict; diagnostics are everything the extractors or
//! the reconciler want to tell the user without changing the verdict.

use serde::Serialize;
use std::fmt;

use super::schema::{ColumnKind, Location};

/// Why a column was flagged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ViolationReason {
    MissingIndex,
}

/// A foreign-key-shaped column with no supporting index
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    pub table: String,
    pub column: String,
    pub reason: ViolationReason,
    /// Effective kind after all type changes
    pub inferred_kind: ColumnKind,
    /// Statement that gave the column its effective kind
    pub location: Location,
    /// First declaration of the column in the combined event order
    pub first_seen: Location,
}

impl Violation {
    /// Remedial statement to paste into a migration
    pub fn suggestion(&self) -> String {
        format!("add_index :{}, :{}", self.table, self.column)
    }

    pub fn format(&self) -> String {
        format!(
            "{} - Missing index on {}.{} ({})\n  Suggestion: {}",
            self.location,
            self.table,
            self.column,
            self.inferred_kind,
            self.suggestion()
        )
    }
}

/// Diagnostic categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// Statement matched no recognized form (verbose only)
    ParseSkip,
    /// Recognized statement missing a name or type
    MalformedDeclaration,
    /// Table block still open at end of input
    UnterminatedBlock,
    /// Change-set file could not be read
    FileReadFailure,
    /// Type change for a column never declared
    AmbiguousRetype,
    /// Index on an expression rather than named columns
    UnsupportedIndexExpression,
}

impl DiagnosticKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ParseSkip => "parse-skip",
            Self::MalformedDeclaration => "malformed-declaration",
            Self::UnterminatedBlock => "unterminated-block",
            Self::FileReadFailure => "file-read-failure",
            Self::AmbiguousRetype => "ambiguous-retype",
            Self::UnsupportedIndexExpression => "unsupported-index-expression",
        }
    }
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Non-fatal note attached to a file position
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub location: Location,
    pub message: String,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, location: Location, message: impl Into<String>) -> Self {
        Self {
            kind,
            location,
            message: message.into(),
        }
    }

    pub fn format(&self) -> String {
        format!("{} - [{}] {}", self.location, self.kind, self.message)
    }
}
