//! Schema facts
//!
//! Everything the extractors can observe in a migration or in `schema.rb`,
//! each record tagged with the file and line it came from.

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// Position of a statement in a source file (1-based line)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Location {
    pub file: PathBuf,
    pub line: usize,
}

impl Location {
    pub fn new(file: impl Into<PathBuf>, line: usize) -> Self {
        Self {
            file: file.into(),
            line,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file.display(), self.line)
    }
}

/// Column type as far as foreign-key detection cares
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    Bigint,
    Integer,
    String,
    Text,
    /// Implicit `<name>_id` column added by `references` / `belongs_to`
    Reference,
    Other,
}

impl ColumnKind {
    /// Map a Rails column type token (`bigint`, `:string`, ...) to a kind.
    ///
    /// Returns `None` for tokens that are not column types at all, which lets
    /// the extractor tell `t.bigint :x` apart from `t.timestamps`.
    pub fn from_type_token(token: &str) -> Option<Self> {
        let token = token.trim_start_matches(':').to_ascii_lowercase();
        let kind = match token.as_str() {
            "bigint" | "bigserial" => Self::Bigint,
            "integer" | "serial" | "smallint" => Self::Integer,
            "string" | "citext" => Self::String,
            "text" => Self::Text,
            "references" | "belongs_to" => Self::Reference,
            "primary_key" | "float" | "decimal" | "numeric" | "datetime" | "time" | "date"
            | "timestamp" | "timestamptz" | "binary" | "blob" | "boolean" | "json" | "jsonb"
            | "uuid" | "hstore" | "inet" | "cidr" | "macaddr" | "ltree" | "virtual" | "enum"
            | "tsvector" | "xml" | "point" | "line" | "money" | "interval" | "bit"
            | "bit_varying" | "oid" | "daterange" | "numrange" | "tsrange" | "tstzrange"
            | "int4range" | "int8range" => Self::Other,
            _ => return None,
        };
        Some(kind)
    }

    /// Whether a column of this kind can hold a reference to another table's id
    pub fn is_foreign_key_shaped(&self) -> bool {
        matches!(self, Self::Bigint | Self::Integer | Self::Reference)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Bigint => "bigint",
            Self::Integer => "integer",
            Self::String => "string",
            Self::Text => "text",
            Self::Reference => "reference",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Value of the `index:` option on a column or reference declaration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InlineIndex {
    /// `index: true` or `index: { ... }`
    Requested,
    /// `index: false` or `index: nil`
    Declined,
    #[default]
    Unspecified,
}

/// A column observed in a create/change table block or an add statement
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnDeclaration {
    pub table: String,
    pub column: String,
    pub kind: ColumnKind,
    pub inline_index: InlineIndex,
    pub location: Location,
}

impl ColumnDeclaration {
    pub fn declared_with_inline_index(&self) -> bool {
        self.inline_index == InlineIndex::Requested
    }
}

/// `change_column` / `t.change`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnTypeChange {
    pub table: String,
    pub column: String,
    pub new_kind: ColumnKind,
    pub location: Location,
}

/// `rename_column` / `t.rename`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnRename {
    pub table: String,
    pub from: String,
    pub to: String,
    pub location: Location,
}

/// `remove_column`, `remove_reference`, `t.remove`, ...
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnRemoval {
    pub table: String,
    pub column: String,
    pub location: Location,
}

/// `create_table`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableDefinition {
    pub table: String,
    pub location: Location,
}

/// `drop_table`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableDrop {
    pub table: String,
    pub location: Location,
}

/// `rename_table`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableRename {
    pub from: String,
    pub to: String,
    pub location: Location,
}

/// A single-column or composite index
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexDeclaration {
    pub table: String,
    /// Ordered; never empty
    pub columns: Vec<String>,
    pub location: Location,
}

impl IndexDeclaration {
    /// Leading column, the only one that covers single-column lookups
    pub fn leading_column(&self) -> Option<&str> {
        self.columns.first().map(String::as_str)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    /// Identity used for deduplication: table plus the unordered column set
    pub fn identity(&self) -> (String, Vec<String>) {
        let mut columns = self.columns.clone();
        columns.sort();
        columns.dedup();
        (self.table.clone(), columns)
    }
}

/// One fact extracted from a source file, in file order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SchemaEvent {
    TableDefined(TableDefinition),
    TableDropped(TableDrop),
    TableRenamed(TableRename),
    ColumnDeclared(ColumnDeclaration),
    ColumnRetyped(ColumnTypeChange),
    ColumnRenamed(ColumnRename),
    ColumnRemoved(ColumnRemoval),
    IndexAdded(IndexDeclaration),
}

impl SchemaEvent {
    /// Events produced by the Index-Operation Extractor
    pub fn is_index_operation(&self) -> bool {
        matches!(self, Self::IndexAdded(_))
    }
}
