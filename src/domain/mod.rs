//! Domain layer - pure business logic
//!
//! This module contains the schema facts extracted from migrations and the
//! lint results built from them. No I/O happens here, so everything can be
//! unit tested without fixtures on disk.

pub mod report;
pub mod schema;

// Re-export commonly used types
pub use report::{Diagnostic, DiagnosticKind, Violation, ViolationReason};
pub use schema::{
    ColumnDeclaration, ColumnKind, ColumnRemoval, ColumnRename, ColumnTypeChange,
    IndexDeclaration, InlineIndex, Location, SchemaEvent, TableDefinition, TableDrop,
    TableRename,
};
