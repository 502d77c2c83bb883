//! Services layer - orchestration logic
//!
//! This module coordinates between the analysis core and infrastructure.
//! Services do the I/O the analysis core never does.

pub mod change_set;
pub mod lint_service;

// Re-export commonly used types
pub use change_set::ChangeSetSource;
pub use lint_service::{LintOutcome, LintReport, LintService};
