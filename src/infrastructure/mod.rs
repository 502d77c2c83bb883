//! Infrastructure layer - external I/O adapters
//!
//! Only git lives here: the change set of a branch comes from `git diff`,
//! and run metadata wants the current SHA.

pub mod git;

pub use git::GitClient;
