// Terminal output for the text reporter
// Report lines go to stdout; errors go to stderr.

use colored::Colorize;

use crate::domain::{Diagnostic, Violation};

pub fn print_header(title: &str) {
    println!();
    println!("{}", format!("══ {} ", title).bright_blue().bold());
    println!();
}

pub fn print_success(message: &str) {
    println!("{}", format!("✅ {}", message).bright_green().bold());
}

pub fn print_error(message: &str) {
    eprintln!("{}", format!("❌ {}", message).bright_red().bold());
}

pub fn print_info(message: &str) {
    println!("{}", format!("ℹ️  {}", message).bright_cyan());
}

pub fn print_warning(message: &str) {
    println!("{}", format!("⚠️  {}", message).bright_yellow());
}

/// `path:line - Missing index on t.c (kind)` with the suggestion indented below
pub fn print_violation(violation: &Violation) {
    println!(
        "{} {} - Missing index on {} ({})",
        "❌".red(),
        violation.location.to_string().bold(),
        format!("{}.{}", violation.table, violation.column).bright_red(),
        violation.inferred_kind
    );
    if violation.first_seen != violation.location {
        println!("     first declared at {}", violation.first_seen);
    }
    println!("     Suggestion: {}", violation.suggestion().bright_green());
}

pub fn print_diagnostic(diagnostic: &Diagnostic) {
    println!(
        "   {} [{}] {}",
        diagnostic.location.to_string().dimmed(),
        diagnostic.kind.name().yellow(),
        diagnostic.message
    );
}
