//! Command implementations, one module per subcommand

pub mod check;
