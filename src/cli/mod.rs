//! Command-line interface: process arguments plus the interactive shell.

pub mod commands;
pub mod shell;

pub use commands::Opt;
pub use shell::{Shell, DEFAULT_FEE};
