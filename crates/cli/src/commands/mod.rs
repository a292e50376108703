//! Subcommand implementations.

pub mod clean;
