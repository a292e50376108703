//! ecr-cleaner command line interface
//!
//! Argument parsing, tracing setup and the wiring between the AWS backend and
//! the cleanup pipeline. The binary in `main.rs` only drives these modules.

pub mod cli;
pub mod commands;
pub mod tracing;
