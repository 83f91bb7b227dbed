//! # reportctl
//!
//! Command-line client for the report server: obtain tokens, read and
//! delete reports, and manage application certificates.

pub mod api;
pub mod commands;
pub mod config;
pub mod utils;

pub use utils::error::{CliError, CliResult};
