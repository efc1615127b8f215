//! CLI module
//!
//! Command-line interface for running the transform pipeline.
//!
//! # Commands
//!
//! - `run` - Transform one or more landed archives
//! - `trigger` - Transform the archives named in a notification document
//! - `bookmark` - Show a job's bookmark
//! - `runs` - Show a job's run audit
//! - `inspect` - Print the records of a Parquet output file
//! - `serve` - Start HTTP server mode

mod commands;
mod runner;
mod server;

pub use commands::{Cli, Commands, OutputFormat};
pub use runner::Runner;
pub use server::{router, serve};
