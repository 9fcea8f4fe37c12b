//! CLI module for lexflow
//!
//! Command-line argument parsing and verbosity handling.

pub mod args;

pub use args::{Args, Commands, Verbosity};
