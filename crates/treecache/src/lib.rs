// Rust 1.92 compiler bug: false positives for thiserror/miette derive macro fields
// https://github.com/rust-lang/rust/issues/147648
#![allow(unused_assignments)]

//! treecache - command-line front end for the treecache cache engine
//!
//! The engine itself lives in [`treecache_cache`]; this crate maps its
//! operations onto subcommands, renders results as text or JSON envelopes, and
//! turns engine errors into exit codes.

// CLI output goes to stdout/stderr - this is intentional
#![allow(clippy::print_stdout, clippy::print_stderr)]

/// CLI argument parsing and exit codes.
pub mod cli;
/// Command implementations.
pub mod commands;
/// Tracing subscriber setup and correlation ids.
pub mod tracing;
