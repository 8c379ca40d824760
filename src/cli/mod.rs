//! CLI module for batchmix - command-line interface and subcommands.
//!
//! Provides the main entry point with subcommands for planning, running
//! a batch and inspecting the host.

pub mod commands;

pub use commands::Cli;
