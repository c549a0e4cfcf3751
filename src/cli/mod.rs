//! Command-line interface definitions
//!
//! Argument structures for the `eaiash` binary, parsed with clap derive.

/// Subcommands and their options
pub mod commands;

pub use commands::{
    Action, BenchmarkOptions, Commands, ConfigOptions, EngineOptions, GenerateOptions, SealOptions,
    VerifyOptions, parse_h256, parse_u256,
};
