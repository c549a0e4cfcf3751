// src/utils/mod.rs
//! Error handling and logging shared across the engine

/// Error types and conversions
///
/// Contains the [`EngineError`] enum covering verification, generation,
/// configuration and I/O failures.
pub mod error;

/// Logging initialization for the command line tool
pub mod logging;

pub use error::EngineError;
pub use logging::{init_bench_logging, init_logging};
