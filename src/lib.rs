//! Eaiash - memory-hard proof-of-work engine in Rust
//!
//! This crate provides a complete implementation of an epoch-based,
//! memory-hard proof-of-work scheme with support for:
//! - Deterministic per-epoch cache and dataset generation
//! - Light (cache only) verification and full (dataset) sealing
//! - Multi-threaded nonce search with cooperative cancellation
//! - On-disk persistence of generated caches and datasets
//! - Fake, test and shared engine modes for node testing

#![warn(missing_docs)]
#![deny(unsafe_code)]

/// Proof-of-work engine and consensus interface
pub mod engine;

/// Algorithm, search scheduling and worker threads
pub mod miner;

/// Epoch-indexed cache and dataset management
pub mod resources;

/// Statistics collection and reporting functionality
pub mod stats;

/// Utility functions and error handling
pub mod utils;

/// Command-line interface definitions
pub mod cli;

/// Configuration management
pub mod config;

/// Shared type definitions
pub mod types;

// Core exports
pub use cli::Commands;
pub use config::Config;
pub use engine::{ConsensusEngine, Engine};
pub use miner::{Scheduler, Solution};
pub use resources::{Cache, CacheHandle, Dataset, DatasetHandle, Resources};
pub use stats::{GenerationProgress, Metrics, StatsReporter};
pub use types::{Header, MixResult, ModeKind, PowHeader, PowMode, RpcDescriptor};
pub use utils::{EngineError, init_logging};
