//! Core sealing functionality
//!
//! This module contains all components related to the proof-of-work search:
//! - The memory-hard algorithm (epoch sizing, cache, dataset, hashimoto)
//! - Search coordination and restart on thread count changes
//! - Worker threads walking the nonce space

/// Proof-of-work algorithm implementation
///
/// Contains the consensus-critical pieces: epoch sizing and seeds, cache
/// and dataset generation, and the hashimoto mixing function.
pub mod algorithm;

/// Seal coordinator
///
/// Starts the workers for one search and waits for a solution, the stop
/// signal or a thread count change.
pub mod scheduler;

/// Worker thread implementation
///
/// Contains the search loop that evaluates nonces against the target.
pub mod worker;

// Re-export main components for cleaner imports
pub use self::algorithm::ItemSource;
pub use self::scheduler::Scheduler;
pub use self::worker::{SearchTarget, Solution, Worker};
