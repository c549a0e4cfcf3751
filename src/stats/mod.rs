//! Observability counters for the engine
//!
//! [`Metrics`] is shared by the resource manager and the sealer:
//! - hashrate, fed by search workers every few thousand attempts
//! - the most recent cache/dataset generation progress
//! - the number of search workers currently running
//!
//! [`StatsReporter`] periodically logs a snapshot of these values.

/// Exponentially decaying rate meter
pub mod meter;

/// Periodic logging of engine statistics
pub mod reporter;

pub use meter::Meter;
pub use reporter::{EngineStats, StatsReporter};

use crate::resources::memory::ResourceKind;
use arc_swap::ArcSwapOption;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Snapshot of a cache or dataset generation
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GenerationProgress {
    /// What is being generated
    pub kind: ResourceKind,
    /// Epoch being generated
    pub epoch: u64,
    /// Completed percentage, 0 to 100
    pub percent: u32,
}

/// Counters shared across engine components
#[derive(Default)]
pub struct Metrics {
    /// Hashes attempted by local search workers
    pub hashrate: Meter,
    generation: ArcSwapOption<GenerationProgress>,
    active_workers: AtomicUsize,
}

impl Metrics {
    /// Creates an empty set of counters
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes generation progress
    pub fn set_generation(&self, progress: GenerationProgress) {
        self.generation.store(Some(Arc::new(progress)));
    }

    /// Latest published generation progress, if any generation ran
    pub fn generation(&self) -> Option<GenerationProgress> {
        self.generation.load().as_deref().copied()
    }

    /// Search workers currently running
    pub fn active_workers(&self) -> usize {
        self.active_workers.load(Ordering::Acquire)
    }

    pub(crate) fn worker_started(&self) {
        self.active_workers.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn worker_stopped(&self) {
        self.active_workers.fetch_sub(1, Ordering::AcqRel);
    }
}
