// src/miner/worker.rs
//! Search worker
//!
//! Walks nonces upward from a random start over a shared dataset, checking
//! the abort flag before every attempt. The first worker to find a result
//! under the target publishes it; later finds are dropped.

use crate::miner::algorithm::meets_target;
use crate::resources::DatasetHandle;
use crate::stats::Metrics;
use crossbeam_channel::{Sender, TrySendError};
use ethereum_types::{H256, U256};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Attempts between hashrate reports
pub const REPORT_INTERVAL: u64 = 1 << 15;

/// What every worker of one search is looking for
#[derive(Debug, Clone, Copy)]
pub struct SearchTarget {
    /// Header hash without nonce and mix digest
    pub header_hash: H256,
    /// Largest accepted result
    pub target: U256,
}

/// A nonce whose result meets the target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Solution {
    /// Winning nonce
    pub nonce: u64,
    /// Mix digest produced by that nonce
    pub mix_digest: H256,
}

/// Worker thread that performs the nonce search
pub struct Worker {
    /// Worker index, used in logs only
    id: usize,
    /// Dataset read by the mix function
    dataset: DatasetHandle,
    /// Search parameters shared by all workers
    job: SearchTarget,
    /// Raised by the coordinator to stop every worker
    abort: Arc<AtomicBool>,
    /// Receives at most one solution per search
    found: Sender<Solution>,
    /// Hashrate and live worker counters
    metrics: Arc<Metrics>,
}

impl Worker {
    /// Creates a new Worker instance
    ///
    /// # Arguments
    /// * `id` - Index of the worker within its search
    /// * `dataset` - Dataset of the header's epoch
    /// * `job` - Header hash and target
    /// * `abort` - Shared cancellation flag
    /// * `found` - Single-slot channel for the winning nonce
    /// * `metrics` - Counters to report into
    pub fn new(
        id: usize,
        dataset: DatasetHandle,
        job: SearchTarget,
        abort: Arc<AtomicBool>,
        found: Sender<Solution>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Worker {
            id,
            dataset,
            job,
            abort,
            found,
            metrics,
        }
    }

    /// Searches from `seed` until a solution is found or abort is raised
    pub fn run(self, seed: u64) {
        self.metrics.worker_started();
        log::trace!("Started search for new nonces worker={} seed={}", self.id, seed);

        let mut nonce = seed;
        let mut attempts = 0u64;
        loop {
            if self.abort.load(Ordering::Relaxed) {
                log::trace!(
                    "Nonce search aborted worker={} attempts={}",
                    self.id,
                    nonce.wrapping_sub(seed)
                );
                break;
            }
            attempts += 1;
            if attempts % REPORT_INTERVAL == 0 {
                self.metrics.hashrate.mark(attempts);
                attempts = 0;
            }

            let outcome = self.dataset.compute(&self.job.header_hash, nonce);
            if meets_target(&outcome.result, &self.job.target) {
                let solution = Solution {
                    nonce,
                    mix_digest: outcome.mix_digest,
                };
                match self.found.try_send(solution) {
                    Ok(()) => log::trace!(
                        "Nonce found and reported worker={} attempts={} nonce={}",
                        self.id,
                        nonce.wrapping_sub(seed) + 1,
                        nonce
                    ),
                    Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => log::trace!(
                        "Nonce found but discarded worker={} nonce={}",
                        self.id,
                        nonce
                    ),
                }
                break;
            }
            nonce = nonce.wrapping_add(1);
        }

        self.metrics.hashrate.mark(attempts);
        self.metrics.worker_stopped();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::miner::algorithm::difficulty_target;
    use crate::resources::{ResourceConfig, Resources};

    fn dataset() -> DatasetHandle {
        let resources = Arc::new(Resources::new(ResourceConfig::test(), Arc::new(Metrics::new())));
        resources.dataset(0).unwrap()
    }

    #[test]
    fn easy_target_is_found_at_seed() {
        let dataset = dataset();
        let (tx, rx) = crossbeam_channel::bounded(1);
        let metrics = Arc::new(Metrics::new());
        let job = SearchTarget {
            header_hash: H256::repeat_byte(3),
            target: difficulty_target(U256::one()).unwrap(),
        };

        Worker::new(0, dataset.clone(), job, Arc::new(AtomicBool::new(false)), tx, metrics.clone())
            .run(77);

        let solution = rx.try_recv().unwrap();
        assert_eq!(solution.nonce, 77);
        assert_eq!(solution.mix_digest, dataset.compute(&job.header_hash, 77).mix_digest);
        assert_eq!(metrics.hashrate.count(), 1);
        assert_eq!(metrics.active_workers(), 0);
    }

    #[test]
    fn raised_abort_stops_before_hashing() {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let metrics = Arc::new(Metrics::new());
        let job = SearchTarget {
            header_hash: H256::zero(),
            target: U256::zero(),
        };

        Worker::new(0, dataset(), job, Arc::new(AtomicBool::new(true)), tx, metrics.clone()).run(0);

        assert!(rx.try_recv().is_err());
        assert_eq!(metrics.hashrate.count(), 0);
    }

    #[test]
    fn second_find_is_discarded() {
        let dataset = dataset();
        let (tx, rx) = crossbeam_channel::bounded(1);
        let metrics = Arc::new(Metrics::new());
        let job = SearchTarget {
            header_hash: H256::repeat_byte(9),
            target: U256::MAX,
        };
        let abort = Arc::new(AtomicBool::new(false));

        Worker::new(0, dataset.clone(), job, abort.clone(), tx.clone(), metrics.clone()).run(1);
        Worker::new(1, dataset, job, abort, tx, metrics).run(2);

        assert_eq!(rx.try_recv().map(|s| s.nonce), Ok(1));
        assert!(rx.try_recv().is_err());
    }
}
