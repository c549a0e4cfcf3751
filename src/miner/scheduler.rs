// src/miner/scheduler.rs
//! Seal coordinator
//!
//! Fans a search out over the configured number of worker threads and waits
//! for the first of three events: a solution, the caller's stop signal, or a
//! change of the thread count. A thread count change aborts the running
//! workers and restarts the search with the new count.

use crate::miner::worker::{SearchTarget, Solution, Worker};
use crate::resources::DatasetHandle;
use crate::stats::Metrics;
use crossbeam_channel::{Receiver, Sender, select};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::thread::JoinHandle;

/// How one search round ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SearchOutcome {
    /// A worker found a nonce
    Found(Solution),
    /// The caller fired or dropped the stop signal
    Stopped,
    /// The thread count changed mid-search
    ThreadsChanged,
}

/// Coordinates nonce searches across worker threads
pub struct Scheduler {
    /// Requested thread count: 0 = all CPUs, negative = no local search
    threads: AtomicI32,
    /// Single-slot notification of thread count changes
    update_tx: Sender<()>,
    update_rx: Receiver<()>,
    /// Hashrate and live worker counters
    metrics: Arc<Metrics>,
}

impl Scheduler {
    /// Creates a new Scheduler instance
    ///
    /// # Arguments
    /// * `threads` - Initial thread count
    /// * `metrics` - Counters the workers report into
    pub fn new(threads: i32, metrics: Arc<Metrics>) -> Self {
        let (update_tx, update_rx) = crossbeam_channel::bounded(1);
        Scheduler {
            threads: AtomicI32::new(threads),
            update_tx,
            update_rx,
            metrics,
        }
    }

    /// Requested thread count
    pub fn threads(&self) -> i32 {
        self.threads.load(Ordering::Acquire)
    }

    /// Updates the thread count, restarting any running search
    pub fn set_threads(&self, threads: i32) {
        self.threads.store(threads, Ordering::Release);
        // A pending notification already covers this change.
        let _ = self.update_tx.try_send(());
    }

    /// Number of workers a search starts with right now
    pub fn worker_count(&self) -> usize {
        match self.threads() {
            0 => num_cpus::get(),
            n if n < 0 => 0,
            n => n as usize,
        }
    }

    /// Searches `dataset` for a nonce meeting `job.target`
    ///
    /// # Arguments
    /// * `dataset` - Dataset of the header's epoch
    /// * `job` - Header hash and target
    /// * `stop` - Fires (message or disconnect) to abandon the search
    ///
    /// # Returns
    /// - `Some(Solution)` when a worker found a nonce
    /// - `None` once `stop` fired
    pub fn seal(&self, dataset: &DatasetHandle, job: SearchTarget, stop: &Receiver<()>) -> Option<Solution> {
        loop {
            match self.search(dataset, job, stop) {
                SearchOutcome::Found(solution) => return Some(solution),
                SearchOutcome::Stopped => return None,
                SearchOutcome::ThreadsChanged => {
                    log::debug!("Thread count changed, restarting search threads={}", self.threads());
                }
            }
        }
    }

    pub(crate) fn search(&self, dataset: &DatasetHandle, job: SearchTarget, stop: &Receiver<()>) -> SearchOutcome {
        while self.update_rx.try_recv().is_ok() {}

        let workers = self.worker_count();
        let abort = Arc::new(AtomicBool::new(false));
        let (found_tx, found_rx) = crossbeam_channel::bounded(1);
        let mut handles: Vec<JoinHandle<()>> = Vec::with_capacity(workers);

        for id in 0..workers {
            let worker = Worker::new(
                id,
                Arc::clone(dataset),
                job,
                Arc::clone(&abort),
                found_tx.clone(),
                Arc::clone(&self.metrics),
            );
            let seed = rand::random::<u64>();
            match std::thread::Builder::new()
                .name(format!("search-{}", id))
                .spawn(move || worker.run(seed))
            {
                Ok(handle) => handles.push(handle),
                Err(e) => log::error!("Failed to start search worker {}: {}", id, e),
            }
        }
        log::debug!("Search started workers={} epoch={}", handles.len(), dataset.epoch());

        let outcome = select! {
            recv(stop) -> _ => SearchOutcome::Stopped,
            recv(found_rx) -> solution => match solution {
                Ok(solution) => SearchOutcome::Found(solution),
                Err(_) => SearchOutcome::Stopped,
            },
            recv(self.update_rx) -> _ => SearchOutcome::ThreadsChanged,
        };

        abort.store(true, Ordering::Relaxed);
        drop(found_tx);
        for handle in handles {
            if handle.join().is_err() {
                log::error!("Search worker panicked");
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::miner::algorithm::difficulty_target;
    use crate::resources::{ResourceConfig, Resources};
    use ethereum_types::{H256, U256};
    use std::time::{Duration, Instant};

    fn dataset() -> DatasetHandle {
        let resources = Arc::new(Resources::new(ResourceConfig::test(), Arc::new(Metrics::new())));
        resources.dataset(0).unwrap()
    }

    fn job(difficulty: u64) -> SearchTarget {
        SearchTarget {
            header_hash: H256::repeat_byte(0x5a),
            target: difficulty_target(U256::from(difficulty)).unwrap(),
        }
    }

    fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(10);
        while !condition() {
            if Instant::now() > deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        true
    }

    #[test]
    fn worker_count_follows_thread_setting() {
        let scheduler = Scheduler::new(3, Arc::new(Metrics::new()));
        assert_eq!(scheduler.worker_count(), 3);
        scheduler.set_threads(-1);
        assert_eq!(scheduler.worker_count(), 0);
        scheduler.set_threads(0);
        assert_eq!(scheduler.worker_count(), num_cpus::get());
    }

    #[test]
    fn four_workers_find_one_solution() {
        let dataset = dataset();
        let metrics = Arc::new(Metrics::new());
        let scheduler = Scheduler::new(4, metrics.clone());
        let (_stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(0);

        let solution = scheduler.seal(&dataset, job(50), &stop_rx).unwrap();
        let result = dataset.compute(&H256::repeat_byte(0x5a), solution.nonce);
        assert_eq!(result.mix_digest, solution.mix_digest);
        assert!(crate::miner::algorithm::meets_target(&result.result, &job(50).target));
        assert_eq!(metrics.active_workers(), 0);
        assert!(metrics.hashrate.count() > 0);
    }

    #[test]
    fn stop_terminates_all_workers() {
        let dataset = dataset();
        let metrics = Arc::new(Metrics::new());
        let scheduler = Arc::new(Scheduler::new(4, metrics.clone()));
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(0);

        let search = {
            let scheduler = Arc::clone(&scheduler);
            std::thread::spawn(move || scheduler.seal(&dataset, job(u64::MAX), &stop_rx))
        };
        assert!(wait_for(|| metrics.active_workers() == 4));
        drop(stop_tx);

        assert_eq!(search.join().unwrap(), None);
        assert_eq!(metrics.active_workers(), 0);
    }

    #[test]
    fn thread_change_restarts_search() {
        let dataset = dataset();
        let metrics = Arc::new(Metrics::new());
        let scheduler = Arc::new(Scheduler::new(1, metrics.clone()));
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(0);

        let search = {
            let scheduler = Arc::clone(&scheduler);
            std::thread::spawn(move || scheduler.seal(&dataset, job(u64::MAX), &stop_rx))
        };
        assert!(wait_for(|| metrics.active_workers() == 1));
        scheduler.set_threads(3);
        assert!(wait_for(|| metrics.active_workers() == 3));

        stop_tx.send(()).unwrap();
        assert_eq!(search.join().unwrap(), None);
        assert_eq!(metrics.active_workers(), 0);
    }

    #[test]
    fn no_local_threads_waits_for_stop() {
        let dataset = dataset();
        let metrics = Arc::new(Metrics::new());
        let scheduler = Scheduler::new(-1, metrics.clone());
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
        stop_tx.send(()).unwrap();

        assert_eq!(scheduler.search(&dataset, job(1), &stop_rx), SearchOutcome::Stopped);
        assert_eq!(metrics.hashrate.count(), 0);
    }
}
