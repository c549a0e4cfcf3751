// src/stats/reporter.rs
use super::{GenerationProgress, Metrics};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use std::time::Duration;

/// Point-in-time view of the engine counters
#[derive(Debug, Clone, Default)]
pub struct EngineStats {
    /// Total hashes computed by local search workers
    pub hashes_total: u64,
    /// One-minute average hashrate (hashes per second)
    pub hashrate_1m: f64,
    /// Search workers currently running
    pub active_workers: usize,
    /// Most recent cache or dataset generation
    pub generation: Option<GenerationProgress>,
}

impl EngineStats {
    /// Reads the current values out of `metrics`
    pub fn capture(metrics: &Metrics) -> Self {
        EngineStats {
            hashes_total: metrics.hashrate.count(),
            hashrate_1m: metrics.hashrate.rate1(),
            active_workers: metrics.active_workers(),
            generation: metrics.generation(),
        }
    }
}

/// Logs engine statistics on a background thread
///
/// The thread holds only a weak reference to the metrics and exits when
/// they are dropped or when the reporter itself is dropped.
pub struct StatsReporter {
    metrics: Weak<Metrics>,
    report_interval: Duration,
    shutdown: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl StatsReporter {
    /// Creates a reporter for `metrics` with the given interval
    ///
    /// # Arguments
    /// * `metrics` - Counters to report
    /// * `report_interval` - How often to log statistics
    pub fn new(metrics: &Arc<Metrics>, report_interval: Duration) -> Self {
        StatsReporter {
            metrics: Arc::downgrade(metrics),
            report_interval,
            shutdown: None,
            handle: None,
        }
    }

    /// Gets the current statistics, or defaults once the metrics are gone
    pub fn get_stats(&self) -> EngineStats {
        self.metrics
            .upgrade()
            .map(|metrics| EngineStats::capture(&metrics))
            .unwrap_or_default()
    }

    /// Starts the periodic reporting of statistics
    ///
    /// Calling it again while a reporting thread runs has no effect.
    pub fn start_reporting(&mut self) {
        if self.handle.is_some() {
            return;
        }
        let (tx, rx) = crossbeam_channel::bounded(1);
        let metrics = self.metrics.clone();
        let interval = self.report_interval;

        self.shutdown = Some(tx);
        self.handle = Some(std::thread::spawn(move || report_loop(metrics, interval, rx)));
    }

    /// Stops the reporting thread and waits for it to exit
    pub fn stop(&mut self) {
        self.shutdown.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for StatsReporter {
    fn drop(&mut self) {
        self.stop();
    }
}

fn report_loop(metrics: Weak<Metrics>, interval: Duration, shutdown: Receiver<()>) {
    loop {
        match shutdown.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
        let Some(metrics) = metrics.upgrade() else {
            break;
        };
        let stats = EngineStats::capture(&metrics);
        match stats.generation {
            Some(progress) if progress.percent < 100 => log::info!(
                "Hashrate: {:.2} H/s | Workers: {} | Generating {:?} epoch {}: {}%",
                stats.hashrate_1m,
                stats.active_workers,
                progress.kind,
                progress.epoch,
                progress.percent
            ),
            _ => log::info!(
                "Hashrate: {:.2} H/s | Workers: {} | Total hashes: {}",
                stats.hashrate_1m,
                stats.active_workers,
                stats.hashes_total
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_reflect_metrics() {
        let metrics = Arc::new(Metrics::new());
        metrics.hashrate.mark(1_000);
        let reporter = StatsReporter::new(&metrics, Duration::from_secs(60));

        let stats = reporter.get_stats();
        assert_eq!(stats.hashes_total, 1_000);
        assert_eq!(stats.active_workers, 0);
        assert!(stats.generation.is_none());
    }

    #[test]
    fn reporter_outlives_metrics_gracefully() {
        let metrics = Arc::new(Metrics::new());
        let mut reporter = StatsReporter::new(&metrics, Duration::from_millis(10));
        reporter.start_reporting();
        drop(metrics);
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(reporter.get_stats().hashes_total, 0);
        reporter.stop();
    }
}
