// src/stats/meter.rs
//! Event meter with an exponentially decaying one-minute rate
//!
//! Marks only touch atomics. The moving average is advanced in whole
//! 5 second ticks whenever somebody reads it, so an idle meter costs nothing.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

const TICK: Duration = Duration::from_secs(5);
const WINDOW_SECS: f64 = 60.0;

struct Ewma {
    rate: f64,
    initialized: bool,
    last_tick: Instant,
}

/// Counts events and estimates their per-second rate
pub struct Meter {
    count: AtomicU64,
    uncounted: AtomicU64,
    ewma: Mutex<Ewma>,
    alpha: f64,
}

impl Default for Meter {
    fn default() -> Self {
        Self::new()
    }
}

impl Meter {
    /// Creates a meter with no recorded events
    pub fn new() -> Self {
        Meter {
            count: AtomicU64::new(0),
            uncounted: AtomicU64::new(0),
            ewma: Mutex::new(Ewma {
                rate: 0.0,
                initialized: false,
                last_tick: Instant::now(),
            }),
            alpha: 1.0 - (-TICK.as_secs_f64() / WINDOW_SECS).exp(),
        }
    }

    /// Records `n` events
    pub fn mark(&self, n: u64) {
        self.count.fetch_add(n, Ordering::Relaxed);
        self.uncounted.fetch_add(n, Ordering::Relaxed);
    }

    /// Total events recorded since creation
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// One-minute moving average in events per second
    pub fn rate1(&self) -> f64 {
        let mut ewma = self.ewma.lock();
        let elapsed = ewma.last_tick.elapsed();
        let ticks = (elapsed.as_secs_f64() / TICK.as_secs_f64()) as u32;
        for _ in 0..ticks {
            self.advance(&mut ewma);
        }
        ewma.last_tick += TICK * ticks;
        ewma.rate
    }

    /// Advances the average by one tick immediately
    #[cfg(test)]
    pub(crate) fn tick(&self) {
        let mut ewma = self.ewma.lock();
        self.advance(&mut ewma);
    }

    fn advance(&self, ewma: &mut Ewma) {
        let instant = self.uncounted.swap(0, Ordering::Relaxed) as f64 / TICK.as_secs_f64();
        if ewma.initialized {
            ewma.rate += self.alpha * (instant - ewma.rate);
        } else {
            ewma.rate = instant;
            ewma.initialized = true;
        }
    }
}
