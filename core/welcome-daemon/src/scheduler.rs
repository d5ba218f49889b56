//! Periodic refresh loop.
//!
//! Cycles run one after another on the calling thread, so a slow directory
//! can stretch the period but two cycles never overlap.

use std::thread;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use welcome_core::{CycleReport, DirectorySource, LoadOptions, ReconciliationEngine, Registry};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub cycles: u64,
    pub failures: u64,
}

pub struct Scheduler {
    interval: Duration,
    max_cycles: Option<u64>,
}

impl Scheduler {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            max_cycles: None,
        }
    }

    /// Stops after `cycles` refreshes instead of running forever.
    pub fn with_max_cycles(mut self, cycles: u64) -> Self {
        self.max_cycles = Some(cycles);
        self
    }

    /// Runs a refresh immediately, then once per interval. A failed cycle is
    /// logged and the loop keeps going; the next cycle retries from scratch.
    pub fn run<R: Registry>(
        &self,
        engine: &mut ReconciliationEngine<R>,
        source: &dyn DirectorySource,
        options: &LoadOptions,
        mut on_cycle: impl FnMut(&CycleReport),
    ) -> LoopStats {
        let mut stats = LoopStats::default();
        info!(
            interval_secs = self.interval.as_secs_f64(),
            home_id = %options.home_id,
            "Refresh loop started"
        );

        loop {
            let started = Instant::now();
            match engine.refresh(source, options) {
                Ok(report) => on_cycle(&report),
                Err(err) => {
                    stats.failures += 1;
                    warn!(
                        error = %err,
                        transient = err.is_transient(),
                        "Refresh cycle failed"
                    );
                }
            }
            stats.cycles += 1;

            if self.max_cycles.is_some_and(|max| stats.cycles >= max) {
                break;
            }

            if let Some(remaining) = self.interval.checked_sub(started.elapsed()) {
                thread::sleep(remaining);
            }
        }

        stats
    }
}
