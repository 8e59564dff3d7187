//! Drift-corrected periodic trigger shared by all collectors.

use std::time::{Duration, Instant};

/// Periodic trigger anchored to its creation instant.
///
/// Every cycle targets `start + cycles * interval` rather than "now plus
/// interval", so the sampling cadence never accumulates drift: a cycle that
/// overruns the interval is absorbed by skipping ahead to the next target
/// instant still in the future. Skipped cycles are not back-filled.
#[derive(Debug)]
pub struct SampleClock {
    start: Instant,
    interval: Duration,
    cycles: u64,
}

impl SampleClock {
    /// Creates a clock anchored to the current instant.
    pub fn new(interval: Duration) -> Self {
        Self {
            start: Instant::now(),
            interval,
            cycles: 0,
        }
    }

    /// Milliseconds elapsed since the clock was created.
    ///
    /// Used as the `time_ms` timestamp of the sample taken this cycle.
    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    /// Number of completed schedule slots, including skipped ones.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Blocks until the next scheduled instant.
    ///
    /// If the caller's work already overran one or more intervals, the
    /// cycle counter advances past every stale target first, so the wait
    /// is always shorter than one interval.
    pub fn wait_next_cycle(&mut self) {
        if self.interval.is_zero() {
            self.cycles += 1;
            return;
        }

        self.cycles += 1;
        let mut next = self.start + self.interval * self.cycles as u32;
        let now = Instant::now();
        while next <= now {
            self.cycles += 1;
            next = self.start + self.interval * self.cycles as u32;
        }

        std::thread::sleep(next - now);
    }
}
