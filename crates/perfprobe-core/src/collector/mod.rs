//! Periodic metric collectors.
//!
//! Each collector samples one metric on its own OS thread, gated by the
//! drift-corrected [`SampleClock`](crate::clock::SampleClock), and
//! accumulates a [`TimeSeries`](crate::series::TimeSeries) that is handed
//! back when the collector stops.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          Session                             │
//! │   ┌───────────┐ ┌───────────┐ ┌─────────┐ ┌─────┐ ┌────────┐ │
//! │   │ CpuFreq   │ │ CpuLoad   │ │ Thermal │ │ Fps │ │ Thread │ │
//! │   │ Collector │ │ Collector │ │Collector│ │Coll.│ │Collect.│ │
//! │   └─────┬─────┘ └─────┬─────┘ └────┬────┘ └──┬──┘ └───┬────┘ │
//! │         └─────────────┴─────┬──────┴─────────┴────────┘      │
//! │                     ┌───────▼────────┐                       │
//! │                     │   FileSystem   │ (trait)               │
//! │                     │ CommandRunner  │ (trait)               │
//! │                     └───────┬────────┘                       │
//! └─────────────────────────────┼────────────────────────────────┘
//!                               │
//!               ┌───────────────┼────────────────┐
//!               │               │                │
//!        ┌──────▼──────┐ ┌──────▼──────┐ ┌───────▼───────┐
//!        │   RealFs    │ │   MockFs    │ │  MockRunner   │
//!        │ RealRunner  │ │ (Testing)   │ │  (Testing)    │
//!        └─────────────┘ └─────────────┘ └───────────────┘
//! ```
//!
//! # Usage
//!
//! ```
//! use std::time::Duration;
//! use perfprobe_core::collector::{Collector, CpuLoadCollector, MockFs};
//!
//! let fs = MockFs::new();
//! fs.add_file("/proc/stat", "cpu  1 0 1 1 0 0 0 0 0 0\ncpu0 1 0 1 1 0 0 0 0 0 0\n");
//! fs.add_dir("/sys/devices/system/cpu/cpu0");
//!
//! let mut collector = CpuLoadCollector::new(fs);
//! collector.begin("com.example.game", Duration::from_millis(10));
//! std::thread::sleep(Duration::from_millis(30));
//! let series = collector.end();
//! assert!(!series.is_empty());
//! ```

mod fps;
mod freq;
mod load;
pub mod mock;
pub mod parser;
mod thermal;
mod thread;
pub mod traits;

pub use fps::FpsCollector;
pub use freq::CpuFreqCollector;
pub use load::CpuLoadCollector;
pub use mock::{MockFs, MockRunner};
pub use thermal::ThermalCollector;
pub use thread::ThreadCollector;
pub use traits::{CommandRunner, FileSystem, RealFs, RealRunner};

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::error;

use crate::series::TimeSeries;

/// A periodic sampler of one metric.
///
/// `begin` spawns the collector's worker thread; `end` requests a stop and
/// joins it. Stopping is not preemptive: the worker finishes its in-flight
/// cycle (including any blocking sub-process call) before it observes the
/// flag, so `end` can take up to one cycle plus one external-call latency.
pub trait Collector {
    /// Stable identifier used as the key of this collector's series in the
    /// merged session report.
    fn identifier(&self) -> &'static str;

    /// Starts sampling `target` every `interval` on a dedicated thread.
    fn begin(&mut self, target: &str, interval: Duration);

    /// Stops the worker and returns the accumulated series.
    ///
    /// Returns an empty series if `begin` was never called or the worker
    /// thread died.
    fn end(&mut self) -> TimeSeries;
}

/// Cancellation flag plus join handle for one collector's worker thread.
///
/// The flag is the only state shared between the collector and its worker;
/// the worker polls it once per cycle and returns its series on exit.
#[derive(Debug, Default)]
pub(crate) struct WorkerHandle {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<TimeSeries>>,
}

impl WorkerHandle {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Spawns a named worker thread running `work` until the flag clears.
    ///
    /// A second `start` on a live worker is ignored.
    pub(crate) fn start<W>(&mut self, name: &'static str, work: W)
    where
        W: FnOnce(Arc<AtomicBool>) -> TimeSeries + Send + 'static,
    {
        if self.handle.is_some() {
            return;
        }

        self.running.store(true, Ordering::SeqCst);
        let running = Arc::clone(&self.running);

        match std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || work(running))
        {
            Ok(handle) => self.handle = Some(handle),
            Err(e) => {
                error!("failed to spawn {} worker: {}", name, e);
                self.running.store(false, Ordering::SeqCst);
            }
        }
    }

    /// Clears the flag, joins the worker, and returns its series.
    pub(crate) fn stop(&mut self) -> TimeSeries {
        self.running.store(false, Ordering::SeqCst);
        match self.handle.take() {
            Some(handle) => handle.join().unwrap_or_else(|_| {
                error!("collector worker panicked; returning empty series");
                TimeSeries::new()
            }),
            None => TimeSeries::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::{Sample, SampleData};

    #[test]
    fn test_worker_handle_roundtrip() {
        let mut worker = WorkerHandle::new();
        worker.start("test", |running| {
            let mut series = TimeSeries::new();
            series.push(Sample {
                time_ms: 0,
                data: SampleData::Fps(60.0),
            });
            while running.load(Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(1));
            }
            series
        });

        std::thread::sleep(Duration::from_millis(5));
        let series = worker.stop();
        assert_eq!(series.len(), 1);
    }

    #[test]
    fn test_worker_handle_stop_without_start() {
        let mut worker = WorkerHandle::new();
        assert!(worker.stop().is_empty());
    }
}
