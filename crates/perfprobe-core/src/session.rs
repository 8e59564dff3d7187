//! Session orchestration: owns the collector set, runs one observation
//! window, and merges the collected series into a report.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::{debug, info};

use crate::collector::traits::{CommandRunner, FileSystem};
use crate::collector::{
    Collector, CpuFreqCollector, CpuLoadCollector, FpsCollector, ThermalCollector, ThreadCollector,
};
use crate::collector::parser::parse_foreground_package;
use crate::series::SessionReport;

/// Default sampling interval.
const DEFAULT_INTERVAL: Duration = Duration::from_millis(1000);

/// Default observation window.
const DEFAULT_DURATION: Duration = Duration::from_secs(30);

/// Slice length for the cancellable observation wait.
const WAIT_SLICE: Duration = Duration::from_millis(100);

/// Parameters of one sampling session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Process/package name whose activity is attributed and measured.
    pub target: String,
    /// Sampling interval shared by all collectors.
    pub interval: Duration,
    /// Length of the observation window.
    pub duration: Duration,
}

impl SessionConfig {
    /// Creates a config with the default interval (1 s) and duration (30 s).
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            interval: DEFAULT_INTERVAL,
            duration: DEFAULT_DURATION,
        }
    }

    /// Sets the sampling interval.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Sets the observation window.
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }
}

/// Owns the active collectors for one session.
///
/// Collectors run concurrently on their own threads for the whole
/// observation window; the session never touches their internals, only
/// `begin`/`end`, and merges the resulting series by identifier.
#[derive(Default)]
pub struct Session {
    collectors: Vec<Box<dyn Collector>>,
}

impl Session {
    /// Creates a session with no collectors.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one collector.
    pub fn with_collector(mut self, collector: Box<dyn Collector>) -> Self {
        self.collectors.push(collector);
        self
    }

    /// Builds the standard five-collector set.
    ///
    /// # Arguments
    /// * `fs` - Filesystem implementation (real or mock)
    /// * `runner` - Diagnostic command runner (real or mock)
    /// * `force_fallback` - Always use the frame-latency command for fps
    /// * `threshold` - Minimum per-thread usage (percent) to report
    pub fn standard<F, R>(fs: F, runner: R, force_fallback: bool, threshold: f64) -> Self
    where
        F: FileSystem + Clone + Send + 'static,
        R: CommandRunner + Clone + Send + 'static,
    {
        Self::new()
            .with_collector(Box::new(CpuFreqCollector::new(fs.clone())))
            .with_collector(Box::new(CpuLoadCollector::new(fs.clone())))
            .with_collector(Box::new(ThermalCollector::new(fs.clone())))
            .with_collector(Box::new(
                FpsCollector::new(fs.clone(), runner).force_fallback(force_fallback),
            ))
            .with_collector(Box::new(
                ThreadCollector::new(fs, "/proc").with_threshold(threshold),
            ))
    }

    /// Runs one observation window and returns the merged report.
    ///
    /// All collectors start concurrently; the call then waits out
    /// `config.duration` (or until `running` clears) and stops the
    /// collectors in registration order. Stopping is join-based, so the
    /// call returns only after every worker finished its in-flight cycle.
    pub fn run(&mut self, config: &SessionConfig, running: &AtomicBool) -> SessionReport {
        info!(
            "session start: target={}, interval={:?}, duration={:?}",
            config.target, config.interval, config.duration
        );

        for collector in &mut self.collectors {
            debug!("starting collector {}", collector.identifier());
            collector.begin(&config.target, config.interval);
        }

        let mut remaining = config.duration;
        while remaining > Duration::ZERO && running.load(Ordering::SeqCst) {
            let slice = remaining.min(WAIT_SLICE);
            std::thread::sleep(slice);
            remaining = remaining.saturating_sub(slice);
        }

        let mut report = SessionReport::new();
        for collector in &mut self.collectors {
            debug!("stopping collector {}", collector.identifier());
            report.insert(collector.identifier(), collector.end());
        }

        info!("session complete: {} series collected", report.len());
        report
    }
}

/// Resolves the target from the OS task manager's foreground listing.
///
/// Returns `None` when the diagnostic command fails or no foreground entry
/// can be extracted.
pub fn foreground_package<R: CommandRunner>(runner: &R) -> Option<String> {
    let output = runner.run("dumpsys", &["activity", "lru"]).ok()?;
    parse_foreground_package(&output)
}
