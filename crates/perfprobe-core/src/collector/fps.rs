//! Display frame-rate collector.
//!
//! Two acquisition strategies: a kernel display-statistics node (validated
//! once at start), and a frame-latency diagnostic command whose frame
//! numbers are diffed between cycles. Only positive readings are appended;
//! invalid cycles are skipped, not zero-filled.

use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::clock::SampleClock;
use crate::collector::parser::{extract_fps_value, extract_frame_number};
use crate::collector::traits::{CommandRunner, FileSystem};
use crate::collector::{Collector, WorkerHandle};
use crate::series::{Sample, SampleData, TimeSeries};

/// Kernel display-statistics nodes, probed in order at start.
const STATS_CANDIDATES: &[&str] = &[
    "/sys/class/drm/sde-crtc-0/measured_fps",
    "/sys/class/graphics/fb0/measured_fps",
];

/// Largest believable frame-number delta between two cycles.
const MAX_FRAME_DELTA: i64 = 200;

/// Largest believable wall-time delta between two cycles, seconds.
const MAX_TIME_DELTA: f64 = 10.0;

/// Largest believable frame rate.
const MAX_FPS: f64 = 200.0;

/// Samples the display frame rate of the target.
pub struct FpsCollector<F, R> {
    fs: F,
    runner: R,
    force_fallback: bool,
    worker: WorkerHandle,
}

impl<F, R> FpsCollector<F, R>
where
    F: FileSystem + Clone + Send + 'static,
    R: CommandRunner + Clone + Send + 'static,
{
    /// Creates a collector reading through `fs` and invoking diagnostics
    /// through `runner`.
    pub fn new(fs: F, runner: R) -> Self {
        Self {
            fs,
            runner,
            force_fallback: false,
            worker: WorkerHandle::new(),
        }
    }

    /// Always uses the frame-latency command, skipping the kernel node.
    pub fn force_fallback(mut self, force: bool) -> Self {
        self.force_fallback = force;
        self
    }
}

impl<F, R> Collector for FpsCollector<F, R>
where
    F: FileSystem + Clone + Send + 'static,
    R: CommandRunner + Clone + Send + 'static,
{
    fn identifier(&self) -> &'static str {
        "fps"
    }

    fn begin(&mut self, target: &str, interval: Duration) {
        let fs = self.fs.clone();
        let runner = self.runner.clone();
        let target = target.to_string();
        let force_fallback = self.force_fallback;

        self.worker.start("fps", move |running| {
            let mut state = FpsState::new(fs, runner, target, force_fallback);
            state.discover();

            let mut clock = SampleClock::new(interval);
            while running.load(Ordering::SeqCst) {
                state.sample(clock.elapsed_ms(), Instant::now());
                clock.wait_next_cycle();
            }
            state.series
        });
    }

    fn end(&mut self) -> TimeSeries {
        self.worker.stop()
    }
}

/// Worker-side state, including the frame-number carry-over between
/// command-strategy cycles.
struct FpsState<F, R> {
    fs: F,
    runner: R,
    target: String,
    force_fallback: bool,
    stats_node: Option<PathBuf>,
    last_frame: Option<(i64, Instant)>,
    series: TimeSeries,
}

impl<F: FileSystem, R: CommandRunner> FpsState<F, R> {
    fn new(fs: F, runner: R, target: String, force_fallback: bool) -> Self {
        Self {
            fs,
            runner,
            target,
            force_fallback,
            stats_node: None,
            last_frame: None,
            series: TimeSeries::new(),
        }
    }

    /// Probes the kernel statistics candidates once.
    ///
    /// A node is validated only when its current content yields a positive
    /// reading; otherwise the collector uses the command strategy for the
    /// whole run.
    fn discover(&mut self) {
        self.stats_node = STATS_CANDIDATES
            .iter()
            .map(Path::new)
            .find(|path| {
                self.fs
                    .read_to_string(path)
                    .is_ok_and(|content| extract_fps_value(&content) > 0.0)
            })
            .map(Path::to_path_buf);

        debug!(
            "fps discovery: kernel node {}",
            match &self.stats_node {
                Some(node) => format!("validated ({})", node.display()),
                None => "absent".to_string(),
            }
        );
    }

    /// Appends one reading when it is positive.
    fn sample(&mut self, time_ms: u64, now: Instant) {
        let fps = self.read_fps(now);
        if fps > 0.0 {
            self.series.push(Sample {
                time_ms,
                data: SampleData::Fps(fps),
            });
        }
    }

    /// Picks the acquisition strategy for this cycle.
    fn read_fps(&mut self, now: Instant) -> f64 {
        if self.force_fallback {
            return self.fps_from_command(now);
        }

        if let Some(node) = &self.stats_node {
            let fps = self
                .fs
                .read_to_string(node)
                .map(|content| extract_fps_value(&content))
                .unwrap_or(0.0);
            if fps > 0.0 {
                return fps;
            }
        }

        self.fps_from_command(now)
    }

    /// Frame-number delta over wall-time delta between consecutive cycles.
    ///
    /// The carry-over point is refreshed whenever a frame number could be
    /// extracted, even when the computed rate is rejected.
    fn fps_from_command(&mut self, now: Instant) -> f64 {
        let frame = self
            .runner
            .run("dumpsys", &["SurfaceFlinger", "-latency", &self.target])
            .ok()
            .and_then(|output| extract_frame_number(&output));

        let mut fps = 0.0;
        if let (Some(frame), Some((last_frame, last_at))) = (frame, self.last_frame) {
            let elapsed = now.duration_since(last_at).as_secs_f64();
            fps = compute_fps(frame - last_frame, elapsed);
        }

        if let Some(frame) = frame {
            self.last_frame = Some((frame, now));
        }

        fps
    }
}

/// Validates and computes a frame rate from deltas between two cycles.
///
/// Stale, wrapped, or garbled readings show up as out-of-range deltas and
/// are rejected as 0.
fn compute_fps(frame_delta: i64, elapsed_secs: f64) -> f64 {
    if frame_delta > 0
        && elapsed_secs > 0.0
        && frame_delta <= MAX_FRAME_DELTA
        && elapsed_secs <= MAX_TIME_DELTA
    {
        let fps = frame_delta as f64 / elapsed_secs;
        if fps <= MAX_FPS {
            return fps;
        }
    }
    0.0
}
