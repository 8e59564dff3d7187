//! CPU/GPU load collector.
//!
//! Per-core load is computed from the delta of cumulative tick counters
//! between consecutive cycles; the counters themselves are never retained
//! beyond one cycle pair.

use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::time::Duration;

use tracing::debug;

use crate::clock::SampleClock;
use crate::collector::parser::{CoreCounters, cpu_ids_from_topology, parse_core_counters};
use crate::collector::traits::FileSystem;
use crate::collector::{Collector, WorkerHandle};
use crate::series::{LoadEntry, Sample, SampleData, TimeSeries};

/// CPU topology directory, enumerated once at start for the core count.
const CPU_BASE: &str = "/sys/devices/system/cpu";

/// Aggregate per-core tick counter source.
const STAT_PATH: &str = "/proc/stat";

/// GPU busy-percentage nodes, ordered by vendor prevalence.
const GPU_LOAD_CANDIDATES: &[&str] = &[
    "/sys/class/kgsl/kgsl-3d0/devfreq/gpu_load",
    "/sys/devices/platform/soc/3d00000.qcom,kgsl-3d0/devfreq/3d00000.qcom,kgsl-3d0/gpu_load",
    "/sys/kernel/gpu/gpu_busy",
];

/// Samples per-core CPU load (and GPU load when a known vendor node is
/// present).
pub struct CpuLoadCollector<F> {
    fs: F,
    worker: WorkerHandle,
}

impl<F: FileSystem + Clone + Send + 'static> CpuLoadCollector<F> {
    /// Creates a collector reading through `fs`.
    pub fn new(fs: F) -> Self {
        Self {
            fs,
            worker: WorkerHandle::new(),
        }
    }
}

impl<F: FileSystem + Clone + Send + 'static> Collector for CpuLoadCollector<F> {
    fn identifier(&self) -> &'static str {
        "cpu_load"
    }

    fn begin(&mut self, _target: &str, interval: Duration) {
        let fs = self.fs.clone();
        self.worker.start("cpu_load", move |running| {
            let mut state = LoadState::new(fs);
            state.discover();

            let mut clock = SampleClock::new(interval);
            while running.load(Ordering::SeqCst) {
                state.sample(clock.elapsed_ms());
                clock.wait_next_cycle();
            }
            state.series
        });
    }

    fn end(&mut self) -> TimeSeries {
        let mut series = self.worker.stop();
        // The first cycle has no previous counters and carries no per-core
        // entries; replace it with the second sample at time 0 so consumers
        // always see a populated series head.
        series.overwrite_first_from_second();
        series
    }
}

/// Worker-side state: core count, optional GPU node, and the previous
/// cycle's counters.
struct LoadState<F> {
    fs: F,
    core_count: usize,
    gpu_node: Option<PathBuf>,
    prev: Option<Vec<CoreCounters>>,
    series: TimeSeries,
}

impl<F: FileSystem> LoadState<F> {
    fn new(fs: F) -> Self {
        Self {
            fs,
            core_count: 0,
            gpu_node: None,
            prev: None,
            series: TimeSeries::new(),
        }
    }

    /// Counts logical CPUs and probes GPU load candidates once.
    fn discover(&mut self) {
        let entries = self
            .fs
            .read_dir(Path::new(CPU_BASE))
            .unwrap_or_default();
        self.core_count = cpu_ids_from_topology(&entries).len();

        self.gpu_node = GPU_LOAD_CANDIDATES
            .iter()
            .map(Path::new)
            .find(|p| self.fs.exists(p))
            .map(Path::to_path_buf);

        debug!(
            "load discovery: {} cores, gpu {}",
            self.core_count,
            if self.gpu_node.is_some() { "present" } else { "absent" }
        );
    }

    /// Reads the counter file once and appends one sample.
    ///
    /// The very first cycle has nothing to diff against and emits no
    /// per-core entries; a failed counter read skips the cycle entirely.
    fn sample(&mut self, time_ms: u64) {
        let content = match self.fs.read_to_string(Path::new(STAT_PATH)) {
            Ok(content) => content,
            Err(_) => return,
        };
        let current = parse_core_counters(&content, self.core_count);

        let mut entries = Vec::with_capacity(self.core_count + 1);
        if let Some(prev) = &self.prev {
            for (i, (last, now)) in prev.iter().zip(current.iter()).enumerate() {
                entries.push(LoadEntry {
                    name: format!("cpu{}", i),
                    load: core_load(last, now),
                });
            }
        }

        if let Some(node) = &self.gpu_node
            && let Ok(content) = self.fs.read_to_string(node)
            && let Some(load) = content.split_whitespace().next()
            && let Ok(load) = load.parse::<i64>()
        {
            entries.push(LoadEntry {
                name: "gpu".to_string(),
                load: load as f64,
            });
        }

        self.series.push(Sample {
            time_ms,
            data: SampleData::Loads(entries),
        });
        self.prev = Some(current);
    }
}

/// Busy share of one core between two counter reads, in percent.
///
/// A zero total delta (no ticks accounted between reads) yields 0.
fn core_load(last: &CoreCounters, now: &CoreCounters) -> f64 {
    let total_diff = now.total().saturating_sub(last.total());
    if total_diff == 0 {
        return 0.0;
    }
    let idle_diff = now.idle.saturating_sub(last.idle);
    100.0 * (1.0 - idle_diff as f64 / total_diff as f64)
}
