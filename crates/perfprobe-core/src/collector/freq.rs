//! CPU/GPU clock frequency collector.

use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::time::Duration;

use tracing::debug;

use crate::clock::SampleClock;
use crate::collector::parser::cpu_ids_from_topology;
use crate::collector::traits::FileSystem;
use crate::collector::{Collector, WorkerHandle};
use crate::series::{FreqEntry, Sample, SampleData, TimeSeries};

/// CPU topology directory holding one `cpu<N>` entry per logical CPU.
const CPU_BASE: &str = "/sys/devices/system/cpu";

/// GPU frequency nodes, ordered by vendor prevalence; first readable wins.
const GPU_FREQ_CANDIDATES: &[&str] = &[
    "/sys/class/kgsl/kgsl-3d0/gpuclk",
    "/sys/devices/platform/soc/3d00000.qcom,kgsl-3d0/devfreq/3d00000.qcom,kgsl-3d0/gpuclk",
    "/sys/devices/platform/13000000.mali/devfreq/13000000.mali/cur_freq",
    "/sys/kernel/ged/hal/current_freqency",
    "/sys/kernel/debug/ged/hal/current_freqency",
    "/sys/kernel/gpu/gpu_clock",
    "/sys/class/devfreq/gpufreq/cur_freq",
];

/// Samples the current clock frequency of every CPU core (and the GPU when
/// a known vendor node is present).
pub struct CpuFreqCollector<F> {
    fs: F,
    worker: WorkerHandle,
}

impl<F: FileSystem + Clone + Send + 'static> CpuFreqCollector<F> {
    /// Creates a collector reading through `fs`.
    pub fn new(fs: F) -> Self {
        Self {
            fs,
            worker: WorkerHandle::new(),
        }
    }
}

impl<F: FileSystem + Clone + Send + 'static> Collector for CpuFreqCollector<F> {
    fn identifier(&self) -> &'static str {
        "cpu_freq"
    }

    fn begin(&mut self, _target: &str, interval: Duration) {
        let fs = self.fs.clone();
        self.worker.start("cpu_freq", move |running| {
            let mut state = FreqState::new(fs);
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
        self.worker.stop()
    }
}

/// Worker-side state: the accepted frequency nodes and the series so far.
struct FreqState<F> {
    fs: F,
    /// `(node path, display name)` per accepted core, ascending core id.
    nodes: Vec<(PathBuf, String)>,
    gpu_node: Option<PathBuf>,
    series: TimeSeries,
}

impl<F: FileSystem> FreqState<F> {
    fn new(fs: F) -> Self {
        Self {
            fs,
            nodes: Vec::new(),
            gpu_node: None,
            series: TimeSeries::new(),
        }
    }

    /// Enumerates the CPU topology and probes GPU candidates once.
    ///
    /// A core is accepted only when its current-frequency node is readable
    /// here; cores rejected at discovery are never retried.
    fn discover(&mut self) {
        self.nodes.clear();

        let entries = self
            .fs
            .read_dir(Path::new(CPU_BASE))
            .unwrap_or_default();
        for id in cpu_ids_from_topology(&entries) {
            let name = format!("cpu{}", id);
            let node = Path::new(CPU_BASE)
                .join(&name)
                .join("cpufreq/cpuinfo_cur_freq");
            if self.fs.read_to_string(&node).is_ok() {
                self.nodes.push((node, name));
            }
        }

        self.gpu_node = GPU_FREQ_CANDIDATES
            .iter()
            .map(Path::new)
            .find(|p| self.fs.exists(p))
            .map(Path::to_path_buf);

        debug!(
            "frequency discovery: {} cpu nodes, gpu {}",
            self.nodes.len(),
            if self.gpu_node.is_some() { "present" } else { "absent" }
        );
    }

    /// Reads every accepted node once and appends one sample.
    ///
    /// Nodes that fail to read or parse this cycle are skipped; a partial
    /// sample is still valid.
    fn sample(&mut self, time_ms: u64) {
        let mut entries = Vec::with_capacity(self.nodes.len() + 1);

        for (node, name) in &self.nodes {
            if let Some(freq) = self.read_value(node) {
                entries.push(FreqEntry {
                    name: name.clone(),
                    freq,
                });
            }
        }

        if let Some(node) = &self.gpu_node
            && let Some(freq) = self.read_value(node)
        {
            entries.push(FreqEntry {
                name: "gpu".to_string(),
                // GPU nodes report Hz-scaled values; align with the CPU unit.
                freq: freq / 1000,
            });
        }

        self.series.push(Sample {
            time_ms,
            data: SampleData::Frequencies(entries),
        });
    }

    fn read_value(&self, node: &Path) -> Option<u64> {
        self.fs
            .read_to_string(node)
            .ok()?
            .split_whitespace()
            .next()?
            .parse()
            .ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::mock::MockFs;

    fn fixture() -> MockFs {
        let fs = MockFs::new();
        fs.add_file("/sys/devices/system/cpu/cpu0/cpufreq/cpuinfo_cur_freq", "1804800\n");
        fs.add_file("/sys/devices/system/cpu/cpu1/cpufreq/cpuinfo_cur_freq", "2400000\n");
        fs.add_dir("/sys/devices/system/cpu/cpufreq");
        fs.add_dir("/sys/devices/system/cpu/cpuidle");
        fs
    }

    #[test]
    fn test_discover_accepts_readable_cores_in_order() {
        let fs = fixture();
        // cpu2 exists but has no readable frequency node.
        fs.add_dir("/sys/devices/system/cpu/cpu2");

        let mut state = FreqState::new(fs);
        state.discover();

        let names: Vec<&str> = state.nodes.iter().map(|(_, n)| n.as_str()).collect();
        assert_eq!(names, vec!["cpu0", "cpu1"]);
        assert!(state.gpu_node.is_none());
    }

    #[test]
    fn test_sample_reads_all_nodes() {
        let mut state = FreqState::new(fixture());
        state.discover();
        state.sample(0);

        assert_eq!(state.series.len(), 1);
        match &state.series.samples()[0].data {
            SampleData::Frequencies(entries) => {
                assert_eq!(entries.len(), 2);
                assert_eq!(entries[0].name, "cpu0");
                assert_eq!(entries[0].freq, 1804800);
                assert_eq!(entries[1].freq, 2400000);
            }
            other => panic!("unexpected payload: {:?}", other),
        }
    }

    #[test]
    fn test_gpu_reading_is_unit_normalized() {
        let fs = fixture();
        fs.add_file("/sys/class/kgsl/kgsl-3d0/gpuclk", "585000000\n");

        let mut state = FreqState::new(fs);
        state.discover();
        state.sample(0);

        match &state.series.samples()[0].data {
            SampleData::Frequencies(entries) => {
                let gpu = entries.iter().find(|e| e.name == "gpu").unwrap();
                assert_eq!(gpu.freq, 585000);
            }
            other => panic!("unexpected payload: {:?}", other),
        }
    }

    #[test]
    fn test_node_vanishing_mid_run_yields_partial_sample() {
        let fs = fixture();
        let mut state = FreqState::new(fs.clone());
        state.discover();

        fs.remove_file("/sys/devices/system/cpu/cpu1/cpufreq/cpuinfo_cur_freq");
        state.sample(1000);

        match &state.series.samples()[0].data {
            SampleData::Frequencies(entries) => {
                assert_eq!(entries.len(), 1);
                assert_eq!(entries[0].name, "cpu0");
            }
            other => panic!("unexpected payload: {:?}", other),
        }
    }

    #[test]
    fn test_no_topology_yields_empty_entries() {
        let mut state = FreqState::new(MockFs::new());
        state.discover();
        state.sample(0);

        match &state.series.samples()[0].data {
            SampleData::Frequencies(entries) => assert!(entries.is_empty()),
            other => panic!("unexpected payload: {:?}", other),
        }
    }
}
