//! Thermal state collector.
//!
//! Reports one scalar per cycle: the hottest reading across the CPU/SoC
//! thermal zones kept at discovery.

use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::time::Duration;

use tracing::debug;

use crate::clock::SampleClock;
use crate::collector::traits::FileSystem;
use crate::collector::{Collector, WorkerHandle};
use crate::series::{Sample, SampleData, TimeSeries};

/// Thermal zone directory; each zone holds a `type` and a `temp` node.
const THERMAL_BASE: &str = "/sys/devices/virtual/thermal";

/// Zone `type` substrings that mark CPU/SoC sensors.
const ZONE_MARKERS: &[&str] = &["cpu", "soc"];

/// Samples the maximum CPU/SoC temperature.
pub struct ThermalCollector<F> {
    fs: F,
    worker: WorkerHandle,
}

impl<F: FileSystem + Clone + Send + 'static> ThermalCollector<F> {
    /// Creates a collector reading through `fs`.
    pub fn new(fs: F) -> Self {
        Self {
            fs,
            worker: WorkerHandle::new(),
        }
    }
}

impl<F: FileSystem + Clone + Send + 'static> Collector for ThermalCollector<F> {
    fn identifier(&self) -> &'static str {
        "thermal"
    }

    fn begin(&mut self, _target: &str, interval: Duration) {
        let fs = self.fs.clone();
        self.worker.start("thermal", move |running| {
            let mut state = ThermalState::new(fs);
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

/// Worker-side state: the kept zone temperature nodes.
struct ThermalState<F> {
    fs: F,
    zones: Vec<PathBuf>,
    series: TimeSeries,
}

impl<F: FileSystem> ThermalState<F> {
    fn new(fs: F) -> Self {
        Self {
            fs,
            zones: Vec::new(),
            series: TimeSeries::new(),
        }
    }

    /// Keeps zones whose `type` carries a CPU/SoC marker and whose `temp`
    /// reads successfully. Zones rejected here are never retried.
    fn discover(&mut self) {
        self.zones.clear();

        let entries = self
            .fs
            .read_dir(Path::new(THERMAL_BASE))
            .unwrap_or_default();
        for entry in entries {
            let type_path = entry.join("type");
            let zone_type = match self.fs.read_to_string(&type_path) {
                Ok(t) => t,
                Err(_) => continue,
            };
            if !ZONE_MARKERS.iter().any(|m| zone_type.contains(m)) {
                continue;
            }

            let temp_path = entry.join("temp");
            if self.fs.read_to_string(&temp_path).is_ok() {
                self.zones.push(temp_path);
            }
        }

        debug!("thermal discovery: {} zones kept", self.zones.len());
    }

    /// Appends the maximum zone reading, in whole degrees.
    ///
    /// Individual zone read/parse failures are ignored for the cycle. With
    /// no zones kept at discovery the collector emits nothing at all.
    fn sample(&mut self, time_ms: u64) {
        if self.zones.is_empty() {
            return;
        }

        let mut max_temp: u64 = 0;
        for zone in &self.zones {
            let Ok(content) = self.fs.read_to_string(zone) else {
                continue;
            };
            let Ok(mut temp) = content.trim().parse::<u64>() else {
                continue;
            };
            // Values above 1000 are milli-degrees.
            if temp > 1000 {
                temp /= 1000;
            }
            max_temp = max_temp.max(temp);
        }

        self.series.push(Sample {
            time_ms,
            data: SampleData::Celsius(max_temp),
        });
    }
}
