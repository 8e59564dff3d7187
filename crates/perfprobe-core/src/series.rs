//! Output model for sampling sessions.
//!
//! Each collector produces one `TimeSeries`; the session orchestrator
//! merges them into a `SessionReport` keyed by collector identifier. The
//! whole model serializes to the JSON shape consumed by the external
//! renderer:
//!
//! ```json
//! {
//!   "cpu_load": [ { "time_ms": 0, "data": [ { "name": "cpu0", "load": 80.0 } ] } ],
//!   "thermal":  [ { "time_ms": 0, "data": 52 } ]
//! }
//! ```

use serde::Serialize;
use std::collections::BTreeMap;

/// One timestamped reading of a collector.
///
/// `time_ms` is relative to the collector's own start; within one series
/// timestamps are non-decreasing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sample {
    pub time_ms: u64,
    pub data: SampleData,
}

/// Metric-specific sample payload.
///
/// Serialized untagged, so each variant contributes exactly the `data`
/// shape of its collector.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SampleData {
    /// Per-node frequency readings (`cpu_freq`).
    Frequencies(Vec<FreqEntry>),
    /// Per-core and GPU load percentages (`cpu_load`).
    Loads(Vec<LoadEntry>),
    /// Maximum temperature across kept zones, whole degrees (`thermal`).
    Celsius(u64),
    /// Display frame rate (`fps`).
    Fps(f64),
    /// Active threads grouped by process (`thread`).
    Processes(Vec<ProcessEntry>),
}

/// One frequency reading, named after its source node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FreqEntry {
    pub name: String,
    pub freq: u64,
}

/// One load reading in percent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadEntry {
    pub name: String,
    pub load: f64,
}

/// A target process and its currently active threads.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessEntry {
    pub pid: u32,
    pub name: String,
    pub threads: Vec<ThreadEntry>,
}

/// One active thread of a tracked process.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThreadEntry {
    pub name: String,
    pub tid: u32,
    pub load: f64,
    #[serde(rename = "cpu-set")]
    pub cpu_set: String,
}

/// Ordered sequence of samples from one collector.
///
/// Append-only while the collector runs, immutable once it stops.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct TimeSeries {
    samples: Vec<Sample>,
}

impl TimeSeries {
    /// Creates an empty series.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a sample. Timestamps must not go backwards.
    pub fn push(&mut self, sample: Sample) {
        debug_assert!(
            self.samples
                .last()
                .is_none_or(|last| last.time_ms <= sample.time_ms),
            "sample timestamps must be non-decreasing"
        );
        self.samples.push(sample);
    }

    /// Returns the samples in emission order.
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Replaces the first sample with a copy of the second at time 0.
    ///
    /// Delta-based series start with a sample that carries no usable
    /// payload; downstream consumers expect a populated first sample, so
    /// the second one is copied back instead of dropping it. No-op on
    /// series shorter than two samples.
    pub fn overwrite_first_from_second(&mut self) {
        if self.samples.len() > 1 {
            self.samples[0] = self.samples[1].clone();
            self.samples[0].time_ms = 0;
        }
    }
}

impl From<Vec<Sample>> for TimeSeries {
    fn from(samples: Vec<Sample>) -> Self {
        Self { samples }
    }
}

/// Merged output of one sampling session, keyed by collector identifier.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct SessionReport {
    series: BTreeMap<String, TimeSeries>,
}

impl SessionReport {
    /// Creates an empty report.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores one collector's series under its identifier.
    pub fn insert(&mut self, identifier: impl Into<String>, series: TimeSeries) {
        self.series.insert(identifier.into(), series);
    }

    /// Looks up a series by collector identifier.
    pub fn get(&self, identifier: &str) -> Option<&TimeSeries> {
        self.series.get(identifier)
    }

    /// Iterates over `(identifier, series)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &TimeSeries)> {
        self.series.iter()
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overwrite_first_from_second() {
        let mut series = TimeSeries::new();
        series.push(Sample {
            time_ms: 3,
            data: SampleData::Loads(Vec::new()),
        });
        series.push(Sample {
            time_ms: 1003,
            data: SampleData::Loads(vec![LoadEntry {
                name: "cpu0".to_string(),
                load: 80.0,
            }]),
        });

        series.overwrite_first_from_second();

        assert_eq!(series.samples()[0].time_ms, 0);
        assert_eq!(series.samples()[0].data, series.samples()[1].data);
        assert_eq!(series.samples()[1].time_ms, 1003);
    }

    #[test]
    fn test_overwrite_first_noop_on_short_series() {
        let mut empty = TimeSeries::new();
        empty.overwrite_first_from_second();
        assert!(empty.is_empty());

        let mut single = TimeSeries::new();
        single.push(Sample {
            time_ms: 5,
            data: SampleData::Celsius(52),
        });
        single.overwrite_first_from_second();
        assert_eq!(single.samples()[0].time_ms, 5);
    }

    #[test]
    fn test_report_serializes_keyed_by_identifier() {
        let mut report = SessionReport::new();
        let mut thermal = TimeSeries::new();
        thermal.push(Sample {
            time_ms: 0,
            data: SampleData::Celsius(52),
        });
        report.insert("thermal", thermal);

        let mut fps = TimeSeries::new();
        fps.push(Sample {
            time_ms: 1000,
            data: SampleData::Fps(59.9),
        });
        report.insert("fps", fps);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["thermal"][0]["time_ms"], 0);
        assert_eq!(json["thermal"][0]["data"], 52);
        assert_eq!(json["fps"][0]["data"], 59.9);
    }

    #[test]
    fn test_thread_entry_serializes_cpu_set_key() {
        let entry = ThreadEntry {
            name: "RenderThread".to_string(),
            tid: 1240,
            load: 12.5,
            cpu_set: "4-7".to_string(),
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["cpu-set"], "4-7");
        assert_eq!(json["tid"], 1240);
    }

    #[test]
    fn test_named_entries_serialize_metric_key() {
        let freq = serde_json::to_value(FreqEntry {
            name: "cpu0".to_string(),
            freq: 1804800,
        })
        .unwrap();
        assert_eq!(freq["freq"], 1804800);

        let load = serde_json::to_value(LoadEntry {
            name: "gpu".to_string(),
            load: 37.0,
        })
        .unwrap();
        assert_eq!(load["load"], 37.0);
    }
}
