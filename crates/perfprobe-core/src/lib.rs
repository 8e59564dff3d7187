//! perfprobe-core — on-device performance telemetry sampling engine.
//!
//! For a chosen target process, five collectors run concurrently over a
//! fixed observation window, each on its own OS thread gated by a
//! drift-corrected sampling clock:
//!
//! - `cpu_freq` — per-core (and GPU) clock frequency
//! - `cpu_load` — per-core (and GPU) load from tick-counter deltas
//! - `thermal`  — hottest CPU/SoC thermal zone
//! - `fps`      — display frame rate, kernel node or frame-latency command
//! - `thread`   — per-thread CPU attribution for the target's processes
//!
//! Provides:
//! - `clock` — the drift-corrected periodic trigger
//! - `collector` — the `Collector` trait, the five implementations, the
//!   filesystem/command seams, and mock infrastructure for tests
//! - `series` — samples, time series, and the merged session report
//! - `session` — the orchestrator that runs one observation window
//!
//! Everything is best-effort: interfaces missing at discovery are excluded
//! for the run, transient read failures cost one entry of one sample, and
//! a collector that finds nothing simply produces an empty series.

pub mod clock;
pub mod collector;
pub mod series;
pub mod session;
