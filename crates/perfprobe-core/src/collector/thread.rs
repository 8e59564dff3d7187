//! Per-thread CPU attribution collector.
//!
//! Tracks every process whose name matches the target, maintains per-thread
//! tick accounting across cycles, and reports the threads that are
//! currently active (usage at or above the configured threshold).
//!
//! Two cadences layer on the shared clock: a process rescan (which pids
//! belong to the target) every `process_rescan_cycles`, and a thread
//! structure rescan (which tids a process has) every `thread_rescan_cycles`.
//! In between, only the CPU accounting of already-known threads is
//! refreshed. Thread maps survive process rescans, so a thread's tick
//! baseline is never reset while it stays alive.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::clock::SampleClock;
use crate::collector::parser::{cmdline_basename, parse_cpus_allowed_list, parse_task_ticks};
use crate::collector::traits::FileSystem;
use crate::collector::{Collector, WorkerHandle};
use crate::series::{ProcessEntry, Sample, SampleData, ThreadEntry, TimeSeries};

/// Clock ticks per second (USER_HZ). Standard value for Linux.
const CLK_TCK: f64 = 100.0;

/// Default minimum usage (percent) for a thread to count as active.
const DEFAULT_THRESHOLD: f64 = 0.1;

/// Default process-rescan cadence, in cycles.
const PROCESS_RESCAN_CYCLES: u64 = 5;

/// Default thread-structure rescan cadence, in cycles.
const THREAD_RESCAN_CYCLES: u64 = 2;

/// Placeholder when the allowed-CPU list cannot be read.
const AFFINITY_UNKNOWN: &str = "N/A";

/// Samples per-thread CPU usage for every process matching the target.
pub struct ThreadCollector<F> {
    fs: F,
    proc_path: String,
    threshold: f64,
    process_rescan_cycles: u64,
    thread_rescan_cycles: u64,
    worker: WorkerHandle,
}

impl<F: FileSystem + Clone + Send + 'static> ThreadCollector<F> {
    /// Creates a collector reading through `fs`.
    ///
    /// # Arguments
    /// * `fs` - Filesystem implementation (real or mock)
    /// * `proc_path` - Base path to proc filesystem (usually "/proc")
    pub fn new(fs: F, proc_path: impl Into<String>) -> Self {
        Self {
            fs,
            proc_path: proc_path.into(),
            threshold: DEFAULT_THRESHOLD,
            process_rescan_cycles: PROCESS_RESCAN_CYCLES,
            thread_rescan_cycles: THREAD_RESCAN_CYCLES,
            worker: WorkerHandle::new(),
        }
    }

    /// Sets the minimum usage (percent) for a thread to be reported.
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    /// Overrides the rescan cadences (cycles per process rescan, cycles per
    /// thread-structure rescan).
    pub fn with_rescan_cadence(mut self, process_cycles: u64, thread_cycles: u64) -> Self {
        self.process_rescan_cycles = process_cycles.max(1);
        self.thread_rescan_cycles = thread_cycles.max(1);
        self
    }
}

impl<F: FileSystem + Clone + Send + 'static> Collector for ThreadCollector<F> {
    fn identifier(&self) -> &'static str {
        "thread"
    }

    fn begin(&mut self, target: &str, interval: Duration) {
        let fs = self.fs.clone();
        let proc_path = self.proc_path.clone();
        let target = target.to_string();
        let threshold = self.threshold;
        let process_cycles = self.process_rescan_cycles;
        let thread_cycles = self.thread_rescan_cycles;

        self.worker.start("thread", move |running| {
            let mut state = ThreadState::new(
                fs,
                proc_path,
                target,
                threshold,
                std::process::id(),
            )
            .with_cadence(process_cycles, thread_cycles);

            let mut clock = SampleClock::new(interval);
            while running.load(Ordering::SeqCst) {
                state.cycle(clock.cycles(), clock.elapsed_ms(), Instant::now());
                clock.wait_next_cycle();
            }
            state.series
        });
    }

    fn end(&mut self) -> TimeSeries {
        self.worker.stop()
    }
}

/// Accounting state of one tracked thread.
#[derive(Debug, Clone)]
struct ThreadRecord {
    tid: u32,
    name: String,
    cpu_set: String,
    /// Cumulative user+system ticks at the last read.
    total_ticks: u64,
    last_sample: Option<Instant>,
    usage: f64,
    active: bool,
    initialized: bool,
}

/// One process matching the target, with its thread map.
///
/// The thread map persists across process rescans as long as the pid stays
/// visible, so short-lived activity drops never reset tick baselines.
#[allow(dead_code)]
#[derive(Debug, Clone)]
struct ProcessRecord {
    pid: u32,
    name: String,
    threads: BTreeMap<u32, ThreadRecord>,
    valid: bool,
    last_full_scan: Option<Instant>,
    last_change: Option<Instant>,
}

impl ProcessRecord {
    fn new(pid: u32, name: String) -> Self {
        Self {
            pid,
            name,
            threads: BTreeMap::new(),
            valid: true,
            last_full_scan: None,
            last_change: None,
        }
    }
}

/// Worker-side state of the attribution tracker.
struct ThreadState<F> {
    fs: F,
    proc_path: String,
    target: String,
    threshold: f64,
    self_pid: u32,
    process_rescan_cycles: u64,
    thread_rescan_cycles: u64,
    processes: BTreeMap<u32, ProcessRecord>,
    series: TimeSeries,
}

impl<F: FileSystem> ThreadState<F> {
    fn new(fs: F, proc_path: String, target: String, threshold: f64, self_pid: u32) -> Self {
        Self {
            fs,
            proc_path,
            target,
            threshold,
            self_pid,
            process_rescan_cycles: PROCESS_RESCAN_CYCLES,
            thread_rescan_cycles: THREAD_RESCAN_CYCLES,
            processes: BTreeMap::new(),
            series: TimeSeries::new(),
        }
    }

    fn with_cadence(mut self, process_cycles: u64, thread_cycles: u64) -> Self {
        self.process_rescan_cycles = process_cycles.max(1);
        self.thread_rescan_cycles = thread_cycles.max(1);
        self
    }

    /// Runs one full cycle: optional process rescan, thread update, emit.
    ///
    /// Both cadences count from cycle 0, so the first cycle performs a
    /// process rescan and a full thread rescan.
    fn cycle(&mut self, cycle: u64, time_ms: u64, now: Instant) {
        if cycle % self.process_rescan_cycles == 0 {
            self.rescan_processes();
        }

        let full_scan = cycle % self.thread_rescan_cycles == 0;
        self.update_threads(full_scan, now);
        self.emit(time_ms);
    }

    /// Re-enumerates the process table for pids matching the target.
    ///
    /// Surviving pids keep their thread maps; disappeared pids are dropped
    /// together with their accounting.
    fn rescan_processes(&mut self) {
        let found = self.find_target_processes();
        let mut next = BTreeMap::new();

        for (pid, name) in found {
            let mut record = ProcessRecord::new(pid, name);
            if let Some(old) = self.processes.remove(&pid) {
                record.threads = old.threads;
                record.last_full_scan = old.last_full_scan;
                record.last_change = old.last_change;
            }
            next.insert(pid, record);
        }

        debug!("process rescan: {} matching processes", next.len());
        self.processes = next;
    }

    /// Scans numeric `/proc` entries whose command name or command line
    /// contains the target. The sampler's own pid is always skipped.
    fn find_target_processes(&self) -> Vec<(u32, String)> {
        let entries = match self.fs.read_dir(Path::new(&self.proc_path)) {
            Ok(entries) => entries,
            Err(_) => return Vec::new(),
        };

        let mut found = Vec::new();
        for entry in entries {
            let Some(pid) = entry
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.parse::<u32>().ok())
            else {
                continue;
            };
            if pid == self.self_pid {
                continue;
            }

            let name = self
                .fs
                .read_to_string(&entry.join("comm"))
                .map(|c| c.trim_end_matches('\n').to_string())
                .unwrap_or_default();

            let matches = match self.fs.read_to_string(&entry.join("cmdline")) {
                Ok(cmdline) => {
                    name.contains(&self.target)
                        || cmdline_basename(&cmdline).contains(&self.target)
                }
                Err(_) => !name.is_empty() && name.contains(&self.target),
            };

            if matches {
                found.push((pid, name));
            }
        }
        found
    }

    /// Updates thread accounting for every valid process.
    fn update_threads(&mut self, full_scan: bool, now: Instant) {
        let mut processes = std::mem::take(&mut self.processes);
        for record in processes.values_mut() {
            if !record.valid {
                continue;
            }
            if full_scan {
                self.rescan_threads(record, now);
            } else {
                for thread in record.threads.values_mut() {
                    self.refresh_usage(record.pid, thread, now);
                }
            }
        }
        self.processes = processes;
    }

    /// Full thread rescan: lists the task directory, initializes newly
    /// appeared tids, refreshes known ones, and drops vanished ones.
    ///
    /// A process whose task directory is gone is marked invalid and will be
    /// dropped by the next process rescan.
    fn rescan_threads(&self, record: &mut ProcessRecord, now: Instant) {
        let task_dir = format!("{}/{}/task", self.proc_path, record.pid);
        let entries = match self.fs.read_dir(Path::new(&task_dir)) {
            Ok(entries) => entries,
            Err(_) => {
                record.valid = false;
                return;
            }
        };

        let mut seen = BTreeSet::new();
        let mut changed = false;

        for entry in entries {
            let Some(tid) = entry
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.parse::<u32>().ok())
            else {
                continue;
            };
            seen.insert(tid);

            if let Some(thread) = record.threads.get_mut(&tid) {
                self.refresh_usage(record.pid, thread, now);
            } else if let Some(thread) = self.init_thread(record.pid, tid, now) {
                record.threads.insert(tid, thread);
                changed = true;
            }
        }

        let before = record.threads.len();
        record.threads.retain(|tid, _| seen.contains(tid));
        if record.threads.len() != before {
            changed = true;
        }

        if changed {
            record.last_change = Some(now);
        }
        record.last_full_scan = Some(now);
    }

    /// Initializes accounting for a newly sighted thread from the current
    /// counter snapshot. Returns `None` when the thread is already gone.
    fn init_thread(&self, pid: u32, tid: u32, now: Instant) -> Option<ThreadRecord> {
        let base = format!("{}/{}/task/{}", self.proc_path, pid, tid);

        let name = self
            .fs
            .read_to_string(Path::new(&format!("{}/comm", base)))
            .map(|c| c.trim_end_matches('\n').to_string())
            .unwrap_or_else(|_| format!("thread-{}", tid));

        let cpu_set = self
            .fs
            .read_to_string(Path::new(&format!("{}/status", base)))
            .ok()
            .and_then(|content| parse_cpus_allowed_list(&content))
            .unwrap_or_else(|| AFFINITY_UNKNOWN.to_string());

        let content = self
            .fs
            .read_to_string(Path::new(&format!("{}/stat", base)))
            .ok()?;
        let ticks = parse_task_ticks(&content).ok()?;

        Some(ThreadRecord {
            tid,
            name,
            cpu_set,
            total_ticks: ticks.total(),
            last_sample: Some(now),
            usage: 0.0,
            active: false,
            initialized: true,
        })
    }

    /// Recomputes one thread's CPU usage from its tick delta.
    ///
    /// A failed read leaves the record untouched; the thread stays listed
    /// until a full rescan confirms it is gone.
    fn refresh_usage(&self, pid: u32, thread: &mut ThreadRecord, now: Instant) {
        let stat_path = format!("{}/{}/task/{}/stat", self.proc_path, pid, thread.tid);
        let Ok(content) = self.fs.read_to_string(Path::new(&stat_path)) else {
            return;
        };
        let Ok(ticks) = parse_task_ticks(&content) else {
            return;
        };

        let old_total = thread.total_ticks;
        let old_sample = thread.last_sample;
        thread.total_ticks = ticks.total();

        if thread.initialized
            && let Some(old_at) = old_sample
        {
            let elapsed = now.duration_since(old_at).as_secs_f64();
            if elapsed > 0.0 {
                let delta = thread.total_ticks.saturating_sub(old_total);
                let usage = (delta as f64 * 100.0) / (CLK_TCK * elapsed);
                thread.usage = usage.clamp(0.0, 100.0);
                thread.active = thread.usage >= self.threshold;
            } else {
                thread.usage = 0.0;
                thread.active = false;
            }
        } else {
            thread.usage = 0.0;
            thread.active = false;
        }

        thread.last_sample = Some(now);
        thread.initialized = true;
    }

    /// Emits one sample listing, per process, the threads currently at or
    /// above the activity threshold. Processes with no active thread are
    /// omitted; a cycle with nothing active emits no sample at all.
    fn emit(&mut self, time_ms: u64) {
        let mut entries = Vec::new();

        for record in self.processes.values() {
            if !record.valid {
                continue;
            }

            let threads: Vec<ThreadEntry> = record
                .threads
                .values()
                .filter(|t| t.active)
                .map(|t| ThreadEntry {
                    name: t.name.clone(),
                    tid: t.tid,
                    load: t.usage,
                    cpu_set: t.cpu_set.clone(),
                })
                .collect();

            if !threads.is_empty() {
                entries.push(ProcessEntry {
                    pid: record.pid,
                    name: record.name.clone(),
                    threads,
                });
            }
        }

        if !entries.is_empty() {
            self.series.push(Sample {
                time_ms,
                data: SampleData::Processes(entries),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::mock::MockFs;

    fn state(fs: MockFs, target: &str) -> ThreadState<MockFs> {
        ThreadState::new(fs, "/proc".to_string(), target.to_string(), DEFAULT_THRESHOLD, 0)
    }

    fn processes_of(sample: &Sample) -> &[ProcessEntry] {
        match &sample.data {
            SampleData::Processes(entries) => entries,
            other => panic!("unexpected payload: {:?}", other),
        }
    }

    #[test]
    fn test_find_target_processes_matches_comm_and_cmdline() {
        let fs = MockFs::new();
        fs.add_process(1234, "com.example.game", "com.example.game\0");
        fs.add_process(1300, "game_render", "/vendor/bin/com.example.game.render\0-v\0");
        fs.add_process(999, "unrelated", "/bin/unrelated\0");

        let state = state(fs, "com.example.game");
        let mut found = state.find_target_processes();
        found.sort();

        assert_eq!(
            found,
            vec![
                (1234, "com.example.game".to_string()),
                (1300, "game_render".to_string()),
            ]
        );
    }

    #[test]
    fn test_find_target_processes_skips_self() {
        let fs = MockFs::new();
        fs.add_process(1234, "com.example.game", "com.example.game\0");

        let mut state = state(fs, "com.example.game");
        state.self_pid = 1234;

        assert!(state.find_target_processes().is_empty());
    }

    #[test]
    fn test_first_cycle_emits_nothing() {
        let fs = MockFs::new();
        fs.add_process(1234, "com.example.game", "com.example.game\0");
        fs.add_task(1234, 1240, "RenderThread", 250, 130, Some("4-7"));

        let mut state = state(fs, "com.example.game");
        state.cycle(0, 0, Instant::now());

        // Baselines were just initialized; no usable delta yet.
        assert!(state.series.is_empty());
        assert_eq!(state.processes[&1234].threads.len(), 1);
    }

    #[test]
    fn test_usage_from_tick_delta() {
        let fs = MockFs::new();
        fs.add_process(1234, "com.example.game", "com.example.game\0");
        fs.add_task(1234, 1240, "RenderThread", 250, 130, Some("4-7"));

        let mut state = state(fs.clone(), "com.example.game");
        let t0 = Instant::now();
        state.cycle(0, 0, t0);

        // 50 + 30 ticks over one second: 80% of one core.
        fs.set_task_ticks(1234, 1240, "RenderThread", 300, 160);
        state.cycle(1, 1000, t0 + Duration::from_secs(1));

        assert_eq!(state.series.len(), 1);
        let entries = processes_of(&state.series.samples()[0]);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].pid, 1234);
        assert_eq!(entries[0].name, "com.example.game");

        let thread = &entries[0].threads[0];
        assert_eq!(thread.tid, 1240);
        assert_eq!(thread.name, "RenderThread");
        assert_eq!(thread.cpu_set, "4-7");
        assert!((thread.load - 80.0).abs() < 1e-6, "load = {}", thread.load);
    }

    #[test]
    fn test_usage_is_clamped_to_100() {
        let fs = MockFs::new();
        fs.add_process(1234, "com.example.game", "com.example.game\0");
        fs.add_task(1234, 1240, "busy", 0, 0, None);

        let mut state = state(fs.clone(), "com.example.game");
        let t0 = Instant::now();
        state.cycle(0, 0, t0);

        // 500 ticks in one second is more than a core can account for.
        fs.set_task_ticks(1234, 1240, "busy", 400, 100);
        state.cycle(1, 1000, t0 + Duration::from_secs(1));

        let entries = processes_of(&state.series.samples()[0]);
        assert!((entries[0].threads[0].load - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_idle_threads_are_filtered_out() {
        let fs = MockFs::new();
        fs.add_process(1234, "com.example.game", "com.example.game\0");
        fs.add_task(1234, 1240, "busy", 100, 0, None);
        fs.add_task(1234, 1241, "idle", 100, 0, None);

        let mut state = state(fs.clone(), "com.example.game");
        let t0 = Instant::now();
        state.cycle(0, 0, t0);

        fs.set_task_ticks(1234, 1240, "busy", 180, 0);
        state.cycle(1, 1000, t0 + Duration::from_secs(1));

        let entries = processes_of(&state.series.samples()[0]);
        assert_eq!(entries[0].threads.len(), 1);
        assert_eq!(entries[0].threads[0].name, "busy");
    }

    #[test]
    fn test_all_idle_process_is_omitted() {
        let fs = MockFs::new();
        fs.add_process(1234, "com.example.game", "com.example.game\0");
        fs.add_task(1234, 1240, "idle", 100, 0, None);

        let mut state = state(fs, "com.example.game");
        let t0 = Instant::now();
        state.cycle(0, 0, t0);
        state.cycle(1, 1000, t0 + Duration::from_secs(1));

        assert!(state.series.is_empty());
    }

    #[test]
    fn test_baseline_persists_across_process_rescans() {
        let fs = MockFs::new();
        fs.add_process(1234, "com.example.game", "com.example.game\0");
        fs.add_task(1234, 1240, "RenderThread", 1000, 0, None);

        let mut state = state(fs.clone(), "com.example.game");
        let t0 = Instant::now();
        state.cycle(0, 0, t0);

        for cycle in 1..=4 {
            state.cycle(cycle, cycle * 1000, t0 + Duration::from_secs(cycle));
        }

        // Cycle 5 rescans processes; 100 ticks accrued over the last second.
        fs.set_task_ticks(1234, 1240, "RenderThread", 1100, 0);
        state.cycle(5, 5000, t0 + Duration::from_secs(5));

        let last = state.series.samples().last().unwrap();
        let entries = processes_of(last);
        let load = entries[0].threads[0].load;
        // A reset baseline would have re-initialized from the current
        // snapshot and reported nothing (or a wild value).
        assert!((load - 100.0).abs() < 1e-6, "load = {}", load);
    }

    #[test]
    fn test_new_thread_found_on_full_rescan() {
        let fs = MockFs::new();
        fs.add_process(1234, "com.example.game", "com.example.game\0");
        fs.add_task(1234, 1240, "main", 100, 0, None);

        let mut state = state(fs.clone(), "com.example.game");
        let t0 = Instant::now();
        state.cycle(0, 0, t0);

        // A worker thread appears; cycle 1 is a lightweight update and must
        // not see it, cycle 2 is a full rescan and must.
        fs.add_task(1234, 1250, "worker", 0, 0, None);
        state.cycle(1, 1000, t0 + Duration::from_secs(1));
        assert_eq!(state.processes[&1234].threads.len(), 1);

        state.cycle(2, 2000, t0 + Duration::from_secs(2));
        assert_eq!(state.processes[&1234].threads.len(), 2);
    }

    #[test]
    fn test_vanished_thread_removed_on_full_rescan() {
        let fs = MockFs::new();
        fs.add_process(1234, "com.example.game", "com.example.game\0");
        fs.add_task(1234, 1240, "main", 100, 0, None);
        fs.add_task(1234, 1250, "worker", 100, 0, None);

        let mut state = state(fs.clone(), "com.example.game");
        let t0 = Instant::now();
        state.cycle(0, 0, t0);
        assert_eq!(state.processes[&1234].threads.len(), 2);

        fs.remove_tree("/proc/1234/task/1250");
        state.cycle(2, 2000, t0 + Duration::from_secs(2));
        assert_eq!(state.processes[&1234].threads.len(), 1);
        assert!(state.processes[&1234].threads.contains_key(&1240));
    }

    #[test]
    fn test_process_disappearance_is_a_lifecycle_event() {
        let fs = MockFs::new();
        fs.add_process(1234, "com.example.game", "com.example.game\0");
        fs.add_task(1234, 1240, "main", 100, 0, None);

        let mut state = state(fs.clone(), "com.example.game");
        let t0 = Instant::now();
        state.cycle(0, 0, t0);

        // The process exits; the next full thread rescan invalidates it.
        fs.remove_tree("/proc/1234");
        state.cycle(2, 2000, t0 + Duration::from_secs(2));
        assert!(!state.processes[&1234].valid);

        // The next process rescan drops it entirely.
        state.cycle(5, 5000, t0 + Duration::from_secs(5));
        assert!(state.processes.is_empty());
    }

    #[test]
    fn test_affinity_defaults_when_status_missing() {
        let fs = MockFs::new();
        fs.add_process(1234, "com.example.game", "com.example.game\0");
        fs.add_task(1234, 1240, "busy", 100, 0, None);

        let mut state = state(fs.clone(), "com.example.game");
        let t0 = Instant::now();
        state.cycle(0, 0, t0);

        fs.set_task_ticks(1234, 1240, "busy", 200, 0);
        state.cycle(1, 1000, t0 + Duration::from_secs(1));

        let entries = processes_of(&state.series.samples()[0]);
        assert_eq!(entries[0].threads[0].cpu_set, AFFINITY_UNKNOWN);
    }

    #[test]
    fn test_last_change_tracks_thread_set_mutations() {
        let fs = MockFs::new();
        fs.add_process(1234, "com.example.game", "com.example.game\0");
        fs.add_task(1234, 1240, "main", 100, 0, None);

        let mut state = state(fs.clone(), "com.example.game");
        let t0 = Instant::now();
        state.cycle(0, 0, t0);
        assert_eq!(state.processes[&1234].last_change, Some(t0));
        assert_eq!(state.processes[&1234].last_full_scan, Some(t0));

        // No structural change: last_change stays, last_full_scan advances.
        let t2 = t0 + Duration::from_secs(2);
        state.cycle(2, 2000, t2);
        assert_eq!(state.processes[&1234].last_change, Some(t0));
        assert_eq!(state.processes[&1234].last_full_scan, Some(t2));

        // A thread appears: last_change advances on the next full rescan.
        fs.add_task(1234, 1250, "worker", 0, 0, None);
        let t4 = t0 + Duration::from_secs(4);
        state.cycle(4, 4000, t4);
        assert_eq!(state.processes[&1234].last_change, Some(t4));
    }

    #[test]
    fn test_thread_comm_fallback_name() {
        let fs = MockFs::new();
        fs.add_process(1234, "com.example.game", "com.example.game\0");
        fs.add_task(1234, 1240, "x", 100, 0, None);
        fs.remove_file("/proc/1234/task/1240/comm");

        let mut state = state(fs.clone(), "com.example.game");
        let t0 = Instant::now();
        state.cycle(0, 0, t0);

        assert_eq!(state.processes[&1234].threads[&1240].name, "thread-1240");
    }
}
