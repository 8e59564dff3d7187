//! Parsers for kernel statistics files and diagnostic command output.
//!
//! These are pure functions that parse the content of procfs/sysfs files and
//! sub-process output into structured data. They are designed to be easily
//! testable with string inputs; collectors treat any parse failure as "skip
//! this entry for this cycle".

use std::path::Path;

/// Error type for parsing failures.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
}

impl ParseError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            message: msg.into(),
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Parse error: {}", self.message)
    }
}

impl std::error::Error for ParseError {}

/// Cumulative tick counters for one logical CPU, from one per-core line of
/// the global statistics file.
///
/// Only meaningful as the difference between two reads; never retained
/// beyond one sampling cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoreCounters {
    pub user: u64,
    pub nice: u64,
    pub system: u64,
    pub idle: u64,
    pub iowait: u64,
    pub irq: u64,
    pub softirq: u64,
}

impl CoreCounters {
    /// Sum of all accounted ticks.
    pub fn total(&self) -> u64 {
        self.user + self.nice + self.system + self.idle + self.iowait + self.irq + self.softirq
    }
}

/// Parses the per-core lines of `/proc/stat` content.
///
/// The aggregate `cpu` line is skipped; at most `core_count` per-core
/// (`cpuN`) lines are taken in file order. Malformed lines are skipped.
pub fn parse_core_counters(content: &str, core_count: usize) -> Vec<CoreCounters> {
    let mut counters = Vec::with_capacity(core_count);

    for line in content.lines() {
        if counters.len() >= core_count {
            break;
        }

        let rest = match line.strip_prefix("cpu") {
            Some(rest) => rest,
            None => continue,
        };
        // Aggregate line has no core id suffix.
        if !rest.starts_with(|c: char| c.is_ascii_digit()) {
            continue;
        }

        let fields: Vec<&str> = rest.split_whitespace().collect();
        if fields.len() < 8 {
            continue;
        }

        let get_val = |idx: usize| -> u64 { fields[idx].parse().unwrap_or(0) };

        counters.push(CoreCounters {
            user: get_val(1),
            nice: get_val(2),
            system: get_val(3),
            idle: get_val(4),
            iowait: get_val(5),
            irq: get_val(6),
            softirq: get_val(7),
        });
    }

    counters
}

/// Extracts numeric core ids from CPU topology directory entries.
///
/// Accepts entries named `cpu<N>` with an all-digit suffix (`cpu0`,
/// `cpu11`), skipping the likes of `cpufreq` or `online`. The result is
/// sorted ascending and deduplicated.
pub fn cpu_ids_from_topology(entries: &[impl AsRef<Path>]) -> Vec<u32> {
    let mut ids: Vec<u32> = entries
        .iter()
        .filter_map(|entry| {
            let name = entry.as_ref().file_name()?.to_str()?;
            let suffix = name.strip_prefix("cpu")?;
            if suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            suffix.parse().ok()
        })
        .collect();
    ids.sort_unstable();
    ids.dedup();
    ids
}

/// Scheduler-accounted CPU time for one task, from its `stat` file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskTicks {
    /// Time spent in user mode (clock ticks).
    pub utime: u64,
    /// Time spent in kernel mode (clock ticks).
    pub stime: u64,
}

impl TaskTicks {
    /// Combined user + system ticks.
    pub fn total(&self) -> u64 {
        self.utime + self.stime
    }
}

/// Parses a task `stat` line into its CPU tick counters.
///
/// The format is tricky because the comm field can contain spaces and
/// parentheses; fields are counted from the last `)`.
pub fn parse_task_ticks(content: &str) -> Result<TaskTicks, ParseError> {
    let close_paren = content
        .rfind(')')
        .ok_or_else(|| ParseError::new("missing ')' in task stat"))?;

    let fields: Vec<&str> = content[close_paren + 1..].split_whitespace().collect();
    if fields.len() < 13 {
        return Err(ParseError::new(format!(
            "not enough fields in task stat: expected 13+, got {}",
            fields.len()
        )));
    }

    let utime = fields[11]
        .parse()
        .map_err(|_| ParseError::new("invalid utime"))?;
    let stime = fields[12]
        .parse()
        .map_err(|_| ParseError::new("invalid stime"))?;

    Ok(TaskTicks { utime, stime })
}

/// Extracts the allowed-CPU list from task `status` content.
///
/// Returns the trimmed value of the `Cpus_allowed_list:` line, or `None`
/// when the field is absent or empty.
pub fn parse_cpus_allowed_list(content: &str) -> Option<String> {
    for line in content.lines() {
        if let Some(value) = line.strip_prefix("Cpus_allowed_list:") {
            let value = value.trim();
            if !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }
    None
}

/// Returns the basename of the first NUL-separated `cmdline` token.
///
/// `/system/bin/surfaceflinger\0--foo\0` becomes `surfaceflinger`; a plain
/// package name passes through unchanged.
pub fn cmdline_basename(cmdline: &str) -> &str {
    let first = cmdline.split('\0').next().unwrap_or("");
    match first.rfind('/') {
        Some(idx) => &first[idx + 1..],
        None => first,
    }
}

/// Extracts the last `frameNumber:` value from frame-latency output.
///
/// The diagnostic command lists one record per frame; the most recent
/// record is the last occurrence in the output.
pub fn extract_frame_number(output: &str) -> Option<i64> {
    let pos = output.rfind("frameNumber:")?;
    let rest = output[pos + "frameNumber:".len()..].trim_start_matches([' ', '\t']);
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}

/// Extracts a frame-rate reading from display-statistics node content.
///
/// Handles the labelled form first (`fps: 58.1 duration:500000 ...`), then
/// falls back to the first standalone decimal in `(0, 200]`. Returns 0.0
/// when no usable value is found.
pub fn extract_fps_value(content: &str) -> f64 {
    if let Some(pos) = content.find("fps:") {
        return number_after(&content[pos + 4..]);
    }

    for token in content.split(|c: char| !(c.is_ascii_digit() || c == '.' || c == '-')) {
        if token.is_empty() {
            continue;
        }
        if let Ok(value) = token.parse::<f64>()
            && value > 0.0
            && value <= 200.0
        {
            return value;
        }
    }

    0.0
}

/// Parses the number following a label, skipping separator characters.
fn number_after(rest: &str) -> f64 {
    let rest = rest.trim_start_matches([' ', '\t', ':']);
    let end = rest
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '-'))
        .unwrap_or(rest.len());
    rest[..end].parse().unwrap_or(0.0)
}

/// Extracts the foreground package name from the task-manager lru listing.
///
/// The package sits between the last `:` before the first `/` of a line,
/// and only lines carrying a `TOP` state marker (not preceded by `B`)
/// qualify. Returns `None` when no line matches.
pub fn parse_foreground_package(output: &str) -> Option<String> {
    for line in output.lines() {
        let bytes = line.as_bytes();
        let mut start = None;
        let mut end = None;

        // Package name starts after the state columns.
        for (i, b) in bytes.iter().enumerate().skip(16) {
            match b {
                b':' => start = Some(i + 1),
                b'/' if start.is_some() => {
                    end = Some(i);
                    break;
                }
                _ => {}
            }
        }

        let (start, end) = match (start, end) {
            (Some(s), Some(e)) if e > s => (s, e),
            _ => continue,
        };

        let head = &line[..start - 1];
        let top_state = head
            .match_indices("TOP")
            .any(|(i, _)| i == 0 || head.as_bytes()[i - 1] != b'B');
        if top_state {
            return Some(line[start..end].to_string());
        }
    }
    None
}
