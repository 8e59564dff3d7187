//! Pre-built mock filesystem fixtures for testing collectors.
//!
//! These helpers lay out the sysfs/procfs nodes the collectors read, in
//! the exact shapes the kernel exposes them.

use super::filesystem::MockFs;

/// Builds a plausible task `stat` line. Only the comm and the CPU tick
/// fields matter to the collectors; the rest is filler in the right slots.
pub fn task_stat_line(tid: u32, comm: &str, utime: u64, stime: u64) -> String {
    format!(
        "{} ({}) S 1 1 0 0 -1 4194368 100 0 0 0 {} {} 0 0 20 0 1 0 12345 0 0 18446744073709551615 0 0 0 0 0 0 0 0 0 0 0 0 17 4 0 0 0 0 0",
        tid, comm, utime, stime
    )
}

impl MockFs {
    /// Adds a process directory with `comm` and `cmdline` files.
    pub fn add_process(&self, pid: u32, comm: &str, cmdline: &str) {
        let base = format!("/proc/{}", pid);
        self.add_file(format!("{}/comm", base), format!("{}\n", comm));
        self.add_file(format!("{}/cmdline", base), cmdline.to_string());
        self.add_dir(format!("{}/task", base));
    }

    /// Adds one task under a process, with its `stat`, `comm`, and
    /// (optionally) `status` files.
    pub fn add_task(
        &self,
        pid: u32,
        tid: u32,
        comm: &str,
        utime: u64,
        stime: u64,
        cpus_allowed: Option<&str>,
    ) {
        let base = format!("/proc/{}/task/{}", pid, tid);
        self.add_file(format!("{}/comm", base), format!("{}\n", comm));
        self.add_file(format!("{}/stat", base), task_stat_line(tid, comm, utime, stime));
        if let Some(list) = cpus_allowed {
            self.add_file(
                format!("{}/status", base),
                format!("Name:\t{}\nCpus_allowed:\tff\nCpus_allowed_list:\t{}\n", comm, list),
            );
        }
    }

    /// Rewrites one task's tick counters, simulating accrued CPU time.
    pub fn set_task_ticks(&self, pid: u32, tid: u32, comm: &str, utime: u64, stime: u64) {
        self.add_file(
            format!("/proc/{}/task/{}/stat", pid, tid),
            task_stat_line(tid, comm, utime, stime),
        );
    }

    /// Adds `count` CPU cores with readable current-frequency nodes.
    pub fn add_cpu_topology(&self, count: u32, freq_khz: u64) {
        for id in 0..count {
            self.add_file(
                format!("/sys/devices/system/cpu/cpu{}/cpufreq/cpuinfo_cur_freq", id),
                format!("{}\n", freq_khz),
            );
        }
    }

    /// Writes the global statistics file from per-core `(user, system,
    /// idle)` triples.
    pub fn set_core_ticks(&self, cores: &[(u64, u64, u64)]) {
        let mut content = String::from("cpu  0 0 0 0 0 0 0 0 0 0\n");
        for (i, (user, system, idle)) in cores.iter().enumerate() {
            content.push_str(&format!(
                "cpu{} {} 0 {} {} 0 0 0 0 0 0\n",
                i, user, system, idle
            ));
        }
        content.push_str("ctxt 500000\nbtime 1700000000\n");
        self.add_file("/proc/stat", content);
    }

    /// Adds a thermal zone with the given `type` and `temp` contents.
    pub fn add_thermal_zone(&self, index: u32, zone_type: &str, temp: &str) {
        let base = format!("/sys/devices/virtual/thermal/thermal_zone{}", index);
        self.add_file(format!("{}/type", base), format!("{}\n", zone_type));
        self.add_file(format!("{}/temp", base), format!("{}\n", temp));
    }

    /// Creates a typical device fixture: four cores, CPU and SoC thermal
    /// zones, a GPU, and a foreground game process with a few threads.
    pub fn typical_device() -> Self {
        let fs = Self::new();

        fs.add_cpu_topology(4, 1804800);
        fs.set_core_ticks(&[
            (100, 50, 850),
            (90, 40, 870),
            (80, 30, 890),
            (70, 20, 910),
        ]);

        fs.add_thermal_zone(0, "cpu-0-0", "45123");
        fs.add_thermal_zone(1, "soc-thermal", "52000");
        fs.add_thermal_zone(2, "battery", "30000");

        fs.add_file("/sys/class/kgsl/kgsl-3d0/gpuclk", "585000000\n");
        fs.add_file("/sys/class/kgsl/kgsl-3d0/devfreq/gpu_load", "37\n");

        fs.add_process(1, "init", "/init\0");
        fs.add_process(1234, "com.example.game", "com.example.game\0");
        fs.add_task(1234, 1234, "com.example.game", 500, 200, Some("0-7"));
        fs.add_task(1234, 1240, "RenderThread", 250, 130, Some("4-7"));
        fs.add_task(1234, 1241, "AudioTrack", 10, 5, None);

        fs
    }
}
