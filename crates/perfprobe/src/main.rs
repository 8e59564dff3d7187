//! perfprobe - on-device performance telemetry sampler.
//!
//! Runs the five-collector sampling session against a target process and
//! writes the merged time series as a JSON report.

use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::Parser;
use tracing::{Level, error, info, warn};
use tracing_subscriber::EnvFilter;

use perfprobe_core::collector::{RealFs, RealRunner};
use perfprobe_core::series::SessionReport;
use perfprobe_core::session::{Session, SessionConfig, foreground_package};

/// On-device performance telemetry sampler.
#[derive(Parser)]
#[command(name = "perfprobe", about = "On-device performance telemetry sampler", version)]
struct Args {
    /// Target process or package name.
    /// Resolved from the foreground application when omitted.
    target: Option<String>,

    /// Observation duration in seconds.
    #[arg(short = 't', long, default_value = "30")]
    duration: u64,

    /// Sampling interval in milliseconds.
    #[arg(short, long, default_value = "1000")]
    interval: u64,

    /// Always use the frame-latency command for fps, skipping the kernel
    /// display-statistics node.
    #[arg(long)]
    force_dumpsys: bool,

    /// Minimum per-thread CPU usage (percent) for a thread to be reported.
    #[arg(long, default_value = "0.1")]
    threshold: f64,

    /// Report output path.
    #[arg(short, long, default_value = "perfprobe.json")]
    output: String,

    /// Increase logging verbosity (-v for debug, -vv for trace). Default is info level.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    quiet: bool,
}

/// Initializes the tracing subscriber with the appropriate log level.
fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(format!("perfprobe={}", level).parse().unwrap())
        .add_directive(format!("perfprobe_core={}", level).parse().unwrap());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Describes the collected series for logging.
fn describe_report(report: &SessionReport) -> String {
    let parts: Vec<String> = report
        .iter()
        .map(|(id, series)| format!("{}: {} samples", id, series.len()))
        .collect();
    parts.join(", ")
}

fn main() -> ExitCode {
    let args = Args::parse();

    init_logging(args.verbose, args.quiet);

    info!("perfprobe {} starting", env!("CARGO_PKG_VERSION"));

    let runner = RealRunner::new();
    let target = match args.target.or_else(|| foreground_package(&runner)) {
        Some(target) if !target.is_empty() => target,
        _ => {
            error!("no target given and the foreground application could not be resolved");
            return ExitCode::FAILURE;
        }
    };

    info!(
        "Config: target={}, interval={}ms, duration={}s, output={}",
        target, args.interval, args.duration, args.output
    );
    if args.force_dumpsys {
        info!("Frame rate: frame-latency command forced");
    }

    // Setup graceful shutdown
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();

    if let Err(e) = ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        r.store(false, Ordering::SeqCst);
    }) {
        warn!("Failed to set Ctrl-C handler: {}", e);
    }

    let mut session = Session::standard(
        RealFs::new(),
        runner,
        args.force_dumpsys,
        args.threshold,
    );
    let config = SessionConfig::new(target)
        .with_interval(Duration::from_millis(args.interval))
        .with_duration(Duration::from_secs(args.duration));

    let report = session.run(&config, &running);
    info!("Collected: {}", describe_report(&report));

    let json = match serde_json::to_string_pretty(&report) {
        Ok(json) => json,
        Err(e) => {
            error!("Failed to encode report: {}", e);
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = std::fs::write(&args.output, json) {
        error!("Failed to write {}: {}", args.output, e);
        return ExitCode::FAILURE;
    }

    info!("Report written to {}", args.output);
    ExitCode::SUCCESS
}

#[cfg(test)]
mod tests {
    use super::describe_report;
    use perfprobe_core::series::{Sample, SampleData, SessionReport, TimeSeries};

    #[test]
    fn describe_report_lists_all_series() {
        let mut report = SessionReport::new();

        let mut thermal = TimeSeries::new();
        thermal.push(Sample {
            time_ms: 0,
            data: SampleData::Celsius(52),
        });
        thermal.push(Sample {
            time_ms: 1000,
            data: SampleData::Celsius(53),
        });
        report.insert("thermal", thermal);
        report.insert("fps", TimeSeries::new());

        let desc = describe_report(&report);
        assert!(desc.contains("thermal: 2 samples"));
        assert!(desc.contains("fps: 0 samples"));
    }
}
