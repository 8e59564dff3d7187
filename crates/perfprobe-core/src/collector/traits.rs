//! Abstractions over the OS surfaces the collectors read.
//!
//! The `FileSystem` trait covers sysfs/procfs reads and lets the collectors
//! run against an in-memory mock in tests. The `CommandRunner` trait covers
//! the diagnostic sub-process invocations (frame-latency listing, foreground
//! task lookup) the same way.

use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Abstraction for filesystem operations.
///
/// This trait allows collectors to read from the real filesystem or from
/// a mock implementation for testing purposes.
pub trait FileSystem: Send + Sync {
    /// Reads the entire contents of a file as a string.
    fn read_to_string(&self, path: &Path) -> io::Result<String>;

    /// Checks if a path exists.
    fn exists(&self, path: &Path) -> bool;

    /// Lists entries in a directory.
    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>>;
}

/// Real filesystem implementation that delegates to `std::fs`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealFs;

impl RealFs {
    /// Creates a new `RealFs` instance.
    pub fn new() -> Self {
        Self
    }
}

impl FileSystem for RealFs {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        let entries = std::fs::read_dir(path)?;
        let mut paths = Vec::new();
        for entry in entries {
            paths.push(entry?.path());
        }
        Ok(paths)
    }
}

/// Abstraction for running a diagnostic command and capturing its stdout.
///
/// The engine never interprets exit codes; an unreadable or empty output is
/// handled by the caller as an invalid reading for that cycle.
pub trait CommandRunner: Send + Sync {
    /// Runs `program` with `args` and returns captured stdout as a string.
    fn run(&self, program: &str, args: &[&str]) -> io::Result<String>;
}

/// Real command runner that delegates to `std::process::Command`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealRunner;

impl RealRunner {
    /// Creates a new `RealRunner` instance.
    pub fn new() -> Self {
        Self
    }
}

impl CommandRunner for RealRunner {
    fn run(&self, program: &str, args: &[&str]) -> io::Result<String> {
        let output = Command::new(program).args(args).output()?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_real_fs_read_to_string() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("node");
        std::fs::write(&file, "1804800\n").unwrap();

        let fs = RealFs::new();
        assert_eq!(fs.read_to_string(&file).unwrap(), "1804800\n");
    }

    #[test]
    fn test_real_fs_exists() {
        let dir = tempfile::tempdir().unwrap();
        let fs = RealFs::new();
        assert!(fs.exists(dir.path()));
        assert!(!fs.exists(Path::new("/nonexistent/path/12345")));
    }

    #[test]
    fn test_real_fs_read_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a"), "x").unwrap();
        std::fs::write(dir.path().join("b"), "y").unwrap();

        let fs = RealFs::new();
        let entries = fs.read_dir(dir.path()).unwrap();
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn test_real_runner_captures_stdout() {
        let runner = RealRunner::new();
        let output = runner.run("echo", &["hello"]).unwrap();
        assert_eq!(output.trim(), "hello");
    }
}
