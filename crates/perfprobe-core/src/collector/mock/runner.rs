//! Scripted command runner for testing sub-process based acquisition.

use crate::collector::traits::CommandRunner;
use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
struct Inner {
    outputs: VecDeque<String>,
    invocations: Vec<Vec<String>>,
}

/// Command runner that replays canned outputs in order.
///
/// Each `run` call consumes the next queued output; when the queue is
/// exhausted, `run` fails with `NotFound`, which callers treat the same as
/// an unavailable diagnostic command. Clones share the queue so a fixture
/// can keep pushing outputs while a collector holds its own clone.
#[derive(Debug, Clone, Default)]
pub struct MockRunner {
    inner: Arc<Mutex<Inner>>,
}

impl MockRunner {
    /// Creates a runner with an empty output queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues one output to be returned by the next `run` call.
    pub fn push_output(&self, output: impl Into<String>) {
        self.inner.lock().unwrap().outputs.push_back(output.into());
    }

    /// Returns the recorded invocations as `[program, args...]` vectors.
    pub fn invocations(&self) -> Vec<Vec<String>> {
        self.inner.lock().unwrap().invocations.clone()
    }
}

impl CommandRunner for MockRunner {
    fn run(&self, program: &str, args: &[&str]) -> io::Result<String> {
        let mut inner = self.inner.lock().unwrap();
        let mut invocation = vec![program.to_string()];
        invocation.extend(args.iter().map(|a| a.to_string()));
        inner.invocations.push(invocation);

        inner
            .outputs
            .pop_front()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no scripted output"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_runner_replays_in_order() {
        let runner = MockRunner::new();
        runner.push_output("first");
        runner.push_output("second");

        assert_eq!(runner.run("dumpsys", &[]).unwrap(), "first");
        assert_eq!(runner.run("dumpsys", &[]).unwrap(), "second");
        assert!(runner.run("dumpsys", &[]).is_err());
    }

    #[test]
    fn test_mock_runner_records_invocations() {
        let runner = MockRunner::new();
        runner.push_output("");
        runner
            .run("dumpsys", &["SurfaceFlinger", "-latency", "com.example"])
            .unwrap();

        let calls = runner.invocations();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0][0], "dumpsys");
        assert_eq!(calls[0][3], "com.example");
    }
}
