//! In-memory mock filesystem for testing collectors without real `/proc`
//! and `/sys` trees.
//!
//! Storage is shared between clones: a collector holds its own clone of the
//! fixture, and a test can keep mutating counter files between cycles to
//! simulate the kernel updating them.

use crate::collector::traits::FileSystem;
use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
struct Inner {
    /// Map from path to file contents.
    files: HashMap<PathBuf, String>,
    /// Set of directories (for read_dir support).
    directories: HashSet<PathBuf>,
}

/// In-memory filesystem for testing.
///
/// Stores files and directories in memory, allowing tests to simulate
/// various sysfs/procfs states without needing actual device access.
#[derive(Debug, Clone, Default)]
pub struct MockFs {
    inner: Arc<Mutex<Inner>>,
}

impl MockFs {
    /// Creates a new empty mock filesystem.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a file with the given content, replacing any previous content.
    ///
    /// Parent directories are automatically created.
    pub fn add_file(&self, path: impl AsRef<Path>, content: impl Into<String>) {
        let path = path.as_ref().to_path_buf();
        let mut inner = self.inner.lock().unwrap();

        let mut parent = path.parent();
        while let Some(p) = parent {
            if !p.as_os_str().is_empty() {
                inner.directories.insert(p.to_path_buf());
            }
            parent = p.parent();
        }

        inner.files.insert(path, content.into());
    }

    /// Adds an empty directory.
    pub fn add_dir(&self, path: impl AsRef<Path>) {
        let path = path.as_ref().to_path_buf();
        let mut inner = self.inner.lock().unwrap();
        inner.directories.insert(path.clone());

        let mut parent = path.parent();
        while let Some(p) = parent {
            if !p.as_os_str().is_empty() {
                inner.directories.insert(p.to_path_buf());
            }
            parent = p.parent();
        }
    }

    /// Removes a file, simulating a node disappearing mid-run.
    pub fn remove_file(&self, path: impl AsRef<Path>) {
        self.inner.lock().unwrap().files.remove(path.as_ref());
    }

    /// Removes a directory and everything under it, simulating a process
    /// or thread exiting.
    pub fn remove_tree(&self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        let mut inner = self.inner.lock().unwrap();
        inner.files.retain(|p, _| !p.starts_with(path));
        inner.directories.retain(|p| !p.starts_with(path));
    }
}

impl FileSystem for MockFs {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        self.inner
            .lock()
            .unwrap()
            .files
            .get(path)
            .cloned()
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("file not found: {:?}", path),
                )
            })
    }

    fn exists(&self, path: &Path) -> bool {
        let inner = self.inner.lock().unwrap();
        inner.files.contains_key(path) || inner.directories.contains(path)
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        let inner = self.inner.lock().unwrap();
        if !inner.directories.contains(path) {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("directory not found: {:?}", path),
            ));
        }

        let mut entries = HashSet::new();

        for file_path in inner.files.keys() {
            if file_path.parent().is_some_and(|parent| parent == path) {
                entries.insert(file_path.clone());
            }
        }

        for dir_path in &inner.directories {
            if dir_path.parent().is_some_and(|parent| parent == path) && dir_path != path {
                entries.insert(dir_path.clone());
            }
        }

        Ok(entries.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_fs_add_file() {
        let fs = MockFs::new();
        fs.add_file("/proc/stat", "cpu  1 2 3 4 5 6 7\n");

        assert!(fs.exists(Path::new("/proc/stat")));
        assert!(fs.exists(Path::new("/proc")));

        let content = fs.read_to_string(Path::new("/proc/stat")).unwrap();
        assert_eq!(content, "cpu  1 2 3 4 5 6 7\n");
    }

    #[test]
    fn test_mock_fs_read_dir() {
        let fs = MockFs::new();
        fs.add_file("/proc/1/stat", "stat content");
        fs.add_file("/proc/1/comm", "init\n");
        fs.add_file("/proc/2/stat", "stat content 2");

        let proc_entries = fs.read_dir(Path::new("/proc")).unwrap();
        assert_eq!(proc_entries.len(), 2); // /proc/1 and /proc/2

        let proc1_entries = fs.read_dir(Path::new("/proc/1")).unwrap();
        assert_eq!(proc1_entries.len(), 2); // stat and comm
    }

    #[test]
    fn test_mock_fs_not_found() {
        let fs = MockFs::new();
        let result = fs.read_to_string(Path::new("/nonexistent"));
        assert!(result.is_err());
        assert_eq!(result.unwrap_err().kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_mock_fs_clones_share_storage() {
        let fs = MockFs::new();
        let clone = fs.clone();

        fs.add_file("/proc/uptime", "1.0 2.0\n");
        assert!(clone.exists(Path::new("/proc/uptime")));

        fs.add_file("/proc/uptime", "3.0 4.0\n");
        assert_eq!(
            clone.read_to_string(Path::new("/proc/uptime")).unwrap(),
            "3.0 4.0\n"
        );
    }

    #[test]
    fn test_mock_fs_remove_tree() {
        let fs = MockFs::new();
        fs.add_file("/proc/42/task/42/stat", "x");
        fs.add_file("/proc/42/comm", "x\n");
        fs.add_file("/proc/43/comm", "y\n");

        fs.remove_tree("/proc/42");

        assert!(!fs.exists(Path::new("/proc/42")));
        assert!(!fs.exists(Path::new("/proc/42/comm")));
        assert!(fs.exists(Path::new("/proc/43/comm")));
    }
}
