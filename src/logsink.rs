//! Per-process log sinks.
//!
//! Every process owns an append-only text log. In production that is
//! `logs/<name>.txt`, created at admission with a two-line header; the
//! scheduler appends one line per executed instruction and the interpreter
//! appends PRINT/WRITE/READ output. Tests swap in [`MemLog`] and assert on
//! lines without touching the filesystem.
//!
//! # Durability model
//!
//! [`FileLog`] opens, appends, and closes per line. That is slow and
//! deliberately so: a line is on its way to the OS before the next
//! instruction executes, and a crashed run leaves complete logs. At
//! hundreds of instructions per second across a handful of cores this is
//! nowhere near a bottleneck.
//!
//! # Failure policy
//!
//! Logging is best-effort. A line that cannot be written is dropped
//! silently; the simulation never stalls or dies on log I/O.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Append-only sink for one process's log.
///
/// Implementations are `Send + Sync`; the executor thread appends while
/// shell threads read tails for process-smi.
pub trait LogSink: Send + Sync {
    /// Append one line. Best-effort: errors are swallowed.
    fn append(&self, line: &str);

    /// Last `n` lines, oldest first.
    fn tail(&self, n: usize) -> Vec<String>;

    /// Backing file path, if any.
    fn path(&self) -> Option<&Path> {
        None
    }
}

/// File-backed sink at `<dir>/<name>.txt`.
pub struct FileLog {
    path: PathBuf,
}

impl FileLog {
    /// Create (or truncate) the log file and write the standard header:
    ///
    /// ```text
    /// Process: <name>
    /// Logs:
    /// ```
    ///
    /// The parent directory is created if missing. Failure to create the
    /// file is tolerated; subsequent appends will be dropped.
    pub fn create(dir: impl AsRef<Path>, name: &str) -> Self {
        let dir = dir.as_ref();
        let _ = fs::create_dir_all(dir);
        let path = dir.join(format!("{name}.txt"));
        if let Ok(mut f) = fs::File::create(&path) {
            let _ = writeln!(f, "Process: {name}");
            let _ = writeln!(f, "Logs:");
        }
        Self { path }
    }

    /// Wrap an existing path without touching the file.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl LogSink for FileLog {
    fn append(&self, line: &str) {
        // Open-append-close per line; see module docs.
        if let Ok(mut f) = OpenOptions::new().append(true).open(&self.path) {
            let _ = writeln!(f, "{line}");
        }
    }

    fn tail(&self, n: usize) -> Vec<String> {
        let Ok(text) = fs::read_to_string(&self.path) else {
            return Vec::new();
        };
        let lines: Vec<&str> = text.lines().collect();
        let start = lines.len().saturating_sub(n);
        lines[start..].iter().map(|s| s.to_string()).collect()
    }

    fn path(&self) -> Option<&Path> {
        Some(&self.path)
    }
}

/// In-memory sink for tests.
pub struct MemLog {
    lines: Mutex<Vec<String>>,
}

impl MemLog {
    pub fn new() -> Self {
        Self {
            lines: Mutex::new(Vec::new()),
        }
    }

    /// All appended lines, in order.
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().expect("mem log mutex poisoned").clone()
    }
}

impl Default for MemLog {
    fn default() -> Self {
        Self::new()
    }
}

impl LogSink for MemLog {
    fn append(&self, line: &str) {
        self.lines
            .lock()
            .expect("mem log mutex poisoned")
            .push(line.to_string());
    }

    fn tail(&self, n: usize) -> Vec<String> {
        let lines = self.lines.lock().expect("mem log mutex poisoned");
        let start = lines.len().saturating_sub(n);
        lines[start..].to_vec()
    }
}

/// Discards everything. For benchmarks and throwaway processes.
pub struct NullLog;

impl LogSink for NullLog {
    fn append(&self, _line: &str) {}

    fn tail(&self, _n: usize) -> Vec<String> {
        Vec::new()
    }
}
