//! Backing-store file: an append-only record of paged-out frames.
//!
//! The file is truncated at manager construction and starts with a header
//! naming the geometry:
//!
//! ```text
//! CSOPESY Backing Store
//! FrameSizeKB 16
//! MaxMemoryKB 1024
//!
//! ```
//!
//! Each frame released by a deallocation appends one line:
//!
//! ```text
//! FRAME 3 PID 12 NAME Process_12 SIZEKB 16 TIME Thu Jan  1 00:00:00 1970
//! ```
//!
//! Writes are best-effort: an unopenable file warns on stderr and the frame
//! is freed regardless.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::process::Pid;

pub struct BackingStore {
    path: PathBuf,
}

impl BackingStore {
    /// Truncate the file and write the header. A failure to create the file
    /// warns and leaves a store whose appends will also warn.
    pub fn create(path: impl Into<PathBuf>, frame_kb: u64, max_kb: u64) -> Self {
        let path = path.into();
        match File::create(&path) {
            Ok(mut f) => {
                let _ = writeln!(f, "CSOPESY Backing Store");
                let _ = writeln!(f, "FrameSizeKB {frame_kb}");
                let _ = writeln!(f, "MaxMemoryKB {max_kb}");
                let _ = writeln!(f);
            }
            Err(_) => {
                eprintln!(
                    "WARNING: could not initialize backing store file at '{}'",
                    path.display()
                );
            }
        }
        Self { path }
    }

    /// Append one evicted-frame record. Returns whether the line was
    /// written; callers use this to decide page-out accounting.
    pub fn append_frame(
        &self,
        frame_index: usize,
        pid: Pid,
        name: &str,
        size_kb: u64,
        timestamp: &str,
    ) -> bool {
        let mut f = match OpenOptions::new().append(true).open(&self.path) {
            Ok(f) => f,
            Err(_) => {
                eprintln!(
                    "WARNING: could not open backing store file '{}' for appending",
                    self.path.display()
                );
                return false;
            }
        };
        writeln!(
            f,
            "FRAME {frame_index} PID {pid} NAME {name} SIZEKB {size_kb} TIME {timestamp}"
        )
        .is_ok()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
