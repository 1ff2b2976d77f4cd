//! System configuration: file format, defaults, and validation.
//!
//! The config file is plain `key value` pairs, whitespace-separated, one per
//! line, with `#` line comments. Keys accept both hyphen and underscore
//! spellings (`num-cpu` / `num_cpu`). Unrecognized keys are ignored so a
//! config file can carry annotations for other tooling.
//!
//! Loading and validating are separate steps: [`Config::load`] reads the
//! file (falling back to defaults with a stderr warning when the file is
//! missing), and [`Config::validate`] enforces the range rules. Invalid
//! configuration aborts initialization; neither the scheduler nor the
//! memory manager is constructed from an unvalidated config.

use std::fmt;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Scheduling policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SchedulerKind {
    /// First-come-first-served: a dispatched process runs to completion.
    Fcfs,
    /// Preemptive round-robin with a fixed quantum in ticks.
    Rr,
}

impl fmt::Display for SchedulerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fcfs => write!(f, "fcfs"),
            Self::Rr => write!(f, "rr"),
        }
    }
}

/// Full system configuration.
///
/// All memory quantities are in KB. See the module docs for the file format.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Number of CPU cores, 1..=128.
    pub num_cpu: u32,
    /// Scheduling policy.
    pub scheduler: SchedulerKind,
    /// Round-robin slice in ticks; ignored under FCFS.
    pub quantum_cycles: u32,
    /// Seconds between generated processes when auto-generation is on.
    pub batch_process_freq: u64,
    /// Minimum instruction count for generated programs.
    pub min_ins: u32,
    /// Maximum instruction count for generated programs.
    pub max_ins: u32,
    /// Busy-wait cycles between instructions; 0 means one instruction per tick.
    pub delay_per_exec: u32,
    /// Total simulated memory in KB.
    pub max_overall_mem: u64,
    /// Frame size in KB (paging).
    pub mem_per_frame: u64,
    /// Lower clamp for per-process memory requests in KB.
    pub min_mem_per_proc: u64,
    /// Upper clamp for per-process memory requests in KB.
    pub max_mem_per_proc: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            num_cpu: 4,
            scheduler: SchedulerKind::Fcfs,
            quantum_cycles: 5,
            batch_process_freq: 3,
            min_ins: 100,
            max_ins: 1000,
            delay_per_exec: 0,
            max_overall_mem: 1024,
            mem_per_frame: 16,
            min_mem_per_proc: 16,
            max_mem_per_proc: 128,
        }
    }
}

impl Config {
    /// Load configuration from a file.
    ///
    /// A missing or unreadable file yields the defaults with a warning on
    /// stderr (the simulator still comes up). A file that parses but carries
    /// a malformed value is an error: silently substituting a default for a
    /// key the user explicitly set would hide the typo.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(_) => {
                eprintln!(
                    "WARNING: could not open config file '{}'; using defaults",
                    path.display()
                );
                return Ok(Self::default());
            }
        };
        Self::parse(&text)
    }

    /// Parse configuration from in-memory text. Same rules as [`Config::load`].
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let mut cfg = Self::default();

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut parts = line.split_whitespace();
            let (key, value) = match (parts.next(), parts.next()) {
                (Some(k), Some(v)) => (k, v),
                _ => continue,
            };
            cfg.apply(key, value)?;
        }

        Ok(cfg)
    }

    fn apply(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        // Normalize so each key matches both spellings.
        let canon = key.replace('_', "-");
        match canon.as_str() {
            "num-cpu" => self.num_cpu = parse_int(key, value)?,
            "scheduler" | "scheduler-type" => {
                self.scheduler = match value.to_ascii_lowercase().as_str() {
                    "fcfs" => SchedulerKind::Fcfs,
                    "rr" => SchedulerKind::Rr,
                    _ => {
                        return Err(ConfigError::InvalidScheduler {
                            value: value.to_string(),
                        })
                    }
                }
            }
            "quantum-cycles" => self.quantum_cycles = parse_int(key, value)?,
            "batch-process-freq" => self.batch_process_freq = parse_int(key, value)?,
            "min-ins" | "min-instructions" => self.min_ins = parse_int(key, value)?,
            "max-ins" | "max-instructions" => self.max_ins = parse_int(key, value)?,
            "delay-per-exec" => self.delay_per_exec = parse_int(key, value)?,
            "max-overall-mem" => self.max_overall_mem = parse_int(key, value)?,
            "mem-per-frame" => self.mem_per_frame = parse_int(key, value)?,
            "min-mem-per-proc" => self.min_mem_per_proc = parse_int(key, value)?,
            "max-mem-per-proc" => self.max_mem_per_proc = parse_int(key, value)?,
            _ => {} // unknown keys are ignored
        }
        Ok(())
    }

    /// Check every range rule. Returns the first violation found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_cpu < 1 || self.num_cpu > 128 {
            return Err(ConfigError::CpuCountOutOfRange { count: self.num_cpu });
        }
        if self.scheduler == SchedulerKind::Rr && self.quantum_cycles < 1 {
            return Err(ConfigError::QuantumTooSmall {
                quantum: self.quantum_cycles,
            });
        }
        if self.min_ins < 1 || self.max_ins < self.min_ins {
            return Err(ConfigError::InvalidInstructionRange {
                min: self.min_ins,
                max: self.max_ins,
            });
        }
        if self.mem_per_frame < 1 || self.mem_per_frame > self.max_overall_mem {
            return Err(ConfigError::InvalidFrameSize {
                frame_kb: self.mem_per_frame,
                total_kb: self.max_overall_mem,
            });
        }
        if self.min_mem_per_proc < 1
            || self.max_mem_per_proc < self.min_mem_per_proc
            || self.max_mem_per_proc > self.max_overall_mem
        {
            return Err(ConfigError::InvalidProcessMemoryRange {
                min_kb: self.min_mem_per_proc,
                max_kb: self.max_mem_per_proc,
                total_kb: self.max_overall_mem,
            });
        }
        Ok(())
    }
}

fn parse_int<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

/// Configuration load or validation failure.
#[derive(Debug)]
#[non_exhaustive]
pub enum ConfigError {
    /// A recognized key had an unparsable value.
    InvalidValue { key: String, value: String },
    /// Scheduler was neither `fcfs` nor `rr`.
    InvalidScheduler { value: String },
    /// Core count outside 1..=128.
    CpuCountOutOfRange { count: u32 },
    /// Round-robin quantum below 1.
    QuantumTooSmall { quantum: u32 },
    /// `min-ins` below 1 or above `max-ins`.
    InvalidInstructionRange { min: u32, max: u32 },
    /// Frame size below 1 KB or above total memory.
    InvalidFrameSize { frame_kb: u64, total_kb: u64 },
    /// Per-process memory bounds inconsistent or above total memory.
    InvalidProcessMemoryRange {
        min_kb: u64,
        max_kb: u64,
        total_kb: u64,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidValue { key, value } => {
                write!(f, "invalid value for '{key}': '{value}'")
            }
            Self::InvalidScheduler { value } => {
                write!(f, "invalid scheduler '{value}' (must be 'fcfs' or 'rr')")
            }
            Self::CpuCountOutOfRange { count } => {
                write!(f, "invalid number of CPUs ({count}); must be 1..=128")
            }
            Self::QuantumTooSmall { quantum } => {
                write!(
                    f,
                    "invalid quantum cycles ({quantum}); must be at least 1 for round-robin"
                )
            }
            Self::InvalidInstructionRange { min, max } => {
                write!(f, "invalid instruction range: min {min}, max {max}")
            }
            Self::InvalidFrameSize { frame_kb, total_kb } => {
                write!(
                    f,
                    "invalid frame size: {frame_kb} KB (total memory {total_kb} KB)"
                )
            }
            Self::InvalidProcessMemoryRange {
                min_kb,
                max_kb,
                total_kb,
            } => {
                write!(
                    f,
                    "invalid per-process memory range: min {min_kb} KB, max {max_kb} KB \
                     (total memory {total_kb} KB)"
                )
            }
        }
    }
}

impl std::error::Error for ConfigError {}
