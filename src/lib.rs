//! A teaching-grade OS simulator: multi-core process scheduling over a
//! paged memory manager, driven by a tiny interpreted instruction set.
//!
//! # Overview
//!
//! The simulator models three tightly coupled subsystems:
//!
//! - an **execution engine** — a fixed bank of virtual CPU cores that step
//!   one cycle at a time with a configurable per-instruction delay;
//! - a **scheduler** — FCFS or preemptive round-robin over a shared ready
//!   queue, with concurrent admission, dispatch, preemption, completion,
//!   and an optional background process generator;
//! - a **memory manager** — a frame pool (or flat block arena) with
//!   first/best/worst-fit selection, per-process allocation records, a
//!   backing-store log for released frames, and fragmentation accounting.
//!
//! Processes run small interpreted programs (16-bit variables, PRINT,
//! SLEEP, memory WRITE/READ, FOR-expansion); the interpreter lives inside
//! the core loop because preemption, delay, and sleep semantics interact
//! with it.
//!
//! # Module Organization
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`clock`] | Tick period and timestamp formatting |
//! | [`rng`] | Deterministic PRNG for program generation |
//! | [`config`] | Config file parsing, defaults, validation |
//! | [`process`] | Process control block + interpreter step |
//! | [`process::program`] | Instruction set and program construction |
//! | [`cpu`] | CPU core: bind, step, busy-wait, release |
//! | [`sched`] | Scheduler, executor/generator threads, reaper |
//! | [`mem`] | Frames, blocks, fit strategies, backing store |
//! | [`logsink`] | Per-process append-only log sinks |
//! | [`report`] | screen-ls / report-util / vmstat / process-smi |
//! | [`shell`] | Command parsing and dispatch for the binary |
//!
//! # Determinism
//!
//! Every source of randomness (instruction counts, operands, sleep
//! durations, memory requests) flows from one seedable [`rng::XorShift64`].
//! The executor's tick body is exposed as [`sched::Scheduler::tick`], so
//! tests drive whole scenarios synchronously: same seed, same admissions,
//! same schedule, with no wall clock involved.
//!
//! # Concurrency
//!
//! Production runs use two joinable worker threads (executor, generator),
//! each paced by `recv_timeout` on its shutdown channel and gated by an
//! atomic flag, so a stop takes effect at the next iteration boundary. The
//! data model is lock-per-structure: ready queue, running set, finished
//! set, process table, core bank, and the memory manager each guard their
//! own state, with one ordering rule: scheduler locks and the memory lock
//! are never held at the same time.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use csopesy::config::Config;
//! use csopesy::mem::{MemoryConfig, MemoryManager};
//! use csopesy::sched::Scheduler;
//!
//! let cfg = Config::default();
//! cfg.validate().expect("default config is valid");
//!
//! let mem = Arc::new(MemoryManager::new(MemoryConfig::from_config(&cfg)));
//! let mut sched = Scheduler::new(cfg);
//! sched.start();
//! sched.spawn_auto("worker", 64, &mem).expect("memory available");
//! sched.start_generation(Arc::clone(&mem));
//! // ... run, query, report ...
//! sched.stop();
//! ```

pub mod clock;
pub mod config;
pub mod cpu;
pub mod logsink;
pub mod mem;
pub mod process;
pub mod report;
pub mod rng;
pub mod sched;
pub mod shell;

pub use config::{Config, ConfigError, SchedulerKind};
pub use cpu::{CoreCycle, CpuCore};
pub use logsink::{FileLog, LogSink, MemLog, NullLog};
pub use mem::{
    AllocError, AllocKind, FitStrategy, MemoryConfig, MemoryManager, MemoryStats,
    ProcessMemoryRecord,
};
pub use process::{Pid, Process, ProcessSnapshot, ProcessState, StepOutcome};
pub use rng::XorShift64;
pub use sched::{Scheduler, SmiView};
