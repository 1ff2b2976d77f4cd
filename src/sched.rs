//! Scheduler: admission, dispatch, execution, preemption, completion,
//! reaping, and process generation.
//!
//! # Tick anatomy
//!
//! Every tick runs the same fixed sequence:
//!
//! 1. **Dispatch** — cores are visited in index order; each idle core pops
//!    one process from the ready queue, stamping its start time on first
//!    dispatch.
//! 2. **Execute** — each bound core advances one cycle. A cycle that
//!    actually consumes an instruction appends one log line; busy-wait and
//!    sleep cycles log nothing.
//! 3. **Completion / preemption** — a core whose process exhausted its
//!    program moves it to the finished set and frees the core. Under
//!    round-robin, a process that has held its core for a full quantum is
//!    pushed back to the tail of the ready queue, so it is not eligible
//!    again until the next tick.
//!
//! Memory is *not* released at completion. [`Scheduler::reap_finished`]
//! walks the finished set and deallocates each process exactly once,
//! tracked by a run-lifetime dedup set.
//!
//! # Threads
//!
//! Two optional workers, both joinable:
//!
//! - the **executor** ticks every 100 ms ([`clock::TICK_PERIOD`]);
//! - the **generator** admits one auto process every `batch_process_freq`
//!   seconds while enabled.
//!
//! Each is driven by an atomic flag (`is_running` / `auto_generate`) plus a
//! shutdown channel; the sleep between iterations is `recv_timeout` on that
//! channel, so a stop request takes effect at the next iteration boundary
//! without interrupting a tick in progress. Tests skip the threads entirely
//! and call [`Scheduler::tick`] / [`Scheduler::generate_one`] directly.
//!
//! # Locks
//!
//! Ready queue, running set, finished set, reaped set, process table, and
//! the core bank each have a dedicated mutex, held only for the duration of
//! a mutation or snapshot copy, and never two scheduler locks at once
//! except the core bank around a tick. The one ordering rule: no thread
//! holds the memory-manager lock while acquiring a scheduler lock, or vice
//! versa. Admission allocates before touching the queue, and the reaper
//! copies the finished list before deallocating.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use crossbeam_channel::{bounded, RecvTimeoutError, Sender};

use crate::clock::{self, TICK_PERIOD};
use crate::config::{Config, SchedulerKind};
use crate::cpu::{CoreCycle, CpuCore};
use crate::logsink::FileLog;
use crate::mem::{AllocError, MemoryManager};
use crate::process::{Pid, Process, ProcessSnapshot, ProcessState, StepOutcome};
use crate::rng::XorShift64;

/// Single-process view for `screen -r` / process-smi: scheduling snapshot
/// plus the tail of the process log.
#[derive(Clone, Debug)]
pub struct SmiView {
    pub snapshot: ProcessSnapshot,
    pub log_tail: Vec<String>,
}

struct Shared {
    cfg: Config,
    cores: Mutex<Vec<CpuCore>>,
    table: Mutex<BTreeMap<Pid, Process>>,
    ready: Mutex<VecDeque<Pid>>,
    running: Mutex<Vec<Pid>>,
    finished: Mutex<Vec<Pid>>,
    reaped: Mutex<BTreeSet<Pid>>,
    is_running: AtomicBool,
    auto_generate: AtomicBool,
    current_cycle: AtomicU64,
    total_created: AtomicU32,
    rng: Mutex<XorShift64>,
    log_dir: PathBuf,
    started_at: Mutex<Option<Instant>>,
}

/// The scheduler. Owns the core bank, all process records, and the two
/// worker threads.
pub struct Scheduler {
    shared: Arc<Shared>,
    executor: Option<(Sender<()>, JoinHandle<()>)>,
    generator: Option<(Sender<()>, JoinHandle<()>)>,
}

impl Scheduler {
    /// Build from a validated config, seeding the RNG from the wall clock.
    pub fn new(cfg: Config) -> Self {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(1);
        Self::with_seed(cfg, seed)
    }

    /// Build with a fixed seed for reproducible generation.
    pub fn with_seed(cfg: Config, seed: u64) -> Self {
        Self::with_seed_and_log_dir(cfg, seed, "logs")
    }

    /// Full constructor; tests point `log_dir` into a temp directory.
    pub fn with_seed_and_log_dir(cfg: Config, seed: u64, log_dir: impl Into<PathBuf>) -> Self {
        let cores = (0..cfg.num_cpu as usize).map(CpuCore::new).collect();
        Self {
            shared: Arc::new(Shared {
                cfg,
                cores: Mutex::new(cores),
                table: Mutex::new(BTreeMap::new()),
                ready: Mutex::new(VecDeque::new()),
                running: Mutex::new(Vec::new()),
                finished: Mutex::new(Vec::new()),
                reaped: Mutex::new(BTreeSet::new()),
                is_running: AtomicBool::new(false),
                auto_generate: AtomicBool::new(false),
                current_cycle: AtomicU64::new(0),
                total_created: AtomicU32::new(0),
                rng: Mutex::new(XorShift64::new(seed)),
                log_dir: log_dir.into(),
                started_at: Mutex::new(None),
            }),
            executor: None,
            generator: None,
        }
    }

    pub fn config(&self) -> &Config {
        &self.shared.cfg
    }

    // ------------------------------------------------------------------
    // Admission
    // ------------------------------------------------------------------

    /// Claim the next process id. Also drives generated `Process_<N>`
    /// names, so ids are consumed even for processes that fail admission.
    pub fn next_pid(&self) -> Pid {
        Pid(self.shared.total_created.fetch_add(1, Ordering::Relaxed))
    }

    /// Admit a fully built process: allocate its memory, then queue it.
    ///
    /// Allocation happens first; a process that cannot get memory is never
    /// queued and its record is dropped here.
    pub fn admit(
        &self,
        process: Process,
        mem_kb: u64,
        mem: &MemoryManager,
    ) -> Result<Pid, AllocError> {
        self.shared.admit(process, mem_kb, mem)
    }

    /// Create and admit an auto-program process with a random instruction
    /// count in the configured range. Used by `screen -s` and the
    /// generator.
    pub fn spawn_auto(
        &self,
        name: &str,
        mem_kb: u64,
        mem: &MemoryManager,
    ) -> Result<Pid, AllocError> {
        let pid = self.next_pid();
        let (count, child_rng) = {
            let mut rng = self.shared.rng.lock().expect("rng mutex poisoned");
            (
                rng.range_u32(self.shared.cfg.min_ins, self.shared.cfg.max_ins),
                rng.fork(),
            )
        };
        let log = Arc::new(FileLog::create(&self.shared.log_dir, name));
        let process = Process::new_auto(pid, name, count, clock::now_ctime(), log, child_rng);
        self.admit(process, mem_kb, mem)
    }

    /// Create and admit a custom-program process from instruction lines.
    /// Used by `screen -c`.
    pub fn spawn_custom<I, S>(
        &self,
        name: &str,
        mem_kb: u64,
        lines: I,
        mem: &MemoryManager,
    ) -> Result<Pid, AllocError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let pid = self.next_pid();
        let log = Arc::new(FileLog::create(&self.shared.log_dir, name));
        let process = Process::new_custom(pid, name, lines, clock::now_ctime(), log);
        self.admit(process, mem_kb, mem)
    }

    /// Generate one auto process the way the generator thread does:
    /// random instruction count and memory request, name `Process_<N>`.
    /// Dropped with a warning if allocation fails.
    pub fn generate_one(&self, mem: &MemoryManager) {
        self.shared.generate_one(mem);
    }

    // ------------------------------------------------------------------
    // Execution control
    // ------------------------------------------------------------------

    /// Run one tick synchronously. This is the entire executor body; the
    /// executor thread is just this plus a 100 ms pause.
    pub fn tick(&self) {
        self.shared.tick();
    }

    /// Start the executor thread. Idempotent.
    pub fn start(&mut self) {
        if self.shared.is_running.swap(true, Ordering::SeqCst) {
            return;
        }
        *self
            .shared
            .started_at
            .lock()
            .expect("start-time mutex poisoned") = Some(Instant::now());

        let shared = Arc::clone(&self.shared);
        let (tx, rx) = bounded::<()>(1);
        let handle = std::thread::Builder::new()
            .name("executor".into())
            .spawn(move || loop {
                if !shared.is_running.load(Ordering::SeqCst) {
                    break;
                }
                shared.tick();
                match rx.recv_timeout(TICK_PERIOD) {
                    Err(RecvTimeoutError::Timeout) => {}
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            })
            .expect("failed to spawn executor thread");
        self.executor = Some((tx, handle));
    }

    /// Stop the executor (and the generator). The in-progress tick, if
    /// any, completes; queued and running processes are left in place.
    pub fn stop(&mut self) {
        self.stop_generation();
        self.shared.is_running.store(false, Ordering::SeqCst);
        if let Some((tx, handle)) = self.executor.take() {
            let _ = tx.send(());
            let _ = handle.join();
        }
    }

    /// Start the generator thread. Idempotent; independent of the executor.
    pub fn start_generation(&mut self, mem: Arc<MemoryManager>) {
        if self.shared.auto_generate.swap(true, Ordering::SeqCst) {
            return;
        }
        let shared = Arc::clone(&self.shared);
        let period = Duration::from_secs(shared.cfg.batch_process_freq);
        let (tx, rx) = bounded::<()>(1);
        let handle = std::thread::Builder::new()
            .name("generator".into())
            .spawn(move || loop {
                match rx.recv_timeout(period) {
                    Err(RecvTimeoutError::Timeout) => {}
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
                if !shared.auto_generate.load(Ordering::SeqCst) {
                    break;
                }
                shared.generate_one(&mem);
            })
            .expect("failed to spawn generator thread");
        self.generator = Some((tx, handle));
    }

    /// Stop the generator thread.
    pub fn stop_generation(&mut self) {
        self.shared.auto_generate.store(false, Ordering::SeqCst);
        if let Some((tx, handle)) = self.generator.take() {
            let _ = tx.send(());
            let _ = handle.join();
        }
    }

    pub fn is_running(&self) -> bool {
        self.shared.is_running.load(Ordering::SeqCst)
    }

    pub fn is_generating(&self) -> bool {
        self.shared.auto_generate.load(Ordering::SeqCst)
    }

    // ------------------------------------------------------------------
    // Reaper
    // ------------------------------------------------------------------

    /// Release memory of finished processes, each exactly once for the
    /// lifetime of the run. Returns how many were newly reaped.
    pub fn reap_finished(&self, mem: &MemoryManager) -> usize {
        // Copy first: the memory lock must not be taken while a scheduler
        // lock is held.
        let finished: Vec<Pid> = self
            .shared
            .finished
            .lock()
            .expect("finished mutex poisoned")
            .clone();

        let fresh: Vec<Pid> = {
            let reaped = self.shared.reaped.lock().expect("reaped mutex poisoned");
            finished
                .into_iter()
                .filter(|pid| !reaped.contains(pid))
                .collect()
        };

        let mut count = 0;
        for pid in fresh {
            mem.deallocate(pid);
            self.shared
                .reaped
                .lock()
                .expect("reaped mutex poisoned")
                .insert(pid);
            count += 1;
        }
        count
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Busy cores over total cores, in `[0, 1]`.
    pub fn cpu_utilization(&self) -> f64 {
        let cores = self.shared.cores.lock().expect("core mutex poisoned");
        if cores.is_empty() {
            return 0.0;
        }
        let busy = cores.iter().filter(|c| !c.is_idle()).count();
        busy as f64 / cores.len() as f64
    }

    pub fn active_cores(&self) -> usize {
        let cores = self.shared.cores.lock().expect("core mutex poisoned");
        cores.iter().filter(|c| !c.is_idle()).count()
    }

    pub fn total_cores(&self) -> usize {
        self.shared.cores.lock().expect("core mutex poisoned").len()
    }

    pub fn ready_queue_len(&self) -> usize {
        self.shared.ready.lock().expect("ready mutex poisoned").len()
    }

    pub fn total_created(&self) -> u32 {
        self.shared.total_created.load(Ordering::Relaxed)
    }

    pub fn current_cycle(&self) -> u64 {
        self.shared.current_cycle.load(Ordering::Relaxed)
    }

    /// Seconds since the executor first started, zero if it never has.
    pub fn elapsed_seconds(&self) -> u64 {
        self.shared
            .started_at
            .lock()
            .expect("start-time mutex poisoned")
            .map(|t| t.elapsed().as_secs())
            .unwrap_or(0)
    }

    /// Snapshots of currently running processes, in running-set order.
    pub fn running_snapshot(&self) -> Vec<ProcessSnapshot> {
        let pids: Vec<Pid> = self
            .shared
            .running
            .lock()
            .expect("running mutex poisoned")
            .clone();
        self.snapshots_for(&pids)
    }

    /// Snapshots of finished processes, in completion order.
    pub fn finished_snapshot(&self) -> Vec<ProcessSnapshot> {
        let pids: Vec<Pid> = self
            .shared
            .finished
            .lock()
            .expect("finished mutex poisoned")
            .clone();
        self.snapshots_for(&pids)
    }

    fn snapshots_for(&self, pids: &[Pid]) -> Vec<ProcessSnapshot> {
        let table = self.shared.table.lock().expect("table mutex poisoned");
        pids.iter()
            .filter_map(|pid| table.get(pid))
            .map(Process::snapshot)
            .collect()
    }

    /// Look a process up by name across every lifecycle stage.
    pub fn find_process(&self, name: &str) -> Option<ProcessSnapshot> {
        let table = self.shared.table.lock().expect("table mutex poisoned");
        table
            .values()
            .find(|p| p.name() == name)
            .map(Process::snapshot)
    }

    /// Run a closure against one process record under the table lock.
    /// The inspection seam for detailed views and tests; keep the closure
    /// short, the executor shares this lock.
    pub fn inspect<R>(&self, name: &str, f: impl FnOnce(&Process) -> R) -> Option<R> {
        let table = self.shared.table.lock().expect("table mutex poisoned");
        table.values().find(|p| p.name() == name).map(f)
    }

    /// Snapshot plus log tail for one process.
    pub fn smi_view(&self, name: &str, tail: usize) -> Option<SmiView> {
        let table = self.shared.table.lock().expect("table mutex poisoned");
        table.values().find(|p| p.name() == name).map(|p| SmiView {
            snapshot: p.snapshot(),
            log_tail: p.log_tail(tail),
        })
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

impl Shared {
    fn lock_table(&self) -> MutexGuard<'_, BTreeMap<Pid, Process>> {
        self.table.lock().expect("table mutex poisoned")
    }

    fn admit(&self, process: Process, mem_kb: u64, mem: &MemoryManager) -> Result<Pid, AllocError> {
        let pid = process.pid();
        mem.allocate(pid, process.name(), mem_kb)?;
        self.lock_table().insert(pid, process);
        self.ready
            .lock()
            .expect("ready mutex poisoned")
            .push_back(pid);
        Ok(pid)
    }

    fn generate_one(&self, mem: &MemoryManager) {
        let pid = Pid(self.total_created.fetch_add(1, Ordering::Relaxed));
        let name = format!("Process_{}", pid.0);
        let (count, mem_kb, child_rng) = {
            let mut rng = self.rng.lock().expect("rng mutex poisoned");
            (
                rng.range_u32(self.cfg.min_ins, self.cfg.max_ins),
                rng.range_u64(self.cfg.min_mem_per_proc, self.cfg.max_mem_per_proc),
                rng.fork(),
            )
        };
        let log = Arc::new(FileLog::create(&self.log_dir, &name));
        let process = Process::new_auto(pid, &name, count, clock::now_ctime(), log, child_rng);
        if let Err(e) = self.admit(process, mem_kb, mem) {
            eprintln!("WARNING: dropping generated process '{name}': {e}");
        }
    }

    fn tick(&self) {
        self.current_cycle.fetch_add(1, Ordering::Relaxed);
        let mut cores = self.cores.lock().expect("core mutex poisoned");
        self.dispatch(&mut cores);
        self.execute(&mut cores);
    }

    /// Fill idle cores from the ready queue, in core index order.
    fn dispatch(&self, cores: &mut [CpuCore]) {
        for core in cores.iter_mut() {
            if !core.is_idle() {
                continue;
            }
            let popped = self
                .ready
                .lock()
                .expect("ready mutex poisoned")
                .pop_front();
            let Some(pid) = popped else {
                continue;
            };
            {
                let mut table = self.lock_table();
                let Some(process) = table.get_mut(&pid) else {
                    debug_assert!(false, "queued pid {pid} missing from table");
                    continue;
                };
                if process.start_time().is_empty() {
                    process.set_start_time(clock::now_ctime());
                }
                core.assign(process);
            }
            self.running
                .lock()
                .expect("running mutex poisoned")
                .push(pid);
        }
    }

    /// Advance every bound core one cycle, then handle completion and
    /// quantum expiry.
    fn execute(&self, cores: &mut [CpuCore]) {
        for core in cores.iter_mut() {
            let Some(pid) = core.current() else {
                continue;
            };

            enum After {
                Keep,
                Finish,
                Preempt,
            }

            let after = {
                let mut table = self.lock_table();
                let Some(process) = table.get_mut(&pid) else {
                    debug_assert!(false, "bound pid {pid} missing from table");
                    continue;
                };

                if core.is_busy_waiting() {
                    core.execute_cycle(process, self.cfg.delay_per_exec);
                } else {
                    // Snapshot the line before stepping; FOR rewrites the
                    // stream and the counters move.
                    let instr = process.current_instruction().map(str::to_string);
                    let outcome = core.execute_cycle(process, self.cfg.delay_per_exec);
                    if outcome == CoreCycle::Stepped(StepOutcome::Executed) {
                        if let Some(instr) = instr {
                            let mut message = instr.clone();
                            if process.is_auto()
                                && (instr.starts_with("ADD") || instr.starts_with("VAR"))
                            {
                                message.push_str(&format!(" | X = {}", process.accumulator()));
                            }
                            process.log().append(&format!(
                                "({}) Core:{} \"{message}\"",
                                clock::now_log_timestamp(),
                                core.id()
                            ));
                        }
                    }
                }

                if core.process_finished(process) {
                    process.set_state(ProcessState::Finished);
                    process.set_finish_time(clock::now_ctime());
                    core.release(process);
                    After::Finish
                } else if self.cfg.scheduler == SchedulerKind::Rr
                    && core.executed_cycles() >= self.cfg.quantum_cycles
                {
                    process.set_state(ProcessState::Ready);
                    core.release(process);
                    After::Preempt
                } else {
                    After::Keep
                }
            };

            match after {
                After::Keep => {}
                After::Finish => {
                    self.running
                        .lock()
                        .expect("running mutex poisoned")
                        .retain(|p| *p != pid);
                    self.finished
                        .lock()
                        .expect("finished mutex poisoned")
                        .push(pid);
                }
                After::Preempt => {
                    self.running
                        .lock()
                        .expect("running mutex poisoned")
                        .retain(|p| *p != pid);
                    self.ready
                        .lock()
                        .expect("ready mutex poisoned")
                        .push_back(pid);
                }
            }
        }
    }
}
