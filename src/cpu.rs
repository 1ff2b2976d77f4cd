//! A single virtual CPU core.
//!
//! A core binds at most one process and advances it one cycle at a time.
//! The `delay_per_exec` knob is modeled as busy-waiting: after each executed
//! instruction the core burns that many cycles while still bound, so CPU
//! utilization counts occupied cores, not retired instructions.
//!
//! Cores hold a [`Pid`], not the process itself; the scheduler resolves the
//! pid against its process table and hands the core a mutable borrow for
//! the duration of one cycle.

use crate::process::{Pid, Process, ProcessState, StepOutcome};

/// What one core cycle did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CoreCycle {
    /// Core has no process bound.
    Idle,
    /// Burned a delay cycle; the interpreter was not invoked.
    BusyWait,
    /// Interpreter ran; see the inner outcome for executed vs slept.
    Stepped(StepOutcome),
}

/// One CPU core.
#[derive(Debug)]
pub struct CpuCore {
    id: usize,
    current: Option<Pid>,
    executed_cycles: u32,
    delay_remaining: u32,
}

impl CpuCore {
    pub fn new(id: usize) -> Self {
        Self {
            id,
            current: None,
            executed_cycles: 0,
            delay_remaining: 0,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn current(&self) -> Option<Pid> {
        self.current
    }

    pub fn is_idle(&self) -> bool {
        self.current.is_none()
    }

    pub fn is_busy_waiting(&self) -> bool {
        self.delay_remaining > 0
    }

    /// Interpreter invocations since the current process was dispatched.
    /// Drives round-robin quantum accounting.
    pub fn executed_cycles(&self) -> u32 {
        self.executed_cycles
    }

    /// Bind a process: mark it running, record the core assignment, and
    /// reset the per-dispatch counters.
    pub fn assign(&mut self, process: &mut Process) {
        self.current = Some(process.pid());
        self.executed_cycles = 0;
        self.delay_remaining = 0;
        process.set_state(ProcessState::Running);
        process.set_assigned_core(Some(self.id));
    }

    /// Advance the bound process one cycle.
    ///
    /// A pending delay burns the cycle without invoking the interpreter.
    /// Otherwise the interpreter runs once and, if the process is still
    /// alive and a delay is configured, the next `delay_per_exec` cycles
    /// become busy-waits.
    pub fn execute_cycle(&mut self, process: &mut Process, delay_per_exec: u32) -> CoreCycle {
        debug_assert_eq!(self.current, Some(process.pid()), "core/process mismatch");
        if self.current.is_none() {
            return CoreCycle::Idle;
        }

        if self.delay_remaining > 0 {
            self.delay_remaining -= 1;
            return CoreCycle::BusyWait;
        }

        let outcome = process.step();
        self.executed_cycles += 1;
        if !process.is_finished() && delay_per_exec > 0 {
            self.delay_remaining = delay_per_exec;
        }
        CoreCycle::Stepped(outcome)
    }

    /// Whether the bound process has exhausted its program.
    pub fn process_finished(&self, process: &Process) -> bool {
        self.current == Some(process.pid()) && process.is_finished()
    }

    /// Unbind and clear all per-dispatch state.
    pub fn release(&mut self, process: &mut Process) {
        process.set_assigned_core(None);
        self.current = None;
        self.executed_cycles = 0;
        self.delay_remaining = 0;
    }
}
