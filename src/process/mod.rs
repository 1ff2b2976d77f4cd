//! Process control block and the per-cycle interpreter step.
//!
//! A [`Process`] owns everything about one simulated program: identity,
//! scheduling state, the instruction stream, the program counter (tracked as
//! `executed`/`remaining` so `executed + remaining == total` always holds),
//! the register file, simulated memory, the sleep counter, timestamps, and
//! the log sink.
//!
//! Processes are stored in a scheduler-owned table keyed by [`Pid`]; cores,
//! queues, and result sets hold `Pid`s, never references, so exactly one
//! place can ever mutate a process.

pub mod program;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::logsink::LogSink;
use crate::rng::XorShift64;
use program::{Instr, Operand, Program};

/// Process identifier. Unique for the lifetime of a run.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Pid(pub u32);

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Scheduling state machine. `Waiting` is reserved for blocked processes;
/// nothing currently transitions into it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessState {
    Ready,
    Running,
    Waiting,
    Finished,
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Ready => "Ready",
            Self::Running => "Running",
            Self::Waiting => "Waiting",
            Self::Finished => "Finished",
        };
        write!(f, "{s}")
    }
}

/// What one interpreter invocation did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    /// Consumed one instruction.
    Executed,
    /// Burned the cycle on an active SLEEP; program counter unchanged.
    Slept,
    /// Nothing left to run.
    Idle,
}

/// Read-only view of a process for reports and queries, copied under the
/// table lock.
#[derive(Clone, Debug)]
pub struct ProcessSnapshot {
    pub pid: Pid,
    pub name: String,
    pub state: ProcessState,
    pub executed: u32,
    pub remaining: u32,
    pub total: u32,
    pub core: Option<usize>,
    pub arrival: String,
    pub start: String,
    pub finish: String,
}

impl ProcessSnapshot {
    pub fn progress(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            f64::from(self.executed) / f64::from(self.total) * 100.0
        }
    }
}

/// Per-process control block.
pub struct Process {
    pid: Pid,
    name: String,
    state: ProcessState,
    program: Program,
    executed: u32,
    remaining: u32,
    /// Accumulator for auto programs.
    accumulator: u16,
    /// Named 16-bit variables for custom programs.
    vars: BTreeMap<String, u16>,
    /// Simulated address-keyed memory (WRITE/READ target).
    memory: BTreeMap<String, u16>,
    sleep_counter: u32,
    arrival: String,
    start: String,
    finish: String,
    assigned_core: Option<usize>,
    log: Arc<dyn LogSink>,
    rng: XorShift64,
}

impl Process {
    /// Build a process around an existing program.
    pub fn with_program(
        pid: Pid,
        name: impl Into<String>,
        program: Program,
        arrival: impl Into<String>,
        log: Arc<dyn LogSink>,
        rng: XorShift64,
    ) -> Self {
        let remaining = program.len() as u32;
        Self {
            pid,
            name: name.into(),
            state: ProcessState::Ready,
            program,
            executed: 0,
            remaining,
            accumulator: 0,
            vars: BTreeMap::new(),
            memory: BTreeMap::new(),
            sleep_counter: 0,
            arrival: arrival.into(),
            start: String::new(),
            finish: String::new(),
            assigned_core: None,
            log,
            rng,
        }
    }

    /// Auto process with the fixed VAR/PRINT/ADD pattern.
    pub fn new_auto(
        pid: Pid,
        name: impl Into<String>,
        total: u32,
        arrival: impl Into<String>,
        log: Arc<dyn LogSink>,
        mut rng: XorShift64,
    ) -> Self {
        let name = name.into();
        let program = Program::patterned(&name, total, &mut rng);
        Self::with_program(pid, name, program, arrival, log, rng)
    }

    /// Auto process with a random mix of bare opcode tokens.
    pub fn new_random_mix(
        pid: Pid,
        name: impl Into<String>,
        total: u32,
        arrival: impl Into<String>,
        log: Arc<dyn LogSink>,
        mut rng: XorShift64,
    ) -> Self {
        let program = Program::random_mix(total, &mut rng);
        Self::with_program(pid, name, program, arrival, log, rng)
    }

    /// Custom process from user-supplied instruction lines. Unknown opcodes
    /// are dropped at load (see [`Program::custom`]).
    pub fn new_custom<I, S>(
        pid: Pid,
        name: impl Into<String>,
        lines: I,
        arrival: impl Into<String>,
        log: Arc<dyn LogSink>,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let program = Program::custom(lines);
        Self::with_program(
            pid,
            name,
            program,
            arrival,
            log,
            XorShift64::new(u64::from(pid.0) + 1),
        )
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ProcessState {
        self.state
    }

    pub fn set_state(&mut self, state: ProcessState) {
        self.state = state;
    }

    pub fn executed(&self) -> u32 {
        self.executed
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn total(&self) -> u32 {
        self.executed + self.remaining
    }

    pub fn is_finished(&self) -> bool {
        self.remaining == 0
    }

    pub fn is_auto(&self) -> bool {
        self.program.is_auto()
    }

    /// Accumulator value (auto programs).
    pub fn accumulator(&self) -> u16 {
        self.accumulator
    }

    /// Named variable value, if declared.
    pub fn var(&self, name: &str) -> Option<u16> {
        self.vars.get(name).copied()
    }

    /// Simulated memory cell, if written.
    pub fn mem_value(&self, addr: &str) -> Option<u16> {
        self.memory.get(addr).copied()
    }

    pub fn sleep_counter(&self) -> u32 {
        self.sleep_counter
    }

    pub fn assigned_core(&self) -> Option<usize> {
        self.assigned_core
    }

    pub fn set_assigned_core(&mut self, core: Option<usize>) {
        self.assigned_core = core;
    }

    pub fn arrival(&self) -> &str {
        &self.arrival
    }

    pub fn start_time(&self) -> &str {
        &self.start
    }

    pub fn set_start_time(&mut self, t: impl Into<String>) {
        self.start = t.into();
    }

    pub fn finish_time(&self) -> &str {
        &self.finish
    }

    pub fn set_finish_time(&mut self, t: impl Into<String>) {
        self.finish = t.into();
    }

    pub fn log(&self) -> &Arc<dyn LogSink> {
        &self.log
    }

    pub fn log_tail(&self, n: usize) -> Vec<String> {
        self.log.tail(n)
    }

    /// The instruction the next executed cycle will consume.
    pub fn current_instruction(&self) -> Option<&str> {
        self.program.get(self.executed as usize)
    }

    pub fn snapshot(&self) -> ProcessSnapshot {
        ProcessSnapshot {
            pid: self.pid,
            name: self.name.clone(),
            state: self.state,
            executed: self.executed,
            remaining: self.remaining,
            total: self.total(),
            core: self.assigned_core,
            arrival: self.arrival.clone(),
            start: self.start.clone(),
            finish: self.finish.clone(),
        }
    }

    // ------------------------------------------------------------------
    // Interpreter
    // ------------------------------------------------------------------

    /// Run one interpreter cycle.
    ///
    /// An active SLEEP consumes the cycle without touching the program
    /// counter. Otherwise exactly one instruction is consumed: `executed`
    /// advances, `remaining` shrinks, and FOR-expansion may grow the
    /// program in the same step.
    pub fn step(&mut self) -> StepOutcome {
        if self.remaining == 0 {
            return StepOutcome::Idle;
        }
        if self.sleep_counter > 0 {
            self.sleep_counter -= 1;
            return StepOutcome::Slept;
        }

        let pc = self.executed as usize;
        let line = match self.program.get(pc) {
            Some(line) => line.to_string(),
            None => {
                // Counter drift would be a bug; consume the cycle safely.
                self.remaining = 0;
                return StepOutcome::Idle;
            }
        };

        if let Some(instr) = program::parse_instr(&line) {
            self.execute(instr, pc);
        }
        // Unparsable lines are consumed as no-ops; custom programs filtered
        // them at load and the generators never emit them.

        self.executed += 1;
        self.remaining -= 1;
        StepOutcome::Executed
    }

    fn execute(&mut self, instr: Instr, pc: usize) {
        match instr {
            Instr::VarInit => self.accumulator = 0,
            Instr::Declare { name, value } => {
                if self.program.is_auto() {
                    self.accumulator = value;
                } else {
                    self.vars.insert(name, value);
                }
            }
            Instr::DeclareRand => {
                let v = self.rng.range_u32(0, 10) as u16;
                self.accumulator = v;
            }
            Instr::Add { dest, lhs, rhs } => {
                let sum = i32::from(self.operand_value(&lhs)) + i32::from(self.operand_value(&rhs));
                self.store(&dest, clamp_u16(sum));
            }
            Instr::AddRand => {
                let r = self.rng.range_u32(1, 10) as i32;
                let sum = i32::from(self.accumulator) + r;
                self.accumulator = clamp_u16(sum);
            }
            Instr::Sub { dest, lhs, rhs } => {
                let diff = i32::from(self.operand_value(&lhs)) - i32::from(self.operand_value(&rhs));
                self.store(&dest, clamp_u16(diff));
            }
            Instr::SubRand => {
                let r = self.rng.range_u32(1, 10) as i32;
                let diff = i32::from(self.accumulator) - r;
                self.accumulator = clamp_u16(diff);
            }
            Instr::Sleep { ticks } => {
                self.sleep_counter = ticks.max(1);
            }
            Instr::SleepRand => {
                self.sleep_counter = self.rng.range_u32(1, 3);
            }
            Instr::Write { addr, var } => {
                let value = self.var_value(&var);
                self.log.append(&format!("WRITE {addr} = {value}"));
                self.memory.insert(addr, value);
            }
            Instr::Read { var, addr } => {
                let value = self.memory.get(&addr).copied().unwrap_or(0);
                self.log.append(&format!("READ {var} = {value}"));
                self.vars.insert(var, value);
            }
            Instr::Print { text } => {
                let rendered = self.substitute(&text);
                self.log.append(&rendered);
                self.log
                    .append(&format!("Hello world from {}!", self.name));
            }
            Instr::PrintHello => {
                self.log
                    .append(&format!("Hello world from {}!", self.name));
            }
            Instr::For => {
                // remaining still includes the FOR itself here.
                let after = self.remaining.saturating_sub(1);
                let count = after.min(3) as usize;
                if self.program.is_auto() && count > 0 {
                    self.program.insert_prints(pc, count);
                    self.remaining += count as u32;
                }
            }
        }
    }

    /// Operand resolution. Variable reads auto-vivify to zero in custom
    /// mode; auto mode has only the accumulator.
    fn operand_value(&mut self, op: &Operand) -> u16 {
        match op {
            Operand::Imm(v) => *v,
            Operand::Var(name) => self.var_value(name),
        }
    }

    fn var_value(&mut self, name: &str) -> u16 {
        if self.program.is_auto() {
            self.accumulator
        } else {
            *self.vars.entry(name.to_string()).or_insert(0)
        }
    }

    fn store(&mut self, dest: &str, value: u16) {
        if self.program.is_auto() {
            self.accumulator = value;
        } else {
            self.vars.insert(dest.to_string(), value);
        }
    }

    /// PRINT substitution: strip `"` and `+`, then replace the first
    /// matching variable occurrence with its value. Only one variable is
    /// ever substituted; earliest match wins, longer names break ties.
    fn substitute(&self, text: &str) -> String {
        let cleaned: String = text.chars().filter(|c| *c != '"' && *c != '+').collect();
        let cleaned = cleaned.trim().to_string();

        let mut best: Option<(usize, &str, u16)> = None;
        for (name, value) in &self.vars {
            if let Some(pos) = cleaned.find(name.as_str()) {
                let better = match best {
                    None => true,
                    Some((bpos, bname, _)) => {
                        pos < bpos || (pos == bpos && name.len() > bname.len())
                    }
                };
                if better {
                    best = Some((pos, name, *value));
                }
            }
        }

        match best {
            Some((pos, name, value)) => {
                let mut out = cleaned;
                out.replace_range(pos..pos + name.len(), &value.to_string());
                out
            }
            None => cleaned,
        }
    }
}

fn clamp_u16(v: i32) -> u16 {
    v.clamp(0, i32::from(u16::MAX)) as u16
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logsink::MemLog;

    fn custom(lines: &[&str]) -> (Process, Arc<MemLog>) {
        let log = Arc::new(MemLog::new());
        let p = Process::new_custom(
            Pid(1),
            "p1",
            lines.iter().copied(),
            "arrival",
            log.clone() as Arc<dyn LogSink>,
        );
        (p, log)
    }

    fn run_to_completion(p: &mut Process) {
        let mut guard = 0;
        while !p.is_finished() {
            p.step();
            guard += 1;
            assert!(guard < 100_000, "program did not terminate");
        }
    }

    #[test]
    fn counters_stay_conserved() {
        let (mut p, _) = custom(&["DECLARE x 1", "ADD y x 2", "PRINT y"]);
        assert_eq!(p.total(), 3);
        p.step();
        assert_eq!(p.executed() + p.remaining(), p.total());
        run_to_completion(&mut p);
        assert_eq!(p.executed(), 3);
        assert_eq!(p.remaining(), 0);
    }

    #[test]
    fn declare_add_and_print_substitution() {
        let (mut p, log) = custom(&["DECLARE x 10", "ADD y x x", "PRINT y"]);
        run_to_completion(&mut p);
        assert_eq!(p.var("x"), Some(10));
        assert_eq!(p.var("y"), Some(20));
        let lines = log.lines();
        assert!(lines.iter().any(|l| l.ends_with("20")), "lines: {lines:?}");
        assert!(lines.iter().any(|l| l == "Hello world from p1!"));
    }

    #[test]
    fn addition_saturates_at_u16_max() {
        let (mut p, _) = custom(&["DECLARE a 60000", "DECLARE b 60000", "ADD c a b"]);
        run_to_completion(&mut p);
        assert_eq!(p.var("c"), Some(65535));
    }

    #[test]
    fn subtraction_saturates_at_zero() {
        let (mut p, _) = custom(&["DECLARE a 3", "SUBTRACT c a 9"]);
        run_to_completion(&mut p);
        assert_eq!(p.var("c"), Some(0));
    }

    #[test]
    fn operands_auto_vivify_to_zero() {
        let (mut p, _) = custom(&["ADD total ghost 5"]);
        run_to_completion(&mut p);
        assert_eq!(p.var("total"), Some(5));
        assert_eq!(p.var("ghost"), Some(0));
    }

    #[test]
    fn sleep_burns_cycles_without_advancing_pc() {
        let (mut p, _) = custom(&["SLEEP 2", "DECLARE x 1"]);
        assert_eq!(p.step(), StepOutcome::Executed); // SLEEP consumed
        assert_eq!(p.executed(), 1);
        assert_eq!(p.step(), StepOutcome::Slept);
        assert_eq!(p.step(), StepOutcome::Slept);
        assert_eq!(p.executed(), 1); // pc untouched while sleeping
        assert_eq!(p.step(), StepOutcome::Executed);
        assert!(p.is_finished());
    }

    #[test]
    fn sleep_zero_still_sleeps_one_cycle() {
        let (mut p, _) = custom(&["SLEEP 0"]);
        p.step();
        assert_eq!(p.sleep_counter(), 1);
    }

    #[test]
    fn write_then_read_round_trips_and_logs() {
        let (mut p, log) = custom(&["DECLARE v 42", "WRITE 0x500 v", "READ back 0x500"]);
        run_to_completion(&mut p);
        assert_eq!(p.mem_value("0x500"), Some(42));
        assert_eq!(p.var("back"), Some(42));
        let lines = log.lines();
        assert!(lines.contains(&"WRITE 0x500 = 42".to_string()));
        assert!(lines.contains(&"READ back = 42".to_string()));
    }

    #[test]
    fn read_of_unseen_address_yields_zero() {
        let (mut p, _) = custom(&["READ v 0xDEAD"]);
        run_to_completion(&mut p);
        assert_eq!(p.var("v"), Some(0));
    }

    #[test]
    fn print_substitutes_only_first_match() {
        let (mut p, log) = custom(&["DECLARE x 7", "PRINT x and x"]);
        run_to_completion(&mut p);
        let lines = log.lines();
        assert!(lines.iter().any(|l| l == "7 and x"), "lines: {lines:?}");
    }

    #[test]
    fn for_expansion_grows_total_by_inserted_prints() {
        let log = Arc::new(MemLog::new());
        let rng = XorShift64::new(5);
        let program = Program::Auto(vec![
            "FOR".into(),
            "ADD X 1".into(),
            "ADD X 1".into(),
            "ADD X 1".into(),
            "ADD X 1".into(),
        ]);
        let mut p = Process::with_program(
            Pid(2),
            "p2",
            program,
            "arrival",
            log.clone() as Arc<dyn LogSink>,
            rng,
        );
        assert_eq!(p.total(), 5);
        p.step(); // FOR consumed, 3 PRINTs spliced in
        assert_eq!(p.executed(), 1);
        assert_eq!(p.total(), 8);
        run_to_completion(&mut p);
        assert_eq!(p.executed(), 8);
        // The three inserted PRINTs each produced a hello line.
        assert_eq!(log.lines().len(), 3);
    }

    #[test]
    fn for_insertion_is_capped_by_remaining() {
        let log = Arc::new(MemLog::new());
        let program = Program::Auto(vec!["FOR".into(), "ADD X 1".into()]);
        let mut p = Process::with_program(
            Pid(3),
            "p3",
            program,
            "arrival",
            log as Arc<dyn LogSink>,
            XorShift64::new(1),
        );
        p.step();
        // remaining-1 == 1 at FOR time, so a single PRINT was inserted.
        assert_eq!(p.total(), 3);
    }

    #[test]
    fn lone_for_inserts_nothing() {
        let log = Arc::new(MemLog::new());
        let program = Program::Auto(vec!["FOR".into()]);
        let mut p = Process::with_program(
            Pid(4),
            "p4",
            program,
            "arrival",
            log as Arc<dyn LogSink>,
            XorShift64::new(1),
        );
        p.step();
        assert_eq!(p.total(), 1);
        assert!(p.is_finished());
    }

    #[test]
    fn auto_patterned_program_accumulates() {
        let log = Arc::new(MemLog::new());
        let mut p = Process::new_auto(
            Pid(5),
            "p5",
            7,
            "arrival",
            log as Arc<dyn LogSink>,
            XorShift64::new(9),
        );
        run_to_completion(&mut p);
        // Three ADDs of 1..=10 each.
        assert!((3..=30).contains(&p.accumulator()));
    }

    #[test]
    fn auto_sleep_token_sleeps_one_to_three() {
        let log = Arc::new(MemLog::new());
        let program = Program::Auto(vec!["SLEEP".into(), "PRINT".into()]);
        let mut p = Process::with_program(
            Pid(6),
            "p6",
            program,
            "arrival",
            log as Arc<dyn LogSink>,
            XorShift64::new(11),
        );
        p.step();
        assert!((1..=3).contains(&p.sleep_counter()));
    }

    #[test]
    fn random_mix_program_terminates() {
        let log = Arc::new(MemLog::new());
        let mut p = Process::new_random_mix(
            Pid(8),
            "p8",
            40,
            "arrival",
            log as Arc<dyn LogSink>,
            XorShift64::new(77),
        );
        // FOR may grow the program; sleeps burn extra cycles. Both are
        // bounded, so completion is too.
        let mut cycles = 0;
        while !p.is_finished() {
            p.step();
            cycles += 1;
            assert!(cycles < 100_000, "random-mix program did not terminate");
        }
        assert_eq!(p.executed(), p.total());
        assert!(p.total() >= 40);
    }

    #[test]
    fn empty_program_is_immediately_idle() {
        let (mut p, log) = custom(&[]);
        assert!(p.is_finished());
        assert_eq!(p.step(), StepOutcome::Idle);
        assert!(log.lines().is_empty());
    }
}
