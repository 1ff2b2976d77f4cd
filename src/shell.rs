//! Command shell: parsing and dispatch.
//!
//! The shell is a thin layer over the library. Commands parse into a
//! [`Command`], dispatch against the (optional) initialized system, and
//! return rendered text; the binary owns the prompt loop, printing, and
//! screen clearing.
//!
//! `initialize` is the gate: every command that touches the scheduler or
//! memory manager fails with [`ShellError::NotInitialized`] until a config
//! has been loaded and validated. A failed validation leaves the system
//! unconstructed.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::{Config, ConfigError};
use crate::mem::{AllocError, MemoryConfig, MemoryManager};
use crate::report;
use crate::sched::Scheduler;

/// A parsed shell command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Initialize,
    /// `screen -s <name> <mem>` — auto-program process.
    ScreenStart { name: String, mem_kb: u64 },
    /// `screen -c <name> <mem> "i1; i2; …"` — custom-program process.
    ScreenCustom {
        name: String,
        mem_kb: u64,
        instructions: Vec<String>,
    },
    /// `screen -r <name>` — read-only snapshot.
    ScreenResume { name: String },
    ScreenLs,
    SchedulerStart,
    SchedulerStop,
    ReportUtil,
    Vmstat,
    ProcessSmi,
    Clear,
    Help,
    Exit,
}

/// What the caller should do after a command.
#[derive(Debug)]
pub enum Outcome {
    /// Print this and keep going.
    Text(String),
    /// Clear the screen and reprint the banner.
    Clear,
    /// Print this and leave the loop.
    Exit(String),
}

/// Shell-level failure.
#[derive(Debug)]
#[non_exhaustive]
pub enum ShellError {
    UnknownCommand { input: String },
    NotInitialized,
    MissingArgument { what: &'static str },
    /// `screen -s`/`-c` memory must be a power of two in 64..=65536 KB.
    InvalidMemorySize { value: String },
    /// Custom programs carry 1..=50 instructions.
    InvalidInstructionCount { count: usize },
    DuplicateProcess { name: String },
    ProcessNotFound { name: String },
    Config(ConfigError),
    Alloc(AllocError),
    Io(std::io::Error),
}

impl fmt::Display for ShellError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownCommand { input } => write!(f, "unknown command: '{input}'"),
            Self::NotInitialized => {
                write!(f, "system not initialized; run 'initialize' first")
            }
            Self::MissingArgument { what } => write!(f, "missing argument: {what}"),
            Self::InvalidMemorySize { value } => write!(
                f,
                "invalid memory size '{value}': must be a power of two between 64 and 65536 KB"
            ),
            Self::InvalidInstructionCount { count } => write!(
                f,
                "invalid instruction count {count}: must be between 1 and 50"
            ),
            Self::DuplicateProcess { name } => {
                write!(f, "a process named '{name}' already exists")
            }
            Self::ProcessNotFound { name } => write!(f, "process '{name}' not found"),
            Self::Config(e) => write!(f, "configuration error: {e}"),
            Self::Alloc(e) => write!(f, "{e}"),
            Self::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for ShellError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Config(e) => Some(e),
            Self::Alloc(e) => Some(e),
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigError> for ShellError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

impl From<AllocError> for ShellError {
    fn from(e: AllocError) -> Self {
        Self::Alloc(e)
    }
}

impl From<std::io::Error> for ShellError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

/// Parse one input line.
pub fn parse(input: &str) -> Result<Command, ShellError> {
    let trimmed = input.trim();
    let tokens: Vec<&str> = trimmed.split_whitespace().collect();

    match tokens.as_slice() {
        ["initialize"] => Ok(Command::Initialize),
        ["screen-ls"] => Ok(Command::ScreenLs),
        ["scheduler-start"] => Ok(Command::SchedulerStart),
        ["scheduler-stop"] => Ok(Command::SchedulerStop),
        ["report-util"] => Ok(Command::ReportUtil),
        ["vmstat"] => Ok(Command::Vmstat),
        ["process-smi"] => Ok(Command::ProcessSmi),
        ["clear"] => Ok(Command::Clear),
        ["help"] => Ok(Command::Help),
        ["exit"] => Ok(Command::Exit),
        ["screen", "-r", name] => Ok(Command::ScreenResume {
            name: (*name).to_string(),
        }),
        ["screen", "-r"] => Err(ShellError::MissingArgument {
            what: "process name",
        }),
        ["screen", "-s", name, mem] => Ok(Command::ScreenStart {
            name: (*name).to_string(),
            mem_kb: parse_screen_mem(mem)?,
        }),
        ["screen", "-s", ..] => Err(ShellError::MissingArgument {
            what: "process name and memory size",
        }),
        ["screen", "-c", name, mem, ..] => {
            let instructions = parse_quoted_instructions(trimmed)?;
            Ok(Command::ScreenCustom {
                name: (*name).to_string(),
                mem_kb: parse_screen_mem(mem)?,
                instructions,
            })
        }
        ["screen", "-c", ..] => Err(ShellError::MissingArgument {
            what: "process name, memory size, and instruction string",
        }),
        _ => Err(ShellError::UnknownCommand {
            input: trimmed.to_string(),
        }),
    }
}

fn parse_screen_mem(value: &str) -> Result<u64, ShellError> {
    let err = || ShellError::InvalidMemorySize {
        value: value.to_string(),
    };
    let mem: u64 = value.parse().map_err(|_| err())?;
    if !mem.is_power_of_two() || !(64..=65536).contains(&mem) {
        return Err(err());
    }
    Ok(mem)
}

/// Extract the semicolon-separated instruction list between the first and
/// last double quote, and enforce the 1..=50 bound.
fn parse_quoted_instructions(input: &str) -> Result<Vec<String>, ShellError> {
    let first = input.find('"');
    let last = input.rfind('"');
    let (Some(first), Some(last)) = (first, last) else {
        return Err(ShellError::MissingArgument {
            what: "quoted instruction string",
        });
    };
    if last <= first {
        return Err(ShellError::MissingArgument {
            what: "closing quote on instruction string",
        });
    }

    let instructions: Vec<String> = input[first + 1..last]
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();

    if instructions.is_empty() || instructions.len() > 50 {
        return Err(ShellError::InvalidInstructionCount {
            count: instructions.len(),
        });
    }
    Ok(instructions)
}

struct System {
    sched: Scheduler,
    mem: Arc<MemoryManager>,
}

/// The shell: file paths plus the optional initialized system.
pub struct Shell {
    config_path: PathBuf,
    report_path: PathBuf,
    log_dir: PathBuf,
    backing_store_path: PathBuf,
    system: Option<System>,
}

impl Shell {
    /// Standard paths: `config.txt`, `csopesy-log.txt`, `logs/`,
    /// `csopesy-backing-store.txt`.
    pub fn new() -> Self {
        Self::with_paths(
            "config.txt",
            "csopesy-log.txt",
            "logs",
            "csopesy-backing-store.txt",
        )
    }

    pub fn with_paths(
        config_path: impl Into<PathBuf>,
        report_path: impl Into<PathBuf>,
        log_dir: impl Into<PathBuf>,
        backing_store_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            config_path: config_path.into(),
            report_path: report_path.into(),
            log_dir: log_dir.into(),
            backing_store_path: backing_store_path.into(),
            system: None,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.system.is_some()
    }

    /// Parse and run one input line.
    pub fn execute(&mut self, input: &str) -> Result<Outcome, ShellError> {
        let command = parse(input)?;
        self.run(command)
    }

    /// Run an already-parsed command.
    pub fn run(&mut self, command: Command) -> Result<Outcome, ShellError> {
        match command {
            Command::Initialize => self.initialize(),
            Command::Clear => Ok(Outcome::Clear),
            Command::Help => Ok(Outcome::Text(help_text())),
            Command::Exit => {
                if let Some(mut system) = self.system.take() {
                    system.sched.stop();
                }
                Ok(Outcome::Exit("Shutting down OS simulator. Goodbye!".into()))
            }
            Command::ScreenStart { name, mem_kb } => {
                let system = self.system()?;
                if system.sched.find_process(&name).is_some() {
                    return Err(ShellError::DuplicateProcess { name });
                }
                system.sched.spawn_auto(&name, mem_kb, &system.mem)?;
                Ok(Outcome::Text(format!("Process '{name}' created.")))
            }
            Command::ScreenCustom {
                name,
                mem_kb,
                instructions,
            } => {
                let system = self.system()?;
                if system.sched.find_process(&name).is_some() {
                    return Err(ShellError::DuplicateProcess { name });
                }
                system
                    .sched
                    .spawn_custom(&name, mem_kb, &instructions, &system.mem)?;
                Ok(Outcome::Text(format!("Process '{name}' created.")))
            }
            Command::ScreenResume { name } => {
                let system = self.system()?;
                report::process_detail(&system.sched, &system.mem, &name)
                    .map(Outcome::Text)
                    .ok_or(ShellError::ProcessNotFound { name })
            }
            Command::ScreenLs => {
                let system = self.system()?;
                system.sched.reap_finished(&system.mem);
                Ok(Outcome::Text(report::screen_ls(&system.sched)))
            }
            Command::SchedulerStart => {
                let system = self.system_mut()?;
                let mem = Arc::clone(&system.mem);
                system.sched.start_generation(mem);
                Ok(Outcome::Text("Started automatic process generation.".into()))
            }
            Command::SchedulerStop => {
                let system = self.system_mut()?;
                system.sched.stop_generation();
                Ok(Outcome::Text("Stopped automatic process generation.".into()))
            }
            Command::ReportUtil => {
                let system = self.system()?;
                system.sched.reap_finished(&system.mem);
                report::write_report(&system.sched, &system.mem, &self.report_path)?;
                Ok(Outcome::Text(format!(
                    "Report written to {}",
                    self.report_path.display()
                )))
            }
            Command::Vmstat => {
                let system = self.system()?;
                system.sched.reap_finished(&system.mem);
                Ok(Outcome::Text(report::vmstat(&system.mem)))
            }
            Command::ProcessSmi => {
                let system = self.system()?;
                system.sched.reap_finished(&system.mem);
                Ok(Outcome::Text(report::process_smi(
                    &system.sched,
                    &system.mem,
                )))
            }
        }
    }

    fn initialize(&mut self) -> Result<Outcome, ShellError> {
        let cfg = Config::load(&self.config_path)?;
        cfg.validate()?;

        let mut mem_cfg = MemoryConfig::from_config(&cfg);
        mem_cfg.backing_store_path = self.backing_store_path.clone();
        let mem = Arc::new(MemoryManager::new(mem_cfg));

        // A re-initialize drops the previous system; its threads join on drop.
        let mut sched =
            Scheduler::with_seed_and_log_dir(cfg, rand_seed(), self.log_dir.clone());
        sched.start();
        self.system = Some(System { sched, mem });

        Ok(Outcome::Text(
            "System initialized: configuration loaded, scheduler and memory manager ready."
                .into(),
        ))
    }

    fn system(&self) -> Result<&System, ShellError> {
        self.system.as_ref().ok_or(ShellError::NotInitialized)
    }

    fn system_mut(&mut self) -> Result<&mut System, ShellError> {
        self.system.as_mut().ok_or(ShellError::NotInitialized)
    }
}

impl Default for Shell {
    fn default() -> Self {
        Self::new()
    }
}

fn rand_seed() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(1)
}

fn help_text() -> String {
    "\n=== Available Commands ===\n\
     \x20 initialize                      load config, start the scheduler\n\
     \x20 screen -s <name> <mem>          create an auto process\n\
     \x20 screen -c <name> <mem> \"i;...\"  create a custom process\n\
     \x20 screen -r <name>                show one process\n\
     \x20 screen-ls                       list processes\n\
     \x20 scheduler-start                 start process generation\n\
     \x20 scheduler-stop                  stop process generation\n\
     \x20 report-util                     write the utilization report\n\
     \x20 vmstat                          memory statistics\n\
     \x20 process-smi                     cpu + memory overview\n\
     \x20 clear                           clear the screen\n\
     \x20 help                            this text\n\
     \x20 exit                            quit\n\
     ==========================\n"
        .to_string()
}
