//! Programs and the instruction set.
//!
//! A program is an ordered list of instruction *strings*; the interpreter
//! parses one line per executed cycle. Keeping the textual form as the
//! source of truth matters for two reasons: the execution log records the
//! exact line that ran, and FOR-expansion splices new PRINT lines into the
//! stream mid-run.
//!
//! Two flavors share the instruction grammar but differ in register model
//! and randomness:
//!
//! - **Auto** programs operate on a single accumulator (`X`). They are
//!   machine-generated, either as the fixed VAR/PRINT/ADD pattern or as a
//!   random mix of bare opcode tokens whose operands are rolled at
//!   execution time. FOR is legal only here.
//! - **Custom** programs come from the user, operate on named 16-bit
//!   variables, and are validated at load: lines whose opcode is not in the
//!   whitelist are dropped with a warning and never enter the stream.

use serde::{Deserialize, Serialize};

use crate::rng::XorShift64;

/// An instruction operand: a literal or a variable reference.
///
/// Variable operands auto-vivify to zero on first read.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Operand {
    Imm(u16),
    Var(String),
}

fn parse_operand(tok: &str) -> Operand {
    match tok.parse::<u16>() {
        Ok(v) => Operand::Imm(v),
        Err(_) => Operand::Var(tok.to_string()),
    }
}

/// One parsed instruction.
///
/// The `*Rand` variants are the bare-token forms emitted by the random-mix
/// generator; their operands are rolled from the process RNG when executed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Instr {
    /// `VAR X = 0` — auto-mode accumulator reset.
    VarInit,
    /// `DECLARE name value`.
    Declare { name: String, value: u16 },
    /// Bare `DECLARE`: accumulator gets a random 0..=10.
    DeclareRand,
    /// `ADD dest a b` (or the two-operand auto form `ADD dest b`, which
    /// reads as `dest = dest + b`).
    Add {
        dest: String,
        lhs: Operand,
        rhs: Operand,
    },
    /// Bare `ADD`: accumulator += random 1..=10.
    AddRand,
    /// `SUBTRACT dest a b` (two-operand form mirrors ADD).
    Sub {
        dest: String,
        lhs: Operand,
        rhs: Operand,
    },
    /// Bare `SUBTRACT`: accumulator -= random 1..=10, saturating.
    SubRand,
    /// `SLEEP d` — busy the core for `max(1, d)` cycles.
    Sleep { ticks: u32 },
    /// Bare `SLEEP`: random 1..=3 cycles.
    SleepRand,
    /// `WRITE addr var` — store the variable into simulated memory.
    Write { addr: String, var: String },
    /// `READ var addr` — load from simulated memory (missing keys read 0).
    Read { var: String, addr: String },
    /// `PRINT text`.
    Print { text: String },
    /// Bare `PRINT`: the standard hello line only.
    PrintHello,
    /// `FOR` — splice PRINTs after the program counter (auto mode only).
    For,
}

/// Parse one instruction line. `None` means the opcode is unknown or the
/// line is malformed.
pub fn parse_instr(line: &str) -> Option<Instr> {
    let line = line.trim();
    let mut tokens = line.split_whitespace();
    let opcode = tokens.next()?;
    let rest: Vec<&str> = tokens.collect();

    match opcode {
        "VAR" => Some(Instr::VarInit),
        "DECLARE" => match rest.as_slice() {
            [] => Some(Instr::DeclareRand),
            [name, value] => Some(Instr::Declare {
                name: (*name).to_string(),
                value: value.parse().ok()?,
            }),
            _ => None,
        },
        "ADD" => parse_arith(&rest, true),
        "SUBTRACT" => parse_arith(&rest, false),
        "SLEEP" => match rest.as_slice() {
            [] => Some(Instr::SleepRand),
            [d] => Some(Instr::Sleep {
                ticks: d.parse().ok()?,
            }),
            _ => None,
        },
        "WRITE" => match rest.as_slice() {
            [addr, var] => Some(Instr::Write {
                addr: (*addr).to_string(),
                var: (*var).to_string(),
            }),
            _ => None,
        },
        "READ" => match rest.as_slice() {
            [var, addr] => Some(Instr::Read {
                var: (*var).to_string(),
                addr: (*addr).to_string(),
            }),
            _ => None,
        },
        "PRINT" => match line.split_once(char::is_whitespace) {
            None => Some(Instr::PrintHello),
            Some((_, text)) => Some(Instr::Print {
                text: text.trim().to_string(),
            }),
        },
        "FOR" => Some(Instr::For),
        _ => None,
    }
}

fn parse_arith(rest: &[&str], add: bool) -> Option<Instr> {
    let (dest, lhs, rhs) = match rest {
        [] => return Some(if add { Instr::AddRand } else { Instr::SubRand }),
        // Two-operand auto form: dest op  ==  dest = dest op.
        [dest, op] => (
            (*dest).to_string(),
            Operand::Var((*dest).to_string()),
            parse_operand(op),
        ),
        [dest, a, b] => ((*dest).to_string(), parse_operand(a), parse_operand(b)),
        _ => return None,
    };
    Some(if add {
        Instr::Add { dest, lhs, rhs }
    } else {
        Instr::Sub { dest, lhs, rhs }
    })
}

/// Opcodes permitted in user-supplied programs. FOR and VAR are auto-only.
fn custom_whitelisted(instr: &Instr) -> bool {
    matches!(
        instr,
        Instr::Declare { .. }
            | Instr::Add { .. }
            | Instr::Sub { .. }
            | Instr::Sleep { .. }
            | Instr::Write { .. }
            | Instr::Read { .. }
            | Instr::Print { .. }
            | Instr::PrintHello
    )
}

/// A process's instruction stream, tagged by flavor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Program {
    Auto(Vec<String>),
    Custom(Vec<String>),
}

impl Program {
    /// The fixed auto pattern: index 0 resets the accumulator, odd indices
    /// print, even indices add a random 1..=10.
    pub fn patterned(name: &str, total: u32, rng: &mut XorShift64) -> Self {
        let mut code = Vec::with_capacity(total as usize);
        for i in 0..total {
            let line = if i == 0 {
                "VAR X = 0".to_string()
            } else if i % 2 == 1 {
                format!("PRINT \"Hello world from {name}!\"")
            } else {
                format!("ADD X {}", rng.range_u32(1, 10))
            };
            code.push(line);
        }
        Self::Auto(code)
    }

    /// Random mix of bare opcode tokens; operands are rolled at execution.
    pub fn random_mix(total: u32, rng: &mut XorShift64) -> Self {
        const TOKENS: [&str; 6] = ["PRINT", "ADD", "SUBTRACT", "DECLARE", "SLEEP", "FOR"];
        let code = (0..total)
            .map(|_| TOKENS[rng.next_u32(TOKENS.len() as u32) as usize].to_string())
            .collect();
        Self::Auto(code)
    }

    /// Build a custom program, dropping non-whitelisted lines.
    ///
    /// Dropped lines produce a stderr warning and do not count toward the
    /// program's length.
    pub fn custom<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut code = Vec::new();
        for line in lines {
            let line = line.as_ref().trim();
            if line.is_empty() {
                continue;
            }
            match parse_instr(line) {
                Some(ref instr) if custom_whitelisted(instr) => code.push(line.to_string()),
                _ => eprintln!("WARNING: dropping unknown instruction '{line}'"),
            }
        }
        Self::Custom(code)
    }

    pub fn is_auto(&self) -> bool {
        matches!(self, Self::Auto(_))
    }

    pub fn len(&self) -> usize {
        self.code().len()
    }

    pub fn is_empty(&self) -> bool {
        self.code().is_empty()
    }

    pub fn code(&self) -> &[String] {
        match self {
            Self::Auto(code) | Self::Custom(code) => code,
        }
    }

    pub fn get(&self, idx: usize) -> Option<&str> {
        self.code().get(idx).map(String::as_str)
    }

    /// Splice `count` bare PRINT tokens immediately after `at`
    /// (FOR-expansion). Bare PRINT is the random-mix form: it emits the
    /// standard hello line when executed.
    pub fn insert_prints(&mut self, at: usize, count: usize) {
        let code = match self {
            Self::Auto(code) | Self::Custom(code) => code,
        };
        for i in 0..count {
            code.insert(at + 1 + i, "PRINT".to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_declare_and_arith() {
        assert_eq!(
            parse_instr("DECLARE x 10"),
            Some(Instr::Declare {
                name: "x".into(),
                value: 10
            })
        );
        assert_eq!(
            parse_instr("ADD y x x"),
            Some(Instr::Add {
                dest: "y".into(),
                lhs: Operand::Var("x".into()),
                rhs: Operand::Var("x".into()),
            })
        );
        assert_eq!(
            parse_instr("SUBTRACT z z 3"),
            Some(Instr::Sub {
                dest: "z".into(),
                lhs: Operand::Var("z".into()),
                rhs: Operand::Imm(3),
            })
        );
    }

    #[test]
    fn two_operand_add_reads_as_accumulate() {
        assert_eq!(
            parse_instr("ADD X 5"),
            Some(Instr::Add {
                dest: "X".into(),
                lhs: Operand::Var("X".into()),
                rhs: Operand::Imm(5),
            })
        );
    }

    #[test]
    fn bare_tokens_parse_to_rand_variants() {
        assert_eq!(parse_instr("PRINT"), Some(Instr::PrintHello));
        assert_eq!(parse_instr("ADD"), Some(Instr::AddRand));
        assert_eq!(parse_instr("SUBTRACT"), Some(Instr::SubRand));
        assert_eq!(parse_instr("DECLARE"), Some(Instr::DeclareRand));
        assert_eq!(parse_instr("SLEEP"), Some(Instr::SleepRand));
        assert_eq!(parse_instr("FOR"), Some(Instr::For));
    }

    #[test]
    fn print_keeps_the_rest_of_the_line() {
        assert_eq!(
            parse_instr("PRINT \"value is \" + x"),
            Some(Instr::Print {
                text: "\"value is \" + x".into()
            })
        );
    }

    #[test]
    fn unknown_and_malformed_lines_parse_to_none() {
        assert_eq!(parse_instr("JUMP 4"), None);
        assert_eq!(parse_instr("DECLARE x notanumber"), None);
        assert_eq!(parse_instr("DECLARE x 70000"), None); // overflows u16
        assert_eq!(parse_instr("WRITE only_one"), None);
    }

    #[test]
    fn patterned_program_alternates() {
        let mut rng = XorShift64::new(1);
        let p = Program::patterned("p1", 5, &mut rng);
        let code = p.code();
        assert_eq!(code[0], "VAR X = 0");
        assert!(code[1].starts_with("PRINT"));
        assert!(code[2].starts_with("ADD X "));
        assert!(code[3].starts_with("PRINT"));
        assert!(code[4].starts_with("ADD X "));
        // Every even-index operand stays in 1..=10.
        for line in [&code[2], &code[4]] {
            let n: u32 = line.rsplit(' ').next().unwrap().parse().unwrap();
            assert!((1..=10).contains(&n));
        }
    }

    #[test]
    fn random_mix_emits_only_known_tokens() {
        let mut rng = XorShift64::new(2);
        let p = Program::random_mix(200, &mut rng);
        for line in p.code() {
            assert!(parse_instr(line).is_some(), "unparsable token {line:?}");
        }
    }

    #[test]
    fn custom_drops_unknown_and_auto_only_opcodes() {
        let p = Program::custom(["DECLARE x 1", "JUMP 3", "FOR", "VAR X = 0", "PRINT x"]);
        assert_eq!(p.code(), ["DECLARE x 1", "PRINT x"]);
        assert!(!p.is_auto());
    }

    #[test]
    fn insert_prints_splices_after_index() {
        let mut p = Program::Auto(vec!["FOR".into(), "ADD X 1".into()]);
        p.insert_prints(0, 2);
        assert_eq!(p.len(), 4);
        assert_eq!(p.get(0), Some("FOR"));
        assert_eq!(p.get(1), Some("PRINT"));
        assert_eq!(p.get(2), Some("PRINT"));
        assert_eq!(p.get(3), Some("ADD X 1"));
    }
}
