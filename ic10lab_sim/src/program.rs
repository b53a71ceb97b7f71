//! Program parsing.
//!
//! A program is parsed once, line by line. The program counter is a source
//! line index, so blank lines, comments and labels keep their positions and
//! `j 0` always means "the first line".
//!
//! ```text
//! start:              # Line::Label
//! l r0 d1 Setting     # Line::Op(Load)
//! add r0 r0 1         # Line::Op(Arith)
//! s db Setting r0     # Line::Op(Store)
//! yield               # Line::Op(Yield)
//! j start             # Line::Op(Jump)
//! ```
//!
//! Lines that fail to parse become [`Line::Invalid`] and are reported by the
//! sandbox pre-check; executing one is a runtime fault.

use std::collections::HashMap;

/// A register reference, resolved against the chip's `SP`/`RA` aliases at run time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reg {
    R(usize),
    Sp,
    Ra,
}

/// An instruction operand.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Reg(Reg),
    Number(f64),
    /// Line index of a resolved label
    Line(usize),
}

/// Where an `s`/`l` instruction reads or writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// `db`: the device housing the chip
    Housing,
    /// `d<N>`: device by id
    Device(u32),
    /// Any other identifier: network by id
    Network(String),
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Target::Housing => write!(f, "db"),
            Target::Device(id) => write!(f, "d{}", id),
            Target::Network(id) => write!(f, "{}", id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compare {
    Eq,
    Ne,
    Lt,
    Gt,
}

impl Compare {
    pub fn holds(self, a: f64, b: f64) -> bool {
        match self {
            Compare::Eq => a == b,
            Compare::Ne => a != b,
            Compare::Lt => a < b,
            Compare::Gt => a > b,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    Move { dst: Reg, src: Operand },
    Arith { op: ArithOp, dst: Reg, a: Operand, b: Operand },
    Jump { target: Operand },
    JumpAndLink { target: Operand },
    Branch { cmp: Compare, a: Operand, b: Operand, target: Operand },
    Yield,
    Store { target: Target, prop: String, value: Operand },
    Load { dst: Reg, target: Target, prop: String },
    Push(Operand),
    Pop(Reg),
    Rand(Reg),
    Hcf,
}

impl Instruction {
    /// The `s`/`l` target, if this instruction touches a device or network.
    pub fn target(&self) -> Option<&Target> {
        match self {
            Instruction::Store { target, .. } | Instruction::Load { target, .. } => Some(target),
            _ => None,
        }
    }
}

/// One source line.
#[derive(Debug, Clone, PartialEq)]
pub enum Line {
    Empty,
    Label(String),
    Op(Instruction),
    Invalid(String),
}

impl Line {
    pub fn is_executable(&self) -> bool {
        matches!(self, Line::Op(_) | Line::Invalid(_))
    }
}

/// A parsed program.
#[derive(Debug, Clone, Default)]
pub struct Program {
    lines: Vec<Line>,
    labels: HashMap<String, usize>,
}

impl Program {
    /// Parses `code` for a chip with `register_length` general registers.
    pub fn parse(code: &str, register_length: usize) -> Self {
        let sources: Vec<&str> = code.lines().map(strip_comment).collect();

        let mut labels = HashMap::new();
        for (index, source) in sources.iter().enumerate() {
            if let Some(name) = label_name(source) {
                labels.entry(name.to_string()).or_insert(index);
            }
        }

        let parser = LineParser {
            labels: &labels,
            register_length,
        };
        let lines = sources.iter().map(|source| parser.parse(source)).collect();

        Self { lines, labels }
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn line(&self, index: usize) -> Option<&Line> {
        self.lines.get(index)
    }

    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    pub fn label(&self, name: &str) -> Option<usize> {
        self.labels.get(name).copied()
    }

    /// First executable line at or after `from`, if any.
    pub fn next_executable(&self, from: usize) -> Option<usize> {
        (from..self.lines.len()).find(|&index| self.lines[index].is_executable())
    }
}

fn strip_comment(line: &str) -> &str {
    match line.find('#') {
        Some(index) => line[..index].trim(),
        None => line.trim(),
    }
}

fn label_name(source: &str) -> Option<&str> {
    let name = source.strip_suffix(':')?;
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    valid.then_some(name)
}

struct LineParser<'a> {
    labels: &'a HashMap<String, usize>,
    register_length: usize,
}

impl LineParser<'_> {
    fn parse(&self, source: &str) -> Line {
        if source.is_empty() {
            return Line::Empty;
        }
        if let Some(name) = label_name(source) {
            return Line::Label(name.to_string());
        }
        match self.instruction(source) {
            Ok(instruction) => Line::Op(instruction),
            Err(message) => Line::Invalid(message),
        }
    }

    fn instruction(&self, source: &str) -> Result<Instruction, String> {
        let mut tokens = source.split_whitespace();
        let opcode = tokens.next().unwrap_or_default();
        let args: Vec<&str> = tokens.collect();

        let instruction = match opcode {
            "move" => {
                arity(opcode, &args, 2)?;
                Instruction::Move {
                    dst: self.reg(args[0])?,
                    src: self.value(args[1])?,
                }
            }
            "add" | "sub" | "mul" | "div" => {
                arity(opcode, &args, 3)?;
                let op = match opcode {
                    "add" => ArithOp::Add,
                    "sub" => ArithOp::Sub,
                    "mul" => ArithOp::Mul,
                    _ => ArithOp::Div,
                };
                Instruction::Arith {
                    op,
                    dst: self.reg(args[0])?,
                    a: self.value(args[1])?,
                    b: self.value(args[2])?,
                }
            }
            "j" => {
                arity(opcode, &args, 1)?;
                Instruction::Jump {
                    target: self.jump_target(args[0])?,
                }
            }
            "jal" => {
                arity(opcode, &args, 1)?;
                Instruction::JumpAndLink {
                    target: self.jump_target(args[0])?,
                }
            }
            "beq" | "bne" | "blt" | "bgt" => {
                arity(opcode, &args, 3)?;
                let cmp = match opcode {
                    "beq" => Compare::Eq,
                    "bne" => Compare::Ne,
                    "blt" => Compare::Lt,
                    _ => Compare::Gt,
                };
                Instruction::Branch {
                    cmp,
                    a: self.value(args[0])?,
                    b: self.value(args[1])?,
                    target: self.jump_target(args[2])?,
                }
            }
            "yield" => {
                arity(opcode, &args, 0)?;
                Instruction::Yield
            }
            "s" => {
                arity(opcode, &args, 3)?;
                Instruction::Store {
                    target: target(args[0])?,
                    prop: property(args[1])?,
                    value: self.value(args[2])?,
                }
            }
            "l" => {
                arity(opcode, &args, 3)?;
                Instruction::Load {
                    dst: self.reg(args[0])?,
                    target: target(args[1])?,
                    prop: property(args[2])?,
                }
            }
            "push" => {
                arity(opcode, &args, 1)?;
                Instruction::Push(self.value(args[0])?)
            }
            "pop" => {
                arity(opcode, &args, 1)?;
                Instruction::Pop(self.reg(args[0])?)
            }
            "rand" => {
                arity(opcode, &args, 1)?;
                Instruction::Rand(self.reg(args[0])?)
            }
            "hcf" => {
                arity(opcode, &args, 0)?;
                Instruction::Hcf
            }
            other => return Err(format!("unknown instruction '{}'", other)),
        };
        Ok(instruction)
    }

    fn reg(&self, token: &str) -> Result<Reg, String> {
        match token {
            "sp" => return Ok(Reg::Sp),
            "ra" => return Ok(Reg::Ra),
            _ => {}
        }
        let index = token
            .strip_prefix('r')
            .and_then(|digits| digits.parse::<usize>().ok())
            .ok_or_else(|| format!("expected a register, found '{}'", token))?;
        if index >= self.register_length {
            return Err(format!(
                "register r{} out of range (chip has {})",
                index, self.register_length
            ));
        }
        Ok(Reg::R(index))
    }

    fn value(&self, token: &str) -> Result<Operand, String> {
        if let Ok(number) = token.parse::<f64>() {
            if !number.is_finite() {
                return Err(format!("number '{}' is not finite", token));
            }
            return Ok(Operand::Number(number));
        }
        self.reg(token)
            .map(Operand::Reg)
            .map_err(|_| format!("expected a register or number, found '{}'", token))
    }

    fn jump_target(&self, token: &str) -> Result<Operand, String> {
        if let Some(&line) = self.labels.get(token) {
            return Ok(Operand::Line(line));
        }
        if token.starts_with(|c: char| c.is_ascii_alphabetic()) && self.reg(token).is_err() {
            return Err(format!("unknown label '{}'", token));
        }
        self.value(token)
    }
}

fn arity(opcode: &str, args: &[&str], expected: usize) -> Result<(), String> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(format!(
            "'{}' expects {} operand(s), found {}",
            opcode,
            expected,
            args.len()
        ))
    }
}

fn target(token: &str) -> Result<Target, String> {
    if token == "db" {
        return Ok(Target::Housing);
    }
    if let Some(id) = token.strip_prefix('d').and_then(|digits| digits.parse::<u32>().ok()) {
        return Ok(Target::Device(id));
    }
    if token.starts_with(|c: char| c.is_ascii_alphabetic()) {
        return Ok(Target::Network(token.to_string()));
    }
    Err(format!("expected db, d<N> or a network id, found '{}'", token))
}

fn property(token: &str) -> Result<String, String> {
    if token.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(token.to_string())
    } else {
        Err(format!("invalid property name '{}'", token))
    }
}
