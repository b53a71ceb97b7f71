//! SimRunner - executes one chip's program.
//!
//! Each runner has two contexts:
//! - **sandbox**: a static pre-check run once at construction; it never
//!   touches the world and only produces sandbox diagnostics
//! - **live**: executes one instruction per tick against the shared world

use ic10lab_env::{
    Chip, DiagnosticRecord, EngineError, ExecutionUnit, Register, Severity, UnitId,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::program::{ArithOp, Instruction, Line, Operand, Program, Reg};
use crate::world::SimWorld;

/// Outcome of one executed instruction.
enum Flow {
    Next,
    Jump(usize),
}

/// Why an instruction could not complete.
enum Fault {
    /// Halts this runner only
    Runtime(String),
    /// `hcf`: aborts the step
    Fire,
}

impl From<String> for Fault {
    fn from(message: String) -> Self {
        Fault::Runtime(message)
    }
}

/// Execution unit backed by a parsed program.
pub struct SimRunner {
    id: UnitId,
    chip: Chip,
    program: Program,
    registers: Vec<f64>,
    stack: Vec<f64>,
    sp_index: usize,
    ra_index: usize,
    pc: usize,
    halted: bool,
    rng: ChaCha8Rng,
    rejected: bool,
    sandbox: Vec<DiagnosticRecord>,
    live: Vec<DiagnosticRecord>,
}

impl SimRunner {
    /// Builds a runner and runs the sandbox pre-check against `world`.
    pub fn new(chip: &Chip, world: &SimWorld, seed: u64) -> Result<Self, EngineError> {
        let id = chip.id;
        let length = chip.register_length;
        if length < 2 {
            return Err(EngineError::rejected(format!(
                "chip {}: register_length must be at least 2",
                id
            )));
        }

        let sp_index = chip.sp.unwrap_or(length - 2);
        let ra_index = chip.ra.unwrap_or(length - 1);
        for (alias, index) in [("SP", sp_index), ("RA", ra_index)] {
            if index >= length {
                return Err(EngineError::rejected(format!(
                    "chip {}: {} register index {} out of range",
                    id, alias, index
                )));
            }
        }

        let mut registers = vec![0.0; length];
        for register in &chip.registers {
            let index = match register.name.as_str() {
                "sp" => sp_index,
                "ra" => ra_index,
                name => name
                    .strip_prefix('r')
                    .and_then(|digits| digits.parse::<usize>().ok())
                    .filter(|&index| index < length)
                    .ok_or_else(|| {
                        EngineError::rejected(format!("chip {}: unknown register '{}'", id, name))
                    })?,
            };
            registers[index] = register.value;
        }

        if chip.stack.len() > chip.stack_length {
            return Err(EngineError::rejected(format!(
                "chip {}: stack holds {} values but stack_length is {}",
                id,
                chip.stack.len(),
                chip.stack_length
            )));
        }
        let mut stack = vec![0.0; chip.stack_length];
        stack[..chip.stack.len()].copy_from_slice(&chip.stack);

        let program = Program::parse(&chip.code, length);
        let halted = program.next_executable(0).is_none();
        let rng = ChaCha8Rng::seed_from_u64(seed.wrapping_mul(0x517cc1b727220a95) ^ u64::from(id.0));

        let mut runner = Self {
            id,
            chip: chip.clone(),
            program,
            registers,
            stack,
            sp_index,
            ra_index,
            pc: 0,
            halted,
            rng,
            rejected: false,
            sandbox: Vec::new(),
            live: Vec::new(),
        };
        runner.precheck(world);
        Ok(runner)
    }

    /// True if the sandbox found a line the live context cannot execute.
    pub fn has_sandbox_errors(&self) -> bool {
        self.rejected
    }

    fn precheck(&mut self, world: &SimWorld) {
        let mut findings = Vec::new();
        for (index, line) in self.program.lines().iter().enumerate() {
            match line {
                Line::Invalid(message) => {
                    findings.push((Severity::Error, format!("line {}: {}", index, message)));
                }
                Line::Op(instruction) => {
                    if let Some(target) = instruction.target() {
                        if let Err(message) = world.resolves(self.id, target) {
                            findings.push((Severity::Warning, format!("line {}: {}", index, message)));
                        }
                    }
                }
                _ => {}
            }
        }

        self.rejected = findings.iter().any(|(severity, _)| *severity == Severity::Error);
        self.sandbox.extend(
            findings
                .into_iter()
                .map(|(severity, message)| DiagnosticRecord::sandbox(self.id, severity, message)),
        );
    }

    /// Executes one instruction in the live context.
    ///
    /// Runtime faults halt this runner and are reported as live diagnostics;
    /// only `hcf` is returned as an error.
    pub fn execute(&mut self, world: &mut SimWorld) -> Result<(), EngineError> {
        if self.halted {
            return Ok(());
        }
        let Some(pc) = self.program.next_executable(self.pc) else {
            self.halted = true;
            return Ok(());
        };
        self.pc = pc;

        let outcome = match self.program.line(pc).cloned() {
            Some(Line::Op(instruction)) => self.apply(pc, &instruction, world),
            Some(Line::Invalid(message)) => Err(Fault::Runtime(format!("malformed line: {}", message))),
            _ => Ok(Flow::Next),
        };

        match outcome {
            Ok(Flow::Next) => self.pc = pc + 1,
            Ok(Flow::Jump(target)) => self.pc = target,
            Err(Fault::Runtime(message)) => {
                self.halted = true;
                self.live.push(DiagnosticRecord::live(
                    self.id,
                    Severity::Error,
                    format!("line {}: {}", pc, message),
                ));
                return Ok(());
            }
            Err(Fault::Fire) => {
                self.halted = true;
                return Err(EngineError::fault(
                    self.id,
                    format!("line {}: hcf, chip caught fire", pc),
                ));
            }
        }

        if self.program.next_executable(self.pc).is_none() {
            self.halted = true;
        }
        Ok(())
    }

    fn apply(&mut self, pc: usize, instruction: &Instruction, world: &mut SimWorld) -> Result<Flow, Fault> {
        match instruction {
            Instruction::Move { dst, src } => {
                let value = self.read(src);
                self.write(*dst, value);
            }
            Instruction::Arith { op, dst, a, b } => {
                let (a, b) = (self.read(a), self.read(b));
                let value = match op {
                    ArithOp::Add => a + b,
                    ArithOp::Sub => a - b,
                    ArithOp::Mul => a * b,
                    ArithOp::Div if b == 0.0 => return Err(Fault::Runtime("division by zero".into())),
                    ArithOp::Div => a / b,
                };
                if !value.is_finite() {
                    return Err(Fault::Runtime("arithmetic overflow".into()));
                }
                self.write(*dst, value);
            }
            Instruction::Jump { target } => return Ok(Flow::Jump(self.jump_target(target)?)),
            Instruction::JumpAndLink { target } => {
                let destination = self.jump_target(target)?;
                self.write(Reg::Ra, (pc + 1) as f64);
                return Ok(Flow::Jump(destination));
            }
            Instruction::Branch { cmp, a, b, target } => {
                if cmp.holds(self.read(a), self.read(b)) {
                    return Ok(Flow::Jump(self.jump_target(target)?));
                }
            }
            Instruction::Yield => {}
            Instruction::Store { target, prop, value } => {
                let value = self.read(value);
                world.write(self.id, target, prop, value)?;
            }
            Instruction::Load { dst, target, prop } => {
                let value = world.read(self.id, target, prop)?;
                self.write(*dst, value);
            }
            Instruction::Push(value) => {
                let value = self.read(value);
                let sp = self.stack_pointer()?;
                if sp >= self.stack.len() {
                    return Err(Fault::Runtime("stack overflow".into()));
                }
                self.stack[sp] = value;
                self.write(Reg::Sp, (sp + 1) as f64);
            }
            Instruction::Pop(dst) => {
                let sp = self.stack_pointer()?;
                if sp == 0 {
                    return Err(Fault::Runtime("stack underflow".into()));
                }
                let value = self.stack[sp - 1];
                self.write(Reg::Sp, (sp - 1) as f64);
                self.write(*dst, value);
            }
            Instruction::Rand(dst) => {
                let value: f64 = self.rng.gen();
                self.write(*dst, value);
            }
            Instruction::Hcf => return Err(Fault::Fire),
        }
        Ok(Flow::Next)
    }

    fn index(&self, reg: Reg) -> usize {
        match reg {
            Reg::R(index) => index,
            Reg::Sp => self.sp_index,
            Reg::Ra => self.ra_index,
        }
    }

    fn read(&self, operand: &Operand) -> f64 {
        match operand {
            Operand::Reg(reg) => self.registers[self.index(*reg)],
            Operand::Number(value) => *value,
            Operand::Line(line) => *line as f64,
        }
    }

    fn write(&mut self, reg: Reg, value: f64) {
        let index = self.index(reg);
        self.registers[index] = value;
    }

    fn stack_pointer(&self) -> Result<usize, Fault> {
        let value = self.registers[self.sp_index];
        if !(value.is_finite() && value >= 0.0 && value.fract() == 0.0) {
            return Err(Fault::Runtime(format!("invalid stack pointer {}", value)));
        }
        let sp = value as usize;
        if sp > self.stack.len() {
            return Err(Fault::Runtime(format!("stack pointer {} out of range", sp)));
        }
        Ok(sp)
    }

    fn jump_target(&self, operand: &Operand) -> Result<usize, Fault> {
        let value = self.read(operand);
        if value.is_finite() && value >= 0.0 && value <= self.program.len() as f64 {
            Ok(value as usize)
        } else {
            Err(Fault::Runtime(format!("jump target {} out of range", value)))
        }
    }

    /// Chip description reflecting the live registers and stack.
    pub fn to_chip(&self) -> Chip {
        let mut chip = self.chip.clone();
        chip.registers = self
            .registers
            .iter()
            .enumerate()
            .filter(|(_, value)| **value != 0.0)
            .map(|(index, value)| Register {
                name: format!("r{}", index),
                value: *value,
            })
            .collect();

        let used = self
            .stack
            .iter()
            .rposition(|value| *value != 0.0)
            .map_or(0, |last| last + 1);
        chip.stack = self.stack[..used].to_vec();
        chip
    }

    /// Live value of a general register.
    pub fn register(&self, index: usize) -> Option<f64> {
        self.registers.get(index).copied()
    }
}

impl ExecutionUnit for SimRunner {
    fn id(&self) -> UnitId {
        self.id
    }

    fn program(&self) -> &str {
        &self.chip.code
    }

    fn program_counter(&self) -> usize {
        self.pc
    }

    fn is_halted(&self) -> bool {
        self.halted
    }

    fn drain_sandbox_diagnostics(&mut self) -> Vec<DiagnosticRecord> {
        std::mem::take(&mut self.sandbox)
    }

    fn drain_live_diagnostics(&mut self) -> Vec<DiagnosticRecord> {
        std::mem::take(&mut self.live)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ic10lab_env::{Environment, Network, NetworkKind};

    fn world() -> SimWorld {
        SimWorld::new(&Environment {
            chips: vec![Chip::new(1, "")],
            networks: vec![Network {
                id: "base".into(),
                kind: NetworkKind::Data,
                props: Vec::new(),
            }],
            ..Default::default()
        })
        .unwrap()
    }

    fn runner(code: &str) -> (SimRunner, SimWorld) {
        let world = world();
        let runner = SimRunner::new(&Chip::new(1, code), &world, 42).unwrap();
        (runner, world)
    }

    fn run(runner: &mut SimRunner, world: &mut SimWorld, ticks: usize) {
        for _ in 0..ticks {
            runner.execute(world).unwrap();
        }
    }

    #[test]
    fn test_arithmetic_and_halt() {
        let (mut runner, mut world) = runner("move r0 6\nmul r1 r0 7\nsub r2 r1 2\n");
        run(&mut runner, &mut world, 3);

        assert_eq!(runner.register(1), Some(42.0));
        assert_eq!(runner.register(2), Some(40.0));
        assert!(runner.is_halted());
    }

    #[test]
    fn test_loop_with_label() {
        let (mut runner, mut world) = runner("start:\nadd r0 r0 1\nyield\nj start\n");
        run(&mut runner, &mut world, 9);

        assert_eq!(runner.register(0), Some(3.0));
        assert!(!runner.is_halted());
    }

    #[test]
    fn test_division_by_zero_halts_with_live_diagnostic() {
        let (mut runner, mut world) = runner("move r0 1\ndiv r1 r0 0\nmove r2 1\n");
        run(&mut runner, &mut world, 3);

        assert!(runner.is_halted());
        assert_eq!(runner.register(2), Some(0.0));
        let live = runner.drain_live_diagnostics();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].message, "line 1: division by zero");
        assert!(live[0].is_error());
    }

    #[test]
    fn test_hcf_is_an_engine_error() {
        let (mut runner, mut world) = runner("hcf\n");
        let err = runner.execute(&mut world).unwrap_err();
        assert_eq!(err, EngineError::fault(UnitId(1), "line 0: hcf, chip caught fire"));
        assert!(runner.is_halted());
    }

    #[test]
    fn test_sandbox_precheck() {
        let (mut runner, _) = runner("move r0 1\nbogus\nl r0 d5 Setting\n");

        assert!(runner.has_sandbox_errors());
        let sandbox = runner.drain_sandbox_diagnostics();
        assert_eq!(sandbox.len(), 2);
        assert_eq!(sandbox[0].severity, Severity::Error);
        assert_eq!(sandbox[0].message, "line 1: unknown instruction 'bogus'");
        assert_eq!(sandbox[1].severity, Severity::Warning);
        assert_eq!(sandbox[1].message, "line 2: unknown device d5");
        assert!(runner.drain_sandbox_diagnostics().is_empty());
    }

    #[test]
    fn test_stack_and_jal() {
        let (mut runner, mut world) = runner("push 5\njal sub\nj 6\nsub:\npop r0\nj ra\n");
        run(&mut runner, &mut world, 5);

        assert_eq!(runner.register(0), Some(5.0));
        assert!(runner.is_halted());
    }

    #[test]
    fn test_stack_pointer_past_stack_faults() {
        let (mut runner, mut world) = runner("move sp 600\npop r0\nmove r1 1\n");
        run(&mut runner, &mut world, 3);

        assert!(runner.is_halted());
        assert_eq!(runner.register(0), Some(0.0));
        assert_eq!(runner.register(1), Some(0.0));
        let live = runner.drain_live_diagnostics();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].message, "line 1: stack pointer 600 out of range");
    }

    #[test]
    fn test_push_at_stack_end_overflows() {
        let (mut runner, mut world) = runner("move sp 512\npush 1\n");
        run(&mut runner, &mut world, 2);

        assert!(runner.is_halted());
        let live = runner.drain_live_diagnostics();
        assert_eq!(live[0].message, "line 1: stack overflow");
    }

    #[test]
    fn test_arithmetic_overflow_halts() {
        let (mut runner, mut world) = runner("move r0 5\nmul r0 1e308 10\n");
        run(&mut runner, &mut world, 2);

        assert!(runner.is_halted());
        assert_eq!(runner.register(0), Some(5.0));
        let live = runner.drain_live_diagnostics();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].message, "line 1: arithmetic overflow");
    }

    #[test]
    fn test_network_store() {
        let (mut runner, mut world) = runner("s base Channel0 9\n");
        run(&mut runner, &mut world, 1);
        assert_eq!(world.networks()[0].prop("Channel0"), Some(9.0));
    }

    #[test]
    fn test_rand_is_seeded() {
        let (mut a, mut world_a) = runner("rand r0\n");
        let (mut b, mut world_b) = runner("rand r0\n");
        run(&mut a, &mut world_a, 1);
        run(&mut b, &mut world_b, 1);

        let value = a.register(0).unwrap();
        assert_eq!(Some(value), b.register(0));
        assert!((0.0..1.0).contains(&value));
    }

    #[test]
    fn test_to_chip_is_sparse() {
        let (mut runner, mut world) = runner("move r3 2\npush 4\n");
        run(&mut runner, &mut world, 2);

        let chip = runner.to_chip();
        assert_eq!(chip.register("r3"), 2.0);
        assert_eq!(chip.register("r16"), 1.0);
        assert_eq!(chip.registers.len(), 2);
        assert_eq!(chip.stack, vec![4.0]);
    }

    #[test]
    fn test_rejects_unknown_initial_register() {
        let mut chip = Chip::new(1, "");
        chip.registers.push(Register {
            name: "r99".into(),
            value: 1.0,
        });
        assert!(SimRunner::new(&chip, &world(), 42).is_err());
    }
}
