use anyhow::{bail, Context, Result};
use log::{debug, trace};
use thiserror::Error;

use super::alu::{self, AluResult};
use super::condition::Condition;
use super::ea::{EaMode, Operand};
use super::instruction::{AddSub, ArithOp, Instruction};
use super::regs::{Flag, RegisterFile};
use super::trap::{self, Console, TrapError, TrapOutcome, IO_VECTOR};
use super::value::{Size, Value};
use crate::bus::{Address, Bus, BusIterator};

/// Return type of CPU::op_* functions
type CpuOpResult = Result<OpOk>;

/// Result of a successful CPU::op_* function.
pub struct OpOk {
    /// New program counter
    pc: Address,

    /// Instruction stops the CPU
    halt: bool,
}

impl OpOk {
    /// Normal successful op, moves PC to next instruction.
    #[inline(always)]
    fn ok(pc: Address, instr: &Instruction) -> Self {
        Self {
            pc: pc.wrapping_add(instr.byte_length() as Address),
            halt: false,
        }
    }

    /// Branch op: successful op, branch taken.
    #[inline(always)]
    fn branch(pc: Address) -> Self {
        Self { pc, halt: false }
    }

    /// Moves PC past the instruction and halts.
    #[inline(always)]
    fn halt(pc: Address, instr: &Instruction) -> Self {
        Self {
            halt: true,
            ..Self::ok(pc, instr)
        }
    }
}

/// Context attached to errors raised while executing an instruction.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
#[error("Error executing {mnemonic} at ${pc:06X}")]
pub struct ExecutionError {
    pub mnemonic: String,
    pub pc: Address,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum StepResult {
    Executed,
    Halted,
}

/// Motorola 68000
pub struct CpuM68k<TBus: Bus> {
    /// Address bus
    pub bus: TBus,

    /// Register file
    pub regs: RegisterFile,

    /// TRAP #15 console
    console: Console,

    /// Stopped by SIMHALT, TRAP #15 task 9 or an unknown instruction
    halted: bool,

    /// Amount of instructions executed
    steps: usize,
}

impl<TBus> CpuM68k<TBus>
where
    TBus: Bus,
{
    pub fn new(bus: TBus, pc: Address) -> Result<Self> {
        Self::with_console(bus, pc, Console::stdio())
    }

    pub fn with_console(bus: TBus, pc: Address, console: Console) -> Result<Self> {
        let mut regs = RegisterFile::new();
        regs.set_pc(pc)?;
        Ok(Self {
            bus,
            regs,
            console,
            halted: false,
            steps: 0,
        })
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn get_steps(&self) -> usize {
        self.steps
    }

    pub fn dump_state(&self) -> String {
        let next = match self.peek_next_instr() {
            Ok(Some(i)) => i.to_string(),
            Ok(None) => "(no instruction)".to_string(),
            Err(e) => format!("(invalid: {})", e),
        };
        format!(
            "{} {}\n --> {}\n",
            self.steps,
            self.regs,
            if self.halted { "(halted)".to_string() } else { next }
        )
    }

    /// Fetches and decodes the next instruction at PC
    pub fn peek_next_instr(&self) -> Result<Option<Instruction>> {
        self.bus.check(self.regs.pc, Size::Word)?;
        let mut busiter = BusIterator::new_from(&self.bus, self.regs.pc);
        Instruction::decode(&mut busiter, self.regs.pc)
    }

    /// Executes a single instruction. A word that decodes to nothing
    /// halts the CPU; a halted CPU stays halted.
    pub fn step(&mut self) -> Result<StepResult> {
        if self.halted {
            return Ok(StepResult::Halted);
        }

        let pc = self.regs.pc;
        let instr = match self
            .peek_next_instr()
            .with_context(|| format!("Cannot decode instruction at ${:06X}", pc))?
        {
            Some(i) => i,
            None => {
                debug!("No instruction at ${:06X}, halting", pc);
                self.halted = true;
                return Ok(StepResult::Halted);
            }
        };
        trace!("${:06X}: {}", pc, instr);

        let result = self
            .execute(&instr)
            .and_then(|r| {
                self.regs.set_pc(r.pc)?;
                Ok(r)
            })
            .with_context(|| ExecutionError {
                mnemonic: instr.mnemonic().to_string(),
                pc,
            })?;
        self.steps += 1;

        if result.halt {
            debug!("Halted by {} at ${:06X}", instr, pc);
            self.halted = true;
            return Ok(StepResult::Halted);
        }
        Ok(StepResult::Executed)
    }

    /// Runs until halted. Returns the amount of instructions executed.
    pub fn run(&mut self) -> Result<usize> {
        let start = self.steps;
        while self.step()? == StepResult::Executed {}
        Ok(self.steps - start)
    }

    /// Runs until halted or `max_steps` instructions were executed.
    pub fn run_for(&mut self, max_steps: usize) -> Result<StepResult> {
        for _ in 0..max_steps {
            if self.step()? == StepResult::Halted {
                return Ok(StepResult::Halted);
            }
        }
        Ok(if self.halted {
            StepResult::Halted
        } else {
            StepResult::Executed
        })
    }

    /// Executes an instruction and returns the result, PC not yet updated
    pub fn execute(&mut self, instr: &Instruction) -> CpuOpResult {
        match instr {
            Instruction::Move { size, src, dst } => self.op_move(instr, *size, src, dst),
            Instruction::Movea { size, src, dst } => self.op_movea(instr, *size, src, dst),
            Instruction::Arith { op, size, src, dst } => {
                self.op_arith(instr, *op, *size, src, dst)
            }
            Instruction::ArithA { op, size, src, dst } => {
                self.op_arith_a(instr, *op, *size, src, dst)
            }
            Instruction::Quick {
                op,
                size,
                data,
                dst,
            } => self.op_quick(instr, *op, *size, *data, dst),
            Instruction::Eor { size, src, dst } => self.op_eor(instr, *size, src, dst),
            Instruction::Cmp { size, src, dst } | Instruction::Cmpi { size, src, dst } => {
                self.op_cmp(instr, *size, src, dst)
            }
            Instruction::Neg { size, dst } => self.op_neg(instr, *size, dst),
            Instruction::Lea { src, dst } => self.op_lea(instr, src, dst),
            Instruction::Jsr { target } => self.op_jsr(instr, target),
            Instruction::Rts => self.op_rts(),
            Instruction::Nop => Ok(OpOk::ok(self.regs.pc, instr)),
            Instruction::Trap { vector } => self.op_trap(instr, *vector),
            Instruction::Branch { cond, target, .. } => self.op_bcc(instr, *cond, *target),
            Instruction::Bsr { target, .. } => self.op_bsr(instr, *target),
            Instruction::Simhalt => Ok(OpOk::halt(self.regs.pc, instr)),
            Instruction::Dc { .. } => bail!("Constant data is not executable"),
        }
    }

    /// Sets N, Z, V, C and, if requested, X.
    fn set_arith_flags(&mut self, r: &AluResult, extend: bool) {
        self.regs.write_flags(&[
            (Flag::N, r.n),
            (Flag::Z, r.z),
            (Flag::V, r.v),
            (Flag::C, r.c),
        ]);
        if extend {
            self.regs.write_flags(&[(Flag::X, r.c)]);
        }
    }

    fn push_long(&mut self, val: u32) -> Result<()> {
        Operand::pre_dec(7)?.store(
            &mut self.regs,
            &mut self.bus,
            Value::truncate(Size::Long, val),
        )
    }

    fn pop_long(&mut self) -> Result<u32> {
        Ok(Operand::post_inc(7)?
            .fetch(&mut self.regs, &self.bus, Size::Long)?
            .as_unsigned())
    }

    /// MOVE
    fn op_move(&mut self, instr: &Instruction, size: Size, src: &Operand, dst: &Operand) -> CpuOpResult {
        let val = src.fetch(&mut self.regs, &self.bus, size)?;
        dst.store(&mut self.regs, &mut self.bus, val)?;
        self.set_arith_flags(&alu::mov(size, val.as_unsigned()), false);
        Ok(OpOk::ok(self.regs.pc, instr))
    }

    /// MOVEA
    fn op_movea(&mut self, instr: &Instruction, size: Size, src: &Operand, dst: &Operand) -> CpuOpResult {
        let val = src.fetch(&mut self.regs, &self.bus, size)?;
        dst.store(&mut self.regs, &mut self.bus, val.sign_extend(Size::Long))?;
        Ok(OpOk::ok(self.regs.pc, instr))
    }

    /// ADD, SUB, AND, OR
    fn op_arith(
        &mut self,
        instr: &Instruction,
        op: ArithOp,
        size: Size,
        src: &Operand,
        dst: &Operand,
    ) -> CpuOpResult {
        let s = src.fetch(&mut self.regs, &self.bus, size)?.as_unsigned();
        let f = match op {
            ArithOp::Add => alu::add,
            ArithOp::Sub => alu::sub,
            ArithOp::And => alu::and,
            ArithOp::Or => alu::or,
        };
        let r = dst.modify(&mut self.regs, &mut self.bus, size, |d| {
            let r = f(size, d.as_unsigned(), s);
            (Value::truncate(size, r.result), r)
        })?;
        self.set_arith_flags(&r, matches!(op, ArithOp::Add | ArithOp::Sub));
        Ok(OpOk::ok(self.regs.pc, instr))
    }

    /// ADDA, SUBA
    fn op_arith_a(
        &mut self,
        instr: &Instruction,
        op: AddSub,
        size: Size,
        src: &Operand,
        dst: &Operand,
    ) -> CpuOpResult {
        let s = src
            .fetch(&mut self.regs, &self.bus, size)?
            .sign_extend(Size::Long)
            .as_unsigned();
        dst.modify(&mut self.regs, &mut self.bus, Size::Long, |d| {
            let d = d.as_unsigned();
            let r = match op {
                AddSub::Add => d.wrapping_add(s),
                AddSub::Sub => d.wrapping_sub(s),
            };
            (Value::truncate(Size::Long, r), ())
        })?;
        Ok(OpOk::ok(self.regs.pc, instr))
    }

    /// ADDQ, SUBQ
    fn op_quick(
        &mut self,
        instr: &Instruction,
        op: AddSub,
        size: Size,
        data: u8,
        dst: &Operand,
    ) -> CpuOpResult {
        let data = u32::from(data);
        if dst.mode() == EaMode::AddressDirect {
            // Whole register, no flags
            dst.modify(&mut self.regs, &mut self.bus, Size::Long, |d| {
                let d = d.as_unsigned();
                let r = match op {
                    AddSub::Add => d.wrapping_add(data),
                    AddSub::Sub => d.wrapping_sub(data),
                };
                (Value::truncate(Size::Long, r), ())
            })?;
            return Ok(OpOk::ok(self.regs.pc, instr));
        }

        let f = match op {
            AddSub::Add => alu::add,
            AddSub::Sub => alu::sub,
        };
        let r = dst.modify(&mut self.regs, &mut self.bus, size, |d| {
            let r = f(size, d.as_unsigned(), data);
            (Value::truncate(size, r.result), r)
        })?;
        self.set_arith_flags(&r, true);
        Ok(OpOk::ok(self.regs.pc, instr))
    }

    /// EOR
    fn op_eor(&mut self, instr: &Instruction, size: Size, src: &Operand, dst: &Operand) -> CpuOpResult {
        let s = src.fetch(&mut self.regs, &self.bus, size)?.as_unsigned();
        let r = dst.modify(&mut self.regs, &mut self.bus, size, |d| {
            let r = alu::eor(size, d.as_unsigned(), s);
            (Value::truncate(size, r.result), r)
        })?;
        self.set_arith_flags(&r, false);
        Ok(OpOk::ok(self.regs.pc, instr))
    }

    /// CMP, CMPI
    fn op_cmp(&mut self, instr: &Instruction, size: Size, src: &Operand, dst: &Operand) -> CpuOpResult {
        let s = src.fetch(&mut self.regs, &self.bus, size)?.as_unsigned();
        let d = dst.fetch(&mut self.regs, &self.bus, size)?.as_unsigned();
        self.set_arith_flags(&alu::sub(size, d, s), false);
        Ok(OpOk::ok(self.regs.pc, instr))
    }

    /// NEG
    fn op_neg(&mut self, instr: &Instruction, size: Size, dst: &Operand) -> CpuOpResult {
        let r = dst.modify(&mut self.regs, &mut self.bus, size, |d| {
            let r = alu::neg(size, d.as_unsigned());
            (Value::truncate(size, r.result), r)
        })?;
        self.set_arith_flags(&r, true);
        Ok(OpOk::ok(self.regs.pc, instr))
    }

    /// LEA
    fn op_lea(&mut self, instr: &Instruction, src: &Operand, dst: &Operand) -> CpuOpResult {
        let addr = src.effective_address(&self.regs)?;
        dst.store(
            &mut self.regs,
            &mut self.bus,
            Value::truncate(Size::Long, addr),
        )?;
        Ok(OpOk::ok(self.regs.pc, instr))
    }

    /// JSR
    fn op_jsr(&mut self, instr: &Instruction, target: &Operand) -> CpuOpResult {
        let addr = target.effective_address(&self.regs)?;
        self.bus.check(addr, Size::Word)?;
        let ret = OpOk::ok(self.regs.pc, instr).pc;
        self.push_long(ret)?;
        Ok(OpOk::branch(addr))
    }

    /// BSR
    fn op_bsr(&mut self, instr: &Instruction, target: Address) -> CpuOpResult {
        self.bus.check(target, Size::Word)?;
        let ret = OpOk::ok(self.regs.pc, instr).pc;
        self.push_long(ret)?;
        Ok(OpOk::branch(target))
    }

    /// RTS
    fn op_rts(&mut self) -> CpuOpResult {
        let pc = self.pop_long()?;
        Ok(OpOk::branch(pc))
    }

    /// Bcc, BRA
    fn op_bcc(&mut self, instr: &Instruction, cond: Condition, target: Address) -> CpuOpResult {
        if cond.test(&self.regs) {
            Ok(OpOk::branch(target))
        } else {
            Ok(OpOk::ok(self.regs.pc, instr))
        }
    }

    /// TRAP
    fn op_trap(&mut self, instr: &Instruction, vector: u8) -> CpuOpResult {
        if vector != IO_VECTOR {
            return Err(TrapError::UnknownVector(vector).into());
        }
        match trap::io_task(&mut self.regs, &mut self.bus, &mut self.console)? {
            TrapOutcome::Continue => Ok(OpOk::ok(self.regs.pc, instr)),
            TrapOutcome::Halt => Ok(OpOk::halt(self.regs.pc, instr)),
        }
    }
}
