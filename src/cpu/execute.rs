//! CPU execution engine for the LC-3.
//!
//! Implements the fetch-decode-execute cycle and all instruction behaviors.
//! Trap service routines live in [`trap`](crate::cpu::trap).

use crate::cpu::{Memory, Registers};
use crate::cpu::decode::{self, Instruction, JsrTarget, Operand};
use crate::cpu::memory::{MemoryError, CYCLE_COUNTER};
use crate::cpu::registers::{Condition, REGISTER_COUNT};
use crate::image::ProgramImage;
use crate::io::Console;
use serde::{Serialize, Deserialize};
use thiserror::Error;
use tracing::{error, trace};

/// CPU run state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CpuState {
    /// Not executing; initial state, and the state after HALT or a fatal error.
    #[default]
    Stopped,
    /// Executing instructions.
    Running,
}

/// The LC-3 CPU.
///
/// Owns its registers and memory outright. The console is passed in on every
/// call instead, so one console can outlive several machines and a test can
/// read back what a program printed.
#[derive(Clone)]
pub struct Cpu {
    /// CPU registers.
    pub regs: Registers,
    /// Main memory.
    pub mem: Memory,
    /// Current execution state.
    pub state: CpuState,
    /// Instructions executed since construction or the last reset.
    pub cycles: u64,
    /// Whether a program has been loaded.
    loaded: bool,
}

impl Cpu {
    /// Create a new CPU with zeroed state.
    pub fn new() -> Self {
        Self {
            regs: Registers::new(),
            mem: Memory::new(),
            state: CpuState::Stopped,
            cycles: 0,
            loaded: false,
        }
    }

    /// Point PC at the start address and clear the condition flags.
    ///
    /// Memory and general purpose registers are left alone, so a program
    /// loaded before the reset is still there afterwards.
    pub fn reset(&mut self) {
        self.regs.reset();
        self.state = CpuState::Stopped;
        self.cycles = 0;
    }

    /// Load a program into memory at `origin`.
    pub fn load_program(&mut self, origin: u16, program: &[u16]) -> Result<(), MemoryError> {
        self.mem.load_program(origin, program)?;
        self.loaded = true;
        Ok(())
    }

    /// Load a parsed program image.
    pub fn load_image(&mut self, image: &ProgramImage) -> Result<(), MemoryError> {
        self.load_program(image.origin, &image.words)
    }

    /// Execute a single instruction.
    ///
    /// Returns the instruction that was executed, or an error. A fatal error
    /// leaves the machine stopped with PC still at the failing instruction.
    pub fn step(&mut self, console: &mut dyn Console) -> Result<Instruction, CpuError> {
        self.state = CpuState::Running;

        // Fetch
        let pc = self.regs.pc;
        let word = self.mem.read(pc);
        let next_pc = pc.wrapping_add(1);

        // Decode
        let instr = decode::decode(word);
        trace!("{:#06x}: {:#06x} {:?}", pc, word, instr);

        // Execute
        match self.execute(instr, pc, word, next_pc, console) {
            Ok(next_pc) => self.regs.pc = next_pc,
            Err(e) => {
                error!("{:#06x}: {}", pc, e);
                self.state = CpuState::Stopped;
                return Err(e);
            }
        }

        // Update state
        self.mem.tick();
        self.cycles += 1;

        Ok(instr)
    }

    /// Run until halt or error.
    ///
    /// Returns the number of instructions executed.
    pub fn run(&mut self, console: &mut dyn Console) -> Result<u64, CpuError> {
        self.run_until(console, |_| true)
    }

    /// Run for at most `max_cycles` instructions.
    pub fn run_limited(&mut self, console: &mut dyn Console, max_cycles: u64) -> Result<u64, CpuError> {
        let limit = self.cycles.saturating_add(max_cycles);
        self.run_until(console, |cpu| cpu.cycles < limit)
    }

    fn run_until(
        &mut self,
        console: &mut dyn Console,
        mut keep_going: impl FnMut(&Cpu) -> bool,
    ) -> Result<u64, CpuError> {
        if !self.loaded {
            return Err(CpuError::MissingProgram);
        }

        let start_cycles = self.cycles;

        while keep_going(self) {
            self.step(console)?;
            if self.state == CpuState::Stopped {
                break;
            }
        }
        console.flush()?;

        Ok(self.cycles - start_cycles)
    }

    /// Execute a decoded instruction and return the address of the next one.
    fn execute(
        &mut self,
        instr: Instruction,
        pc: u16,
        word: u16,
        next_pc: u16,
        console: &mut dyn Console,
    ) -> Result<u16, CpuError> {
        let relative = |offset: i16| next_pc.wrapping_add_signed(offset);

        match instr {
            // ==================== Control Flow ====================

            Instruction::Br { n, z, p, offset } => {
                if self.regs.cond.matches(n, z, p) {
                    return Ok(relative(offset));
                }
            }

            Instruction::Jmp { base } => {
                return Ok(self.regs.get(base));
            }

            Instruction::Jsr { target } => {
                // R7 is written first, so JSRR R7 jumps to the return address
                self.regs.set(7, next_pc);
                let dest = match target {
                    JsrTarget::Offset(offset) => relative(offset),
                    JsrTarget::Register(base) => self.regs.get(base),
                };
                return Ok(dest);
            }

            Instruction::Trap { vector } => {
                self.trap(vector, pc, word, console)?;
            }

            // ==================== Operate ====================

            Instruction::Add { dr, sr1, operand } => {
                let result = self.regs.get(sr1).wrapping_add(self.operand(operand));
                self.regs.write_result(dr, result);
            }

            Instruction::And { dr, sr1, operand } => {
                let result = self.regs.get(sr1) & self.operand(operand);
                self.regs.write_result(dr, result);
            }

            Instruction::Not { dr, sr } => {
                let result = !self.regs.get(sr);
                self.regs.write_result(dr, result);
            }

            // ==================== Data Movement ====================

            Instruction::Ld { dr, offset } => {
                let value = self.mem.read_word(relative(offset), console)?;
                self.regs.write_result(dr, value);
            }

            Instruction::Ldi { dr, offset } => {
                let pointer = self.mem.read_word(relative(offset), console)?;
                let value = self.mem.read_word(pointer, console)?;
                self.regs.write_result(dr, value);
            }

            Instruction::Ldr { dr, base, offset } => {
                let addr = self.regs.get(base).wrapping_add_signed(offset);
                let value = self.mem.read_word(addr, console)?;
                self.regs.write_result(dr, value);
            }

            Instruction::Lea { dr, offset } => {
                self.regs.write_result(dr, relative(offset));
            }

            Instruction::St { sr, offset } => {
                self.mem.write_word(relative(offset), self.regs.get(sr));
            }

            Instruction::Sti { sr, offset } => {
                let pointer = self.mem.read_word(relative(offset), console)?;
                self.mem.write_word(pointer, self.regs.get(sr));
            }

            Instruction::Str { sr, base, offset } => {
                let addr = self.regs.get(base).wrapping_add_signed(offset);
                self.mem.write_word(addr, self.regs.get(sr));
            }

            // ==================== Unused ====================

            Instruction::Rti | Instruction::Res => {
                // No supervisor mode; treated as no-ops
            }
        }

        Ok(next_pc)
    }

    fn operand(&self, operand: Operand) -> u16 {
        match operand {
            Operand::Register(sr2) => self.regs.get(sr2),
            Operand::Immediate(imm) => imm as u16,
        }
    }

    /// Snapshot of the machine state for reporting.
    pub fn report(&self) -> MachineReport {
        MachineReport {
            state: self.state,
            pc: self.regs.pc,
            registers: self.regs.r,
            condition: self.regs.cond,
            cycles: self.cycles,
            cycle_counter: self.mem.read(CYCLE_COUNTER),
        }
    }

    /// Check if the CPU is halted.
    pub fn is_halted(&self) -> bool {
        self.state == CpuState::Stopped
    }

    /// Check if the CPU is running.
    pub fn is_running(&self) -> bool {
        self.state == CpuState::Running
    }
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Cpu {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cpu")
            .field("state", &self.state)
            .field("cycles", &self.cycles)
            .field("regs", &self.regs)
            .finish()
    }
}

/// Register and flag state after a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineReport {
    pub state: CpuState,
    pub pc: u16,
    pub registers: [u16; REGISTER_COUNT],
    pub condition: Condition,
    pub cycles: u64,
    /// Value of the memory-mapped counter at `0xFFFF`.
    pub cycle_counter: u16,
}

/// Errors that can occur during CPU execution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CpuError {
    #[error("no program loaded")]
    MissingProgram,

    #[error("trap vector {vector:#04x} not implemented (instruction {word:#06x} at {address:#06x})")]
    UnimplementedTrap { vector: u8, address: u16, word: u16 },

    #[error("console error: {0}")]
    Console(String),
}

impl From<std::io::Error> for CpuError {
    fn from(e: std::io::Error) -> Self {
        CpuError::Console(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::decode::encode;
    use crate::cpu::registers::PC_START;
    use crate::io::StreamConsole;
    use std::io;

    type TestConsole = StreamConsole<io::Empty, Vec<u8>>;

    fn console() -> TestConsole {
        StreamConsole::new(io::empty(), Vec::new())
    }

    fn make_program(instructions: &[Instruction]) -> Vec<u16> {
        instructions.iter().map(encode).collect()
    }

    fn cpu_with(instructions: &[Instruction]) -> Cpu {
        let mut cpu = Cpu::new();
        cpu.load_program(PC_START, &make_program(instructions)).unwrap();
        cpu.reset();
        cpu
    }

    const HALT: Instruction = Instruction::Trap { vector: 0x25 };

    fn imm(value: i16) -> Operand {
        Operand::Immediate(value)
    }

    #[test]
    fn test_add_immediate() {
        let mut cpu = cpu_with(&[Instruction::Add { dr: 1, sr1: 0, operand: imm(3) }]);
        cpu.regs.set(0, 5);

        cpu.step(&mut console()).unwrap();

        assert_eq!(cpu.regs.get(1), 8);
        assert_eq!(cpu.regs.cond, Condition { n: false, z: false, p: true });
        assert_eq!(cpu.regs.pc, 0x3001);
    }

    #[test]
    fn test_add_register_wraps() {
        let mut cpu = cpu_with(&[Instruction::Add { dr: 2, sr1: 0, operand: Operand::Register(1) }]);
        cpu.regs.set(0, 0xFFFF);
        cpu.regs.set(1, 1);

        cpu.step(&mut console()).unwrap();

        assert_eq!(cpu.regs.get(2), 0);
        assert!(cpu.regs.cond.z);
    }

    #[test]
    fn test_and_and_not() {
        let mut cpu = cpu_with(&[
            Instruction::And { dr: 0, sr1: 0, operand: imm(0) },
            Instruction::And { dr: 1, sr1: 2, operand: Operand::Register(3) },
            Instruction::Not { dr: 4, sr: 1 },
        ]);
        cpu.regs.set(0, 0x1234);
        cpu.regs.set(2, 0xFF0F);
        cpu.regs.set(3, 0x0FF0);
        let mut con = console();

        cpu.step(&mut con).unwrap();
        assert_eq!(cpu.regs.get(0), 0);
        assert!(cpu.regs.cond.z);

        cpu.step(&mut con).unwrap();
        assert_eq!(cpu.regs.get(1), 0x0F00);
        assert!(cpu.regs.cond.p);

        cpu.step(&mut con).unwrap();
        assert_eq!(cpu.regs.get(4), 0xF0FF);
        assert!(cpu.regs.cond.n);
    }

    #[test]
    fn test_and_negative_immediate_is_sign_extended() {
        let mut cpu = cpu_with(&[Instruction::And { dr: 0, sr1: 1, operand: imm(-2) }]);
        cpu.regs.set(1, 0x8001);

        cpu.step(&mut console()).unwrap();

        assert_eq!(cpu.regs.get(0), 0x8000);
        assert!(cpu.regs.cond.n);
    }

    #[test]
    fn test_lea_is_relative_to_next_pc() {
        let mut cpu = cpu_with(&[Instruction::Lea { dr: 0, offset: 5 }]);

        cpu.step(&mut console()).unwrap();

        assert_eq!(cpu.regs.get(0), 0x3006);
        assert!(cpu.regs.cond.p);
    }

    #[test]
    fn test_ld() {
        let mut cpu = cpu_with(&[Instruction::Ld { dr: 3, offset: -1 }]);

        cpu.step(&mut console()).unwrap();

        // Loads its own encoding
        assert_eq!(cpu.regs.get(3), 0x27FF);
    }

    #[test]
    fn test_ldi_double_indirection() {
        let mut cpu = cpu_with(&[Instruction::Ldi { dr: 0, offset: 1 }]);
        // Offset is from PC after fetch, as in test_lea_is_relative_to_next_pc
        cpu.mem.write(0x3002, 0x4000);
        cpu.mem.write(0x4000, 0x1234);

        cpu.step(&mut console()).unwrap();

        assert_eq!(cpu.regs.get(0), 0x1234);
        assert!(cpu.regs.cond.p);
    }

    #[test]
    fn test_ldr_and_str_use_decoded_fields() {
        let mut cpu = cpu_with(&[
            Instruction::Str { sr: 5, base: 6, offset: -2 },
            Instruction::Ldr { dr: 3, base: 6, offset: -2 },
        ]);
        cpu.regs.set(5, 0xABCD);
        cpu.regs.set(6, 0x5000);
        let mut con = console();

        cpu.step(&mut con).unwrap();
        assert_eq!(cpu.mem.read(0x4FFE), 0xABCD);
        assert_eq!(cpu.regs.cond, Condition::default(), "stores leave flags alone");

        cpu.step(&mut con).unwrap();
        assert_eq!(cpu.regs.get(3), 0xABCD);
        assert!(cpu.regs.cond.n);
    }

    #[test]
    fn test_st_and_sti() {
        let mut cpu = cpu_with(&[
            Instruction::St { sr: 1, offset: 10 },
            Instruction::Sti { sr: 2, offset: 0 },
        ]);
        cpu.mem.write(0x3002, 0x6000);
        cpu.regs.set(1, 11);
        cpu.regs.set(2, 22);
        let mut con = console();

        cpu.step(&mut con).unwrap();
        cpu.step(&mut con).unwrap();

        assert_eq!(cpu.mem.read(0x300B), 11);
        assert_eq!(cpu.mem.read(0x6000), 22);
    }

    #[test]
    fn test_branch_without_flags_never_taken() {
        for value in [0u16, 1, 0x8000] {
            let mut cpu = cpu_with(&[Instruction::Br { n: false, z: false, p: false, offset: 10 }]);
            cpu.regs.set_condition_codes(value);

            cpu.step(&mut console()).unwrap();

            assert_eq!(cpu.regs.pc, 0x3001);
        }
    }

    #[test]
    fn test_branch_taken_backwards() {
        let mut cpu = cpu_with(&[
            Instruction::Add { dr: 0, sr1: 0, operand: imm(-1) },
            Instruction::Br { n: true, z: false, p: false, offset: -3 },
        ]);
        let mut con = console();

        cpu.step(&mut con).unwrap();
        cpu.step(&mut con).unwrap();

        assert_eq!(cpu.regs.pc, 0x2FFF);
    }

    #[test]
    fn test_branch_not_taken_on_other_flag() {
        let mut cpu = cpu_with(&[Instruction::Br { n: false, z: true, p: false, offset: 4 }]);
        cpu.regs.set_condition_codes(7);

        cpu.step(&mut console()).unwrap();

        assert_eq!(cpu.regs.pc, 0x3001);
    }

    #[test]
    fn test_jmp_and_ret() {
        let mut cpu = cpu_with(&[Instruction::Jmp { base: 7 }]);
        cpu.regs.set(7, 0x4321);

        cpu.step(&mut console()).unwrap();

        assert_eq!(cpu.regs.pc, 0x4321);
    }

    #[test]
    fn test_jsr_offset_saves_return_address() {
        let mut cpu = cpu_with(&[Instruction::Jsr { target: JsrTarget::Offset(16) }]);

        cpu.step(&mut console()).unwrap();

        assert_eq!(cpu.regs.get(7), 0x3001);
        assert_eq!(cpu.regs.pc, 0x3011);
    }

    #[test]
    fn test_jsrr() {
        let mut cpu = cpu_with(&[Instruction::Jsr { target: JsrTarget::Register(2) }]);
        cpu.regs.set(2, 0x5000);

        cpu.step(&mut console()).unwrap();

        assert_eq!(cpu.regs.get(7), 0x3001);
        assert_eq!(cpu.regs.pc, 0x5000);
    }

    #[test]
    fn test_jsrr_through_r7() {
        let mut cpu = cpu_with(&[Instruction::Jsr { target: JsrTarget::Register(7) }]);
        cpu.regs.set(7, 0x5000);

        cpu.step(&mut console()).unwrap();

        assert_eq!(cpu.regs.pc, 0x3001);
        assert_eq!(cpu.regs.get(7), 0x3001);
    }

    #[test]
    fn test_rti_and_res_are_noops() {
        let mut cpu = cpu_with(&[Instruction::Rti, Instruction::Res]);
        let before = cpu.regs.clone();
        let mut con = console();

        cpu.step(&mut con).unwrap();
        cpu.step(&mut con).unwrap();

        assert_eq!(cpu.regs.r, before.r);
        assert_eq!(cpu.regs.cond, before.cond);
        assert_eq!(cpu.regs.pc, 0x3002);
    }

    #[test]
    fn test_halt_stops_run() {
        let mut cpu = cpu_with(&[HALT]);

        let executed = cpu.run(&mut console()).unwrap();

        assert_eq!(executed, 1);
        assert!(cpu.is_halted());
    }

    #[test]
    fn test_step_marks_running() {
        let mut cpu = cpu_with(&[Instruction::Add { dr: 0, sr1: 0, operand: imm(1) }, HALT]);
        let mut con = console();

        cpu.step(&mut con).unwrap();
        assert!(cpu.is_running());

        cpu.step(&mut con).unwrap();
        assert!(cpu.is_halted());
    }

    #[test]
    fn test_add_then_halt_end_to_end() {
        let mut cpu = cpu_with(&[Instruction::Add { dr: 0, sr1: 0, operand: imm(1) }, HALT]);

        let executed = cpu.run(&mut console()).unwrap();

        assert_eq!(executed, 2);
        assert_eq!(cpu.regs.get(0), 1);
        assert_eq!(cpu.state, CpuState::Stopped);
        assert_eq!(cpu.mem.read(CYCLE_COUNTER), 2);
    }

    #[test]
    fn test_image_end_to_end() {
        // .ORIG x3000; ADD R0, R0, #1; HALT
        let image = ProgramImage::parse(&[0x30, 0x00, 0x10, 0x21, 0xF0, 0x25]).unwrap();
        let mut cpu = Cpu::new();
        cpu.load_image(&image).unwrap();
        cpu.reset();

        assert_eq!(cpu.run(&mut console()), Ok(2));
        assert_eq!(cpu.regs.get(0), 1);
        assert!(cpu.is_halted());
    }

    #[test]
    fn test_polls_keyboard_through_device_registers() {
        let mut program = make_program(&[
            Instruction::Ldi { dr: 1, offset: 3 },
            Instruction::Br { n: false, z: true, p: true, offset: -2 },
            Instruction::Ldi { dr: 0, offset: 2 },
            HALT,
        ]);
        program.extend([crate::cpu::memory::KBSR, crate::cpu::memory::KBDR]);
        let mut cpu = Cpu::new();
        cpu.load_program(PC_START, &program).unwrap();
        cpu.reset();
        let mut con = StreamConsole::new(&b"k"[..], Vec::new());

        assert_eq!(cpu.run(&mut con), Ok(4));
        assert_eq!(cpu.regs.get(0), u16::from(b'k'));
        assert_eq!(cpu.regs.get(1), 0x8000);
    }

    #[test]
    fn test_run_without_program() {
        let mut cpu = Cpu::new();
        assert_eq!(cpu.run(&mut console()), Err(CpuError::MissingProgram));
        assert_eq!(cpu.cycles, 0);
    }

    #[test]
    fn test_unknown_trap_is_fatal() {
        let mut cpu = cpu_with(&[
            Instruction::Add { dr: 0, sr1: 0, operand: imm(1) },
            Instruction::Trap { vector: 0x40 },
            Instruction::Add { dr: 0, sr1: 0, operand: imm(1) },
            HALT,
        ]);

        let err = cpu.run(&mut console()).unwrap_err();

        assert_eq!(
            err,
            CpuError::UnimplementedTrap { vector: 0x40, address: 0x3001, word: 0xF040 }
        );
        assert!(cpu.is_halted());
        assert_eq!(cpu.regs.pc, 0x3001);
        assert_eq!(cpu.regs.get(0), 1);
        assert_eq!(cpu.cycles, 1);
        assert_eq!(cpu.mem.read(CYCLE_COUNTER), 1);
    }

    #[test]
    fn test_run_limited() {
        // BRnzp #-1 spins forever
        let mut cpu = cpu_with(&[Instruction::Br { n: true, z: true, p: true, offset: -1 }]);
        cpu.regs.set_condition_codes(0);

        let executed = cpu.run_limited(&mut console(), 100).unwrap();

        assert_eq!(executed, 100);
        assert!(cpu.is_running());
        assert_eq!(cpu.regs.pc, 0x3000);
    }

    #[test]
    fn test_run_limited_saturates_cycle_limit() {
        let mut cpu = cpu_with(&[HALT]);
        cpu.cycles = 1;

        let executed = cpu.run_limited(&mut console(), u64::MAX).unwrap();

        assert_eq!(executed, 1);
        assert!(cpu.is_halted());
        assert_eq!(cpu.cycles, 2);
    }

    #[test]
    fn test_reset_keeps_program() {
        let mut cpu = cpu_with(&[HALT]);
        cpu.run(&mut console()).unwrap();

        cpu.reset();

        assert_eq!(cpu.regs.pc, PC_START);
        assert_eq!(cpu.cycles, 0);
        assert_eq!(cpu.run(&mut console()), Ok(1));
    }

    #[test]
    fn test_machines_are_independent() {
        let mut a = cpu_with(&[Instruction::Add { dr: 0, sr1: 0, operand: imm(1) }, HALT]);
        let mut b = a.clone();
        b.regs.set(0, 100);

        a.run(&mut console()).unwrap();
        b.run(&mut console()).unwrap();

        assert_eq!(a.regs.get(0), 1);
        assert_eq!(b.regs.get(0), 101);
    }

    #[test]
    fn test_report() {
        let mut cpu = cpu_with(&[Instruction::Add { dr: 0, sr1: 0, operand: imm(1) }, HALT]);
        cpu.run(&mut console()).unwrap();

        let report = cpu.report();

        assert_eq!(report.state, CpuState::Stopped);
        assert_eq!(report.pc, 0x3002);
        assert_eq!(report.registers[0], 1);
        assert_eq!(report.cycles, 2);
        assert_eq!(report.cycle_counter, 2);
    }
}
