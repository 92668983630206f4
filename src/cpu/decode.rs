//! Instruction decoder for the LC-3.
//!
//! Every instruction is one 16-bit word. Bits `[15:12]` select one of sixteen
//! opcodes; the rest of the word holds register selectors, immediates and
//! PC-relative offsets whose widths depend on the opcode.

use crate::cpu::bits::{bit, extract, extract_signed};
use serde::{Serialize, Deserialize};

/// The sixteen LC-3 opcodes, in encoding order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Opcode {
    Br = 0,
    Add = 1,
    Ld = 2,
    St = 3,
    Jsr = 4,
    And = 5,
    Ldr = 6,
    Str = 7,
    Rti = 8,
    Not = 9,
    Ldi = 10,
    Sti = 11,
    Jmp = 12,
    Res = 13,
    Lea = 14,
    Trap = 15,
}

impl Opcode {
    /// Opcode of an instruction word.
    pub fn of(word: u16) -> Self {
        match extract(word, 15, 12) {
            0 => Opcode::Br,
            1 => Opcode::Add,
            2 => Opcode::Ld,
            3 => Opcode::St,
            4 => Opcode::Jsr,
            5 => Opcode::And,
            6 => Opcode::Ldr,
            7 => Opcode::Str,
            8 => Opcode::Rti,
            9 => Opcode::Not,
            10 => Opcode::Ldi,
            11 => Opcode::Sti,
            12 => Opcode::Jmp,
            13 => Opcode::Res,
            14 => Opcode::Lea,
            15 => Opcode::Trap,
            _ => unreachable!("4-bit field out of range"),
        }
    }
}

/// Second operand of ADD and AND.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operand {
    /// SR2, bits `[2:0]`
    Register(u8),
    /// imm5, bits `[4:0]`, sign-extended
    Immediate(i16),
}

/// Where JSR/JSRR jumps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JsrTarget {
    /// JSR: PCoffset11, sign-extended
    Offset(i16),
    /// JSRR: BaseR
    Register(u8),
}

/// Decoded LC-3 instruction.
///
/// Register fields are 3-bit selectors. Offsets and immediates are already
/// sign-extended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Instruction {
    // ==================== Control Flow ====================

    /// Conditional branch on the N/Z/P flags
    Br { n: bool, z: bool, p: bool, offset: i16 },

    /// Jump to BaseR (RET is JMP R7)
    Jmp { base: u8 },

    /// Save the return address in R7, then jump
    Jsr { target: JsrTarget },

    /// Service call through the trap vector table
    Trap { vector: u8 },

    // ==================== Operate ====================

    Add { dr: u8, sr1: u8, operand: Operand },

    And { dr: u8, sr1: u8, operand: Operand },

    Not { dr: u8, sr: u8 },

    // ==================== Data Movement ====================

    /// DR := mem[PC + offset]
    Ld { dr: u8, offset: i16 },

    /// DR := mem[mem[PC + offset]]
    Ldi { dr: u8, offset: i16 },

    /// DR := mem[BaseR + offset]
    Ldr { dr: u8, base: u8, offset: i16 },

    /// DR := PC + offset
    Lea { dr: u8, offset: i16 },

    /// mem[PC + offset] := SR
    St { sr: u8, offset: i16 },

    /// mem[mem[PC + offset]] := SR
    Sti { sr: u8, offset: i16 },

    /// mem[BaseR + offset] := SR
    Str { sr: u8, base: u8, offset: i16 },

    // ==================== Unused ====================

    /// Return from interrupt (supervisor mode only)
    Rti,

    /// Reserved opcode
    Res,
}

impl Instruction {
    /// The opcode this instruction encodes to.
    pub fn opcode(&self) -> Opcode {
        match self {
            Instruction::Br { .. } => Opcode::Br,
            Instruction::Jmp { .. } => Opcode::Jmp,
            Instruction::Jsr { .. } => Opcode::Jsr,
            Instruction::Trap { .. } => Opcode::Trap,
            Instruction::Add { .. } => Opcode::Add,
            Instruction::And { .. } => Opcode::And,
            Instruction::Not { .. } => Opcode::Not,
            Instruction::Ld { .. } => Opcode::Ld,
            Instruction::Ldi { .. } => Opcode::Ldi,
            Instruction::Ldr { .. } => Opcode::Ldr,
            Instruction::Lea { .. } => Opcode::Lea,
            Instruction::St { .. } => Opcode::St,
            Instruction::Sti { .. } => Opcode::Sti,
            Instruction::Str { .. } => Opcode::Str,
            Instruction::Rti => Opcode::Rti,
            Instruction::Res => Opcode::Res,
        }
    }
}

fn reg(word: u16, hi: u8, lo: u8) -> u8 {
    extract(word, hi, lo) as u8
}

fn signed(word: u16, hi: u8, lo: u8) -> i16 {
    extract_signed(word, hi, lo) as i16
}

fn operand(word: u16) -> Operand {
    if bit(word, 5) {
        Operand::Immediate(signed(word, 4, 0))
    } else {
        Operand::Register(reg(word, 2, 0))
    }
}

/// Decode a 16-bit instruction word.
///
/// Every word decodes to something; unused bits are ignored.
pub fn decode(word: u16) -> Instruction {
    match Opcode::of(word) {
        Opcode::Br => Instruction::Br {
            n: bit(word, 11),
            z: bit(word, 10),
            p: bit(word, 9),
            offset: signed(word, 8, 0),
        },
        Opcode::Add => Instruction::Add {
            dr: reg(word, 11, 9),
            sr1: reg(word, 8, 6),
            operand: operand(word),
        },
        Opcode::And => Instruction::And {
            dr: reg(word, 11, 9),
            sr1: reg(word, 8, 6),
            operand: operand(word),
        },
        Opcode::Not => Instruction::Not {
            dr: reg(word, 11, 9),
            sr: reg(word, 8, 6),
        },
        Opcode::Ld => Instruction::Ld { dr: reg(word, 11, 9), offset: signed(word, 8, 0) },
        Opcode::Ldi => Instruction::Ldi { dr: reg(word, 11, 9), offset: signed(word, 8, 0) },
        Opcode::Lea => Instruction::Lea { dr: reg(word, 11, 9), offset: signed(word, 8, 0) },
        Opcode::Ldr => Instruction::Ldr {
            dr: reg(word, 11, 9),
            base: reg(word, 8, 6),
            offset: signed(word, 5, 0),
        },
        Opcode::St => Instruction::St { sr: reg(word, 11, 9), offset: signed(word, 8, 0) },
        Opcode::Sti => Instruction::Sti { sr: reg(word, 11, 9), offset: signed(word, 8, 0) },
        Opcode::Str => Instruction::Str {
            sr: reg(word, 11, 9),
            base: reg(word, 8, 6),
            offset: signed(word, 5, 0),
        },
        Opcode::Jmp => Instruction::Jmp { base: reg(word, 8, 6) },
        Opcode::Jsr => Instruction::Jsr {
            target: if bit(word, 11) {
                JsrTarget::Offset(signed(word, 10, 0))
            } else {
                JsrTarget::Register(reg(word, 8, 6))
            },
        },
        Opcode::Trap => Instruction::Trap { vector: extract(word, 7, 0) as u8 },
        Opcode::Rti => Instruction::Rti,
        Opcode::Res => Instruction::Res,
    }
}

/// Encode an instruction back to a 16-bit word.
///
/// Offsets and immediates are truncated to their field width.
pub fn encode(instr: &Instruction) -> u16 {
    let op = (instr.opcode() as u16) << 12;
    let r = |index: u8, shift: u16| (u16::from(index) & 0x7) << shift;
    let field = |value: i16, width: u16| (value as u16) & ((1 << width) - 1);
    let flag = |set: bool, shift: u16| u16::from(set) << shift;
    let second = |operand: &Operand| match *operand {
        Operand::Register(sr2) => r(sr2, 0),
        Operand::Immediate(imm) => (1 << 5) | field(imm, 5),
    };

    let rest = match instr {
        Instruction::Br { n, z, p, offset } => {
            flag(*n, 11) | flag(*z, 10) | flag(*p, 9) | field(*offset, 9)
        }
        Instruction::Jmp { base } => r(*base, 6),
        Instruction::Jsr { target: JsrTarget::Offset(offset) } => (1 << 11) | field(*offset, 11),
        Instruction::Jsr { target: JsrTarget::Register(base) } => r(*base, 6),
        Instruction::Trap { vector } => u16::from(*vector),
        Instruction::Add { dr, sr1, operand: op2 } | Instruction::And { dr, sr1, operand: op2 } => {
            r(*dr, 9) | r(*sr1, 6) | second(op2)
        }
        // Bits [5:0] of NOT are all ones
        Instruction::Not { dr, sr } => r(*dr, 9) | r(*sr, 6) | 0x3F,
        Instruction::Ld { dr, offset }
        | Instruction::Ldi { dr, offset }
        | Instruction::Lea { dr, offset } => r(*dr, 9) | field(*offset, 9),
        Instruction::St { sr, offset } | Instruction::Sti { sr, offset } => {
            r(*sr, 9) | field(*offset, 9)
        }
        Instruction::Ldr { dr: reg, base, offset } | Instruction::Str { sr: reg, base, offset } => {
            r(*reg, 9) | r(*base, 6) | field(*offset, 6)
        }
        Instruction::Rti | Instruction::Res => 0,
    };

    op | rest
}
