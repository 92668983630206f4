//! LC-3 CPU registers.
//!
//! The LC-3 has:
//! - R0-R7: eight 16-bit general purpose registers
//! - PC: 16-bit program counter
//! - COND: the N/Z/P condition flags

use serde::{Serialize, Deserialize};

/// Number of general purpose registers.
pub const REGISTER_COUNT: usize = 8;

/// Address execution starts from after a reset.
pub const PC_START: u16 = 0x3000;

/// The condition register.
///
/// After any instruction that writes a result register exactly one flag is
/// set, reflecting the sign of the result read as a two's-complement value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Condition {
    pub n: bool,
    pub z: bool,
    pub p: bool,
}

impl Condition {
    /// Flags describing `value`.
    pub fn from_value(value: u16) -> Self {
        let signed = value as i16;
        Self {
            n: signed < 0,
            z: signed == 0,
            p: signed > 0,
        }
    }

    /// Whether a branch with the given `nzp` mask is taken.
    pub fn matches(&self, n: bool, z: bool, p: bool) -> bool {
        (n && self.n) || (z && self.z) || (p && self.p)
    }
}

impl std::fmt::Display for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let flag = |set: bool, c: char| if set { c } else { '-' };
        write!(f, "{}{}{}", flag(self.n, 'n'), flag(self.z, 'z'), flag(self.p, 'p'))
    }
}

/// The LC-3 register file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registers {
    /// R0-R7
    pub r: [u16; REGISTER_COUNT],

    /// Program counter
    pub pc: u16,

    /// Condition flags
    pub cond: Condition,
}

impl Registers {
    /// Create a register file with every register zeroed and PC at [`PC_START`].
    pub fn new() -> Self {
        Self {
            r: [0; REGISTER_COUNT],
            pc: PC_START,
            cond: Condition::default(),
        }
    }

    /// Move PC back to [`PC_START`] and clear the condition flags.
    ///
    /// General purpose registers keep their contents.
    pub fn reset(&mut self) {
        self.pc = PC_START;
        self.cond = Condition::default();
    }

    /// Read a general purpose register.
    #[inline]
    pub fn get(&self, index: u8) -> u16 {
        self.r[usize::from(index)]
    }

    /// Write a general purpose register without touching the flags.
    #[inline]
    pub fn set(&mut self, index: u8, value: u16) {
        self.r[usize::from(index)] = value;
    }

    /// Update the condition flags from a result value.
    pub fn set_condition_codes(&mut self, value: u16) {
        self.cond = Condition::from_value(value);
    }

    /// Write a result register and update the condition flags from it.
    pub fn write_result(&mut self, index: u8, value: u16) {
        self.set(index, value);
        self.set_condition_codes(value);
    }
}

impl Default for Registers {
    fn default() -> Self {
        Self::new()
    }
}
