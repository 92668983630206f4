//! LC-3 memory subsystem.
//!
//! 65,536 sixteen-bit words, one per address. A few addresses near the top
//! of the space are device registers rather than storage:
//!
//! - `0xFE00` KBSR: keyboard status, bit 15 set when a key is ready
//! - `0xFE02` KBDR: keyboard data, the last latched character
//! - `0xFFFF`: incremented once per executed instruction

use crate::io::Input;
use std::io;

/// The number of addressable words.
pub const MEMORY_SIZE: usize = 1 << 16;

/// Keyboard status register.
pub const KBSR: u16 = 0xFE00;

/// Keyboard data register.
pub const KBDR: u16 = 0xFE02;

/// Free-running instruction counter.
pub const CYCLE_COUNTER: u16 = 0xFFFF;

/// KBSR bit reporting a character is ready.
const KEY_READY: u16 = 1 << 15;

/// LC-3 main memory.
#[derive(Clone, PartialEq, Eq)]
pub struct Memory {
    cells: Vec<u16>,
}

impl Memory {
    /// Create a new memory with all cells zeroed.
    pub fn new() -> Self {
        Self {
            cells: vec![0; MEMORY_SIZE],
        }
    }

    /// Read a cell as plain storage, without device side effects.
    #[inline]
    pub fn read(&self, addr: u16) -> u16 {
        self.cells[usize::from(addr)]
    }

    /// Write a cell.
    #[inline]
    pub fn write(&mut self, addr: u16, value: u16) {
        self.cells[usize::from(addr)] = value;
    }

    /// Read a word the way a load instruction sees it.
    ///
    /// Reading KBSR asks `input` whether a key is ready. A ready key is
    /// latched into KBDR and reported by setting bit 15.
    pub fn read_word<I: Input + ?Sized>(&mut self, addr: u16, input: &mut I) -> io::Result<u16> {
        if addr == KBSR {
            match input.poll_char()? {
                Some(ch) => {
                    self.write(KBSR, KEY_READY);
                    self.write(KBDR, u16::from(ch));
                }
                None => self.write(KBSR, 0),
            }
        }
        Ok(self.read(addr))
    }

    /// Write a word the way a store instruction does.
    #[inline]
    pub fn write_word(&mut self, addr: u16, value: u16) {
        self.write(addr, value);
    }

    /// Advance the memory-mapped instruction counter.
    pub fn tick(&mut self) {
        let count = self.read(CYCLE_COUNTER).wrapping_add(1);
        self.write(CYCLE_COUNTER, count);
    }

    /// Copy a program into memory starting at `origin`.
    pub fn load_program(&mut self, origin: u16, program: &[u16]) -> Result<(), MemoryError> {
        let start = usize::from(origin);
        if start + program.len() > MEMORY_SIZE {
            return Err(MemoryError::ProgramTooLarge {
                origin,
                size: program.len(),
            });
        }

        self.cells[start..start + program.len()].copy_from_slice(program);
        Ok(())
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Memory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Only count non-zero cells
        let non_zero = self.cells.iter().filter(|&&cell| cell != 0).count();

        f.debug_struct("Memory")
            .field("non_zero_cells", &non_zero)
            .field("total_cells", &MEMORY_SIZE)
            .finish()
    }
}

/// Errors that can occur during memory operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoryError {
    /// Program runs past the top of memory.
    ProgramTooLarge { origin: u16, size: usize },
}

impl std::fmt::Display for MemoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MemoryError::ProgramTooLarge { origin, size } => {
                write!(
                    f,
                    "program of {} words at {:#06x} runs past the end of memory",
                    size, origin
                )
            }
        }
    }
}

impl std::error::Error for MemoryError {}
