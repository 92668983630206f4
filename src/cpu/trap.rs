//! Trap service routines.
//!
//! `TRAP` goes straight to a host-side routine here instead of jumping
//! through the trap vector table in low memory. R7 is not touched.

use crate::cpu::execute::{Cpu, CpuError, CpuState};
use crate::io::Console;
use tracing::{debug, info};

/// Prompt printed by the IN routine.
pub const IN_PROMPT: &str = "Enter a character: ";

/// The built-in trap routines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrapVector {
    /// Read one character into R0, no echo
    Getc = 0x20,
    /// Write the character in R0
    Out = 0x21,
    /// Write the string of one-character words at R0
    Puts = 0x22,
    /// Prompt, then read and echo one character into R0
    In = 0x23,
    /// Write the string of two-character words at R0
    Putsp = 0x24,
    /// Stop the machine
    Halt = 0x25,
}

impl TryFrom<u8> for TrapVector {
    type Error = u8;

    fn try_from(vector: u8) -> Result<Self, Self::Error> {
        match vector {
            0x20 => Ok(TrapVector::Getc),
            0x21 => Ok(TrapVector::Out),
            0x22 => Ok(TrapVector::Puts),
            0x23 => Ok(TrapVector::In),
            0x24 => Ok(TrapVector::Putsp),
            0x25 => Ok(TrapVector::Halt),
            other => Err(other),
        }
    }
}

impl Cpu {
    /// Run the service routine for `vector`.
    ///
    /// `address` and `word` locate the TRAP instruction for error reporting.
    pub(crate) fn trap(
        &mut self,
        vector: u8,
        address: u16,
        word: u16,
        console: &mut dyn Console,
    ) -> Result<(), CpuError> {
        let routine = TrapVector::try_from(vector)
            .map_err(|vector| CpuError::UnimplementedTrap { vector, address, word })?;
        debug!("{:#06x}: trap {:?}", address, routine);

        match routine {
            TrapVector::Getc => {
                let ch = console.read_char()?;
                self.regs.set(0, u16::from(ch));
            }

            TrapVector::Out => {
                console.write_char(self.regs.get(0) as u8)?;
                console.flush()?;
            }

            TrapVector::Puts => {
                let mut addr = self.regs.get(0);
                loop {
                    let word = self.mem.read(addr);
                    if word == 0 {
                        break;
                    }
                    console.write_char(word as u8)?;
                    addr = addr.wrapping_add(1);
                }
                console.flush()?;
            }

            TrapVector::In => {
                for &ch in IN_PROMPT.as_bytes() {
                    console.write_char(ch)?;
                }
                console.flush()?;

                let ch = console.read_char()?;
                console.write_char(ch)?;
                console.flush()?;
                self.regs.set(0, u16::from(ch));
            }

            TrapVector::Putsp => {
                let mut addr = self.regs.get(0);
                'words: loop {
                    let word = self.mem.read(addr);
                    // Low byte first; a zero byte ends the string
                    for ch in [word as u8, (word >> 8) as u8] {
                        if ch == 0 {
                            break 'words;
                        }
                        console.write_char(ch)?;
                    }
                    addr = addr.wrapping_add(1);
                }
                console.flush()?;
            }

            TrapVector::Halt => {
                info!("HALT at {:#06x}", address);
                self.state = CpuState::Stopped;
            }
        }

        Ok(())
    }
}
