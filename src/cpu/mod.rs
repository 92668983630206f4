//! CPU emulation for the LC-3.
//!
//! This module implements the LC-3 architecture:
//! - 65,536 sixteen-bit words of memory with memory-mapped keyboard registers
//! - 8 general purpose registers, PC, and N/Z/P condition flags
//! - 16-opcode instruction set with trap-based character I/O

pub mod bits;
pub mod memory;
pub mod registers;
pub mod decode;
pub mod execute;
pub mod trap;

pub use memory::{Memory, MemoryError};
pub use registers::{Condition, Registers};
pub use decode::{Instruction, Opcode};
pub use execute::{Cpu, CpuError, CpuState, MachineReport};
pub use trap::TrapVector;
