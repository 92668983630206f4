//! # LC-3 Emulator
//!
//! An emulator of the LC-3, a 16-bit word-addressed teaching computer.
//!
//! The machine is a plain value: build a [`Cpu`], load a program image into
//! it, and drive it with [`Cpu::step`] or [`Cpu::run`], passing in whatever
//! [`Console`] should service the keyboard and display.

pub mod cpu;
pub mod image;
pub mod io;

#[cfg(feature = "term")]
pub mod term;

// Re-export commonly used types
pub use cpu::{Cpu, CpuState, CpuError, Memory, Registers, Instruction, MachineReport};
pub use image::{ProgramImage, ImageError, load_image};
pub use io::{Console, Input, Output, StreamConsole};

#[cfg(feature = "term")]
pub use term::TerminalConsole;
