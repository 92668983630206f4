//! Character I/O collaborators for the trap routines and keyboard device.
//!
//! The CPU never touches a terminal directly. Anything implementing
//! [`Input`] and [`Output`] can be handed to [`Cpu::step`](crate::Cpu::step)
//! and [`Cpu::run`](crate::Cpu::run).

use std::io::{self, Read, Write};

/// Source of keyboard characters.
pub trait Input {
    /// Block until a character is available and return it.
    fn read_char(&mut self) -> io::Result<u8>;

    /// Return a character if one is ready.
    ///
    /// A character returned here is consumed; the caller latches it.
    fn poll_char(&mut self) -> io::Result<Option<u8>>;
}

/// Sink for display characters.
pub trait Output {
    fn write_char(&mut self, ch: u8) -> io::Result<()>;

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Both halves of a console.
pub trait Console: Input + Output {}

impl<T: Input + Output> Console for T {}

/// A console over any byte reader and writer.
///
/// Used for piped stdin/stdout and, with a byte slice and a `Vec<u8>`, for
/// driving programs deterministically in tests.
///
/// A stream cannot be polled without blocking, so `poll_char` waits for the
/// next byte. End of input polls as "not ready" and fails a blocking read
/// with `UnexpectedEof`.
pub struct StreamConsole<R, W> {
    reader: R,
    writer: W,
}

impl<R: Read, W: Write> StreamConsole<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader,
            writer,
        }
    }

    /// The output sink.
    pub fn writer(&self) -> &W {
        &self.writer
    }

    fn next_byte(&mut self) -> io::Result<Option<u8>> {
        let mut buf = [0u8; 1];
        loop {
            match self.reader.read(&mut buf) {
                Ok(0) => return Ok(None),
                Ok(_) => return Ok(Some(buf[0])),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }
}

impl<R: Read, W: Write> Input for StreamConsole<R, W> {
    fn read_char(&mut self) -> io::Result<u8> {
        self.next_byte()?.ok_or_else(|| {
            io::Error::new(io::ErrorKind::UnexpectedEof, "end of input")
        })
    }

    fn poll_char(&mut self) -> io::Result<Option<u8>> {
        self.next_byte()
    }
}

impl<R: Read, W: Write> Output for StreamConsole<R, W> {
    fn write_char(&mut self, ch: u8) -> io::Result<()> {
        self.writer.write_all(&[ch])
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}
