//! Raw-mode terminal console.
//!
//! Keys are delivered one at a time without waiting for Enter, which is what
//! LC-3 programs polling the keyboard expect.

use crate::io::{Input, Output};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use std::io::{self, Stdout, Write};
use std::time::Duration;

/// Console on the controlling terminal.
///
/// Raw mode is on for as long as the console exists. Ctrl-C fails the read
/// with `Interrupted` so a runaway program can still be stopped.
pub struct TerminalConsole {
    stdout: Stdout,
}

impl TerminalConsole {
    pub fn new() -> io::Result<Self> {
        enable_raw_mode()?;
        Ok(Self { stdout: io::stdout() })
    }

    /// Wait up to `timeout` (forever if `None`) for a key press.
    fn next_key(&mut self, timeout: Option<Duration>) -> io::Result<Option<u8>> {
        loop {
            if let Some(timeout) = timeout {
                if !event::poll(timeout)? {
                    return Ok(None);
                }
            }

            if let Event::Key(key) = event::read()? {
                if let Some(ch) = key_to_ascii(key)? {
                    return Ok(Some(ch));
                }
            }
        }
    }
}

fn key_to_ascii(key: KeyEvent) -> io::Result<Option<u8>> {
    if key.kind != KeyEventKind::Press {
        return Ok(None);
    }

    let ch = match key.code {
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            return Err(io::Error::new(io::ErrorKind::Interrupted, "interrupted"));
        }
        KeyCode::Char(c) if c.is_ascii() => c as u8,
        KeyCode::Enter => b'\n',
        KeyCode::Tab => b'\t',
        KeyCode::Backspace => 0x08,
        KeyCode::Esc => 0x1B,
        _ => return Ok(None),
    };
    Ok(Some(ch))
}

impl Input for TerminalConsole {
    fn read_char(&mut self) -> io::Result<u8> {
        loop {
            if let Some(ch) = self.next_key(None)? {
                return Ok(ch);
            }
        }
    }

    fn poll_char(&mut self) -> io::Result<Option<u8>> {
        self.next_key(Some(Duration::ZERO))
    }
}

impl Output for TerminalConsole {
    fn write_char(&mut self, ch: u8) -> io::Result<()> {
        // Raw mode turns off output post-processing
        if ch == b'\n' {
            self.stdout.write_all(b"\r\n")
        } else {
            self.stdout.write_all(&[ch])
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stdout.flush()
    }
}

impl Drop for TerminalConsole {
    fn drop(&mut self) {
        let _ = self.stdout.flush();
        let _ = disable_raw_mode();
    }
}
