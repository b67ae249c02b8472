//! NNTP multi-line block encoding (RFC 3977 §3.1.1).

use std::io::{self, Write};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    BeginLine,
    Data,
    Cr,
}

/// Converts LF line endings to CRLF, doubles leading dots and writes the
/// terminating `.` line.
///
/// The encoder keeps its line state between calls, so one block may be
/// fed from several sources in sequence.
#[derive(Debug, Clone)]
pub struct DotEncoder {
    state: State,
    scratch: Vec<u8>,
}

impl Default for DotEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl DotEncoder {
    pub fn new() -> Self {
        Self {
            state: State::BeginLine,
            scratch: Vec::new(),
        }
    }

    /// Encode `data` into `out`.
    pub fn write(&mut self, out: &mut dyn Write, data: &[u8]) -> io::Result<()> {
        self.scratch.clear();
        self.scratch.reserve(data.len() + data.len() / 32 + 2);
        for &b in data {
            if self.state == State::BeginLine && b == b'.' {
                self.scratch.push(b'.');
            }
            match b {
                b'\n' => {
                    if self.state != State::Cr {
                        self.scratch.push(b'\r');
                    }
                    self.scratch.push(b'\n');
                    self.state = State::BeginLine;
                }
                b'\r' => {
                    self.scratch.push(b'\r');
                    self.state = State::Cr;
                }
                _ => {
                    self.scratch.push(b);
                    self.state = State::Data;
                }
            }
        }
        out.write_all(&self.scratch)
    }

    /// Terminate an unfinished line and write the `.` line.
    pub fn finish(self, out: &mut dyn Write) -> io::Result<()> {
        match self.state {
            State::BeginLine => {}
            State::Data => out.write_all(b"\r\n")?,
            State::Cr => out.write_all(b"\n")?,
        }
        out.write_all(b".\r\n")
    }
}
