//! Streaming multipart body reader.

use std::io::{self, BufRead, Read};

use crate::error::{NewsError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Preamble,
    InPart,
    /// Current part ended at a delimiter; `true` if it was the closing one.
    PartEnded(bool),
    Done,
}

/// Splits a multipart body into its parts.
///
/// Works line by line: each line's terminator is held back until the next
/// line is known not to be a delimiter, since the line break before a
/// delimiter belongs to the delimiter. The reader itself yields the
/// current part's raw content (headers included); call [`next_part`]
/// to advance.
///
/// [`next_part`]: PartReader::next_part
pub struct PartReader<'a> {
    inner: &'a mut dyn BufRead,
    dash_boundary: Vec<u8>,
    state: State,
    buf: Vec<u8>,
    pos: usize,
    pending_nl: Vec<u8>,
    line: Vec<u8>,
}

impl<'a> PartReader<'a> {
    pub fn new(inner: &'a mut dyn BufRead, boundary: &str) -> Self {
        let mut dash_boundary = Vec::with_capacity(boundary.len() + 2);
        dash_boundary.extend_from_slice(b"--");
        dash_boundary.extend_from_slice(boundary.as_bytes());
        Self {
            inner,
            dash_boundary,
            state: State::Preamble,
            buf: Vec::new(),
            pos: 0,
            pending_nl: Vec::new(),
            line: Vec::new(),
        }
    }

    /// Advance to the next part, skipping whatever is left of the current
    /// one (or the preamble). Returns `false` after the closing delimiter.
    pub fn next_part(&mut self) -> Result<bool> {
        match self.state {
            State::Done => return Ok(false),
            State::Preamble => loop {
                self.line.clear();
                if self.inner.read_until(b'\n', &mut self.line)? == 0 {
                    return Err(NewsError::Multipart("no boundary found".into()));
                }
                match self.delimiter_kind() {
                    Some(true) => {
                        self.state = State::Done;
                        return Ok(false);
                    }
                    Some(false) => break,
                    None => {}
                }
            },
            State::InPart => {
                io::copy(self, &mut io::sink())?;
                return self.next_part();
            }
            State::PartEnded(true) => {
                self.state = State::Done;
                return Ok(false);
            }
            State::PartEnded(false) => {}
        }
        self.state = State::InPart;
        self.buf.clear();
        self.pos = 0;
        self.pending_nl.clear();
        Ok(true)
    }

    /// `Some(close)` if the buffered line is a delimiter line.
    fn delimiter_kind(&self) -> Option<bool> {
        let rest = self.line.strip_prefix(self.dash_boundary.as_slice())?;
        let (close, rest) = match rest.strip_prefix(b"--") {
            Some(r) => (true, r),
            None => (false, rest),
        };
        rest.iter()
            .all(|b| matches!(b, b' ' | b'\t' | b'\r' | b'\n'))
            .then_some(close)
    }

    fn refill(&mut self) -> io::Result<()> {
        self.buf.clear();
        self.pos = 0;
        while self.state == State::InPart && self.buf.is_empty() {
            self.line.clear();
            if self.inner.read_until(b'\n', &mut self.line)? == 0 {
                return Err(NewsError::Multipart("unexpected end of multipart body".into()).into());
            }
            if let Some(close) = self.delimiter_kind() {
                self.pending_nl.clear();
                self.state = State::PartEnded(close);
                break;
            }
            let body_len = if self.line.ends_with(b"\r\n") {
                self.line.len() - 2
            } else if self.line.ends_with(b"\n") {
                self.line.len() - 1
            } else {
                self.line.len()
            };
            self.buf.append(&mut self.pending_nl);
            self.buf.extend_from_slice(&self.line[..body_len]);
            self.pending_nl.extend_from_slice(&self.line[body_len..]);
        }
        Ok(())
    }
}

impl Read for PartReader<'_> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        let available = self.fill_buf()?;
        let n = available.len().min(out.len());
        out[..n].copy_from_slice(&available[..n]);
        self.consume(n);
        Ok(n)
    }
}

impl BufRead for PartReader<'_> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        if self.pos >= self.buf.len() && self.state == State::InPart {
            self.refill()?;
        }
        if self.state != State::InPart && self.pos >= self.buf.len() {
            return Ok(&[]);
        }
        Ok(&self.buf[self.pos..])
    }

    fn consume(&mut self, amt: usize) {
        self.pos = (self.pos + amt).min(self.buf.len());
    }
}
