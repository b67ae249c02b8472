//! Multipart body writer.

use std::io::{self, Write};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;

use crate::generator::headers::write_headers;
use crate::model::Headers;

/// Random bytes behind each boundary.
const BOUNDARY_ENTROPY: usize = 33;

/// A fresh boundary: URL-safe base64 of random bytes, which stays within
/// the token characters and never needs quoting.
pub fn random_boundary() -> String {
    let mut raw = [0u8; BOUNDARY_ENTROPY];
    rand::thread_rng().fill_bytes(&mut raw);
    URL_SAFE_NO_PAD.encode(raw)
}

/// Writes delimiters and part headers around part bodies.
///
/// The line break before each delimiter belongs to the delimiter, so a
/// part body is reproduced exactly, trailing newline or not.
pub struct PartWriter<'w> {
    w: &'w mut dyn Write,
    boundary: String,
    parts: usize,
}

impl<'w> PartWriter<'w> {
    pub fn new(w: &'w mut dyn Write, boundary: impl Into<String>) -> Self {
        Self {
            w,
            boundary: boundary.into(),
            parts: 0,
        }
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// Start a part: delimiter, headers, blank line. The body follows
    /// through [`writer`](PartWriter::writer).
    pub fn create_part(&mut self, headers: &Headers) -> io::Result<()> {
        if self.parts > 0 {
            self.w.write_all(b"\n")?;
        }
        writeln!(self.w, "--{}", self.boundary)?;
        write_headers(&mut *self.w, headers)?;
        self.w.write_all(b"\n")?;
        self.parts += 1;
        Ok(())
    }

    /// Sink for the current part's body.
    pub fn writer(&mut self) -> &mut dyn Write {
        &mut *self.w
    }

    /// Write the closing delimiter.
    pub fn close(self) -> io::Result<()> {
        if self.parts > 0 {
            self.w.write_all(b"\n")?;
        }
        writeln!(self.w, "--{}--", self.boundary)
    }
}
