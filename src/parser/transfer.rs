//! Content-Transfer-Encoding decoding for inbound parts.

use std::io::{self, BufRead, BufReader, Read};

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};

use crate::error::{NewsError, Result};

/// Standard alphabet, padding optional, trailing bits tolerated.
pub(crate) static LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

/// Wrap `r` in the decoder for `cte`.
///
/// Returns the decoded stream and whether its content is binary.
/// Absent, `7bit` and `8bit` pass through. `base64` and
/// `quoted-printable` are refused on multipart entities. `binary` is
/// accepted only with `allow_binary`.
pub fn prepare_reader<'a, R: Read + 'a>(
    cte: &str,
    multipart: bool,
    allow_binary: bool,
    r: R,
) -> Result<(Box<dyn Read + 'a>, bool)> {
    let cte = cte.trim();
    if cte.is_empty() || cte.eq_ignore_ascii_case("7bit") || cte.eq_ignore_ascii_case("8bit") {
        Ok((Box::new(r), false))
    } else if cte.eq_ignore_ascii_case("base64") {
        if multipart {
            return Err(NewsError::EncodedMultipart("base64".into()));
        }
        let decoder =
            base64::read::DecoderReader::new(StripWhitespace::new(r), &LENIENT_BASE64);
        Ok((Box::new(decoder), true))
    } else if cte.eq_ignore_ascii_case("quoted-printable") {
        if multipart {
            return Err(NewsError::EncodedMultipart("quoted-printable".into()));
        }
        Ok((Box::new(QpReader::new(BufReader::new(r))), false))
    } else if cte.eq_ignore_ascii_case("binary") && allow_binary {
        Ok((Box::new(r), true))
    } else {
        Err(NewsError::UnsupportedEncoding(cte.to_string()))
    }
}

/// Decode two ASCII hex digits.
pub(crate) fn hex_pair(hi: Option<&u8>, lo: Option<&u8>) -> Option<u8> {
    let hi = (*hi? as char).to_digit(16)?;
    let lo = (*lo? as char).to_digit(16)?;
    Some((hi * 16 + lo) as u8)
}

/// Drops ASCII whitespace so line-wrapped base64 can be fed to a strict decoder.
pub struct StripWhitespace<R> {
    inner: R,
}

impl<R: Read> StripWhitespace<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }
}

impl<R: Read> Read for StripWhitespace<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            let n = self.inner.read(buf)?;
            if n == 0 {
                return Ok(0);
            }
            let mut kept = 0;
            for i in 0..n {
                let b = buf[i];
                if !b.is_ascii_whitespace() {
                    buf[kept] = b;
                    kept += 1;
                }
            }
            if kept > 0 {
                return Ok(kept);
            }
        }
    }
}

/// Quoted-printable decoder (RFC 2045 §6.7).
///
/// Transport padding before a line break is dropped, soft line breaks
/// are joined, hard line breaks are kept as they arrived. Malformed `=`
/// escapes pass through literally.
pub struct QpReader<R> {
    inner: R,
    line: Vec<u8>,
    out: Vec<u8>,
    pos: usize,
}

impl<R: BufRead> QpReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            line: Vec::new(),
            out: Vec::new(),
            pos: 0,
        }
    }

    /// Decode the next input line into `out`. Returns false at end of input.
    fn next_line(&mut self) -> io::Result<bool> {
        self.line.clear();
        self.out.clear();
        self.pos = 0;
        if self.inner.read_until(b'\n', &mut self.line)? == 0 {
            return Ok(false);
        }

        let mut content: &[u8] = &self.line;
        let mut ending: &[u8] = b"";
        if let Some(stripped) = content.strip_suffix(b"\r\n") {
            content = stripped;
            ending = b"\r\n";
        } else if let Some(stripped) = content.strip_suffix(b"\n") {
            content = stripped;
            ending = b"\n";
        }
        while let [rest @ .., b' ' | b'\t'] = content {
            content = rest;
        }
        let soft = content.last() == Some(&b'=');
        if soft {
            content = &content[..content.len() - 1];
        }

        let mut i = 0;
        while i < content.len() {
            if content[i] == b'=' {
                if let Some(b) = hex_pair(content.get(i + 1), content.get(i + 2)) {
                    self.out.push(b);
                    i += 3;
                    continue;
                }
            }
            self.out.push(content[i]);
            i += 1;
        }
        if !soft {
            self.out.extend_from_slice(ending);
        }
        Ok(true)
    }
}

impl<R: BufRead> Read for QpReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        while self.pos >= self.out.len() {
            if !self.next_line()? {
                return Ok(0);
            }
        }
        let n = buf.len().min(self.out.len() - self.pos);
        buf[..n].copy_from_slice(&self.out[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}
