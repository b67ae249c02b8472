//! Outbound transfer encoders.

use std::io::{self, Write};

use base64::engine::general_purpose::STANDARD;
use base64::engine::GeneralPurpose;
use base64::write::EncoderWriter;

use crate::model::PartInfo;
use crate::parser::text::UnixTextReader;

/// Line width for base64 bodies.
pub const BASE64_LINE_WIDTH: usize = 76;

/// Longest quoted-printable line, soft break included (RFC 2045 §6.7).
const QP_LINE_WIDTH: usize = 76;

/// Transfer encoding chosen for a leaf part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferEncoding {
    /// 7-bit clean; no header.
    Plain,
    /// Raw 8-bit content, declared.
    EightBit,
    QuotedPrintable,
    Base64,
}

impl TransferEncoding {
    /// Pick the encoding from the flags recorded at decode time.
    ///
    /// Binary wins over NUL, NUL over 8-bit.
    pub fn for_part(part: &PartInfo) -> Self {
        if part.binary {
            Self::Base64
        } else if part.has_null {
            Self::QuotedPrintable
        } else if part.has_8bit {
            Self::EightBit
        } else {
            Self::Plain
        }
    }

    /// `Content-Transfer-Encoding` value, if one is written.
    pub fn header_value(self) -> Option<&'static str> {
        match self {
            Self::Plain => None,
            Self::EightBit => Some("8bit"),
            Self::QuotedPrintable => Some("quoted-printable"),
            Self::Base64 => Some("base64"),
        }
    }
}

/// Inserts a line break after every `width` bytes.
pub struct LineSplitWriter<W: Write> {
    inner: W,
    width: usize,
    col: usize,
}

impl<W: Write> LineSplitWriter<W> {
    pub fn new(inner: W, width: usize) -> Self {
        Self {
            inner,
            width,
            col: 0,
        }
    }

    /// Terminate a partial last line.
    pub fn finish(mut self) -> io::Result<W> {
        if self.col > 0 {
            self.inner.write_all(b"\n")?;
            self.col = 0;
        }
        Ok(self.inner)
    }
}

impl<W: Write> Write for LineSplitWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut rest = buf;
        while !rest.is_empty() {
            let n = rest.len().min(self.width - self.col);
            self.inner.write_all(&rest[..n])?;
            self.col += n;
            rest = &rest[n..];
            if self.col == self.width {
                self.inner.write_all(b"\n")?;
                self.col = 0;
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Quoted-printable encoder with LF hard line breaks.
///
/// `=`, control bytes other than tab, bytes ≥ 0x7F and whitespace at the
/// end of a line are escaped.
pub struct QpWriter<W: Write> {
    inner: W,
    line_len: usize,
    pending_ws: Option<u8>,
}

impl<W: Write> QpWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            line_len: 0,
            pending_ws: None,
        }
    }

    fn emit(&mut self, chunk: &[u8]) -> io::Result<()> {
        if self.line_len + chunk.len() > QP_LINE_WIDTH - 1 {
            self.inner.write_all(b"=\n")?;
            self.line_len = 0;
        }
        self.inner.write_all(chunk)?;
        self.line_len += chunk.len();
        Ok(())
    }

    fn emit_escaped(&mut self, b: u8) -> io::Result<()> {
        let escaped = format!("={b:02X}");
        self.emit(escaped.as_bytes())
    }

    pub fn finish(mut self) -> io::Result<W> {
        if let Some(ws) = self.pending_ws.take() {
            self.emit_escaped(ws)?;
        }
        Ok(self.inner)
    }
}

impl<W: Write> Write for QpWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        for &b in buf {
            if let Some(ws) = self.pending_ws.take() {
                if b == b'\n' {
                    self.emit_escaped(ws)?;
                } else {
                    self.emit(&[ws])?;
                }
            }
            match b {
                b'\n' => {
                    self.inner.write_all(b"\n")?;
                    self.line_len = 0;
                }
                b' ' | b'\t' => self.pending_ws = Some(b),
                b'=' | 0x00..=0x1f | 0x7f..=0xff => self.emit_escaped(b)?,
                _ => self.emit(&[b])?,
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Body writer applying one transfer encoding.
pub enum ContentWriter<'w> {
    Plain(&'w mut dyn Write),
    Base64(EncoderWriter<'static, GeneralPurpose, LineSplitWriter<&'w mut dyn Write>>),
    QuotedPrintable(QpWriter<&'w mut dyn Write>),
}

impl<'w> ContentWriter<'w> {
    pub fn new(w: &'w mut dyn Write, encoding: TransferEncoding) -> Self {
        match encoding {
            TransferEncoding::Plain | TransferEncoding::EightBit => Self::Plain(w),
            TransferEncoding::Base64 => Self::Base64(EncoderWriter::new(
                LineSplitWriter::new(w, BASE64_LINE_WIDTH),
                &STANDARD,
            )),
            TransferEncoding::QuotedPrintable => Self::QuotedPrintable(QpWriter::new(w)),
        }
    }

    /// Flush encoder state (base64 padding, pending whitespace).
    pub fn finish(self) -> io::Result<()> {
        match self {
            Self::Plain(_) => Ok(()),
            Self::Base64(mut enc) => {
                enc.finish()?.finish()?;
                Ok(())
            }
            Self::QuotedPrintable(qp) => {
                qp.finish()?;
                Ok(())
            }
        }
    }
}

impl Write for ContentWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Plain(w) => w.write(buf),
            Self::Base64(w) => w.write(buf),
            Self::QuotedPrintable(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Plain(w) => w.flush(),
            Self::Base64(w) => w.flush(),
            Self::QuotedPrintable(w) => w.flush(),
        }
    }
}

/// Copy text content with LF line endings and a final newline.
pub fn copy_text(src: &mut dyn io::Read, dst: &mut dyn Write) -> io::Result<u64> {
    io::copy(&mut UnixTextReader::new(src), dst)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::transfer::prepare_reader;
    use std::io::Read;

    fn encode(encoding: TransferEncoding, data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        let mut w = ContentWriter::new(&mut out, encoding);
        w.write_all(data).unwrap();
        w.finish().unwrap();
        out
    }

    fn decode(cte: &str, data: &[u8]) -> Vec<u8> {
        let (mut r, _) = prepare_reader(cte, false, false, data).unwrap();
        let mut out = Vec::new();
        r.read_to_end(&mut out).unwrap();
        out
    }

    #[test]
    fn test_selection_order() {
        let mut part = PartInfo {
            binary: true,
            has_null: true,
            has_8bit: true,
            ..PartInfo::default()
        };
        assert_eq!(TransferEncoding::for_part(&part), TransferEncoding::Base64);
        part.binary = false;
        assert_eq!(TransferEncoding::for_part(&part), TransferEncoding::QuotedPrintable);
        part.has_null = false;
        assert_eq!(TransferEncoding::for_part(&part), TransferEncoding::EightBit);
        part.has_8bit = false;
        assert_eq!(TransferEncoding::for_part(&part), TransferEncoding::Plain);
        assert_eq!(TransferEncoding::Plain.header_value(), None);
    }

    #[test]
    fn test_base64_wrapped() {
        let data: Vec<u8> = (0..=255u8).collect();
        let out = encode(TransferEncoding::Base64, &data);
        let text = std::str::from_utf8(&out).unwrap();
        assert!(text.ends_with('\n'));
        assert!(text.lines().all(|l| l.len() <= BASE64_LINE_WIDTH));
        assert_eq!(text.lines().next().unwrap().len(), BASE64_LINE_WIDTH);
        assert_eq!(decode("base64", &out), data);
    }

    #[test]
    fn test_line_split_exact_multiple() {
        let mut out = Vec::new();
        let mut w = LineSplitWriter::new(&mut out, 4);
        w.write_all(b"abcdefgh").unwrap();
        w.finish().unwrap();
        assert_eq!(out, b"abcd\nefgh\n");
    }

    #[test]
    fn test_qp_escapes() {
        let out = encode(TransferEncoding::QuotedPrintable, b"a=b\0c \nend\t");
        assert_eq!(out, b"a=3Db=00c=20\nend=09");
        assert_eq!(decode("quoted-printable", &out), b"a=b\0c \nend\t");
    }

    #[test]
    fn test_qp_soft_breaks() {
        let data = vec![b'x'; 200];
        let out = encode(TransferEncoding::QuotedPrintable, &data);
        let text = std::str::from_utf8(&out).unwrap();
        assert!(text.lines().all(|l| l.len() <= 76));
        assert_eq!(decode("quoted-printable", &out), data);
    }

    #[test]
    fn test_qp_roundtrip_binaryish() {
        let data: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
        let out = encode(TransferEncoding::QuotedPrintable, &data);
        assert_eq!(decode("quoted-printable", &out), data);
    }

    #[test]
    fn test_copy_text() {
        let mut out = Vec::new();
        copy_text(&mut &b"a\r\nb"[..], &mut out).unwrap();
        assert_eq!(out, b"a\nb\n");
    }
}
