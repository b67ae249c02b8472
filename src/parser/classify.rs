//! Pass-through reader that notes NUL and 8-bit bytes.

use std::io::{self, Read};

/// Records, while content flows through, whether any NUL byte or any
/// byte ≥ 0x80 was seen. Nothing is buffered.
pub struct ByteClassifier<R> {
    inner: R,
    saw_null: bool,
    saw_high: bool,
}

impl<R: Read> ByteClassifier<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            saw_null: false,
            saw_high: false,
        }
    }

    pub fn has_null(&self) -> bool {
        self.saw_null
    }

    /// 8-bit content without NULs; NULs already force quoted-printable.
    pub fn has_8bit(&self) -> bool {
        self.saw_high && !self.saw_null
    }
}

impl<R: Read> Read for ByteClassifier<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        for &b in &buf[..n] {
            if b == 0 {
                self.saw_null = true;
            } else if b >= 0x80 {
                self.saw_high = true;
            }
        }
        Ok(n)
    }
}
