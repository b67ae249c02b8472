//! Text handling for inline messages: newline normalization and the
//! charset acceptance policy.

use std::io::{self, Read};

use crate::config::ProcessorConfig;

/// Strips every `\r` and makes non-empty text end with `\n`.
pub struct UnixTextReader<R> {
    inner: R,
    mid_line: bool,
}

impl<R: Read> UnixTextReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            mid_line: false,
        }
    }
}

impl<R: Read> Read for UnixTextReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            let n = self.inner.read(buf)?;
            if n == 0 {
                if self.mid_line {
                    self.mid_line = false;
                    buf[0] = b'\n';
                    return Ok(1);
                }
                return Ok(0);
            }
            let mut kept = 0;
            for i in 0..n {
                let b = buf[i];
                if b != b'\r' {
                    buf[kept] = b;
                    kept += 1;
                }
            }
            if kept > 0 {
                self.mid_line = buf[kept - 1] != b'\n';
                return Ok(kept);
            }
        }
    }
}

/// Outcome of running the charset policy over a candidate inline text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextDecision {
    /// Accepted as-is; becomes the inline message.
    Inline(String),
    /// Transcoded to UTF-8; the text is shown inline but the original part
    /// must also be kept as an attachment.
    Converted(String),
    /// Not usable as text; keep as an attachment only.
    Keep,
}

/// Decide how a fully read text part (already newline-normalized unless
/// `binary`) is treated.
///
/// Text is accepted when it validates as UTF-8 under a UTF-8/US-ASCII
/// (or, with `try_utf8`, undeclared) charset, or when an ASCII-compatible
/// 8-bit charset is declared but the text is 7-bit clean. Otherwise an
/// attempt is made to transcode from the declared charset, or from
/// `empty_charset` when none was declared. NUL bytes rule out inline use.
pub fn decide_text(data: &[u8], binary: bool, charset: &str, cfg: &ProcessorConfig) -> TextDecision {
    let utf8_or_ascii =
        charset.eq_ignore_ascii_case("UTF-8") || charset.eq_ignore_ascii_case("US-ASCII");

    let mut charset = charset.to_string();
    if !data.contains(&0) {
        let expect_utf8 = utf8_or_ascii || (charset.is_empty() && cfg.try_utf8);
        let ascii_family = charset.is_empty()
            || starts_with_ignore_case(&charset, "ISO-8859-")
            || starts_with_ignore_case(&charset, "Windows-")
            || starts_with_ignore_case(&charset, "KOI8-");

        let accepted = if expect_utf8 {
            std::str::from_utf8(data).ok()
        } else if ascii_family && data.is_ascii() {
            std::str::from_utf8(data).ok()
        } else {
            None
        };
        if let Some(text) = accepted {
            let text = if binary { text } else { trim_unix_nl(text) };
            return TextDecision::Inline(text.to_string());
        }
        if charset.is_empty() {
            charset = cfg.empty_charset.clone();
        }
    }

    if charset.is_empty() || utf8_or_ascii {
        return TextDecision::Keep;
    }
    let Some(encoding) = encoding_rs::Encoding::for_label(charset.as_bytes()) else {
        tracing::debug!(charset = %charset, "Unknown charset in text part");
        return TextDecision::Keep;
    };
    match encoding.decode_without_bom_handling_and_without_replacement(data) {
        Some(decoded) if !decoded.contains('\0') => {
            TextDecision::Converted(normalize_text_message(&decoded))
        }
        _ => TextDecision::Keep,
    }
}

/// Remove a single trailing `\n`.
pub fn trim_unix_nl(s: &str) -> &str {
    s.strip_suffix('\n').unwrap_or(s)
}

/// Trim trailing whitespace on every line and drop trailing empty lines.
pub fn normalize_text_message(msg: &str) -> String {
    let mut lines: Vec<&str> = msg.split('\n').map(str::trim_end).collect();
    while lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }
    lines.join("\n")
}

fn starts_with_ignore_case(s: &str, prefix: &str) -> bool {
    s.len() >= prefix.len()
        && s.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
}
