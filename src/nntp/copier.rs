//! Delivery of article bytes to an NNTP client as ARTICLE, HEAD, BODY or
//! STAT responses.

use std::io::{self, Read};

use crate::error::{NewsError, Result};
use crate::model::CoreMsgId;
use crate::nntp::dotwriter::DotEncoder;
use crate::nntp::responder::Responder;

/// Which response a request wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyMode {
    /// `ARTICLE`: headers and body.
    Full,
    /// `HEAD`: headers only.
    Head,
    /// `BODY`: body only.
    Body,
    /// `STAT`: existence only; no bytes are read.
    Stat,
}

/// Receiver of article bytes from the cache.
///
/// `copy_from` may be called more than once for one article when a live
/// stream is interrupted and delivery resumes from the promoted file; the
/// second source starts where the first stopped. The return value is the
/// number of bytes consumed from `src`.
pub trait ArticleDestination {
    fn copy_from(&mut self, src: &mut dyn Read, number: u64, msgid: &CoreMsgId) -> Result<u64>;

    /// Response this destination produces. `Stat` destinations are never
    /// given a source to read.
    fn copy_mode(&self) -> CopyMode {
        CopyMode::Full
    }
}

/// Position in the header/body scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scan {
    LineStart,
    MidLine,
    /// The blank line separating headers from body was seen.
    Separated,
}

/// Copies an article into an NNTP response.
///
/// The status line is written only once the first bytes of the article
/// have been read, so a request that fails immediately never starts a
/// response.
pub struct ArticleSink<R: Responder> {
    mode: CopyMode,
    responder: R,
    buffer_size: usize,
    dot: Option<DotEncoder>,
    scan: Scan,
}

impl<R: Responder> ArticleSink<R> {
    pub fn new(mode: CopyMode, responder: R) -> Self {
        Self {
            mode,
            responder,
            buffer_size: 32 * 1024,
            dot: None,
            scan: Scan::LineStart,
        }
    }

    /// Size of the read buffer used while copying.
    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size.max(1);
        self
    }

    pub fn mode(&self) -> CopyMode {
        self.mode
    }

    pub fn responder(&self) -> &R {
        &self.responder
    }

    pub fn into_responder(self) -> R {
        self.responder
    }

    /// Confirm existence (`223`) without reading anything.
    pub fn stat(&mut self, number: u64, msgid: &CoreMsgId) -> Result<()> {
        self.responder.res_article_found(number, msgid)?;
        Ok(())
    }

    fn begin(&mut self, number: u64, msgid: &CoreMsgId) -> io::Result<()> {
        match self.mode {
            CopyMode::Full => self.responder.res_article_follows(number, msgid),
            CopyMode::Head => self.responder.res_head_follows(number, msgid),
            CopyMode::Body => self.responder.res_body_follows(number, msgid),
            CopyMode::Stat => self.responder.res_article_found(number, msgid),
        }
    }

    /// Forward one chunk. Returns `false` once nothing more is wanted.
    fn forward(&mut self, chunk: &[u8]) -> io::Result<bool> {
        let (data, more) = match self.mode {
            CopyMode::Full => (chunk, true),
            CopyMode::Stat => (&chunk[..0], false),
            CopyMode::Head => match self.scan_head(chunk) {
                Some(end) => (&chunk[..end], false),
                None => (chunk, true),
            },
            CopyMode::Body => (&chunk[self.skip_head(chunk)..], true),
        };
        if !data.is_empty() {
            if let Some(dot) = self.dot.as_mut() {
                dot.write(self.responder.output(), data)?;
            }
        }
        Ok(more)
    }

    /// Offset of the blank line ending the headers, if it is in `chunk`.
    fn scan_head(&mut self, chunk: &[u8]) -> Option<usize> {
        for (i, &b) in chunk.iter().enumerate() {
            if b != b'\n' {
                self.scan = Scan::MidLine;
            } else if self.scan == Scan::MidLine {
                self.scan = Scan::LineStart;
            } else {
                self.scan = Scan::Separated;
                return Some(i);
            }
        }
        None
    }

    /// Number of leading bytes of `chunk` that still belong to the headers.
    fn skip_head(&mut self, chunk: &[u8]) -> usize {
        let mut i = 0;
        while self.scan != Scan::Separated && i < chunk.len() {
            if chunk[i] != b'\n' {
                self.scan = Scan::MidLine;
            } else if self.scan == Scan::MidLine {
                self.scan = Scan::LineStart;
            } else {
                self.scan = Scan::Separated;
            }
            i += 1;
        }
        i
    }

    fn end(&mut self) -> Result<()> {
        let complete = match self.mode {
            CopyMode::Head | CopyMode::Body => self.scan != Scan::MidLine,
            CopyMode::Full | CopyMode::Stat => true,
        };
        if !complete {
            return Err(NewsError::UnexpectedEof);
        }
        if let Some(dot) = self.dot.take() {
            let out = self.responder.output();
            dot.finish(out)?;
            out.flush()?;
        }
        Ok(())
    }
}

impl<R: Responder> ArticleDestination for ArticleSink<R> {
    fn copy_from(&mut self, src: &mut dyn Read, number: u64, msgid: &CoreMsgId) -> Result<u64> {
        if self.mode == CopyMode::Stat {
            self.stat(number, msgid)?;
            return Ok(0);
        }
        let mut buf = vec![0u8; self.buffer_size];
        let mut consumed = 0u64;

        if self.dot.is_none() {
            let n = read_some(src, &mut buf)?;
            if n == 0 {
                return Err(NewsError::UnexpectedEof);
            }
            consumed += n as u64;
            self.begin(number, msgid)?;
            self.dot = Some(DotEncoder::new());
            if !self.forward(&buf[..n])? {
                self.end()?;
                return Ok(consumed);
            }
        }

        loop {
            let n = read_some(src, &mut buf)?;
            if n == 0 {
                break;
            }
            consumed += n as u64;
            if !self.forward(&buf[..n])? {
                break;
            }
        }
        self.end()?;
        Ok(consumed)
    }

    fn copy_mode(&self) -> CopyMode {
        self.mode
    }
}

fn read_some(src: &mut dyn Read, buf: &mut [u8]) -> io::Result<usize> {
    loop {
        match src.read(buf) {
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            other => return other,
        }
    }
}
