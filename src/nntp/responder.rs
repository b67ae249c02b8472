//! Status lines for article retrieval responses.

use std::io::{self, Write};

use crate::model::CoreMsgId;

/// The protocol side an article is delivered to.
pub trait Responder {
    /// `220`: article follows.
    fn res_article_follows(&mut self, number: u64, msgid: &CoreMsgId) -> io::Result<()>;
    /// `221`: headers follow.
    fn res_head_follows(&mut self, number: u64, msgid: &CoreMsgId) -> io::Result<()>;
    /// `222`: body follows.
    fn res_body_follows(&mut self, number: u64, msgid: &CoreMsgId) -> io::Result<()>;
    /// `223`: article exists.
    fn res_article_found(&mut self, number: u64, msgid: &CoreMsgId) -> io::Result<()>;
    /// Raw connection output for the multi-line block.
    fn output(&mut self) -> &mut dyn Write;
}

/// Writes CRLF status lines to any byte sink.
#[derive(Debug)]
pub struct LineResponder<W: Write> {
    w: W,
}

impl<W: Write> LineResponder<W> {
    pub fn new(w: W) -> Self {
        Self { w }
    }

    pub fn get_ref(&self) -> &W {
        &self.w
    }

    pub fn into_inner(self) -> W {
        self.w
    }

    fn status(&mut self, code: u16, number: u64, msgid: &CoreMsgId) -> io::Result<()> {
        write!(self.w, "{code} {number} {}\r\n", msgid.to_full())
    }
}

impl<W: Write> Responder for LineResponder<W> {
    fn res_article_follows(&mut self, number: u64, msgid: &CoreMsgId) -> io::Result<()> {
        self.status(220, number, msgid)
    }

    fn res_head_follows(&mut self, number: u64, msgid: &CoreMsgId) -> io::Result<()> {
        self.status(221, number, msgid)
    }

    fn res_body_follows(&mut self, number: u64, msgid: &CoreMsgId) -> io::Result<()> {
        self.status(222, number, msgid)
    }

    fn res_article_found(&mut self, number: u64, msgid: &CoreMsgId) -> io::Result<()> {
        self.status(223, number, msgid)
    }

    fn output(&mut self) -> &mut dyn Write {
        &mut self.w
    }
}
