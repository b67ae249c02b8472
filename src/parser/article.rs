//! Inbound article decoding: wire article → [`PostInfo`] plus attachment
//! files.
//!
//! The body is walked once, part by part. The first text part that fits
//! becomes the post's inline message; everything else is spooled into the
//! content store's scratch area, hashed on the way. The MIME structure is
//! recorded as a [`PartInfo`] tree so the generator can rebuild the article.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Cursor, Read, Write};

use chrono::Utc;
use sha2::{Digest, Sha256};
use tempfile::TempPath;
use tracing::{debug, info, warn};

use crate::config::ProcessorConfig;
use crate::error::{NewsError, Result};
use crate::model::{BodyObject, FileInfo, FileType, FullMsgId, Headers, PartInfo, PostInfo, PostObjectIndex};
use crate::parser::attachment::{attachment_info, store_id, AttachmentName};
use crate::parser::classify::ByteClassifier;
use crate::parser::header::{decode_encoded_words, parse_date, read_headers};
use crate::parser::mediatype::parse_media_type;
use crate::parser::multipart::PartReader;
use crate::parser::text::{decide_text, TextDecision, UnixTextReader};
use crate::parser::transfer::prepare_reader;
use crate::store::{FileStore, Thumbnailer};

/// Multipart subtypes whose parameters carry nothing beyond the boundary.
const PLAIN_MULTIPART: &[&str] = &["mixed", "alternative", "digest", "parallel"];

/// Decoding policy for inbound articles.
#[derive(Debug, Clone, Default)]
pub struct ArticleProcessor {
    pub config: ProcessorConfig,
}

impl ArticleProcessor {
    pub fn new(config: ProcessorConfig) -> Self {
        Self { config }
    }

    /// Decode a complete article: header block, then body.
    ///
    /// Besides the body decomposition this fills the post's identity,
    /// date, title, author and sage flag from the headers.
    pub fn devour_article(
        &self,
        store: &FileStore,
        thumbnailer: &dyn Thumbnailer,
        input: &mut dyn BufRead,
    ) -> Result<DevourOutcome> {
        let headers = read_headers(input, self.config.article_header_limit)?;

        let message_id = match headers.get_first("Message-ID") {
            Some(raw) => Some(FullMsgId::parse(raw)?.core()),
            None => None,
        };
        let date = headers
            .get_first("Date")
            .and_then(parse_date)
            .unwrap_or_else(Utc::now);
        let title = headers
            .get_first("Subject")
            .map(decode_encoded_words)
            .unwrap_or_default();
        let author = headers
            .get_first("From")
            .map(decode_encoded_words)
            .unwrap_or_default();
        let sage = headers.contains("X-Sage");

        let mut outcome = self.devour_message_body(store, thumbnailer, headers, input)?;
        let post = &mut outcome.post;
        post.message_id = message_id;
        post.date = date;
        post.message.title = title;
        post.message.author = author;
        post.message.sage = sage;

        info!(
            msgid = post.message_id.as_ref().map(|m| m.as_str()).unwrap_or("-"),
            files = post.files.len(),
            text_len = post.message.message.len(),
            "Decoded article"
        );
        Ok(outcome)
    }

    /// Decode an article body given its already-parsed top-level headers.
    ///
    /// `Content-Type` and `Content-Transfer-Encoding` move from the headers
    /// into the layout; every other header is kept on the post.
    pub fn devour_message_body(
        &self,
        store: &FileStore,
        thumbnailer: &dyn Thumbnailer,
        mut headers: Headers,
        body: &mut dyn BufRead,
    ) -> Result<DevourOutcome> {
        let mut devourer = Devourer {
            cfg: &self.config,
            store,
            thumbnailer,
            post: PostInfo::default(),
            text_processed: false,
            files: Vec::new(),
            thumbs: Vec::new(),
        };
        let layout = devourer.eat_entity(&mut headers, body, 0, true)?;

        let Devourer {
            mut post,
            files,
            thumbs,
            ..
        } = devourer;
        post.headers = headers;
        post.layout = layout;
        Ok(DevourOutcome { post, files, thumbs })
    }
}

/// A decoded scratch file waiting to be promoted into the content store.
#[derive(Debug)]
struct PendingFile {
    temp: TempPath,
    id: String,
}

/// Result of decoding one article.
///
/// Owns the scratch files written while decoding. Dropping it without
/// calling [`commit`](DevourOutcome::commit) removes them.
#[derive(Debug)]
pub struct DevourOutcome {
    pub post: PostInfo,
    files: Vec<PendingFile>,
    thumbs: Vec<PendingFile>,
}

impl DevourOutcome {
    /// Number of scratch files (attachments and thumbnails) held.
    pub fn pending_files(&self) -> usize {
        self.files.len() + self.thumbs.len()
    }

    /// Promote every attachment and thumbnail into the store and return
    /// the post. A file whose id already exists is identical content and
    /// is simply dropped.
    pub fn commit(self, store: &FileStore) -> Result<PostInfo> {
        for pending in self.files {
            let dest = store.file_path(&pending.id)?;
            promote(store, pending, &dest)?;
        }
        for pending in self.thumbs {
            let dest = store.thumb_path(&pending.id)?;
            promote(store, pending, &dest)?;
        }
        Ok(self.post)
    }
}

fn promote(store: &FileStore, pending: PendingFile, dest: &std::path::Path) -> Result<()> {
    match store.persist_no_clobber(pending.temp, dest) {
        Ok(()) => {
            debug!(id = %pending.id, "Stored file");
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            debug!(id = %pending.id, "File already stored");
            Ok(())
        }
        Err(e) => Err(NewsError::io(dest, e)),
    }
}

struct Devourer<'a> {
    cfg: &'a ProcessorConfig,
    store: &'a FileStore,
    thumbnailer: &'a dyn Thumbnailer,
    post: PostInfo,
    text_processed: bool,
    files: Vec<PendingFile>,
    thumbs: Vec<PendingFile>,
}

/// Where a body's content went and what it contained.
struct Stored {
    index: PostObjectIndex,
    has_null: bool,
    has_8bit: bool,
}

impl Devourer<'_> {
    /// Decode one MIME entity whose headers are in `headers`.
    ///
    /// Content-Type and Content-Transfer-Encoding are taken out of
    /// `headers`; what remains is left for the caller to keep.
    fn eat_entity(
        &mut self,
        headers: &mut Headers,
        r: &mut dyn BufRead,
        depth: usize,
        top: bool,
    ) -> Result<PartInfo> {
        let ct_raw = headers.take_first("Content-Type");
        let (ct_t, ct_par) = parse_media_type(ct_raw.as_deref().unwrap_or(""));
        let cte = headers.take_first("Content-Transfer-Encoding").unwrap_or_default();
        let cdis = headers.get_first("Content-Disposition").unwrap_or("").trim();
        let (cd_t, cd_par) = parse_media_type(cdis);

        let is_multipart = ct_t.starts_with("multipart/");
        let (reader, binary) = prepare_reader(&cte, is_multipart, self.cfg.allow_binary, r)?;

        let mut part = PartInfo {
            binary,
            ..PartInfo::default()
        };

        if is_multipart && cdis.is_empty() {
            if let Some(boundary) = ct_par.get("boundary").filter(|b| !b.is_empty()) {
                if depth >= self.cfg.max_depth {
                    return Err(NewsError::TooDeep(self.cfg.max_depth));
                }
                let subtype = &ct_t["multipart/".len()..];
                if !PLAIN_MULTIPART.contains(&subtype) {
                    part.mp_params = ct_par
                        .iter()
                        .filter(|(k, _)| k.as_str() != "boundary")
                        .map(|(k, v)| (k.clone(), v.clone()))
                        .collect();
                }
                let mut buffered = BufReader::new(reader);
                let children = self.eat_multipart(&mut buffered, boundary, depth)?;
                part.has_8bit = children.iter().any(|c| c.has_8bit);
                part.content_type = Some(ct_t);
                part.body = BodyObject::Parts(children);
                return Ok(part);
            }
        }

        part.content_type = ct_raw;

        if top && ct_t.starts_with("message/") && cdis.is_empty() {
            let name = attachment_info(&ct_t, &ct_par, &cd_par);
            let stored = self.eat_embedded_message(reader, binary, name, depth)?;
            return Ok(self.leaf(part, stored));
        }

        let inline_type =
            ct_t.is_empty() || (ct_t.starts_with("text/") && !ct_par.contains_key("name"));
        let inline_disposition =
            cd_t.is_empty() || (cd_t == "inline" && !cd_par.contains_key("filename"));

        let mut reader: Box<dyn Read + '_> = reader;
        if !self.text_processed && inline_type && inline_disposition {
            let charset = ct_par.get("charset").map(String::as_str).unwrap_or("");
            match self.eat_text(reader, binary, charset)? {
                TextOutcome::Inline { empty, has_8bit } => {
                    if !empty {
                        part.body = BodyObject::ObjectIndex(0);
                        part.has_8bit = has_8bit && !binary;
                    }
                    return Ok(part);
                }
                TextOutcome::Converted(data) => {
                    let name = attachment_info(&ct_t, &ct_par, &cd_par);
                    let stored =
                        self.process_attachment(&mut Cursor::new(data), binary, name, FileType::Msg)?;
                    return Ok(self.leaf(part, stored));
                }
                TextOutcome::Rejected(rest) => reader = rest,
            }
        }

        let name = attachment_info(&ct_t, &ct_par, &cd_par);
        let stored = self.process_attachment(&mut reader, binary, name, FileType::File)?;
        Ok(self.leaf(part, stored))
    }

    fn leaf(&self, mut part: PartInfo, stored: Stored) -> PartInfo {
        part.body = BodyObject::ObjectIndex(stored.index);
        if !part.binary {
            part.has_null = stored.has_null;
            part.has_8bit = stored.has_8bit;
        }
        part
    }

    fn eat_multipart(
        &mut self,
        r: &mut dyn BufRead,
        boundary: &str,
        depth: usize,
    ) -> Result<Vec<PartInfo>> {
        let mut reader = PartReader::new(r, boundary);
        let mut children = Vec::new();
        while reader.next_part()? {
            let mut headers = read_headers(&mut reader, self.cfg.header_size_limit)?;
            let mut child = self.eat_entity(&mut headers, &mut reader, depth + 1, false)?;
            child.headers = headers;
            children.push(child);
        }
        Ok(children)
    }

    /// Try to take a body as the inline message text.
    fn eat_text<'r>(
        &mut self,
        reader: Box<dyn Read + 'r>,
        binary: bool,
        charset: &str,
    ) -> Result<TextOutcome<'r>> {
        let mut src: Box<dyn Read + 'r> = if binary {
            reader
        } else {
            Box::new(UnixTextReader::new(reader))
        };
        let max = self.cfg.max_text_len;
        let mut data = Vec::new();
        (&mut src).take(max as u64 + 1).read_to_end(&mut data)?;
        if data.len() > max {
            debug!(limit = max, "Text part too long for inline message");
            return Ok(TextOutcome::Rejected(Box::new(Cursor::new(data).chain(src))));
        }

        match decide_text(&data, binary, charset, self.cfg) {
            TextDecision::Inline(text) => {
                self.text_processed = true;
                let empty = text.is_empty();
                let has_8bit = !text.is_ascii();
                self.post.message.message = text;
                Ok(TextOutcome::Inline { empty, has_8bit })
            }
            TextDecision::Converted(text) => {
                debug!(charset, "Inline text transcoded, keeping original");
                self.text_processed = true;
                self.post.message.message = text;
                Ok(TextOutcome::Converted(data))
            }
            TextDecision::Keep => Ok(TextOutcome::Rejected(Box::new(Cursor::new(data)))),
        }
    }

    /// Preserve a top-level `message/*` body as an attachment, then harvest
    /// text and attachments from the embedded message. The embedded layout
    /// is not kept.
    fn eat_embedded_message(
        &mut self,
        mut reader: Box<dyn Read + '_>,
        binary: bool,
        name: AttachmentName,
        depth: usize,
    ) -> Result<Stored> {
        let stored = self.process_attachment(&mut reader, binary, name, FileType::Msg)?;
        drop(reader);

        let path = match self.files.last() {
            Some(pending) => pending.temp.to_path_buf(),
            None => return Err(NewsError::Inconsistent("embedded message not spooled".into())),
        };
        let file = File::open(&path).map_err(|e| NewsError::io(&path, e))?;
        let mut inner = BufReader::new(file);

        let mut headers = read_headers(&mut inner, self.cfg.header_size_limit)?;
        self.eat_entity(&mut headers, &mut inner, depth + 1, false)?;
        Ok(stored)
    }

    /// Spool a body into a scratch file, hashing and classifying it, and
    /// register it as the next attachment.
    fn process_attachment(
        &mut self,
        reader: &mut dyn Read,
        binary: bool,
        name: AttachmentName,
        kind: FileType,
    ) -> Result<Stored> {
        let tmp = self.store.temp_file("mail-")?;
        let mut sink = HashingWriter {
            inner: tmp,
            hasher: Sha256::new(),
            written: 0,
        };

        let (has_null, has_8bit) = if binary {
            io::copy(reader, &mut sink)?;
            (false, false)
        } else {
            let mut src = ByteClassifier::new(UnixTextReader::new(reader));
            io::copy(&mut src, &mut sink)?;
            (src.has_null(), src.has_8bit())
        };
        sink.inner.flush()?;

        let hash = format!("{:x}", sink.hasher.finalize());
        let id = store_id(&hash, &name.ext);
        let temp = sink.inner.into_temp_path();

        let mut fi = FileInfo {
            kind,
            content_type: name.content_type,
            size: sink.written,
            id: id.clone(),
            original: name.original,
            ..FileInfo::default()
        };

        if kind != FileType::Msg {
            match self.thumbnailer.thumbnail(&temp, &name.ext, &fi.content_type) {
                Ok(Some(thumb)) => {
                    let thumb_id = store_id(&hash, &thumb.ext);
                    fi.thumb = thumb_id.clone();
                    fi.thumb_attrib.width = thumb.width;
                    fi.thumb_attrib.height = thumb.height;
                    if let Some(k) = thumb.kind {
                        fi.kind = k;
                    }
                    self.thumbs.push(PendingFile {
                        temp: thumb.file,
                        id: thumb_id,
                    });
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(
                        thumbnailer = self.thumbnailer.name(),
                        id = %id,
                        error = %e,
                        "Thumbnailing failed"
                    );
                }
            }
        }

        debug!(
            id = %id,
            size = fi.size,
            content_type = %fi.content_type,
            original = %fi.original,
            "Spooled attachment"
        );
        self.post.files.push(fi);
        self.files.push(PendingFile { temp, id });
        Ok(Stored {
            index: self.post.files.len() as PostObjectIndex,
            has_null,
            has_8bit,
        })
    }
}

enum TextOutcome<'r> {
    /// Text became the inline message.
    Inline { empty: bool, has_8bit: bool },
    /// Transcoded text became the inline message; the original bytes are
    /// returned for preservation.
    Converted(Vec<u8>),
    /// Not usable inline; the full content is still readable from here.
    Rejected(Box<dyn Read + 'r>),
}

struct HashingWriter<W> {
    inner: W,
    hasher: Sha256,
    written: u64,
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
