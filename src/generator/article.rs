//! Outbound article generation: [`PostInfo`] → wire article.

use std::io::{self, Read, Write};

use tracing::trace;

use crate::error::{NewsError, Result};
use crate::generator::encode::{copy_text, ContentWriter, TransferEncoding};
use crate::generator::headers::write_headers;
use crate::generator::multipart::{random_boundary, PartWriter};
use crate::model::{BodyObject, Headers, PartInfo, PostInfo, PostObjectIndex};
use crate::parser::header::encode_word;
use crate::parser::mediatype::{format_media_type, Params};
use crate::store::AttachmentSource;

/// Write the complete article for `post`: header block, blank line, body.
///
/// Message-ID and Subject are filled in from the post when its stored
/// headers lack them. Attachment bodies are read through `files` and must
/// match their recorded sizes exactly.
///
/// # Panics
///
/// If the layout references a post object that does not exist. Layouts
/// are produced by the decoder, so this is a defect in stored data.
pub fn generate_message(w: &mut dyn Write, post: &PostInfo, files: &dyn AttachmentSource) -> Result<()> {
    let mut headers = post.headers.clone();
    if !headers.contains("Message-ID") {
        if let Some(id) = &post.message_id {
            headers.set("Message-ID", id.to_full().as_str());
        }
    }
    if !headers.contains("Subject") && !post.message.title.is_empty() {
        headers.set("Subject", encode_word(&post.message.title));
    }

    let prepared = prepare_part(&post.layout)?;
    if prepared.apply(&mut headers) && !headers.contains("MIME-Version") {
        headers.set("MIME-Version", "1.0");
    }

    write_headers(w, &headers)?;
    w.write_all(b"\n")?;
    write_body(w, &post.layout, &prepared, post, files)
}

/// Wire-level headers computed for one part.
struct Prepared {
    content_type: Option<String>,
    encoding: TransferEncoding,
    boundary: Option<String>,
}

impl Prepared {
    /// Put Content-Type and Content-Transfer-Encoding into `headers`.
    /// Returns whether either was set.
    fn apply(&self, headers: &mut Headers) -> bool {
        let mut any = false;
        if let Some(ct) = &self.content_type {
            headers.set("Content-Type", ct.as_str());
            any = true;
        }
        if let Some(cte) = self.encoding.header_value() {
            headers.set("Content-Transfer-Encoding", cte);
            any = true;
        }
        any
    }
}

fn prepare_part(part: &PartInfo) -> Result<Prepared> {
    if let BodyObject::Parts(_) = part.body {
        let ct = part.content_type.as_deref().ok_or(NewsError::NoContentType)?;
        let boundary = random_boundary();
        let content_type = multipart_type(ct, &part.mp_params, &boundary)?;
        // Children carry their own encodings; the container only declares
        // raw 8-bit content passing through.
        let encoding = if part.has_8bit && !part.has_null {
            TransferEncoding::EightBit
        } else {
            TransferEncoding::Plain
        };
        return Ok(Prepared {
            content_type: Some(content_type),
            encoding,
            boundary: Some(boundary),
        });
    }
    Ok(Prepared {
        content_type: part.content_type.clone(),
        encoding: TransferEncoding::for_part(part),
        boundary: None,
    })
}

/// Attach `boundary` to a bare multipart type, restoring saved parameters.
fn multipart_type(ct: &str, params: &Params, boundary: &str) -> Result<String> {
    if params.is_empty() {
        return Ok(format!("{ct}; boundary={boundary}"));
    }
    let mut params = params.clone();
    params.insert("boundary".to_string(), boundary.to_string());
    format_media_type(ct, &params)
        .ok_or_else(|| NewsError::InvalidHeader(format!("unformattable multipart type {ct:?}")))
}

fn write_body(
    w: &mut dyn Write,
    part: &PartInfo,
    prepared: &Prepared,
    post: &PostInfo,
    files: &dyn AttachmentSource,
) -> Result<()> {
    match &part.body {
        BodyObject::Empty => Ok(()),
        BodyObject::ObjectIndex(index) => write_object(w, *index, part, prepared.encoding, post, files),
        BodyObject::Parts(children) => {
            let boundary = prepared
                .boundary
                .as_deref()
                .ok_or_else(|| NewsError::Inconsistent("multipart without boundary".into()))?;
            let mut pw = PartWriter::new(w, boundary);
            for child in children {
                let child_prepared = prepare_part(child)?;
                let mut headers = child.headers.clone();
                child_prepared.apply(&mut headers);
                pw.create_part(&headers)?;
                write_body(pw.writer(), child, &child_prepared, post, files)?;
            }
            pw.close()?;
            Ok(())
        }
    }
}

fn write_object(
    w: &mut dyn Write,
    index: PostObjectIndex,
    part: &PartInfo,
    encoding: TransferEncoding,
    post: &PostInfo,
    files: &dyn AttachmentSource,
) -> Result<()> {
    let mut out = ContentWriter::new(w, encoding);

    if index == 0 {
        let mut text = post.message.message.as_bytes();
        if part.binary {
            out.write_all(text)?;
        } else {
            copy_text(&mut text, &mut out)?;
        }
        out.finish()?;
        return Ok(());
    }

    let Some(fi) = post.files.get(index as usize - 1) else {
        panic!(
            "post object index {index} out of range ({} attachments)",
            post.files.len()
        );
    };
    let src = files
        .open_attachment(fi)
        .map_err(|e| NewsError::io(&fi.id, e))?;
    // One byte past the recorded size so an over-long file shows up.
    let cap = fi.size.saturating_add(1);
    let mut limited = src.take(cap);
    if part.binary {
        io::copy(&mut limited, &mut out)?;
    } else {
        copy_text(&mut limited, &mut out)?;
    }
    // Raw bytes taken from the file, before any line-ending rewrite.
    let read = cap - limited.limit();
    if read != fi.size {
        return Err(NewsError::SizeMismatch {
            index,
            id: fi.id.clone(),
            expected: fi.size,
            actual: read,
        });
    }
    out.finish()?;
    trace!(index, id = %fi.id, size = fi.size, "Wrote attachment body");
    Ok(())
}
