//! Thumbnail generation hook.

use std::path::Path;

use tempfile::TempPath;

use crate::error::Result;
use crate::model::FileType;

/// A thumbnail produced for a stored attachment.
#[derive(Debug)]
pub struct Thumbnail {
    /// Scratch file holding the thumbnail; promoted with the attachment.
    pub file: TempPath,
    /// Extension of the thumbnail file.
    pub ext: String,
    pub width: u32,
    pub height: u32,
    /// Refined classification of the source attachment, if known.
    pub kind: Option<FileType>,
}

/// Makes previews for attachments as they are decoded.
///
/// Implementations live outside this crate (image and video tooling).
pub trait Thumbnailer: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Produce a thumbnail for the file at `source`, or `None` if the
    /// type is not supported.
    fn thumbnail(&self, source: &Path, ext: &str, content_type: &str) -> Result<Option<Thumbnail>>;
}

/// Never makes thumbnails.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoThumbnailer;

impl Thumbnailer for NoThumbnailer {
    fn name(&self) -> &str {
        "none"
    }

    fn thumbnail(&self, _source: &Path, _ext: &str, _content_type: &str) -> Result<Option<Thumbnail>> {
        Ok(None)
    }
}
