//! Storage collaborators: the content store, post sources and thumbnailers.

pub mod fstore;
pub mod source;
pub mod thumbnail;

use std::io::{self, Read};

use crate::model::FileInfo;

pub use fstore::FileStore;
pub use source::{JsonPostSource, MemoryPostSource, PostSource};
pub use thumbnail::{NoThumbnailer, Thumbnail, Thumbnailer};

/// Opens attachment content for article generation.
pub trait AttachmentSource {
    fn open_attachment(&self, file: &FileInfo) -> io::Result<Box<dyn Read + '_>>;
}
