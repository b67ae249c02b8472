//! Inbound side of the codec: header blocks, media types, transfer
//! decoding, multipart splitting and the article decoder built on them.

pub mod article;
pub mod attachment;
pub mod classify;
pub mod header;
pub mod mediatype;
pub mod multipart;
pub mod text;
pub mod transfer;

pub use article::{ArticleProcessor, DevourOutcome};
