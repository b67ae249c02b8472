//! Core data model: message identifiers, headers, posts and MIME layouts.

pub mod headers;
pub mod layout;
pub mod msgid;
pub mod post;

pub use headers::Headers;
pub use layout::{BodyObject, PartInfo, PostObjectIndex};
pub use msgid::{CoreMsgId, FullMsgId};
pub use post::{FileInfo, FileType, MessageInfo, PostInfo, ThumbAttrib};
