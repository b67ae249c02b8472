//! Structured post: the database-side form of an article.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::headers::Headers;
use crate::model::layout::PartInfo;
use crate::model::msgid::CoreMsgId;

/// One post as stored by the board.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PostInfo {
    /// Globally unique identifier; absent until the post is bound to an article.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<CoreMsgId>,
    #[serde(default)]
    pub date: DateTime<Utc>,
    #[serde(rename = "mi", default)]
    pub message: MessageInfo,
    /// Attachments; `PostObjectIndex` k addresses `files[k - 1]`.
    #[serde(rename = "fi", default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<FileInfo>,
    /// Top-level article headers.
    #[serde(rename = "h", default)]
    pub headers: Headers,
    /// MIME layout of the article body.
    #[serde(rename = "l", default)]
    pub layout: PartInfo,
}

/// Human-facing parts of a post.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageInfo {
    pub title: String,
    pub author: String,
    pub trip: String,
    pub sage: bool,
    /// Inline message text (post object 0).
    pub message: String,
}

/// Kind of an attachment as shown by the board.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    #[default]
    File,
    /// Preserved original of a message (re-embedded or charset-converted).
    Msg,
    Text,
    Image,
    Audio,
    Video,
}

/// One attachment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    #[serde(rename = "type", default)]
    pub kind: FileType,
    /// MIME type without parameters.
    #[serde(default)]
    pub content_type: String,
    pub size: u64,
    /// Content-store name: `<sha256-hex>.<ext>`.
    pub id: String,
    /// Thumbnail name in the content store, if one was made.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub thumb: String,
    /// Original filename as sent by the poster.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub original: String,
    #[serde(default, skip_serializing_if = "ThumbAttrib::is_empty")]
    pub thumb_attrib: ThumbAttrib,
}

/// Thumbnail dimensions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThumbAttrib {
    #[serde(rename = "w", default, skip_serializing_if = "is_zero")]
    pub width: u32,
    #[serde(rename = "h", default, skip_serializing_if = "is_zero")]
    pub height: u32,
}

impl ThumbAttrib {
    pub fn is_empty(&self) -> bool {
        self.width == 0 && self.height == 0
    }
}

fn is_zero(v: &u32) -> bool {
    *v == 0
}
