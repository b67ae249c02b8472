//! Centralized error types for boardnews.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

/// All errors produced by the boardnews library.
#[derive(Error, Debug)]
pub enum NewsError {
    /// I/O error with the associated file path.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// No article with this message identifier exists.
    #[error("No such article: <{0}>")]
    NotFound(String),

    /// The message identifier is syntactically unusable.
    #[error("Invalid message identifier: {0}")]
    InvalidMsgId(String),

    /// A header block could not be parsed.
    #[error("Malformed header: {0}")]
    InvalidHeader(String),

    /// A header block exceeded the configured size limit.
    #[error("Header block exceeds {0} bytes")]
    HeaderTooLarge(usize),

    /// Unknown or disallowed `Content-Transfer-Encoding`.
    #[error("Unsupported Content-Transfer-Encoding: {0}")]
    UnsupportedEncoding(String),

    /// A multipart entity carried an encoding that may not wrap multipart.
    #[error("multipart x {0} not allowed")]
    EncodedMultipart(String),

    /// A multipart body was structurally broken.
    #[error("Failed to parse multipart: {0}")]
    Multipart(String),

    /// Multipart nesting exceeded the configured depth.
    #[error("Multipart nesting deeper than {0} levels")]
    TooDeep(usize),

    /// A multipart layout had no `Content-Type` to attach a boundary to.
    #[error("No Content-Type for multipart layout")]
    NoContentType,

    /// An attachment on disk disagreed with its recorded size.
    #[error("Attachment {index} ({id}): expected {expected} bytes, got {actual}")]
    SizeMismatch {
        index: u32,
        id: String,
        expected: u64,
        actual: u64,
    },

    /// Input ended where more data was required.
    #[error("Unexpected end of input")]
    UnexpectedEof,

    /// A generation failed; every reader attached to it receives this.
    #[error("Article generation failed: {0}")]
    Generation(Arc<NewsError>),

    /// A live article stream was closed under a reader; the rest must be
    /// read from the promoted file.
    #[error("Publisher handle was force-closed")]
    PublisherClosed,

    /// An internal invariant did not hold.
    #[error("Internal consistency error: {0}")]
    Inconsistent(String),

    /// A stored post or layout could not be (de)serialized.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience alias for `Result<T, NewsError>`.
pub type Result<T> = std::result::Result<T, NewsError>;

impl NewsError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error means "no such article", looking through
    /// recorded generation failures.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::Generation(inner) => inner.is_not_found(),
            _ => false,
        }
    }
}

/// Allow `?` on `std::io::Error` when no path context is available.
///
/// Errors carrying a wrapped `NewsError` (produced by stream adapters in
/// this crate) are unwrapped back into it.
impl From<std::io::Error> for NewsError {
    fn from(source: std::io::Error) -> Self {
        if source.get_ref().is_some_and(|e| e.is::<NewsError>()) {
            if let Some(inner) = source.into_inner() {
                if let Ok(news) = inner.downcast::<NewsError>() {
                    return *news;
                }
            }
            return Self::Inconsistent("lost wrapped error".into());
        }
        if source.kind() == std::io::ErrorKind::UnexpectedEof {
            return Self::UnexpectedEof;
        }
        Self::Io {
            path: PathBuf::from("<stream>"),
            source,
        }
    }
}

impl From<NewsError> for std::io::Error {
    fn from(err: NewsError) -> Self {
        match err {
            NewsError::Io { source, .. } => source,
            other => std::io::Error::other(other),
        }
    }
}
