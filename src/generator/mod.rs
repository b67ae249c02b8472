//! Outbound side of the codec: structured posts back to wire articles.

pub mod article;
pub mod encode;
pub mod headers;
pub mod multipart;

pub use article::generate_message;
pub use encode::TransferEncoding;
