//! Response-side plumbing for serving articles over NNTP.

pub mod copier;
pub mod dotwriter;
pub mod responder;

pub use copier::{ArticleDestination, ArticleSink, CopyMode};
pub use dotwriter::DotEncoder;
pub use responder::{LineResponder, Responder};
