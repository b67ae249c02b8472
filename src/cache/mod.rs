//! The article cache: single-flight generation, live replay and promotion
//! into the content store.

pub mod engine;
pub mod publisher;

pub use engine::ArticleCache;
pub use publisher::{CachePub, PubState, ReplayCursor};
