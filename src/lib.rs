//! `boardnews`: the NNTP side of an imageboard.
//!
//! This crate converts stored posts into MIME articles and back, and
//! serves generated articles through a single-flight on-disk cache.

pub mod cache;
pub mod config;
pub mod error;
pub mod generator;
pub mod model;
pub mod nntp;
pub mod parser;
pub mod store;
