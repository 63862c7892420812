//! Framefinder: semantic video search.
//!
//! A video is split into overlapping time chunks, each chunk is reduced to a
//! CLIP embedding, and the embeddings go into an exact L2 nearest-neighbor
//! index keyed by chunk start time. A free-text query is embedded into the
//! same space and resolved back to a buffered timestamp range.
//!
//! - [`pipeline`]: extractor, encoder, index, holder, resolver (the core)
//! - [`server`]: HTTP surface over the pipeline
//! - [`storage`] / [`db`]: object storage and metadata collaborators
//! - [`cli`]: operator commands

pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod pipeline;
pub mod server;
pub mod storage;

pub use config::AppConfig;
pub use error::{Error, Result};
