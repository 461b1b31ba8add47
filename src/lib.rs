//! Feed Enricher: runs LLM agents over unread Miniflux entries and embeds
//! their output in the entry bodies.

pub mod config;
pub mod digest;
pub mod error;
pub mod feed;
pub mod llm;
pub mod pipeline;
pub mod webhook;

pub use error::{Error, Result};
