//! Feed service collaborator.
//!
//! The pipeline depends only on the five `FeedService` operations; `MinifluxClient`
//! is the production implementation.

pub mod miniflux;
pub mod types;

pub use miniflux::{MinifluxClient, MinifluxConfig};
pub use types::{Category, Entry, EntryId, EntryPage, Feed, FeedService};
