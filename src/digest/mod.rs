//! Digest feature.
//!
//! Summary-agent outputs are appended to a JSONL file by pipeline workers.
//! On a cron schedule the generator drains that file, asks the LLM for a
//! greeting and a digest, stores the result for the digest feed server and
//! refreshes the digest feed.

pub mod generator;
pub mod store;

pub use generator::{
    DigestGenerator, DigestPeriod, DigestSettings, digest_period, spawn_digest_schedule,
};
pub use store::{DigestStore, SummaryRecord, SummaryStore};
