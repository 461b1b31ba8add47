//! Entry enrichment pipeline.
//!
//! Every unread entry flows through:
//! 1. `BatchController::run_batch()`: paging and the worker pool
//! 2. `DedupCache::seen()`: drops entries already in flight
//! 3. `EntryProcessor::process()`: per-agent rules and LLM calls
//! 4. `codec::encode()`: rebuilds the body before write-back
//!
//! `BatchController::process_entries()` runs entries pushed by the webhook
//! through steps 2 to 4 on the same pool.

pub mod batch;
pub mod codec;
pub mod content;
pub mod dedup;
pub mod processor;
pub mod rules;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use batch::{BatchConfig, BatchController};
pub use dedup::DedupCache;
pub use processor::EntryProcessor;
pub use rules::{AgentRules, FieldCache, RuleMatcher, RuleSet, match_rules};
pub use types::{AgentDefinition, AgentOutcome, BatchStats, NamedAgent, Outcomes, RulePrecedence};
