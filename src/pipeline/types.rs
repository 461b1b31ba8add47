//! Core pipeline types: agent definitions, per-agent outcomes, batch stats.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Configuration of one annotation agent, as written in the config file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentDefinition {
    /// Instruction template. `{title}` and `{content}` are substituted.
    pub prompt: String,
    /// Output wrapper. `{content}` receives the rendered LLM output.
    /// Empty means the rendered output is embedded as is.
    #[serde(default)]
    pub template: String,
    #[serde(default)]
    pub allow_rules: Vec<String>,
    #[serde(default)]
    pub deny_rules: Vec<String>,
    /// Per-agent sampling temperature; falls back to the LLM default.
    #[serde(default)]
    pub temperature: Option<f32>,
}

/// An agent name paired with its definition.
///
/// Agents are held in a `Vec<NamedAgent>` whose order is the canonical
/// embedding order.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedAgent {
    pub name: String,
    pub definition: AgentDefinition,
}

impl NamedAgent {
    pub fn new(name: impl Into<String>, definition: AgentDefinition) -> Self {
        Self {
            name: name.into(),
            definition,
        }
    }
}

/// Result of one agent's attempt on one entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentOutcome {
    /// Formatted output ready to embed.
    Success(String),
    /// The agent's rules excluded the entry.
    Filtered,
    /// The LLM call failed; carries the cause.
    Error(String),
}

impl AgentOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            AgentOutcome::Success(_) => "success",
            AgentOutcome::Filtered => "filtered",
            AgentOutcome::Error(_) => "error",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, AgentOutcome::Success(_))
    }
}

/// Outcome map for one entry, keyed by agent name.
pub type Outcomes = HashMap<String, AgentOutcome>;

/// Order in which allow and deny lists are consulted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RulePrecedence {
    /// A deny match always excludes; a non-empty allow list is exclusive.
    #[default]
    DenyFirst,
    /// Older behavior: when an allow list exists only it is consulted,
    /// otherwise a deny match excludes.
    AllowFirst,
}

/// How a single entry fared across all attempted agents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryDisposition {
    /// Every attempted agent succeeded.
    Updated,
    /// Some agents succeeded and some errored.
    Partial,
    /// Every attempted agent errored, or the worker itself failed.
    Failed,
    /// No agent was attempted (filtered, deduplicated, empty, fully annotated).
    Skipped,
}

impl EntryDisposition {
    pub fn classify(outcomes: &Outcomes) -> Self {
        let successes = outcomes.values().filter(|o| o.is_success()).count();
        let errors = outcomes
            .values()
            .filter(|o| matches!(o, AgentOutcome::Error(_)))
            .count();
        match (successes, errors) {
            (0, 0) => EntryDisposition::Skipped,
            (_, 0) => EntryDisposition::Updated,
            (0, _) => EntryDisposition::Failed,
            _ => EntryDisposition::Partial,
        }
    }
}

/// Aggregate counts for one batch run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchStats {
    pub updated: usize,
    pub partial: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl BatchStats {
    pub fn record(&mut self, disposition: EntryDisposition) {
        match disposition {
            EntryDisposition::Updated => self.updated += 1,
            EntryDisposition::Partial => self.partial += 1,
            EntryDisposition::Failed => self.failed += 1,
            EntryDisposition::Skipped => self.skipped += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.updated + self.partial + self.failed + self.skipped
    }
}

impl fmt::Display for BatchStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "total={} updated={} partial={} failed={} skipped={}",
            self.total(),
            self.updated,
            self.partial,
            self.failed,
            self.skipped
        )
    }
}
