//! Entry processor: runs every pending agent on one entry and writes back.
//!
//! Flow per entry:
//! 1. Decode the body into original content + existing agent blocks
//! 2. Skip agents already embedded, then pass the dedup gate
//! 3. Per agent, in configured order: rules → LLM → format
//! 4. Re-encode and push the body when at least one agent succeeded

use std::sync::{Arc, LazyLock};

use regex::{Captures, Regex};
use tracing::{debug, info, warn};

use crate::digest::store::{SummaryRecord, SummaryStore};
use crate::error::PipelineError;
use crate::feed::types::{Entry, FeedService};
use crate::llm::provider::{LlmProvider, complete_text};
use crate::pipeline::codec;
use crate::pipeline::content;
use crate::pipeline::dedup::DedupCache;
use crate::pipeline::rules::{AgentRules, FieldCache, RuleMatcher};
use crate::pipeline::types::{AgentDefinition, AgentOutcome, NamedAgent, Outcomes, RulePrecedence};

/// Max chars of a payload written to debug logs.
const LOG_PAYLOAD_CHARS: usize = 1000;

/// Max chars of an entry title in logs.
const LOG_TITLE_CHARS: usize = 100;

/// An agent with its rule lists compiled.
struct PreparedAgent {
    agent: NamedAgent,
    rules: AgentRules,
}

/// Where successful runs of one agent are recorded for the digest.
struct SummarySink {
    store: Arc<SummaryStore>,
    source_agent: String,
}

/// Runs the configured agents on entries.
pub struct EntryProcessor {
    feed: Arc<dyn FeedService>,
    llm: Arc<dyn LlmProvider>,
    agents: Vec<PreparedAgent>,
    dedup: Arc<DedupCache>,
    matcher: RuleMatcher,
    summaries: Option<SummarySink>,
}

impl EntryProcessor {
    /// `agents` order is the canonical embedding order.
    pub fn new(
        feed: Arc<dyn FeedService>,
        llm: Arc<dyn LlmProvider>,
        agents: Vec<NamedAgent>,
        dedup: Arc<DedupCache>,
    ) -> Self {
        let agents = agents
            .into_iter()
            .map(|agent| {
                let def = &agent.definition;
                let rules =
                    AgentRules::compile(def.allow_rules.as_slice(), def.deny_rules.as_slice());
                debug!(
                    agent = %agent.name,
                    allow = rules.allow.len(),
                    deny = rules.deny.len(),
                    "Compiled agent rules"
                );
                PreparedAgent { agent, rules }
            })
            .collect();
        Self {
            feed,
            llm,
            agents,
            dedup,
            matcher: RuleMatcher::default(),
            summaries: None,
        }
    }

    pub fn with_rule_precedence(mut self, precedence: RulePrecedence) -> Self {
        self.matcher = RuleMatcher::new(precedence);
        self
    }

    /// Record raw outputs of `source_agent` in `store` for the digest job.
    pub fn with_summary_store(
        mut self,
        store: Arc<SummaryStore>,
        source_agent: impl Into<String>,
    ) -> Self {
        self.summaries = Some(SummarySink {
            store,
            source_agent: source_agent.into(),
        });
        self
    }

    /// Process one entry and return each attempted agent's outcome.
    ///
    /// Agent failures are reported as `AgentOutcome::Error` and never stop
    /// the remaining agents. Only a failed write-back is returned as `Err`.
    pub async fn process(&self, entry: &Entry) -> Result<Outcomes, PipelineError> {
        let title = truncate(&entry.title, LOG_TITLE_CHARS);
        debug!(entry_id = entry.id, title = %title, "Processing entry");

        let decoded = codec::decode(&entry.content);
        if decoded.original.trim().is_empty() {
            debug!(entry_id = entry.id, "Entry content is empty, skipping");
            return Ok(Outcomes::new());
        }
        if !decoded.agents.is_empty() {
            debug!(
                entry_id = entry.id,
                existing = ?decoded.agents.keys().collect::<Vec<_>>(),
                "Found existing agent blocks"
            );
        }

        let pending: Vec<&PreparedAgent> = self
            .agents
            .iter()
            .filter(|p| !decoded.agents.contains_key(&p.agent.name))
            .collect();
        if pending.is_empty() {
            debug!(entry_id = entry.id, "All agents already applied");
            return Ok(Outcomes::new());
        }

        if self.dedup.seen(entry.id) {
            debug!(entry_id = entry.id, "Entry recently processed, skipping");
            return Ok(Outcomes::new());
        }

        let original = entry.with_content(decoded.original.clone());
        let mut cache = FieldCache::new();
        let mut outcomes = Outcomes::with_capacity(pending.len());

        for prepared in pending {
            let agent = &prepared.agent;
            let outcome = self.run_agent(prepared, &original, &mut cache).await;
            debug!(
                entry_id = entry.id,
                agent = %agent.name,
                outcome = outcome.label(),
                "Agent finished"
            );
            outcomes.insert(agent.name.clone(), outcome);
        }

        let mut merged = decoded.agents;
        let mut added = Vec::new();
        for PreparedAgent { agent, .. } in &self.agents {
            if let Some(AgentOutcome::Success(block)) = outcomes.get(&agent.name) {
                merged.insert(agent.name.clone(), block.clone());
                added.push(agent.name.as_str());
            }
        }

        if added.is_empty() {
            debug!(entry_id = entry.id, "No new agent output, entry unchanged");
            return Ok(outcomes);
        }

        let order: Vec<&str> = self.agents.iter().map(|p| p.agent.name.as_str()).collect();
        let body = codec::encode(&merged, &decoded.original, &order);
        self.feed.update_content(entry.id, &body).await?;

        info!(
            entry_id = entry.id,
            title = %title,
            agents = ?added,
            "Entry updated with new agent output"
        );
        Ok(outcomes)
    }

    async fn run_agent(
        &self,
        prepared: &PreparedAgent,
        entry: &Entry,
        cache: &mut FieldCache,
    ) -> AgentOutcome {
        let agent = &prepared.agent;
        let def = &agent.definition;
        if !self.matcher.matches(entry, &prepared.rules, cache) {
            debug!(entry_id = entry.id, agent = %agent.name, "Filtered out by rules");
            return AgentOutcome::Filtered;
        }

        let markdown = content::to_markdown(&entry.content);
        let (system, user) = build_prompts(def, &entry.title, &markdown);
        debug!(
            entry_id = entry.id,
            agent = %agent.name,
            system = %truncate(system.as_deref().unwrap_or(""), LOG_PAYLOAD_CHARS),
            user = %truncate(&user, LOG_PAYLOAD_CHARS),
            "LLM request"
        );

        let raw = match complete_text(self.llm.as_ref(), system.as_deref(), &user, def.temperature)
            .await
        {
            Ok(raw) => raw,
            Err(e) => {
                warn!(entry_id = entry.id, agent = %agent.name, error = %e, "Agent failed");
                return AgentOutcome::Error(e.to_string());
            }
        };
        debug!(
            entry_id = entry.id,
            agent = %agent.name,
            response = %truncate(&raw, LOG_PAYLOAD_CHARS),
            "LLM response"
        );

        self.record_summary(agent, entry, &raw).await;
        AgentOutcome::Success(format_output(&def.template, &raw))
    }

    async fn record_summary(&self, agent: &NamedAgent, entry: &Entry, raw: &str) {
        let Some(sink) = &self.summaries else {
            return;
        };
        if agent.name != sink.source_agent {
            return;
        }
        let record = SummaryRecord {
            id: entry.id,
            title: entry.title.clone(),
            url: entry.url.clone(),
            datetime: entry.created_at.clone(),
            content: raw.to_string(),
        };
        if let Err(e) = sink.store.append(&record).await {
            warn!(entry_id = entry.id, error = %e, "Failed to save summary record");
        }
    }
}

static PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$?\{([a-z_]+)\}").expect("placeholder regex is valid"));

/// Substitute `{name}` (and the older `${name}`) placeholders in one pass.
///
/// Substituted values are never scanned again, and unknown placeholders
/// are left as written.
fn render(template: &str, values: &[(&str, &str)]) -> String {
    PLACEHOLDER_RE
        .replace_all(template, |caps: &Captures| {
            let name = caps.get(1).map_or("", |m| m.as_str());
            values
                .iter()
                .find(|(key, _)| *key == name)
                .map_or_else(|| caps[0].to_string(), |(_, value)| (*value).to_string())
        })
        .into_owned()
}

fn has_placeholder(template: &str, name: &str) -> bool {
    PLACEHOLDER_RE
        .captures_iter(template)
        .any(|caps| caps.get(1).is_some_and(|m| m.as_str() == name))
}

/// Build the `(system, user)` prompt pair for one agent.
///
/// A prompt that embeds `{content}` is sent alone as the user message.
/// Otherwise the prompt is the system message and the user message carries
/// the title and content. The mode is decided on the configured prompt, so
/// entry text can never change it.
pub fn build_prompts(
    def: &AgentDefinition,
    title: &str,
    content_markdown: &str,
) -> (Option<String>, String) {
    let values = [("title", title), ("content", content_markdown)];
    if has_placeholder(&def.prompt, "content") {
        return (None, render(&def.prompt, &values));
    }

    let system = render(&def.prompt, &values);
    let user = if title.trim().is_empty() {
        content_markdown.to_string()
    } else {
        format!("# {title}\n\n{content_markdown}")
    };
    (Some(system), user)
}

/// Render raw LLM output to HTML and wrap it in the agent's template.
pub fn format_output(template: &str, raw: &str) -> String {
    let html = content::to_html(raw);
    if template.trim().is_empty() {
        html
    } else {
        render(template, &[("content", &html)])
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    let escaped = s.replace('\n', "\\n");
    match escaped.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &escaped[..idx]),
        None => escaped,
    }
}
