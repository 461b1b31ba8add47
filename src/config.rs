//! Configuration loading.
//!
//! Settings come from a TOML file (`$FEED_ENRICHER_CONFIG`, default
//! `config.toml`). Endpoints and secrets can be overridden from the
//! environment: `MINIFLUX_BASE_URL`, `MINIFLUX_API_KEY`,
//! `MINIFLUX_WEBHOOK_SECRET`, `LLM_BASE_URL`, `LLM_API_KEY`, `LLM_MODEL`.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Deserializer};

use crate::digest::generator::{DigestSettings, parse_schedules};
use crate::error::ConfigError;
use crate::feed::miniflux::MinifluxConfig;
use crate::llm::LlmConfig;
use crate::pipeline::batch::BatchConfig;
use crate::pipeline::types::{AgentDefinition, NamedAgent, RulePrecedence};

pub const CONFIG_PATH_ENV: &str = "FEED_ENRICHER_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

const POLL_INTERVAL: Duration = Duration::from_secs(60);
/// Polling only catches what the webhook missed.
const WEBHOOK_POLL_INTERVAL: Duration = Duration::from_secs(15 * 60);

fn secret<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?
        .filter(|s| !s.trim().is_empty())
        .map(SecretString::from))
}

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Default tracing filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Only process entries published after this unix timestamp. 0 disables.
    #[serde(default)]
    pub entry_since: i64,
    #[serde(default)]
    pub miniflux: MinifluxSection,
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub batch: BatchSection,
    #[serde(default)]
    pub webhook: WebhookSection,
    #[serde(default)]
    pub digest: Option<DigestSection>,
    #[serde(default)]
    pub agents: Vec<AgentEntry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MinifluxSection {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default, deserialize_with = "secret")]
    pub api_key: Option<SecretString>,
    /// Shared secret Miniflux signs webhook deliveries with. Enables the
    /// webhook endpoint when set.
    #[serde(default, deserialize_with = "secret")]
    pub webhook_secret: Option<SecretString>,
    #[serde(default = "default_miniflux_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    #[serde(default, deserialize_with = "secret")]
    pub api_key: Option<SecretString>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    #[serde(default = "default_rpm", alias = "RPM")]
    pub rpm: u32,
    #[serde(default)]
    pub temperature: Option<f32>,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            api_key: None,
            model: None,
            timeout_secs: default_llm_timeout(),
            max_workers: default_max_workers(),
            rpm: default_rpm(),
            temperature: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchSection {
    /// Poll interval. Unset means 60s, or 900s when the webhook delivers new entries.
    #[serde(default)]
    pub interval_secs: Option<u64>,
    #[serde(default = "default_page_size")]
    pub page_size: u64,
    #[serde(default = "default_dedup_ttl")]
    pub dedup_ttl_secs: u64,
    #[serde(default = "default_dedup_capacity")]
    pub dedup_capacity: usize,
    #[serde(default)]
    pub rule_precedence: RulePrecedence,
}

impl Default for BatchSection {
    fn default() -> Self {
        Self {
            interval_secs: None,
            page_size: default_page_size(),
            dedup_ttl_secs: default_dedup_ttl(),
            dedup_capacity: default_dedup_capacity(),
            rule_precedence: RulePrecedence::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookSection {
    #[serde(default = "default_webhook_bind")]
    pub bind: String,
}

impl Default for WebhookSection {
    fn default() -> Self {
        Self {
            bind: default_webhook_bind(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DigestSection {
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_digest_name")]
    pub name: String,
    /// Cron expressions: `sec min hour day month weekday`.
    #[serde(default)]
    pub schedule: Vec<String>,
    #[serde(default = "default_category_id")]
    pub category_id: i64,
    /// Agent whose raw output feeds the digest.
    #[serde(default = "default_source_agent")]
    pub source_agent: String,
    #[serde(default)]
    pub prompts: DigestPrompts,
    #[serde(default = "default_summary_file")]
    pub summary_file: PathBuf,
    #[serde(default = "default_digest_file")]
    pub digest_file: PathBuf,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DigestPrompts {
    #[serde(default)]
    pub greeting: String,
    #[serde(default)]
    pub summary: String,
}

/// One `[[agents]]` table.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentEntry {
    pub name: String,
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub template: String,
    #[serde(default)]
    pub allow_rules: Vec<String>,
    #[serde(default)]
    pub deny_rules: Vec<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    // Keys of the retired agent format, kept only to detect it.
    #[serde(default)]
    title: Option<toml::Value>,
    #[serde(default)]
    style_block: Option<toml::Value>,
}

impl AgentEntry {
    fn is_outdated(&self) -> bool {
        self.title.is_some() && self.style_block.is_some()
    }

    pub fn to_named(&self) -> NamedAgent {
        NamedAgent::new(
            self.name.clone(),
            AgentDefinition {
                prompt: self.prompt.clone(),
                template: self.template.clone(),
                allow_rules: self.allow_rules.clone(),
                deny_rules: self.deny_rules.clone(),
                temperature: self.temperature,
            },
        )
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_miniflux_timeout() -> u64 {
    30
}
fn default_llm_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_llm_timeout() -> u64 {
    60
}
fn default_max_workers() -> usize {
    4
}
fn default_rpm() -> u32 {
    1000
}
fn default_webhook_bind() -> String {
    "0.0.0.0:8080".to_string()
}
fn default_page_size() -> u64 {
    100
}
fn default_dedup_ttl() -> u64 {
    300
}
fn default_dedup_capacity() -> usize {
    10_000
}
fn default_digest_name() -> String {
    "Digest for you".to_string()
}
fn default_category_id() -> i64 {
    1
}
fn default_source_agent() -> String {
    "summary".to_string()
}
fn default_summary_file() -> PathBuf {
    PathBuf::from("data/summaries.jsonl")
}
fn default_digest_file() -> PathBuf {
    PathBuf::from("data/digest.md")
}

fn missing(key: &str, hint: &str) -> ConfigError {
    ConfigError::MissingRequired {
        key: key.to_string(),
        hint: hint.to_string(),
    }
}

fn invalid(key: impl Into<String>, message: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.into(),
        message: message.into(),
    }
}

impl AppConfig {
    /// Load from `$FEED_ENRICHER_CONFIG` (or `config.toml`), apply environment
    /// overrides and validate.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());
        let mut config = Self::from_file(Path::new(&path))?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse a config file without environment overrides or validation.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => missing(
                &path.display().to_string(),
                "Create the config file or point FEED_ENRICHER_CONFIG at it.",
            ),
            _ => ConfigError::Io(e),
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        toml::from_str(raw).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Override endpoints and secrets from `lookup` (the process environment in production).
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(v) = get("MINIFLUX_BASE_URL") {
            self.miniflux.base_url = Some(v);
        }
        if let Some(v) = get("MINIFLUX_API_KEY") {
            self.miniflux.api_key = Some(SecretString::from(v));
        }
        if let Some(v) = get("MINIFLUX_WEBHOOK_SECRET") {
            self.miniflux.webhook_secret = Some(SecretString::from(v));
        }
        if let Some(v) = get("LLM_BASE_URL") {
            self.llm.base_url = v;
        }
        if let Some(v) = get("LLM_API_KEY") {
            self.llm.api_key = Some(SecretString::from(v));
        }
        if let Some(v) = get("LLM_MODEL") {
            self.llm.model = Some(v);
        }
    }

    /// Check everything that would otherwise fail later at runtime.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.miniflux.base_url.as_deref().is_none_or(str::is_empty) {
            return Err(missing(
                "miniflux.base_url",
                "Set [miniflux].base_url or MINIFLUX_BASE_URL.",
            ));
        }
        if self.miniflux.api_key.is_none() {
            return Err(missing(
                "miniflux.api_key",
                "Set [miniflux].api_key or MINIFLUX_API_KEY.",
            ));
        }
        if self.llm.api_key.is_none() {
            return Err(missing("llm.api_key", "Set [llm].api_key or LLM_API_KEY."));
        }
        if self.llm.model.as_deref().is_none_or(str::is_empty) {
            return Err(missing("llm.model", "Set [llm].model or LLM_MODEL."));
        }
        if self.llm.max_workers == 0 {
            return Err(invalid("llm.max_workers", "must be at least 1"));
        }
        if self.llm.rpm == 0 {
            return Err(invalid("llm.rpm", "must be at least 1"));
        }
        if self.batch.page_size == 0 {
            return Err(invalid("batch.page_size", "must be at least 1"));
        }
        if self.batch.interval_secs == Some(0) {
            return Err(invalid("batch.interval_secs", "must be at least 1"));
        }
        if self.miniflux.webhook_secret.is_some()
            && self.webhook.bind.parse::<std::net::SocketAddr>().is_err()
        {
            return Err(invalid(
                "webhook.bind",
                format!("'{}' is not a socket address", self.webhook.bind),
            ));
        }

        self.validate_agents()?;

        if let Some(digest) = &self.digest {
            if digest.url.trim().is_empty() {
                return Err(missing("digest.url", "Set the public URL of the digest feed."));
            }
            if digest.prompts.greeting.trim().is_empty() || digest.prompts.summary.trim().is_empty()
            {
                return Err(missing(
                    "digest.prompts",
                    "Both prompts.greeting and prompts.summary are required.",
                ));
            }
            parse_schedules(&digest.schedule).map_err(|e| invalid("digest.schedule", e))?;
        }
        Ok(())
    }

    fn validate_agents(&self) -> Result<(), ConfigError> {
        let outdated: Vec<&str> = self
            .agents
            .iter()
            .filter(|a| a.is_outdated())
            .map(|a| a.name.as_str())
            .collect();
        if !outdated.is_empty() {
            return Err(invalid(
                "agents",
                format!(
                    "outdated agent format (title + style_block) in: {}. Use prompt and template instead.",
                    outdated.join(", ")
                ),
            ));
        }

        let mut names = HashSet::new();
        for agent in &self.agents {
            let name = agent.name.trim();
            if name.is_empty() {
                return Err(invalid("agents.name", "agent name must not be empty"));
            }
            if name.contains(['"', '<', '>']) {
                return Err(invalid(
                    format!("agents.{name}"),
                    "agent name must not contain '\"', '<' or '>'",
                ));
            }
            if name != agent.name {
                return Err(invalid(
                    format!("agents.{name}"),
                    "agent name must not have surrounding whitespace",
                ));
            }
            if !names.insert(name) {
                return Err(invalid(format!("agents.{name}"), "duplicate agent name"));
            }
            if agent.prompt.trim().is_empty() {
                return Err(missing(&format!("agents.{name}.prompt"), "Every agent needs a prompt."));
            }
        }
        Ok(())
    }

    pub fn miniflux_config(&self) -> Result<MinifluxConfig, ConfigError> {
        Ok(MinifluxConfig {
            base_url: self
                .miniflux
                .base_url
                .clone()
                .ok_or_else(|| missing("miniflux.base_url", ""))?,
            api_key: self
                .miniflux
                .api_key
                .clone()
                .ok_or_else(|| missing("miniflux.api_key", ""))?,
            timeout: Duration::from_secs(self.miniflux.timeout_secs),
        })
    }

    pub fn llm_config(&self) -> Result<LlmConfig, ConfigError> {
        Ok(LlmConfig {
            base_url: self.llm.base_url.clone(),
            api_key: self
                .llm
                .api_key
                .clone()
                .ok_or_else(|| missing("llm.api_key", ""))?,
            model: self
                .llm
                .model
                .clone()
                .ok_or_else(|| missing("llm.model", ""))?,
            timeout: Duration::from_secs(self.llm.timeout_secs),
            requests_per_minute: self.llm.rpm,
            temperature: self.llm.temperature,
        })
    }

    pub fn batch_config(&self) -> BatchConfig {
        BatchConfig {
            page_size: self.batch.page_size,
            max_workers: self.llm.max_workers,
            since: (self.entry_since > 0).then_some(self.entry_since),
        }
    }

    /// Agents in canonical order.
    pub fn named_agents(&self) -> Vec<NamedAgent> {
        self.agents.iter().map(AgentEntry::to_named).collect()
    }

    pub fn digest_settings(&self) -> Option<DigestSettings> {
        self.digest.as_ref().map(|d| DigestSettings {
            url: d.url.clone(),
            name: d.name.clone(),
            category_id: d.category_id,
            greeting_prompt: d.prompts.greeting.clone(),
            summary_prompt: d.prompts.summary.clone(),
        })
    }

    pub fn dedup_ttl(&self) -> Duration {
        Duration::from_secs(self.batch.dedup_ttl_secs)
    }

    pub fn webhook_enabled(&self) -> bool {
        self.miniflux.webhook_secret.is_some()
    }

    pub fn poll_interval(&self) -> Duration {
        match self.batch.interval_secs {
            Some(secs) => Duration::from_secs(secs),
            None if self.webhook_enabled() => WEBHOOK_POLL_INTERVAL,
            None => POLL_INTERVAL,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use secrecy::ExposeSecret;

    use super::*;

    const FULL: &str = r#"
log_level = "debug"
entry_since = 1700000000

[miniflux]
base_url = "http://miniflux.local"
api_key = "mf-key"

[llm]
base_url = "http://llm.local/v1"
api_key = "llm-key"
model = "gpt-4o-mini"
timeout_secs = 30
max_workers = 8
RPM = 500

[batch]
page_size = 50
rule_precedence = "allow_first"

[digest]
url = "https://digest.example.com"
schedule = ["0 0 8 * * *", "0 0 20 * * *"]
prompts.greeting = "Greet the reader."
prompts.summary = "Summarize these."

[[agents]]
name = "summary"
prompt = "Summarize the article."
template = "<div>{content}</div>"
deny_rules = ["EntryContentLength=lt:100"]

[[agents]]
name = "translate"
prompt = "Translate: {content}"
allow_rules = ["FeedCategoryTitle=News"]
temperature = 0.2
"#;

    const MINIMAL: &str = r#"
[miniflux]
base_url = "http://miniflux.local"
api_key = "k"

[llm]
api_key = "k"
model = "m"
"#;

    fn parse(raw: &str) -> AppConfig {
        AppConfig::from_toml_str(raw).unwrap()
    }

    fn with_agents(agents: &str) -> AppConfig {
        parse(&format!("{MINIMAL}\n{agents}"))
    }

    #[test]
    fn full_config_parses() {
        let config = parse(FULL);
        config.validate().unwrap();

        assert_eq!(config.log_level, "debug");
        assert_eq!(config.llm.max_workers, 8);
        assert_eq!(config.llm.rpm, 500);
        assert_eq!(config.batch.page_size, 50);
        assert_eq!(config.batch.rule_precedence, RulePrecedence::AllowFirst);

        let batch = config.batch_config();
        assert_eq!(batch.since, Some(1_700_000_000));
        assert_eq!(batch.max_workers, 8);

        let agents = config.named_agents();
        let names: Vec<&str> = agents.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["summary", "translate"]);
        assert_eq!(agents[1].definition.temperature, Some(0.2));
        assert_eq!(agents[0].definition.deny_rules, vec!["EntryContentLength=lt:100"]);

        let digest = config.digest.as_ref().unwrap();
        assert_eq!(digest.category_id, 1);
        assert_eq!(digest.source_agent, "summary");
        assert_eq!(digest.schedule.len(), 2);
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let config = parse(MINIMAL);
        config.validate().unwrap();

        assert_eq!(config.log_level, "info");
        assert_eq!(config.llm.base_url, "https://api.openai.com/v1");
        assert_eq!(config.llm.timeout_secs, 60);
        assert_eq!(config.llm.max_workers, 4);
        assert_eq!(config.llm.rpm, 1000);
        assert_eq!(config.poll_interval(), Duration::from_secs(60));
        assert!(!config.webhook_enabled());
        assert_eq!(config.webhook.bind, "0.0.0.0:8080");
        assert_eq!(config.batch.dedup_ttl_secs, 300);
        assert_eq!(config.batch.dedup_capacity, 10_000);
        assert_eq!(config.batch.rule_precedence, RulePrecedence::DenyFirst);
        assert!(config.digest.is_none());
        assert!(config.agents.is_empty());
        assert_eq!(config.batch_config().since, None);
    }

    #[test]
    fn env_overrides_file_values() {
        let mut config = parse(MINIMAL);
        let env: HashMap<&str, &str> = HashMap::from([
            ("MINIFLUX_BASE_URL", "http://other:8080"),
            ("LLM_API_KEY", "env-key"),
            ("LLM_MODEL", ""),
        ]);
        config.apply_env(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.miniflux.base_url.as_deref(), Some("http://other:8080"));
        assert_eq!(config.llm.api_key.as_ref().unwrap().expose_secret(), "env-key");
        // Empty values do not override.
        assert_eq!(config.llm.model.as_deref(), Some("m"));
    }

    #[test]
    fn webhook_secret_slows_polling() {
        let config = parse(
            "[miniflux]\nbase_url = \"http://mf\"\napi_key = \"k\"\nwebhook_secret = \"s\"\n\
             [llm]\napi_key = \"k\"\nmodel = \"m\"",
        );
        config.validate().unwrap();
        assert!(config.webhook_enabled());
        assert_eq!(config.poll_interval(), Duration::from_secs(900));

        let mut config = parse(&format!("{MINIMAL}\n[batch]\ninterval_secs = 30"));
        config.apply_env(|k| (k == "MINIFLUX_WEBHOOK_SECRET").then(|| "env".to_string()));
        assert!(config.webhook_enabled());
        // An explicit interval wins.
        assert_eq!(config.poll_interval(), Duration::from_secs(30));
    }

    #[test]
    fn bad_webhook_bind_rejected() {
        let mut config = parse(&format!("{MINIMAL}\n[webhook]\nbind = \"localhost\""));
        // Only checked when the endpoint is enabled.
        config.validate().unwrap();
        config.miniflux.webhook_secret = Some(SecretString::from("s"));
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "webhook.bind"));
    }

    #[test]
    fn env_can_supply_required_keys() {
        let mut config = parse("");
        assert!(config.validate().is_err());
        config.apply_env(|k| match k {
            "MINIFLUX_BASE_URL" => Some("http://mf".into()),
            "MINIFLUX_API_KEY" => Some("a".into()),
            "LLM_API_KEY" => Some("b".into()),
            "LLM_MODEL" => Some("c".into()),
            _ => None,
        });
        config.validate().unwrap();
        assert_eq!(config.llm_config().unwrap().model, "c");
    }

    #[test]
    fn missing_required_keys_reported() {
        let err = parse("[llm]\napi_key = \"k\"\nmodel = \"m\"").validate().unwrap_err();
        assert!(matches!(err, ConfigError::MissingRequired { ref key, .. } if key == "miniflux.base_url"));

        let err = parse("[miniflux]\nbase_url = \"x\"\napi_key = \"k\"\n[llm]\napi_key = \"k\"")
            .validate()
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingRequired { ref key, .. } if key == "llm.model"));
    }

    #[test]
    fn duplicate_agent_names_rejected() {
        let config = with_agents(
            "[[agents]]\nname = \"summary\"\nprompt = \"a\"\n[[agents]]\nname = \"summary\"\nprompt = \"b\"",
        );
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn marker_breaking_agent_names_rejected() {
        for name in ["", "sum\\\"mary", "a<b", "a>b"] {
            let config = with_agents(&format!("[[agents]]\nname = \"{name}\"\nprompt = \"p\""));
            assert!(config.validate().is_err(), "name {name:?} should be rejected");
        }
    }

    #[test]
    fn outdated_agent_format_rejected() {
        let config = with_agents(
            "[[agents]]\nname = \"summary\"\ntitle = \"AI summary\"\nstyle_block = true\nprompt = \"p\"",
        );
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("outdated agent format"));
    }

    #[test]
    fn agent_without_prompt_rejected() {
        let config = with_agents("[[agents]]\nname = \"summary\"");
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_sizes_rejected() {
        assert!(parse(&format!("{MINIMAL}\n[batch]\npage_size = 0")).validate().is_err());
        assert!(parse(&format!("{MINIMAL}\n[batch]\ninterval_secs = 0")).validate().is_err());
        let mut config = parse(MINIMAL);
        config.llm.max_workers = 0;
        assert!(config.validate().is_err());
        let mut config = parse(MINIMAL);
        config.llm.rpm = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn invalid_digest_schedule_rejected() {
        let raw = format!(
            "{MINIMAL}\n[digest]\nurl = \"https://d\"\nschedule = [\"daily at 8\"]\nprompts.greeting = \"g\"\nprompts.summary = \"s\""
        );
        let err = parse(&raw).validate().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "digest.schedule"));
    }

    #[test]
    fn unknown_precedence_is_parse_error() {
        let err = AppConfig::from_toml_str(&format!("{MINIMAL}\n[batch]\nrule_precedence = \"random\""))
            .unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn secrets_are_redacted_in_debug() {
        let config = parse(MINIMAL);
        let debug = format!("{:?}", config.llm);
        assert!(!debug.contains("\"k\""));
    }

    #[test]
    fn from_file_reads_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, FULL).unwrap();
        let config = AppConfig::from_file(&path).unwrap();
        assert_eq!(config.agents.len(), 2);

        let err = AppConfig::from_file(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::MissingRequired { .. }));
    }
}
