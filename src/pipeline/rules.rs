//! Allow/deny rule matching for agents.
//!
//! Rules use Miniflux's filter syntax, `FieldName=Pattern`:
//! - Text fields match a regex anywhere in the value (`EntryTitle=(?i)rust`)
//! - `EntryContentLength` compares the token count with an operator
//!   (`gt:`, `ge:`, `lt:`, `le:`, `eq:`, `between:lo,hi`)
//! - `NeverMatch` is a placeholder that never matches
//!
//! A malformed rule is logged and skipped. It never fails evaluation.

use std::collections::HashMap;

use regex::Regex;
use tracing::{debug, warn};

use crate::feed::types::{Entry, EntryId};
use crate::pipeline::content;
use crate::pipeline::types::RulePrecedence;

/// Which entry field a rule matches against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleField {
    EntryTitle,
    EntryUrl,
    EntryContent,
    EntryAuthor,
    EntryTag,
    EntryContentLength,
    FeedSiteUrl,
    FeedTitle,
    FeedCategoryTitle,
    NeverMatch,
}

/// How a field's pattern is evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    Regex,
    Numeric,
    Never,
}

impl RuleField {
    pub fn from_name(name: &str) -> Option<Self> {
        let field = match name {
            "EntryTitle" => RuleField::EntryTitle,
            "EntryURL" => RuleField::EntryUrl,
            "EntryContent" => RuleField::EntryContent,
            "EntryAuthor" => RuleField::EntryAuthor,
            "EntryTag" => RuleField::EntryTag,
            "EntryContentLength" => RuleField::EntryContentLength,
            "FeedSiteURL" => RuleField::FeedSiteUrl,
            "FeedTitle" => RuleField::FeedTitle,
            "FeedCategoryTitle" => RuleField::FeedCategoryTitle,
            "NeverMatch" => RuleField::NeverMatch,
            _ => return None,
        };
        Some(field)
    }

    pub fn name(self) -> &'static str {
        match self {
            RuleField::EntryTitle => "EntryTitle",
            RuleField::EntryUrl => "EntryURL",
            RuleField::EntryContent => "EntryContent",
            RuleField::EntryAuthor => "EntryAuthor",
            RuleField::EntryTag => "EntryTag",
            RuleField::EntryContentLength => "EntryContentLength",
            RuleField::FeedSiteUrl => "FeedSiteURL",
            RuleField::FeedTitle => "FeedTitle",
            RuleField::FeedCategoryTitle => "FeedCategoryTitle",
            RuleField::NeverMatch => "NeverMatch",
        }
    }

    pub fn kind(self) -> MatchKind {
        match self {
            RuleField::EntryContentLength => MatchKind::Numeric,
            RuleField::NeverMatch => MatchKind::Never,
            RuleField::EntryTitle
            | RuleField::EntryUrl
            | RuleField::EntryContent
            | RuleField::EntryAuthor
            | RuleField::EntryTag
            | RuleField::FeedSiteUrl
            | RuleField::FeedTitle
            | RuleField::FeedCategoryTitle => MatchKind::Regex,
        }
    }
}

/// A syntactically valid rule. The pattern is not yet compiled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub field: RuleField,
    pub pattern: String,
}

impl Rule {
    /// Parse `FieldName=Pattern`. Returns `None` (with a debug log) when malformed.
    pub fn parse(raw: &str) -> Option<Self> {
        let Some((name, pattern)) = raw.split_once('=') else {
            debug!(rule = %raw, "Invalid rule format (missing '=')");
            return None;
        };
        let name = name.trim();
        let pattern = pattern.trim();

        let Some(field) = RuleField::from_name(name) else {
            debug!(rule = %raw, field = %name, "Unsupported field name in rule");
            return None;
        };

        if pattern.is_empty() && field != RuleField::NeverMatch {
            debug!(rule = %raw, "Empty pattern in rule");
            return None;
        }

        Some(Self {
            field,
            pattern: pattern.to_string(),
        })
    }
}

/// A numeric comparison parsed from an operator expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericOp {
    Gt(i64),
    Ge(i64),
    Lt(i64),
    Le(i64),
    Eq(i64),
    /// Inclusive on both ends.
    Between(i64, i64),
}

impl NumericOp {
    pub fn parse(expr: &str) -> Result<Self, String> {
        let (op, arg) = expr
            .split_once(':')
            .ok_or_else(|| format!("missing ':' in operator '{expr}'"))?;
        let int = |s: &str| {
            s.trim()
                .parse::<i64>()
                .map_err(|e| format!("invalid integer '{}': {e}", s.trim()))
        };
        match op {
            "gt" => Ok(NumericOp::Gt(int(arg)?)),
            "ge" => Ok(NumericOp::Ge(int(arg)?)),
            "lt" => Ok(NumericOp::Lt(int(arg)?)),
            "le" => Ok(NumericOp::Le(int(arg)?)),
            "eq" => Ok(NumericOp::Eq(int(arg)?)),
            "between" => {
                let (lo, hi) = arg
                    .split_once(',')
                    .ok_or_else(|| format!("between needs 'lo,hi', got '{arg}'"))?;
                Ok(NumericOp::Between(int(lo)?, int(hi)?))
            }
            other => Err(format!("unknown operator '{other}'")),
        }
    }

    pub fn matches(self, value: i64) -> bool {
        match self {
            NumericOp::Gt(n) => value > n,
            NumericOp::Ge(n) => value >= n,
            NumericOp::Lt(n) => value < n,
            NumericOp::Le(n) => value <= n,
            NumericOp::Eq(n) => value == n,
            NumericOp::Between(lo, hi) => lo <= value && value <= hi,
        }
    }
}

/// Per-call memo of expensive derived fields, keyed by entry id.
///
/// Create one per processing call and pass it to every evaluation so the
/// text extraction and token count run at most once per entry.
#[derive(Debug, Default)]
pub struct FieldCache {
    text: HashMap<EntryId, String>,
    tokens: HashMap<EntryId, usize>,
}

impl FieldCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn content_text(&mut self, entry: &Entry) -> &str {
        self.text
            .entry(entry.id)
            .or_insert_with(|| content::content_text(&entry.content))
    }

    pub fn token_count(&mut self, entry: &Entry) -> usize {
        *self
            .tokens
            .entry(entry.id)
            .or_insert_with(|| content::token_count(&entry.content))
    }
}

/// The string value of `field` for `entry`.
pub fn field_value(entry: &Entry, field: RuleField, cache: &mut FieldCache) -> String {
    match field {
        RuleField::EntryTitle => entry.title.clone(),
        RuleField::EntryUrl => entry.url.clone(),
        RuleField::EntryContent => cache.content_text(entry).to_string(),
        RuleField::EntryAuthor => entry.author.clone(),
        RuleField::EntryTag => entry.tags.join(","),
        RuleField::EntryContentLength => cache.token_count(entry).to_string(),
        RuleField::FeedSiteUrl => entry.feed.site_url.clone(),
        RuleField::FeedTitle => entry.feed.title.clone(),
        RuleField::FeedCategoryTitle => entry.feed.category.title.clone(),
        RuleField::NeverMatch => String::new(),
    }
}

/// How a compiled rule tests its field value.
#[derive(Debug, Clone)]
enum Matcher {
    Regex(Regex),
    Numeric(NumericOp),
    Never,
}

/// A rule with its pattern compiled once, ready for evaluation.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    field: RuleField,
    matcher: Matcher,
}

impl CompiledRule {
    /// Parse and compile `raw`. Returns `None` when the rule is malformed,
    /// logging at debug for syntax problems and at warn for a bad regex or
    /// numeric operator.
    pub fn compile(raw: &str) -> Option<Self> {
        let rule = Rule::parse(raw)?;
        let matcher = match rule.field.kind() {
            MatchKind::Never => Matcher::Never,
            MatchKind::Numeric => match NumericOp::parse(&rule.pattern) {
                Ok(op) => Matcher::Numeric(op),
                Err(e) => {
                    warn!(rule = %raw, error = %e, "Invalid numeric operator in rule");
                    return None;
                }
            },
            MatchKind::Regex => match Regex::new(&rule.pattern) {
                Ok(re) => Matcher::Regex(re),
                Err(e) => {
                    warn!(rule = %raw, error = %e, "Invalid regex pattern in rule");
                    return None;
                }
            },
        };
        Some(Self {
            field: rule.field,
            matcher,
        })
    }

    pub fn matches(&self, entry: &Entry, cache: &mut FieldCache) -> bool {
        match &self.matcher {
            Matcher::Never => false,
            Matcher::Regex(re) => re.is_match(&field_value(entry, self.field, cache)),
            Matcher::Numeric(op) => {
                numeric_value(entry, self.field, cache).is_some_and(|v| op.matches(v))
            }
        }
    }
}

/// The integer value of a numeric field, `None` for every other field.
fn numeric_value(entry: &Entry, field: RuleField, cache: &mut FieldCache) -> Option<i64> {
    match field {
        RuleField::EntryContentLength => {
            Some(i64::try_from(cache.token_count(entry)).unwrap_or(i64::MAX))
        }
        RuleField::EntryTitle
        | RuleField::EntryUrl
        | RuleField::EntryContent
        | RuleField::EntryAuthor
        | RuleField::EntryTag
        | RuleField::FeedSiteUrl
        | RuleField::FeedTitle
        | RuleField::FeedCategoryTitle
        | RuleField::NeverMatch => None,
    }
}

/// An ordered rule list with malformed rules already dropped.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<CompiledRule>,
    /// Number of raw rules configured, valid or not.
    configured: usize,
}

impl RuleSet {
    pub fn compile<S: AsRef<str>>(raw: &[S]) -> Self {
        Self {
            rules: raw
                .iter()
                .filter_map(|r| CompiledRule::compile(r.as_ref()))
                .collect(),
            configured: raw.len(),
        }
    }

    /// True when no rules were configured. A list of only malformed rules
    /// is not empty: as an allow list it excludes everything.
    pub fn is_empty(&self) -> bool {
        self.configured == 0
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// True on the first valid rule that matches `entry`.
    pub fn matches_any(&self, entry: &Entry, cache: &mut FieldCache) -> bool {
        self.rules.iter().any(|rule| rule.matches(entry, cache))
    }
}

/// Compiled allow and deny lists of one agent.
#[derive(Debug, Clone, Default)]
pub struct AgentRules {
    pub allow: RuleSet,
    pub deny: RuleSet,
}

impl AgentRules {
    pub fn compile<S: AsRef<str>>(allow: &[S], deny: &[S]) -> Self {
        Self {
            allow: RuleSet::compile(allow),
            deny: RuleSet::compile(deny),
        }
    }
}

/// Decide whether an entry should be processed by an agent.
///
/// Deny-first: a deny match always excludes, a non-empty allow list must
/// match, and with no allow list the default is to process.
pub fn match_rules(entry: &Entry, rules: &AgentRules, cache: &mut FieldCache) -> bool {
    if !rules.deny.is_empty() && rules.deny.matches_any(entry, cache) {
        return false;
    }
    if !rules.allow.is_empty() {
        return rules.allow.matches_any(entry, cache);
    }
    true
}

/// Rule evaluation with a configurable allow/deny precedence.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleMatcher {
    precedence: RulePrecedence,
}

impl RuleMatcher {
    pub fn new(precedence: RulePrecedence) -> Self {
        Self { precedence }
    }

    pub fn matches(&self, entry: &Entry, rules: &AgentRules, cache: &mut FieldCache) -> bool {
        match self.precedence {
            RulePrecedence::DenyFirst => match_rules(entry, rules, cache),
            RulePrecedence::AllowFirst => {
                if !rules.allow.is_empty() {
                    return rules.allow.matches_any(entry, cache);
                }
                !(!rules.deny.is_empty() && rules.deny.matches_any(entry, cache))
            }
        }
    }
}
