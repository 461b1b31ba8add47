//! Digest job: turns accumulated summaries into one digest text and
//! refreshes the digest feed in the feed service.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, Timelike};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::digest::store::{DigestStore, SummaryStore};
use crate::error::{FeedError, PipelineError};
use crate::feed::types::FeedService;
use crate::llm::provider::{LlmProvider, complete_text};

/// Path under the digest URL that serves the digest feed.
pub const DIGEST_FEED_PATH: &str = "/rss/digest";

/// Heading placed between the greeting and the digest body.
const DIGEST_HEADING: &str = "### 🌐Digest";

/// Digest settings resolved from configuration.
#[derive(Debug, Clone)]
pub struct DigestSettings {
    /// Public base URL of the digest feed server.
    pub url: String,
    /// Feed title used to recognise an existing digest feed.
    pub name: String,
    pub category_id: i64,
    pub greeting_prompt: String,
    pub summary_prompt: String,
}

/// Time-of-day label for a digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestPeriod {
    Morning,
    Midday,
    Afternoon,
    Evening,
    Nightly,
}

impl DigestPeriod {
    pub fn label(self) -> &'static str {
        match self {
            DigestPeriod::Morning => "Morning",
            DigestPeriod::Midday => "Midday",
            DigestPeriod::Afternoon => "Afternoon",
            DigestPeriod::Evening => "Evening",
            DigestPeriod::Nightly => "Nightly",
        }
    }
}

/// Period for a local hour (0-23).
pub fn digest_period(hour: u32) -> DigestPeriod {
    match hour {
        5..=11 => DigestPeriod::Morning,
        12 => DigestPeriod::Midday,
        13..=17 => DigestPeriod::Afternoon,
        18..=21 => DigestPeriod::Evening,
        _ => DigestPeriod::Nightly,
    }
}

/// Parse cron expressions (`sec min hour day month weekday [year]`).
pub fn parse_schedules(expressions: &[String]) -> Result<Vec<cron::Schedule>, String> {
    expressions
        .iter()
        .map(|expr| {
            cron::Schedule::from_str(expr).map_err(|e| format!("invalid cron '{expr}': {e}"))
        })
        .collect()
}

/// Earliest upcoming fire time across all schedules.
pub fn next_fire(schedules: &[cron::Schedule]) -> Option<DateTime<Local>> {
    schedules
        .iter()
        .filter_map(|s| s.upcoming(Local).next())
        .min()
}

pub struct DigestGenerator {
    feed: Arc<dyn FeedService>,
    llm: Arc<dyn LlmProvider>,
    summaries: Arc<SummaryStore>,
    digests: Arc<DigestStore>,
    settings: DigestSettings,
}

impl DigestGenerator {
    pub fn new(
        feed: Arc<dyn FeedService>,
        llm: Arc<dyn LlmProvider>,
        summaries: Arc<SummaryStore>,
        digests: Arc<DigestStore>,
        settings: DigestSettings,
    ) -> Self {
        Self {
            feed,
            llm,
            summaries,
            digests,
            settings,
        }
    }

    pub fn feed_url(&self) -> String {
        format!(
            "{}{}",
            self.settings.url.trim_end_matches('/'),
            DIGEST_FEED_PATH
        )
    }

    async fn find_feed(&self) -> Result<Option<i64>, FeedError> {
        let url = self.feed_url();
        let feeds = self.feed.list_feeds().await?;
        Ok(feeds
            .iter()
            .find(|f| {
                f.feed_url == url
                    || (!self.settings.name.is_empty() && f.title.contains(&self.settings.name))
            })
            .map(|f| f.id))
    }

    /// Make sure the digest feed is subscribed. Returns its id.
    pub async fn init_feed(&self) -> Result<i64, PipelineError> {
        if let Some(id) = self.find_feed().await? {
            debug!(feed_id = id, "Digest feed already exists");
            return Ok(id);
        }
        let url = self.feed_url();
        let id = self
            .feed
            .create_feed(self.settings.category_id, &url)
            .await?;
        info!(feed_id = id, url = %url, "Created digest feed");
        Ok(id)
    }

    /// Build a digest from pending summaries. Returns `false` when there were none.
    pub async fn generate(&self) -> Result<bool, PipelineError> {
        self.generate_at(Local::now()).await
    }

    pub async fn generate_at(&self, now: DateTime<Local>) -> Result<bool, PipelineError> {
        let records = self.summaries.consume().await?;
        if records.is_empty() {
            info!("No summaries pending, skipping digest");
            return Ok(false);
        }
        info!(
            count = records.len(),
            period = digest_period(now.hour()).label(),
            "Generating digest"
        );

        let stamp = now.format("%B %d, %Y at %I:%M %p").to_string();
        let greeting = complete_text(
            self.llm.as_ref(),
            Some(&self.settings.greeting_prompt),
            &stamp,
            None,
        )
        .await?;

        let contents = records
            .iter()
            .map(|r| r.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        let digest = complete_text(
            self.llm.as_ref(),
            Some(&self.settings.summary_prompt),
            &contents,
            None,
        )
        .await?;

        self.digests
            .write(&format!("{greeting}\n\n{DIGEST_HEADING}\n{digest}"))
            .await?;

        match self.find_feed().await? {
            Some(id) => {
                self.feed.refresh_feed(id).await?;
                info!(feed_id = id, "Digest feed refreshed");
            }
            None => warn!("Digest feed not found, skipping refresh"),
        }
        Ok(true)
    }
}

/// Spawn the digest job on its cron schedules.
///
/// The loop exits as soon as `shutdown` turns true (or its sender is dropped)
/// while waiting for the next fire time. A generation already running is
/// always finished, so awaiting the handle never loses consumed summaries.
pub fn spawn_digest_schedule(
    generator: Arc<DigestGenerator>,
    schedules: Vec<cron::Schedule>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(schedules = schedules.len(), "Digest scheduler started");
        loop {
            if *shutdown.borrow_and_update() {
                break;
            }
            let Some(next) = next_fire(&schedules) else {
                warn!("No upcoming digest time, scheduler stopping");
                return;
            };
            let wait = (next - Local::now()).to_std().unwrap_or(Duration::ZERO);
            debug!(next = %next, "Next digest scheduled");

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
            }

            if let Err(e) = generator.generate().await {
                error!(error = %e, "Digest generation failed");
            }
        }
        info!("Digest scheduler shutting down");
    })
}
