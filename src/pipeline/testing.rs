//! In-memory feed service and scripted LLM for pipeline unit tests.

use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{FeedError, LlmError};
use crate::feed::types::{Entry, EntryId, EntryPage, Feed, FeedService};
use crate::llm::provider::{CompletionRequest, CompletionResponse, LlmProvider};

pub fn entry(id: EntryId, title: &str, content: &str) -> Entry {
    Entry {
        id,
        title: title.into(),
        url: format!("https://example.com/{id}"),
        content: content.into(),
        created_at: "2024-05-01T10:00:00Z".into(),
        ..Default::default()
    }
}

#[derive(Default)]
pub struct MockFeed {
    pub entries: Mutex<Vec<Entry>>,
    pub updates: Mutex<Vec<(EntryId, String)>>,
    pub feeds: Mutex<Vec<Feed>>,
    pub created: Mutex<Vec<(i64, String)>>,
    pub refreshed: Mutex<Vec<i64>>,
    pub list_calls: Mutex<Vec<(u64, u64)>>,
    pub fail_updates: HashSet<EntryId>,
    pub fail_listing: bool,
}

impl MockFeed {
    pub fn with_entries(entries: Vec<Entry>) -> Self {
        Self {
            entries: Mutex::new(entries),
            ..Default::default()
        }
    }

    pub fn updates(&self) -> Vec<(EntryId, String)> {
        self.updates.lock().unwrap().clone()
    }
}

#[async_trait]
impl FeedService for MockFeed {
    async fn list_unread(
        &self,
        offset: u64,
        limit: u64,
        _since: Option<i64>,
    ) -> Result<EntryPage, FeedError> {
        self.list_calls.lock().unwrap().push((offset, limit));
        if self.fail_listing {
            return Err(FeedError::RequestFailed {
                reason: "listing unavailable".into(),
            });
        }
        let entries = self.entries.lock().unwrap();
        let page = entries
            .iter()
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect();
        Ok(EntryPage {
            total: entries.len() as u64,
            entries: page,
        })
    }

    async fn update_content(&self, entry_id: EntryId, content: &str) -> Result<(), FeedError> {
        if self.fail_updates.contains(&entry_id) {
            return Err(FeedError::Status {
                status: 500,
                reason: "write rejected".into(),
            });
        }
        self.updates
            .lock()
            .unwrap()
            .push((entry_id, content.to_string()));
        Ok(())
    }

    async fn list_feeds(&self) -> Result<Vec<Feed>, FeedError> {
        Ok(self.feeds.lock().unwrap().clone())
    }

    async fn create_feed(&self, category_id: i64, feed_url: &str) -> Result<i64, FeedError> {
        self.created
            .lock()
            .unwrap()
            .push((category_id, feed_url.to_string()));
        Ok(99)
    }

    async fn refresh_feed(&self, feed_id: i64) -> Result<(), FeedError> {
        self.refreshed.lock().unwrap().push(feed_id);
        Ok(())
    }
}

type Reply = Box<dyn Fn(&CompletionRequest) -> Result<String, LlmError> + Send + Sync>;

/// LLM whose answer is computed from the request.
pub struct MockLlm {
    reply: Reply,
    delay: Option<Duration>,
    pub requests: Mutex<Vec<CompletionRequest>>,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl MockLlm {
    pub fn new(
        reply: impl Fn(&CompletionRequest) -> Result<String, LlmError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            reply: Box::new(reply),
            delay: None,
            requests: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn fixed(text: &'static str) -> Self {
        Self::new(move |_| Ok(text.to_string()))
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl LlmProvider for MockLlm {
    fn model_name(&self) -> &str {
        "mock"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let result = (self.reply)(&request);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        Ok(CompletionResponse {
            content: result?,
        })
    }
}
