//! Batch controller: pages through unread entries and fans them out to a
//! bounded worker pool.
//!
//! One page is in flight at a time. Every entry of a page resolves before
//! the next page is requested.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::error::PipelineError;
use crate::feed::types::{Entry, EntryId, FeedService};
use crate::pipeline::processor::EntryProcessor;
use crate::pipeline::types::{BatchStats, EntryDisposition, Outcomes};

pub const DEFAULT_PAGE_SIZE: u64 = 100;
pub const DEFAULT_MAX_WORKERS: usize = 4;

/// Batch sizing.
#[derive(Debug, Clone, Copy)]
pub struct BatchConfig {
    pub page_size: u64,
    pub max_workers: usize,
    /// Only list entries published after this unix timestamp.
    pub since: Option<i64>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            max_workers: DEFAULT_MAX_WORKERS,
            since: None,
        }
    }
}

/// Owns the worker pool for the process lifetime.
pub struct BatchController {
    feed: Arc<dyn FeedService>,
    processor: Arc<EntryProcessor>,
    workers: Arc<Semaphore>,
    config: BatchConfig,
    shutdown: Arc<AtomicBool>,
}

impl BatchController {
    pub fn new(
        feed: Arc<dyn FeedService>,
        processor: Arc<EntryProcessor>,
        config: BatchConfig,
    ) -> Self {
        let max_workers = config.max_workers.max(1);
        info!(max_workers, page_size = config.page_size, "Worker pool created");
        Self {
            feed,
            processor,
            workers: Arc::new(Semaphore::new(max_workers)),
            config,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag that stops the controller before its next page when set.
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    /// Tear down the worker pool. Entries submitted afterwards fail.
    pub fn close(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
        self.workers.close();
        info!("Worker pool closed");
    }

    /// Process every unread entry, one page at a time.
    ///
    /// Always returns aggregate counts; a page fetch failure ends the batch
    /// early with the counts gathered so far.
    pub async fn run_batch(&self) -> BatchStats {
        let started = Instant::now();
        let mut stats = BatchStats::default();
        let mut offset: u64 = 0;

        info!("Starting batch over unread entries");
        loop {
            if self.is_shutting_down() {
                info!("Shutdown requested, not fetching further pages");
                break;
            }

            let page = match self
                .feed
                .list_unread(offset, self.config.page_size, self.config.since)
                .await
            {
                Ok(page) => page,
                Err(e) => {
                    error!(offset, error = %e, "Failed to fetch unread entries");
                    break;
                }
            };

            if page.entries.is_empty() {
                break;
            }
            let count = page.entries.len() as u64;
            debug!(offset, count, total = page.total, "Processing page");

            self.run_page(page.entries, &mut stats).await;

            offset += count;
            if offset >= page.total {
                break;
            }
        }

        info!(
            %stats,
            elapsed_secs = started.elapsed().as_secs_f64(),
            "Batch complete"
        );
        stats
    }

    /// Process entries pushed by the feed service on the same worker pool.
    pub async fn process_entries(&self, entries: Vec<Entry>) -> BatchStats {
        let mut stats = BatchStats::default();
        if entries.is_empty() {
            return stats;
        }
        debug!(count = entries.len(), "Processing pushed entries");
        self.run_page(entries, &mut stats).await;
        stats
    }

    async fn run_page(&self, entries: Vec<Entry>, stats: &mut BatchStats) {
        let mut tasks: JoinSet<(EntryId, Result<Outcomes, PipelineError>)> = JoinSet::new();

        for entry in entries {
            let workers = Arc::clone(&self.workers);
            let processor = Arc::clone(&self.processor);
            tasks.spawn(async move {
                let _permit = match workers.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        return (
                            entry.id,
                            Err(PipelineError::Worker("worker pool closed".into())),
                        );
                    }
                };
                let result = processor.process(&entry).await;
                (entry.id, result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            let disposition = match joined {
                Ok((_, Ok(outcomes))) => EntryDisposition::classify(&outcomes),
                Ok((entry_id, Err(e))) => {
                    warn!(entry_id, error = %e, "Entry processing failed");
                    EntryDisposition::Failed
                }
                Err(e) => {
                    error!(error = %e, "Entry worker panicked");
                    EntryDisposition::Failed
                }
            };
            stats.record(disposition);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::error::LlmError;
    use crate::pipeline::dedup::DedupCache;
    use crate::pipeline::testing::{MockFeed, MockLlm, entry};
    use crate::pipeline::types::{AgentDefinition, NamedAgent};

    fn agents(names: &[&str]) -> Vec<NamedAgent> {
        names
            .iter()
            .map(|n| {
                NamedAgent::new(
                    *n,
                    AgentDefinition {
                        prompt: format!("Agent {n}"),
                        ..Default::default()
                    },
                )
            })
            .collect()
    }

    fn entries(n: i64) -> Vec<Entry> {
        (1..=n)
            .map(|id| entry(id, &format!("Entry {id}"), "<p>Body</p>"))
            .collect()
    }

    fn controller(
        feed: &Arc<MockFeed>,
        llm: &Arc<MockLlm>,
        agent_names: &[&str],
        config: BatchConfig,
    ) -> BatchController {
        let processor = EntryProcessor::new(
            feed.clone(),
            llm.clone(),
            agents(agent_names),
            Arc::new(DedupCache::default()),
        );
        BatchController::new(feed.clone(), Arc::new(processor), config)
    }

    fn config(page_size: u64, max_workers: usize) -> BatchConfig {
        BatchConfig {
            page_size,
            max_workers,
            since: None,
        }
    }

    #[tokio::test]
    async fn pages_until_total_reached() {
        let feed = Arc::new(MockFeed::with_entries(entries(5)));
        let llm = Arc::new(MockLlm::fixed("ok"));
        let batch = controller(&feed, &llm, &["summary"], config(2, 2));

        let stats = batch.run_batch().await;

        assert_eq!(stats.updated, 5);
        assert_eq!(stats.total(), 5);
        assert_eq!(
            *feed.list_calls.lock().unwrap(),
            vec![(0, 2), (2, 2), (4, 2)]
        );
        assert_eq!(feed.updates().len(), 5);
    }

    #[tokio::test]
    async fn empty_listing_is_a_quiet_batch() {
        let feed = Arc::new(MockFeed::default());
        let llm = Arc::new(MockLlm::fixed("ok"));
        let batch = controller(&feed, &llm, &["summary"], BatchConfig::default());

        assert_eq!(batch.run_batch().await, BatchStats::default());
        assert_eq!(feed.list_calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn worker_count_bounds_concurrency() {
        let feed = Arc::new(MockFeed::with_entries(entries(8)));
        let llm = Arc::new(MockLlm::fixed("ok").with_delay(Duration::from_millis(20)));
        let batch = controller(&feed, &llm, &["summary"], config(8, 3));

        let stats = batch.run_batch().await;

        assert_eq!(stats.updated, 8);
        let max = llm.max_in_flight.load(std::sync::atomic::Ordering::SeqCst);
        assert!(max <= 3, "max in flight was {max}");
        assert!(max >= 2, "expected parallel workers, saw {max}");
    }

    #[tokio::test]
    async fn aggregates_partial_failed_and_skipped() {
        let mut list = entries(3);
        list[0].title = "fail everything".into();
        list[1].title = "fail translate".into();
        list.push(entry(4, "empty", "   "));
        let feed = Arc::new(MockFeed::with_entries(list));

        let llm = Arc::new(MockLlm::new(|req| {
            let user = req.user_prompt().unwrap_or_default();
            let system = req.system_prompt().unwrap_or_default();
            let fails = user.contains("fail everything")
                || (user.contains("fail translate") && system == "Agent translate");
            if fails {
                Err(LlmError::RequestFailed {
                    provider: "mock".into(),
                    reason: "nope".into(),
                })
            } else {
                Ok("ok".into())
            }
        }));
        let batch = controller(&feed, &llm, &["summary", "translate"], config(10, 2));

        let stats = batch.run_batch().await;

        assert_eq!(stats.failed, 1);
        assert_eq!(stats.partial, 1);
        assert_eq!(stats.updated, 1);
        assert_eq!(stats.skipped, 1);
        // The failed entry is not written back; the partial one is.
        let written: Vec<EntryId> = feed.updates().iter().map(|(id, _)| *id).collect();
        assert!(!written.contains(&1));
        assert!(written.contains(&2));
    }

    #[tokio::test]
    async fn second_batch_is_deduplicated() {
        let feed = Arc::new(MockFeed::with_entries(entries(3)));
        let llm = Arc::new(MockLlm::fixed("ok"));
        let batch = controller(&feed, &llm, &["summary"], config(10, 2));

        batch.run_batch().await;
        let again = batch.run_batch().await;

        assert_eq!(again.skipped, 3);
        assert_eq!(llm.calls(), 3);
    }

    #[tokio::test]
    async fn write_back_failure_counts_as_failed() {
        let feed = Arc::new(MockFeed {
            entries: std::sync::Mutex::new(entries(2)),
            fail_updates: [2].into_iter().collect(),
            ..Default::default()
        });
        let llm = Arc::new(MockLlm::fixed("ok"));
        let batch = controller(&feed, &llm, &["summary"], config(10, 2));

        let stats = batch.run_batch().await;
        assert_eq!(stats.updated, 1);
        assert_eq!(stats.failed, 1);
    }

    #[tokio::test]
    async fn panicking_worker_is_contained() {
        let feed = Arc::new(MockFeed::with_entries(entries(3)));
        let llm = Arc::new(MockLlm::new(|req| {
            if req.user_prompt().unwrap_or_default().contains("Entry 2") {
                panic!("worker blew up");
            }
            Ok("ok".into())
        }));
        let batch = controller(&feed, &llm, &["summary"], config(10, 2));

        let stats = batch.run_batch().await;
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.updated, 2);
    }

    #[tokio::test]
    async fn listing_failure_ends_batch_with_counts() {
        let feed = Arc::new(MockFeed {
            fail_listing: true,
            ..Default::default()
        });
        let llm = Arc::new(MockLlm::fixed("ok"));
        let batch = controller(&feed, &llm, &["summary"], BatchConfig::default());

        assert_eq!(batch.run_batch().await.total(), 0);
    }

    #[tokio::test]
    async fn shutdown_flag_stops_before_next_page() {
        let feed = Arc::new(MockFeed::with_entries(entries(4)));
        let llm = Arc::new(MockLlm::fixed("ok"));
        let batch = controller(&feed, &llm, &["summary"], config(2, 2));

        batch.shutdown_flag().store(true, Ordering::Relaxed);
        let stats = batch.run_batch().await;

        assert_eq!(stats.total(), 0);
        assert!(feed.list_calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn pushed_entries_skip_listing() {
        let feed = Arc::new(MockFeed::default());
        let llm = Arc::new(MockLlm::fixed("ok"));
        let batch = controller(&feed, &llm, &["summary"], config(10, 2));

        let stats = batch.process_entries(entries(3)).await;

        assert_eq!(stats.updated, 3);
        assert!(feed.list_calls.lock().unwrap().is_empty());
        assert_eq!(feed.updates().len(), 3);
        assert_eq!(batch.process_entries(Vec::new()).await, BatchStats::default());
    }

    #[tokio::test]
    async fn closed_pool_fails_submissions() {
        let feed = Arc::new(MockFeed::with_entries(entries(2)));
        let llm = Arc::new(MockLlm::fixed("ok"));
        let batch = controller(&feed, &llm, &["summary"], config(10, 2));

        batch.close();
        batch.shutdown_flag().store(false, Ordering::Relaxed);
        let stats = batch.run_batch().await;

        assert_eq!(stats.failed, 2);
        assert_eq!(llm.calls(), 0);
    }
}
