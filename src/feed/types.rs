//! Feed-service data model and the `FeedService` collaborator trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::FeedError;

/// Stable identifier of an entry in the feed service.
pub type EntryId = i64;

/// A feed category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub title: String,
}

/// A subscribed feed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feed {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub site_url: String,
    #[serde(default)]
    pub feed_url: String,
    #[serde(default)]
    pub category: Category,
}

/// One syndicated article.
///
/// Treated as immutable during processing, except that the processor builds
/// a local copy whose `content` is the de-annotated original.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub id: EntryId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub author: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub tags: Vec<String>,
    /// RFC 3339 timestamp as reported by the feed service.
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub feed: Feed,
}

impl Entry {
    /// Copy of this entry with its body replaced.
    pub fn with_content(&self, content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..self.clone()
        }
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

/// One page of unread entries.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EntryPage {
    /// Total number of unread entries matching the query (across all pages).
    #[serde(default)]
    pub total: u64,
    #[serde(default, deserialize_with = "null_as_empty_entries")]
    pub entries: Vec<Entry>,
}

fn null_as_empty_entries<'de, D>(deserializer: D) -> Result<Vec<Entry>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Vec<Entry>>::deserialize(deserializer)?.unwrap_or_default())
}

/// The feed-service operations the pipeline depends on.
///
/// Implementations must be safe for concurrent use by every pipeline worker.
#[async_trait]
pub trait FeedService: Send + Sync {
    /// List unread entries, newest first.
    async fn list_unread(
        &self,
        offset: u64,
        limit: u64,
        since: Option<i64>,
    ) -> Result<EntryPage, FeedError>;

    /// Replace an entry's body.
    async fn update_content(&self, entry_id: EntryId, content: &str) -> Result<(), FeedError>;

    /// List all subscribed feeds.
    async fn list_feeds(&self) -> Result<Vec<Feed>, FeedError>;

    /// Subscribe to a feed URL in a category. Returns the new feed id.
    async fn create_feed(&self, category_id: i64, feed_url: &str) -> Result<i64, FeedError>;

    /// Ask the feed service to re-fetch a feed.
    async fn refresh_feed(&self, feed_id: i64) -> Result<(), FeedError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_deserializes_miniflux_shape() {
        let json = serde_json::json!({
            "id": 42,
            "title": "Python Guide",
            "url": "https://example.com/python",
            "content": "<p>Hello</p>",
            "author": "Ada",
            "tags": null,
            "created_at": "2024-05-01T10:00:00Z",
            "status": "unread",
            "feed": {
                "id": 7,
                "title": "Example Blog",
                "site_url": "https://example.com",
                "feed_url": "https://example.com/rss",
                "category": {"id": 1, "title": "Tech"}
            }
        });
        let entry: Entry = serde_json::from_value(json).unwrap();
        assert_eq!(entry.id, 42);
        assert!(entry.tags.is_empty());
        assert_eq!(entry.feed.category.title, "Tech");
    }

    #[test]
    fn entry_page_tolerates_null_entries() {
        let page: EntryPage = serde_json::from_str(r#"{"total": 0, "entries": null}"#).unwrap();
        assert_eq!(page.total, 0);
        assert!(page.entries.is_empty());
    }

    #[test]
    fn with_content_keeps_other_fields() {
        let entry = Entry {
            id: 1,
            title: "t".into(),
            content: "old".into(),
            ..Default::default()
        };
        let copy = entry.with_content("new");
        assert_eq!(copy.content, "new");
        assert_eq!(copy.title, "t");
        assert_eq!(entry.content, "old");
    }
}
