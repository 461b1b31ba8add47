//! Miniflux REST API client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, error, info};

use crate::error::FeedError;
use crate::feed::types::{EntryId, EntryPage, Feed, FeedService};

const AUTH_HEADER: &str = "X-Auth-Token";

/// Connection settings for a Miniflux instance.
#[derive(Debug, Clone)]
pub struct MinifluxConfig {
    pub base_url: String,
    pub api_key: SecretString,
    pub timeout: Duration,
}

/// Miniflux API client implementing `FeedService`.
pub struct MinifluxClient {
    client: Client,
    base_url: String,
    api_key: SecretString,
}

#[derive(Debug, Deserialize)]
struct MinifluxErrorBody {
    error_message: String,
}

#[derive(Debug, Deserialize)]
struct CreateFeedResponse {
    feed_id: i64,
}

#[derive(Debug, Deserialize)]
struct CurrentUser {
    username: String,
}

impl MinifluxClient {
    pub fn new(config: MinifluxConfig) -> Result<Self, FeedError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1{}", self.base_url, path)
    }

    fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.header(AUTH_HEADER, self.api_key.expose_secret())
    }

    /// Fetch the authenticated user. Used as a connectivity check.
    pub async fn me(&self) -> Result<String, FeedError> {
        let response = self.authed(self.client.get(self.url("/me"))).send().await?;
        let user: CurrentUser = check(response).await?.json().await?;
        Ok(user.username)
    }

    /// Poll the server until it answers, sleeping `retry_every` between attempts.
    pub async fn wait_until_reachable(&self, retry_every: Duration) {
        loop {
            match self.me().await {
                Ok(username) => {
                    info!(user = %username, "Successfully connected to Miniflux");
                    return;
                }
                Err(e) => {
                    error!(error = %e, "Cannot connect to Miniflux, retrying");
                    tokio::time::sleep(retry_every).await;
                }
            }
        }
    }
}

/// Turn non-2xx responses into `FeedError::Status`, keeping Miniflux's message.
async fn check(response: Response) -> Result<Response, FeedError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await.unwrap_or_default();
    let reason = serde_json::from_str::<MinifluxErrorBody>(&text)
        .map(|b| b.error_message)
        .unwrap_or(text);
    Err(FeedError::Status {
        status: status.as_u16(),
        reason,
    })
}

#[async_trait]
impl FeedService for MinifluxClient {
    async fn list_unread(
        &self,
        offset: u64,
        limit: u64,
        since: Option<i64>,
    ) -> Result<EntryPage, FeedError> {
        let mut query: Vec<(&str, String)> = vec![
            ("status", "unread".to_string()),
            ("offset", offset.to_string()),
            ("limit", limit.to_string()),
            ("order", "id".to_string()),
            ("direction", "desc".to_string()),
        ];
        if let Some(ts) = since.filter(|ts| *ts > 0) {
            query.push(("after", ts.to_string()));
        }

        let response = self
            .authed(self.client.get(self.url("/entries")))
            .query(&query)
            .send()
            .await?;
        let page: EntryPage = check(response)
            .await?
            .json()
            .await
            .map_err(|e| FeedError::InvalidResponse(format!("entries: {e}")))?;

        debug!(
            offset,
            limit,
            total = page.total,
            returned = page.entries.len(),
            "Fetched unread entries"
        );
        Ok(page)
    }

    async fn update_content(&self, entry_id: EntryId, content: &str) -> Result<(), FeedError> {
        let response = self
            .authed(self.client.put(self.url(&format!("/entries/{entry_id}"))))
            .json(&serde_json::json!({ "content": content }))
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    async fn list_feeds(&self) -> Result<Vec<Feed>, FeedError> {
        let response = self.authed(self.client.get(self.url("/feeds"))).send().await?;
        check(response)
            .await?
            .json()
            .await
            .map_err(|e| FeedError::InvalidResponse(format!("feeds: {e}")))
    }

    async fn create_feed(&self, category_id: i64, feed_url: &str) -> Result<i64, FeedError> {
        let response = self
            .authed(self.client.post(self.url("/feeds")))
            .json(&serde_json::json!({
                "feed_url": feed_url,
                "category_id": category_id,
            }))
            .send()
            .await?;
        let created: CreateFeedResponse = check(response)
            .await?
            .json()
            .await
            .map_err(|e| FeedError::InvalidResponse(format!("create feed: {e}")))?;
        Ok(created.feed_id)
    }

    async fn refresh_feed(&self, feed_id: i64) -> Result<(), FeedError> {
        let response = self
            .authed(self.client.put(self.url(&format!("/feeds/{feed_id}/refresh"))))
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }
}
