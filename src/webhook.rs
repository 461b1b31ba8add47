//! Miniflux webhook endpoint.
//!
//! Miniflux pushes `new_entries` events signed with HMAC-SHA256 over the raw
//! body. Verified entries go through the same worker pool as polled ones.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use sha2::Sha256;
use tracing::{info, warn};

use crate::feed::types::{Entry, Feed};
use crate::pipeline::BatchController;

pub const WEBHOOK_PATH: &str = "/api/miniflux-ai";
pub const SIGNATURE_HEADER: &str = "X-Miniflux-Signature";
pub const EVENT_HEADER: &str = "X-Miniflux-Event-Type";
pub const NEW_ENTRIES_EVENT: &str = "new_entries";

type HmacSha256 = Hmac<Sha256>;

/// Shared state for the webhook route.
#[derive(Clone)]
pub struct WebhookState {
    pub batch: Arc<BatchController>,
    pub secret: Arc<SecretString>,
}

/// Body of a `new_entries` event. Entries arrive without their feed.
#[derive(Debug, Deserialize)]
struct NewEntriesEvent {
    #[serde(default)]
    feed: Feed,
    #[serde(default)]
    entries: Vec<Entry>,
}

/// Constant-time check of a hex signature.
pub fn verify_signature(secret: &[u8], payload: &[u8], signature: &str) -> bool {
    let Ok(expected) = hex::decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return false;
    };
    mac.update(payload);
    mac.verify_slice(&expected).is_ok()
}

fn status(code: StatusCode, body: serde_json::Value) -> Response {
    (code, Json(body)).into_response()
}

/// POST /api/miniflux-ai
async fn receive(State(state): State<WebhookState>, headers: HeaderMap, body: Bytes) -> Response {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !verify_signature(state.secret.expose_secret().as_bytes(), &body, signature) {
        warn!("Rejected webhook delivery with a bad signature");
        return status(
            StatusCode::FORBIDDEN,
            json!({"status": "error", "message": "invalid signature"}),
        );
    }

    let event = headers
        .get(EVENT_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if event != NEW_ENTRIES_EVENT {
        return status(StatusCode::OK, json!({"status": "ok"}));
    }

    let NewEntriesEvent { feed, mut entries } = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, "Malformed webhook payload");
            return status(
                StatusCode::BAD_REQUEST,
                json!({"status": "error", "message": e.to_string()}),
            );
        }
    };
    for entry in &mut entries {
        entry.feed = feed.clone();
    }

    info!(count = entries.len(), feed = %feed.title, "Entries received via webhook");
    let stats = state.batch.process_entries(entries).await;
    info!(%stats, "Webhook entries processed");
    status(StatusCode::OK, json!({"status": "ok"}))
}

/// Build the webhook route.
pub fn webhook_routes(state: WebhookState) -> Router {
    Router::new()
        .route(WEBHOOK_PATH, post(receive))
        .with_state(state)
}
