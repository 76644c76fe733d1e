//! Upstream messaging API.
//!
//! The [`Upstream`] trait is the only door to the network. The pipeline
//! never calls it directly: every call goes through
//! [`RateLimitedTransport`](crate::transport::RateLimitedTransport).
//!
//! Implementations:
//!
//! - [`HttpUpstream`]: JSON-over-HTTP gateway (requires the `http` feature)
//! - [`FixtureUpstream`]: in-memory channels with scriptable failures, also
//!   used for demo mode
//!
//! # Contract
//!
//! - `fetch_history` returns messages **newest first**, at most `limit` per page
//! - `next` is `None` once the oldest message has been returned
//! - throttling is reported as [`UpstreamError::Throttled`], never slept on

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub mod fixture;
#[cfg(feature = "http")]
pub mod http;

pub use fixture::FixtureUpstream;
#[cfg(feature = "http")]
pub use http::HttpUpstream;

/// Largest page the upstream API serves.
pub const MAX_PAGE_SIZE: u32 = 100;

/// Failures reported by an upstream implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpstreamError {
    /// Upstream asks the caller to wait before the next request.
    #[error("throttled, retry after {}s", retry_after.as_secs())]
    Throttled { retry_after: Duration },

    /// No channel matches the handle.
    #[error("channel not found")]
    NotFound,

    /// The channel exists but is not publicly readable.
    #[error("channel is private")]
    Private,

    /// The channel was deleted or access was revoked.
    #[error("channel gone: {0}")]
    Gone(String),

    /// Timeouts, connection resets, 5xx.
    #[error("transient failure: {0}")]
    Transient(String),

    /// Upstream answered with something we cannot read.
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Channel as described by the upstream lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawChannel {
    pub id: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default, alias = "handle")]
    pub username: Option<String>,
}

/// One reaction aggregate on a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawReaction {
    /// Missing for custom (sticker) emoji.
    #[serde(default, alias = "emoji")]
    pub emoticon: Option<String>,
    #[serde(default)]
    pub count: u64,
}

/// Reaction aggregates of a message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawReactions {
    #[serde(default)]
    pub results: Vec<RawReaction>,
}

/// A message as served by the upstream history call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawMessage {
    /// Message id, unique per channel
    pub id: u64,
    /// Publication time as unix seconds
    #[serde(with = "chrono::serde::ts_seconds")]
    pub date: DateTime<Utc>,
    /// Plain string or array of strings and entity objects
    #[serde(default)]
    pub text: Option<Value>,
    /// View counter, absent when not exposed
    #[serde(default)]
    pub views: Option<u64>,
    /// Reaction aggregates, absent when reactions are disabled
    #[serde(default)]
    pub reactions: Option<RawReactions>,
}

impl RawMessage {
    /// Creates a plain-text message without counters.
    pub fn new(id: u64, date: DateTime<Utc>, text: impl Into<String>) -> Self {
        Self {
            id,
            date,
            text: Some(Value::String(text.into())),
            views: None,
            reactions: None,
        }
    }

    #[must_use]
    pub fn with_views(mut self, views: u64) -> Self {
        self.views = Some(views);
        self
    }

    #[must_use]
    pub fn with_reactions(mut self, reactions: Vec<(&str, u64)>) -> Self {
        self.reactions = Some(RawReactions {
            results: reactions
                .into_iter()
                .map(|(emoji, count)| RawReaction {
                    emoticon: Some(emoji.to_string()),
                    count,
                })
                .collect(),
        });
        self
    }

    #[must_use]
    pub fn with_text_value(mut self, text: Value) -> Self {
        self.text = Some(text);
        self
    }
}

/// Opaque resume point in a channel's history.
///
/// Only upstream implementations look inside; the paginator just hands the
/// token back on the next request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PageCursor(String);

impl PageCursor {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PageCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Parameters of one history page request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryQuery {
    pub channel_id: u64,
    /// Resume point; `None` for the first page.
    pub cursor: Option<PageCursor>,
    /// Only return messages strictly older than this instant.
    pub offset_date: Option<DateTime<Utc>>,
    pub limit: u32,
}

/// One page of history, newest message first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryPage {
    #[serde(default)]
    pub messages: Vec<RawMessage>,
    #[serde(default, alias = "next_offset")]
    pub next: Option<PageCursor>,
}

/// The upstream messaging API.
#[async_trait]
pub trait Upstream: Send + Sync {
    /// Returns the human-readable name of this upstream.
    fn name(&self) -> &'static str;

    /// Looks up a channel by canonical handle.
    async fn lookup_channel(&self, handle: &str) -> Result<RawChannel, UpstreamError>;

    /// Fetches one page of history.
    async fn fetch_history(&self, query: &HistoryQuery) -> Result<HistoryPage, UpstreamError>;
}
