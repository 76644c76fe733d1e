//! Normalized post record.
//!
//! [`PostRecord`] is the channel-agnostic representation of one post used
//! throughout the pipeline. It is produced by the
//! [`normalize`](crate::normalize) stage and never mutated afterwards.
//!
//! # Examples
//!
//! ```
//! use postpack::PostRecord;
//! use chrono::{TimeZone, Utc};
//!
//! let ts = Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap();
//! let record = PostRecord::new(42, ts, "Release notes: https://example.com/v2")
//!     .with_links(vec!["https://example.com/v2".into()])
//!     .with_reactions(17)
//!     .with_views(1_200);
//!
//! assert_eq!(record.id(), 42);
//! assert_eq!(record.reactions(), 17);
//! assert_eq!(record.links().len(), 1);
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One reaction kind and how many times it was used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionCount {
    /// Emoji shown for the reaction.
    pub emoji: String,
    /// Number of users who reacted with it.
    pub count: u64,
}

impl ReactionCount {
    pub fn new(emoji: impl Into<String>, count: u64) -> Self {
        Self {
            emoji: emoji.into(),
            count,
        }
    }
}

/// A normalized channel post.
///
/// # Fields
///
/// | Field | Type | Description |
/// |-------|------|-------------|
/// | `id` | `u64` | Upstream message id, unique per channel |
/// | `timestamp` | `DateTime<Utc>` | When the post was published |
/// | `text` | `String` | Plain text body, formatting flattened |
/// | `links` | `Vec<String>` | URLs in order of first appearance, no duplicates |
/// | `reactions` | `u64` | Sum of all reaction counts, 0 when not exposed |
/// | `views` | `u64` | View counter, 0 when not exposed |
/// | `top_reactions` | `Vec<ReactionCount>` | Up to three most used reactions |
///
/// Counters that upstream does not expose, or exposes while channel analytics
/// are disabled, are recorded as 0. Zero therefore means "none or unknown".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostRecord {
    /// Upstream message id.
    pub id: u64,

    /// Publication time.
    pub timestamp: DateTime<Utc>,

    /// Plain text body.
    pub text: String,

    /// Extracted links.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<String>,

    /// Total reaction count.
    #[serde(default)]
    pub reactions: u64,

    /// View count.
    #[serde(default)]
    pub views: u64,

    /// Most used reactions, largest first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub top_reactions: Vec<ReactionCount>,
}

impl PostRecord {
    /// Creates a record with no links and zero counters.
    pub fn new(id: u64, timestamp: DateTime<Utc>, text: impl Into<String>) -> Self {
        Self {
            id,
            timestamp,
            text: text.into(),
            links: Vec::new(),
            reactions: 0,
            views: 0,
            top_reactions: Vec::new(),
        }
    }

    // =========================================================================
    // Builder methods
    // =========================================================================

    #[must_use]
    pub fn with_links(mut self, links: Vec<String>) -> Self {
        self.links = links;
        self
    }

    #[must_use]
    pub fn with_reactions(mut self, reactions: u64) -> Self {
        self.reactions = reactions;
        self
    }

    #[must_use]
    pub fn with_views(mut self, views: u64) -> Self {
        self.views = views;
        self
    }

    #[must_use]
    pub fn with_top_reactions(mut self, top: Vec<ReactionCount>) -> Self {
        self.top_reactions = top;
        self
    }

    // =========================================================================
    // Accessor methods
    // =========================================================================

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn links(&self) -> &[String] {
        &self.links
    }

    pub fn reactions(&self) -> u64 {
        self.reactions
    }

    pub fn views(&self) -> u64 {
        self.views
    }

    pub fn top_reactions(&self) -> &[ReactionCount] {
        &self.top_reactions
    }

    /// Returns `true` if the text is empty or whitespace-only.
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}
