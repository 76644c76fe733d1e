//! In-memory upstream.
//!
//! Serves channels from memory with the same ordering and paging contract as
//! the live API: newest first, bounded pages, `offset_date` honoured on the
//! first page. Failures can be scripted per call number, which is how the
//! throttling and mid-walk failure paths are exercised in tests.
//!
//! [`FixtureUpstream::demo`] builds the fixed demo channel used when no live
//! upstream is configured.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, NaiveDate, NaiveTime};

use super::{
    HistoryPage, HistoryQuery, PageCursor, RawChannel, RawMessage, Upstream, UpstreamError,
};

/// Handle of the demo channel.
pub const DEMO_HANDLE: &str = "demo_channel";

#[derive(Debug, Clone)]
struct FixtureChannel {
    info: RawChannel,
    private: bool,
    /// Newest first.
    messages: Vec<RawMessage>,
}

/// Upstream backed by in-memory channels.
///
/// # Example
///
/// ```rust
/// use postpack::upstream::{FixtureUpstream, RawChannel, RawMessage, UpstreamError};
/// use chrono::{TimeZone, Utc};
/// use std::time::Duration;
///
/// let ts = Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap();
/// let upstream = FixtureUpstream::new().with_channel(
///     RawChannel { id: 1, title: "News".into(), username: Some("news".into()) },
///     vec![RawMessage::new(1, ts, "hello")],
/// );
///
/// // The second history call will be throttled once.
/// upstream.fail_fetch(2, UpstreamError::Throttled { retry_after: Duration::from_secs(3) });
/// ```
#[derive(Debug, Default)]
pub struct FixtureUpstream {
    channels: HashMap<String, FixtureChannel>,
    /// Serves every lookup with this channel when set.
    catch_all: Option<String>,
    /// Pages re-serve this many messages of the previous page.
    overlap: usize,
    lookup_faults: Mutex<HashMap<usize, UpstreamError>>,
    fetch_faults: Mutex<HashMap<usize, UpstreamError>>,
    lookup_calls: AtomicUsize,
    fetch_calls: AtomicUsize,
}

impl FixtureUpstream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a public channel. Messages may be given in any order.
    #[must_use]
    pub fn with_channel(mut self, info: RawChannel, messages: Vec<RawMessage>) -> Self {
        self.insert(info, messages, false);
        self
    }

    /// Adds a channel that exists but cannot be read.
    #[must_use]
    pub fn with_private_channel(mut self, handle: &str) -> Self {
        let id = self.channels.len() as u64 + 1_000;
        let info = RawChannel {
            id,
            title: handle.to_string(),
            username: Some(handle.to_string()),
        };
        self.insert(info, Vec::new(), true);
        self
    }

    /// Makes consecutive pages share `overlap` messages at their boundary,
    /// as happens when posts are published during the walk.
    #[must_use]
    pub fn with_page_overlap(mut self, overlap: usize) -> Self {
        self.overlap = overlap;
        self
    }

    fn insert(&mut self, info: RawChannel, mut messages: Vec<RawMessage>, private: bool) {
        messages.sort_by(|a, b| b.date.cmp(&a.date).then(b.id.cmp(&a.id)));
        let key = info
            .username
            .clone()
            .unwrap_or_else(|| info.id.to_string())
            .to_lowercase();
        self.channels.insert(
            key,
            FixtureChannel {
                info,
                private,
                messages,
            },
        );
    }

    /// Builds the demo channel: seven posts, one per day from `date_from`,
    /// clamped to the period. Every lookup resolves to it.
    pub fn demo(date_from: NaiveDate, date_to: NaiveDate) -> Self {
        let days_range = (date_to - date_from).num_days().max(0);
        let posts = demo_posts();

        let messages = posts
            .into_iter()
            .enumerate()
            .map(|(i, (text, views, reactions))| {
                let day = date_from + ChronoDuration::days((i as i64).min(days_range));
                let date = day
                    .and_time(NaiveTime::from_hms_opt(12, 0, 0).unwrap_or(NaiveTime::MIN))
                    .and_utc()
                    + ChronoDuration::minutes(i as i64);
                let mut msg = RawMessage::new(i as u64 + 1, date, text);
                if let Some(v) = views {
                    msg = msg.with_views(v);
                }
                if !reactions.is_empty() {
                    msg = msg.with_reactions(reactions);
                }
                msg
            })
            .collect();

        let mut upstream = Self::new().with_channel(
            RawChannel {
                id: 1,
                title: "Demo channel".to_string(),
                username: Some(DEMO_HANDLE.to_string()),
            },
            messages,
        );
        upstream.catch_all = Some(DEMO_HANDLE.to_string());
        upstream
    }

    /// Scripts the `call`-th lookup (1-based) to fail.
    pub fn fail_lookup(&self, call: usize, error: UpstreamError) {
        if let Ok(mut faults) = self.lookup_faults.lock() {
            faults.insert(call, error);
        }
    }

    /// Scripts the `call`-th history fetch (1-based) to fail. Scripting the
    /// same call twice queues both failures on consecutive calls.
    pub fn fail_fetch(&self, call: usize, error: UpstreamError) {
        if let Ok(mut faults) = self.fetch_faults.lock() {
            let mut call = call;
            while faults.contains_key(&call) {
                call += 1;
            }
            faults.insert(call, error);
        }
    }

    /// Number of lookups served so far.
    pub fn lookup_calls(&self) -> usize {
        self.lookup_calls.load(Ordering::SeqCst)
    }

    /// Number of history fetches served so far, failures included.
    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    /// Total network calls served so far.
    pub fn total_calls(&self) -> usize {
        self.lookup_calls() + self.fetch_calls()
    }

    fn channel_by_id(&self, id: u64) -> Option<&FixtureChannel> {
        self.channels.values().find(|c| c.info.id == id)
    }

    fn scripted_fetch_fault(&self, call: usize) -> Option<UpstreamError> {
        self.fetch_faults
            .lock()
            .ok()
            .and_then(|mut faults| faults.remove(&call))
    }
}

#[async_trait]
impl Upstream for FixtureUpstream {
    fn name(&self) -> &'static str {
        "Fixture"
    }

    async fn lookup_channel(&self, handle: &str) -> Result<RawChannel, UpstreamError> {
        let call = self.lookup_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(err) = self
            .lookup_faults
            .lock()
            .ok()
            .and_then(|mut faults| faults.remove(&call))
        {
            return Err(err);
        }

        let key = handle.to_lowercase();
        let channel = self
            .channels
            .get(&key)
            .or_else(|| {
                self.catch_all
                    .as_ref()
                    .and_then(|fallback| self.channels.get(fallback))
            })
            .ok_or(UpstreamError::NotFound)?;

        if channel.private {
            return Err(UpstreamError::Private);
        }
        Ok(channel.info.clone())
    }

    async fn fetch_history(&self, query: &HistoryQuery) -> Result<HistoryPage, UpstreamError> {
        let call = self.fetch_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(err) = self.scripted_fetch_fault(call) {
            return Err(err);
        }

        let channel = self
            .channel_by_id(query.channel_id)
            .ok_or_else(|| UpstreamError::Gone(format!("channel {}", query.channel_id)))?;
        if channel.private {
            return Err(UpstreamError::Private);
        }

        let start = match &query.cursor {
            Some(cursor) => cursor
                .as_str()
                .parse::<usize>()
                .map_err(|_| UpstreamError::Protocol(format!("bad cursor '{}'", cursor)))?,
            None => match query.offset_date {
                Some(offset) => channel
                    .messages
                    .iter()
                    .position(|m| m.date < offset)
                    .unwrap_or(channel.messages.len()),
                None => 0,
            },
        };

        let limit = query.limit.max(1) as usize;
        let end = (start + limit).min(channel.messages.len());
        let messages = channel.messages.get(start..end).unwrap_or_default().to_vec();

        let next = if end < channel.messages.len() {
            let resume = end.saturating_sub(self.overlap).max(start + 1);
            Some(PageCursor::new(resume.to_string()))
        } else {
            None
        };

        Ok(HistoryPage { messages, next })
    }
}

type DemoPost = (&'static str, Option<u64>, Vec<(&'static str, u64)>);

fn demo_posts() -> Vec<DemoPost> {
    vec![
        (
            "First demo post! Short text with reactions and views.",
            Some(1543),
            vec![("❤️", 120), ("👍", 85), ("🔥", 42)],
        ),
        (
            "This is the second demo post with a longer text.\n\n\
             It has several paragraphs to show how the document handles multi-line content.\n\n\
             It also has reactions and views, which exercises the post header layout.\n\n\
             The third paragraph is here for completeness.",
            Some(2847),
            vec![("😂", 230), ("❤️", 156), ("🎉", 94)],
        ),
        (
            "Third post: no reactions, only views. The reactions block should not be shown.",
            Some(987),
            vec![],
        ),
        (
            "Fourth post: reactions but no views. Checks that the header still renders.",
            None,
            vec![("👏", 67), ("💯", 45)],
        ),
        (
            "Fifth post is minimal. No reactions, no views. Just a date and text.",
            None,
            vec![],
        ),
        (
            "Sixth post with a huge number of reactions!\n\n\
             It is popular by reactions but has few views.\n\n\
             Used to check sorting by reactions. Details: https://example.com/demo/sorting",
            Some(543),
            vec![("🔥", 890), ("❤️", 723), ("😍", 612)],
        ),
        (
            "Seventh post is the longest of all!\n\n\
             This text checks how the renderer copes with large amounts of text.\n\n\
             First paragraph: testing edge cases matters when building software.\n\n\
             Second paragraph: very long texts, missing data and unusual parameter \
             combinations are exactly where things break.\n\n\
             Third paragraph: long multi-line text must keep its line breaks.\n\n\
             Fourth paragraph: the post header (date, reactions, views) must render \
             correctly even for long posts.\n\n\
             Final paragraph: if you can read this with the formatting intact, it works!",
            Some(1876),
            vec![("📚", 234), ("👍", 187), ("🤔", 156)],
        ),
    ]
}
