//! Newest-to-oldest history walk bounded by a date window.
//!
//! [`HistoryPaginator`] holds the cursor and the current page; callers only
//! see messages. The walk:
//!
//! 1. asks for the first page with `offset_date` set to the end of the window,
//! 2. skips messages newer than the window (upstream may ignore the hint),
//! 3. yields messages inside the window,
//! 4. stops at the first message older than the window, without fetching
//!    another page,
//! 5. also stops on an empty page or a page without a next cursor.
//!
//! A page that still fails with a network error after the transport's own
//! retries is requested again up to `page_retries` times. A rate-limit
//! failure is not retried here. Nothing from that page has been yielded
//! yet, so a retry cannot duplicate records.

use std::collections::VecDeque;

use chrono::NaiveDate;
use tracing::{debug, warn};

use crate::channel::ChannelIdentity;
use crate::error::{PostpackError, Result};
use crate::request::DateWindow;
use crate::transport::{RateLimitedTransport, TransportError};
use crate::upstream::{HistoryPage, HistoryQuery, MAX_PAGE_SIZE, PageCursor, RawMessage};

/// Counters describing one walk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PaginationStats {
    /// History pages received
    pub pages_fetched: usize,
    /// Messages inspected, in or out of the window
    pub messages_scanned: usize,
    /// Messages skipped for being newer than the window
    pub skipped_newer: usize,
    /// Messages handed to the caller
    pub yielded: usize,
}

/// Lazy, finite, non-restartable sequence of in-window messages.
pub struct HistoryPaginator<'a> {
    transport: &'a RateLimitedTransport,
    channel_id: u64,
    window: DateWindow,
    page_size: u32,
    page_retries: u32,
    cursor: Option<PageCursor>,
    buffer: VecDeque<RawMessage>,
    first_page: bool,
    /// No further pages exist.
    exhausted: bool,
    /// The walk is over; `next` only returns `None`.
    done: bool,
    stats: PaginationStats,
}

impl<'a> HistoryPaginator<'a> {
    /// Creates a walk over `channel` limited to `window`.
    pub fn new(transport: &'a RateLimitedTransport, channel: &ChannelIdentity, window: DateWindow) -> Self {
        Self {
            transport,
            channel_id: channel.id,
            window,
            page_size: MAX_PAGE_SIZE,
            page_retries: 1,
            cursor: None,
            buffer: VecDeque::new(),
            first_page: true,
            exhausted: false,
            done: false,
            stats: PaginationStats::default(),
        }
    }

    /// Sets the page size, clamped to `1..=MAX_PAGE_SIZE`.
    #[must_use]
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.clamp(1, MAX_PAGE_SIZE);
        self
    }

    #[must_use]
    pub fn with_page_retries(mut self, retries: u32) -> Self {
        self.page_retries = retries;
        self
    }

    pub fn stats(&self) -> PaginationStats {
        self.stats
    }

    /// Returns `true` once the walk has ended, successfully or not.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Next in-window message, newest first.
    ///
    /// After `None` or an error the walk is over and every further call
    /// returns `None`.
    pub async fn next(&mut self) -> Option<Result<RawMessage>> {
        loop {
            if self.done {
                return None;
            }

            if let Some(msg) = self.buffer.pop_front() {
                self.stats.messages_scanned += 1;
                if self.window.is_newer(msg.date) {
                    self.stats.skipped_newer += 1;
                    continue;
                }
                if self.window.is_older(msg.date) {
                    debug!(id = msg.id, date = %msg.date, "reached message older than window");
                    self.finish();
                    return None;
                }
                self.stats.yielded += 1;
                return Some(Ok(msg));
            }

            if self.exhausted {
                self.finish();
                return None;
            }

            if let Err(err) = self.fetch_page().await {
                self.finish();
                return Some(Err(err));
            }
        }
    }

    /// Drains the walk into a vector, stopping at the first error.
    pub async fn collect_all(&mut self) -> Result<Vec<RawMessage>> {
        let mut messages = Vec::new();
        while let Some(msg) = self.next().await {
            messages.push(msg?);
        }
        Ok(messages)
    }

    fn finish(&mut self) {
        self.done = true;
        self.buffer.clear();
    }

    async fn fetch_page(&mut self) -> Result<()> {
        let mut attempt = 0;
        let page = loop {
            self.transport.cancel_handle().check()?;
            match self.request_page().await {
                Ok(page) => break page,
                // Throttling was already waited out by the transport; re-asking
                // at once would ignore the requested delay.
                Err(TransportError::Failed(err)) if err.is_network() && attempt < self.page_retries => {
                    attempt += 1;
                    warn!(attempt, error = %err, "page fetch failed, retrying page");
                }
                Err(TransportError::Failed(err)) => return Err(err),
                Err(TransportError::Terminal(err)) => {
                    return Err(PostpackError::network(
                        "fetch_history",
                        format!("channel became unavailable during the walk ({})", err),
                    ));
                }
            }
        };

        self.first_page = false;
        self.stats.pages_fetched += 1;
        debug!(
            page = self.stats.pages_fetched,
            messages = page.messages.len(),
            has_next = page.next.is_some(),
            "history page fetched"
        );

        if page.next.is_some() && page.next == self.cursor {
            return Err(PostpackError::network(
                "fetch_history",
                format!(
                    "cursor did not advance past '{}'",
                    self.cursor.as_ref().map(PageCursor::as_str).unwrap_or_default()
                ),
            ));
        }

        if page.messages.is_empty() || page.next.is_none() {
            self.exhausted = true;
        }
        self.cursor = page.next;
        self.buffer.extend(page.messages);
        Ok(())
    }

    async fn request_page(&self) -> std::result::Result<HistoryPage, TransportError> {
        let query = HistoryQuery {
            channel_id: self.channel_id,
            cursor: self.cursor.clone(),
            offset_date: self.first_page.then_some(self.window.end),
            limit: self.page_size,
        };
        let upstream = self.transport.upstream();
        self.transport
            .call("fetch_history", || upstream.fetch_history(&query))
            .await
    }
}

/// Starts a walk over `channel` for the inclusive period `date_from..=date_to`.
pub fn paginate<'a>(
    transport: &'a RateLimitedTransport,
    channel: &ChannelIdentity,
    date_from: NaiveDate,
    date_to: NaiveDate,
) -> HistoryPaginator<'a> {
    HistoryPaginator::new(transport, channel, DateWindow::from_dates(date_from, date_to))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::CancelHandle;
    use crate::transport::{RecordingSleeper, RetryPolicy};
    use crate::upstream::{FixtureUpstream, RawChannel, UpstreamError};
    use chrono::{DateTime, TimeZone, Utc};
    use std::sync::Arc;

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, hour, 0, 0).unwrap()
    }

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
    }

    fn channel() -> ChannelIdentity {
        ChannelIdentity {
            id: 9,
            title: "Test".into(),
            handle: "test_chan".into(),
        }
    }

    /// One message per day at noon, ids 1..=days.
    fn daily(days: u32) -> FixtureUpstream {
        let messages = (1..=days)
            .map(|d| RawMessage::new(u64::from(d), at(d, 12), format!("day {d}")))
            .collect();
        FixtureUpstream::new().with_channel(
            RawChannel {
                id: 9,
                title: "Test".into(),
                username: Some("test_chan".into()),
            },
            messages,
        )
    }

    fn transport(upstream: Arc<FixtureUpstream>, policy: RetryPolicy) -> RateLimitedTransport {
        RateLimitedTransport::new(
            upstream,
            policy,
            Arc::new(RecordingSleeper::new()),
            CancelHandle::new(),
        )
    }

    fn ids(messages: &[RawMessage]) -> Vec<u64> {
        messages.iter().map(|m| m.id).collect()
    }

    #[tokio::test]
    async fn test_window_is_respected() {
        let upstream = Arc::new(daily(10));
        let t = transport(upstream.clone(), RetryPolicy::default());
        let mut walk = paginate(&t, &channel(), date(3), date(6)).with_page_size(2);

        let messages = walk.collect_all().await.unwrap();
        assert_eq!(ids(&messages), vec![6, 5, 4, 3]);
        assert!(walk.is_done());
    }

    #[tokio::test]
    async fn test_stops_at_first_older_message() {
        let upstream = Arc::new(daily(10));
        let t = transport(upstream.clone(), RetryPolicy::default());
        let mut walk = paginate(&t, &channel(), date(6), date(8)).with_page_size(2);

        let messages = walk.collect_all().await.unwrap();
        // Pages [8,7] and [6,5]; day 5 ends the walk although more pages exist.
        assert_eq!(ids(&messages), vec![8, 7, 6]);
        assert_eq!(upstream.fetch_calls(), 2);
        assert_eq!(walk.stats().pages_fetched, 2);
    }

    #[tokio::test]
    async fn test_newer_messages_skipped_when_hint_ignored() {
        let upstream = Arc::new(daily(5));
        let t = transport(upstream.clone(), RetryPolicy::default());
        let window = DateWindow::from_dates(date(1), date(2));
        let mut walk = HistoryPaginator::new(&t, &channel(), window);
        // Simulate an upstream ignoring offset_date: no hint on first page.
        walk.first_page = false;

        let messages = walk.collect_all().await.unwrap();
        assert_eq!(ids(&messages), vec![2, 1]);
        assert_eq!(walk.stats().skipped_newer, 3);
    }

    #[tokio::test]
    async fn test_empty_window_yields_nothing() {
        let upstream = Arc::new(daily(3));
        let t = transport(upstream, RetryPolicy::default());
        let mut walk = paginate(&t, &channel(), date(20), date(25));
        assert!(walk.next().await.is_none());
        assert!(walk.next().await.is_none());
    }

    #[tokio::test]
    async fn test_page_retry_after_transport_gives_up() {
        let upstream = Arc::new(daily(4));
        upstream.fail_fetch(2, UpstreamError::Transient("reset".into()));
        let t = transport(upstream.clone(), RetryPolicy::none());
        let mut walk = paginate(&t, &channel(), date(1), date(4)).with_page_size(2);

        let messages = walk.collect_all().await.unwrap();
        assert_eq!(ids(&messages), vec![4, 3, 2, 1]);
        assert_eq!(upstream.fetch_calls(), 3);
    }

    #[tokio::test]
    async fn test_page_failure_surfaces_after_page_retries() {
        let upstream = Arc::new(daily(4));
        upstream.fail_fetch(2, UpstreamError::Transient("reset".into()));
        upstream.fail_fetch(2, UpstreamError::Transient("reset".into()));
        let t = transport(upstream.clone(), RetryPolicy::none());
        let mut walk = paginate(&t, &channel(), date(1), date(4)).with_page_size(2);

        assert_eq!(walk.next().await.unwrap().unwrap().id, 4);
        assert_eq!(walk.next().await.unwrap().unwrap().id, 3);
        let err = walk.next().await.unwrap().unwrap_err();
        assert!(err.is_network());
        assert!(walk.next().await.is_none());
    }

    #[tokio::test]
    async fn test_rate_limit_is_not_retried_at_page_level() {
        let upstream = Arc::new(daily(4));
        // Longer than the transport accepts to wait.
        upstream.fail_fetch(
            2,
            UpstreamError::Throttled {
                retry_after: std::time::Duration::from_secs(3_600),
            },
        );
        let t = transport(upstream.clone(), RetryPolicy::default());
        let mut walk = paginate(&t, &channel(), date(1), date(4))
            .with_page_size(2)
            .with_page_retries(3);

        let err = walk.collect_all().await.unwrap_err();
        assert!(err.is_rate_limited());
        assert_eq!(upstream.fetch_calls(), 2);
    }

    #[tokio::test]
    async fn test_revoked_channel_is_network_error() {
        let upstream = Arc::new(daily(4));
        upstream.fail_fetch(2, UpstreamError::Gone("deleted".into()));
        let t = transport(upstream.clone(), RetryPolicy::default());
        let mut walk = paginate(&t, &channel(), date(1), date(4)).with_page_size(2);

        let err = walk.collect_all().await.unwrap_err();
        assert!(err.is_network());
        assert!(err.to_string().contains("deleted"));
        assert_eq!(upstream.fetch_calls(), 2);
    }

    #[tokio::test]
    async fn test_cancellation_checked_between_pages() {
        let upstream = Arc::new(daily(4));
        let t = transport(upstream.clone(), RetryPolicy::default());
        let mut walk = paginate(&t, &channel(), date(1), date(4)).with_page_size(2);

        assert!(walk.next().await.unwrap().is_ok());
        assert!(walk.next().await.unwrap().is_ok());
        t.cancel_handle().cancel();
        let err = walk.next().await.unwrap().unwrap_err();
        assert!(matches!(err, PostpackError::Cancelled));
        assert_eq!(upstream.fetch_calls(), 1);
    }

    #[tokio::test]
    async fn test_overlapping_pages_are_passed_through() {
        let upstream = Arc::new(daily(6).with_page_overlap(1));
        let t = transport(upstream, RetryPolicy::default());
        let mut walk = paginate(&t, &channel(), date(1), date(6)).with_page_size(3);

        let messages = walk.collect_all().await.unwrap();
        // Deduplication happens downstream.
        assert_eq!(ids(&messages), vec![6, 5, 4, 4, 3, 2, 2, 1]);
    }
}
