//! The export pipeline.
//!
//! ```text
//! validate ─▶ resolve ─▶ paginate ─▶ normalize ─▶ dedupe ─▶ sort ─▶ assemble
//!             (1 call)   (N pages)   └──── streamed per record ────┘
//! ```
//!
//! [`Exporter`] is immutable and may be shared between concurrent exports;
//! each call builds its own [`ExportContext`], transport counters, cursor and
//! record set. Failures come back as [`ExportError`], carrying the stage that
//! was reached and, for failures in the middle of the walk, the records
//! gathered until then.
//!
//! # Example
//!
//! ```rust
//! use postpack::prelude::*;
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
//! let request = ExportRequest::parse("@demo_channel", "2024-01-01", "2024-01-07")?
//!     .with_sort(SortKey::Views, SortDirection::Desc);
//! let upstream = FixtureUpstream::demo(request.date_from, request.date_to);
//! let exporter = Exporter::new(Arc::new(upstream), ExportConfig::default());
//!
//! let result = exporter.run_export(request).await?;
//! assert_eq!(result.stats.total, 7);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::channel::{self, ChannelIdentity};
use crate::config::ExportConfig;
use crate::context::{CancelHandle, ExportContext};
use crate::dedupe::Deduplicator;
use crate::document::{self, Document, DocumentFormat};
use crate::error::{ExportError, PostpackError, Stage};
use crate::normalize::normalize;
use crate::paginator::HistoryPaginator;
use crate::record::PostRecord;
use crate::request::ExportRequest;
use crate::sort::sort_records;
use crate::transport::{RateLimitedTransport, Sleeper, TokioSleeper};
use crate::upstream::{FixtureUpstream, Upstream};

/// Counters for one export.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportStats {
    /// Records in the result
    pub total: usize,
    /// Oldest record timestamp
    pub earliest: Option<DateTime<Utc>>,
    /// Newest record timestamp
    pub latest: Option<DateTime<Utc>>,
    /// History pages received
    pub pages_fetched: usize,
    /// Messages inspected, in or out of the window
    pub messages_scanned: usize,
    /// Repeated message ids dropped
    pub duplicates_dropped: usize,
    /// Posts without text dropped
    pub skipped_empty: usize,
    /// Throttle pauses taken
    pub throttle_waits: u32,
}

impl ExportStats {
    /// Total and time span of `records`; all other counters zero.
    pub fn from_records(records: &[PostRecord]) -> Self {
        Self {
            total: records.len(),
            earliest: records.iter().map(PostRecord::timestamp).min(),
            latest: records.iter().map(PostRecord::timestamp).max(),
            ..Self::default()
        }
    }
}

/// A successful export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportResult {
    pub channel: ChannelIdentity,
    pub request: ExportRequest,
    /// Ordered per the request's sort key and direction.
    pub records: Vec<PostRecord>,
    pub stats: ExportStats,
}

impl ExportResult {
    /// Returns `true` if no post fell inside the window.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Record ids in result order.
    pub fn ids(&self) -> Vec<u64> {
        self.records.iter().map(PostRecord::id).collect()
    }
}

/// Runs exports against one upstream.
pub struct Exporter {
    upstream: Arc<dyn Upstream>,
    config: ExportConfig,
    sleeper: Arc<dyn Sleeper>,
}

impl Exporter {
    /// Creates an exporter that waits on the real clock.
    pub fn new(upstream: Arc<dyn Upstream>, config: ExportConfig) -> Self {
        Self {
            upstream,
            config,
            sleeper: Arc::new(TokioSleeper),
        }
    }

    /// Creates an exporter for `request` from configuration: the demo
    /// channel in demo mode, the HTTP gateway otherwise.
    pub fn from_config(config: ExportConfig, request: &ExportRequest) -> crate::Result<Self> {
        let upstream: Arc<dyn Upstream> = if config.upstream.is_demo() {
            info!("no upstream configured, using demo channel");
            Arc::new(FixtureUpstream::demo(request.date_from, request.date_to))
        } else {
            live_upstream(&config)?
        };
        Ok(Self::new(upstream, config))
    }

    /// Replaces the clock used for throttle and backoff waits.
    #[must_use]
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    /// Name of the upstream in use.
    pub fn upstream_name(&self) -> &'static str {
        self.upstream.name()
    }

    /// Runs one export.
    pub async fn run_export(&self, request: ExportRequest) -> Result<ExportResult, ExportError> {
        self.run_export_with_cancel(request, CancelHandle::new()).await
    }

    /// Runs one export that stops early once `cancel` fires.
    pub async fn run_export_with_cancel(
        &self,
        request: ExportRequest,
        cancel: CancelHandle,
    ) -> Result<ExportResult, ExportError> {
        let fail = |stage: Stage, source: PostpackError, partial: Vec<PostRecord>| {
            warn!(%stage, error = %source, partial = partial.len(), "export failed");
            ExportError {
                channel: request.channel.clone(),
                date_from: request.date_from,
                date_to: request.date_to,
                stage,
                source,
                partial,
            }
        };

        let ctx = ExportContext::new(request.clone(), self.config.clone(), cancel)
            .map_err(|e| fail(Stage::Validation, e, Vec::new()))?;

        info!(
            channel = %ctx.request.channel,
            from = %ctx.request.date_from,
            to = %ctx.request.date_to,
            upstream = self.upstream.name(),
            "starting export"
        );

        let transport = RateLimitedTransport::new(
            Arc::clone(&self.upstream),
            ctx.config.retry.clone(),
            Arc::clone(&self.sleeper),
            ctx.cancel.clone(),
        );

        let channel = channel::resolve(&transport, &ctx.request.channel)
            .await
            .map_err(|e| fail(Stage::Resolution, e, Vec::new()))?;

        let mut paginator = HistoryPaginator::new(&transport, &channel, ctx.window)
            .with_page_size(ctx.config.page_size)
            .with_page_retries(ctx.config.page_retries);
        let mut dedup = Deduplicator::new();
        let mut records = Vec::new();
        let mut skipped_empty = 0;

        while let Some(item) = paginator.next().await {
            let raw = match item {
                Ok(raw) => raw,
                Err(err) => {
                    // Partial records only accompany failures a retry could fix.
                    let partial = if err.is_retryable() {
                        std::mem::take(&mut records)
                    } else {
                        Vec::new()
                    };
                    return Err(fail(Stage::Pagination, err, partial));
                }
            };

            let Some(record) = dedup.accept(normalize(&raw)) else {
                continue;
            };
            if record.is_empty() && !ctx.config.include_empty {
                skipped_empty += 1;
                continue;
            }
            records.push(record);
        }

        let walk = paginator.stats();
        debug!(
            pages = walk.pages_fetched,
            scanned = walk.messages_scanned,
            kept = records.len(),
            "history walk finished"
        );

        sort_records(&mut records, ctx.request.sort_key, ctx.request.sort_direction);

        let stats = ExportStats {
            pages_fetched: walk.pages_fetched,
            messages_scanned: walk.messages_scanned,
            duplicates_dropped: dedup.duplicates(),
            skipped_empty,
            throttle_waits: transport.throttle_waits(),
            ..ExportStats::from_records(&records)
        };

        info!(
            channel = %channel.handle,
            total = stats.total,
            pages = stats.pages_fetched,
            "export finished"
        );

        Ok(ExportResult {
            channel,
            request: ctx.request,
            records,
            stats,
        })
    }

    /// Runs one export and assembles its document.
    pub async fn export_document(
        &self,
        request: ExportRequest,
        format: DocumentFormat,
    ) -> Result<(ExportResult, Document), ExportError> {
        let result = self.run_export(request).await?;
        let document = document::assemble(&result, format, self.config.max_document_bytes).map_err(
            |source| ExportError {
                channel: result.request.channel.clone(),
                date_from: result.request.date_from,
                date_to: result.request.date_to,
                stage: Stage::Rendering,
                source,
                partial: Vec::new(),
            },
        )?;
        Ok((result, document))
    }

    /// Runs one export on a private runtime, blocking the caller.
    ///
    /// Must not be called from inside an async runtime.
    pub fn run_export_blocking(&self, request: ExportRequest) -> Result<ExportResult, ExportError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| ExportError {
                channel: request.channel.clone(),
                date_from: request.date_from,
                date_to: request.date_to,
                stage: Stage::Validation,
                source: PostpackError::from(e),
                partial: Vec::new(),
            })?;
        runtime.block_on(self.run_export(request))
    }
}

#[cfg(feature = "http")]
fn live_upstream(config: &ExportConfig) -> crate::Result<Arc<dyn Upstream>> {
    Ok(Arc::new(crate::upstream::HttpUpstream::from_config(
        &config.upstream,
    )?))
}

#[cfg(not(feature = "http"))]
fn live_upstream(_config: &ExportConfig) -> crate::Result<Arc<dyn Upstream>> {
    Err(PostpackError::invalid_request(
        "a live upstream requires the 'http' feature; enable it or use demo mode",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::RecordingSleeper;
    use crate::upstream::{RawChannel, RawMessage, UpstreamError};
    use chrono::TimeZone;
    use std::time::Duration;

    fn exporter(upstream: Arc<FixtureUpstream>) -> Exporter {
        Exporter::new(upstream, ExportConfig::default().with_page_size(2))
            .with_sleeper(Arc::new(RecordingSleeper::new()))
    }

    fn channel_with(messages: Vec<RawMessage>) -> Arc<FixtureUpstream> {
        Arc::new(FixtureUpstream::new().with_channel(
            RawChannel {
                id: 5,
                title: "Chan".into(),
                username: Some("chan_one".into()),
            },
            messages,
        ))
    }

    fn msg(id: u64, day: u32, text: &str) -> RawMessage {
        RawMessage::new(id, Utc.with_ymd_and_hms(2024, 4, day, 10, 0, 0).unwrap(), text)
    }

    #[tokio::test]
    async fn test_empty_posts_skipped_by_default() {
        let upstream = channel_with(vec![msg(1, 1, "a"), msg(2, 2, "  "), msg(3, 3, "c")]);
        let request = ExportRequest::parse("chan_one", "2024-04-01", "2024-04-03").unwrap();

        let result = exporter(upstream.clone()).run_export(request.clone()).await.unwrap();
        assert_eq!(result.ids(), vec![1, 3]);
        assert_eq!(result.stats.skipped_empty, 1);

        let keep = Exporter::new(upstream, ExportConfig::default().with_include_empty(true))
            .with_sleeper(Arc::new(RecordingSleeper::new()));
        assert_eq!(keep.run_export(request).await.unwrap().ids(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_stats_and_span() {
        let upstream = channel_with((1..=5).map(|d| msg(u64::from(d), d, "x")).collect());
        let request = ExportRequest::parse("chan_one", "2024-04-02", "2024-04-04").unwrap();

        let result = exporter(upstream).run_export(request).await.unwrap();
        assert_eq!(result.stats.total, 3);
        assert_eq!(
            result.stats.earliest,
            Some(Utc.with_ymd_and_hms(2024, 4, 2, 10, 0, 0).unwrap())
        );
        assert_eq!(
            result.stats.latest,
            Some(Utc.with_ymd_and_hms(2024, 4, 4, 10, 0, 0).unwrap())
        );
        assert!(result.stats.pages_fetched >= 2);
    }

    #[tokio::test]
    async fn test_partial_records_on_mid_walk_failure() {
        let upstream = channel_with((1..=6).map(|d| msg(u64::from(d), d, "x")).collect());
        for _ in 0..4 {
            upstream.fail_fetch(2, UpstreamError::Transient("reset".into()));
        }
        let exporter = Exporter::new(
            upstream,
            ExportConfig::default()
                .with_page_size(2)
                .with_retry(crate::transport::RetryPolicy::none()),
        )
        .with_sleeper(Arc::new(RecordingSleeper::new()));
        let request = ExportRequest::parse("chan_one", "2024-04-01", "2024-04-06").unwrap();

        let err = exporter.run_export(request).await.unwrap_err();
        assert_eq!(err.stage, Stage::Pagination);
        assert!(err.kind().is_network());
        let ids: Vec<u64> = err.partial.iter().map(PostRecord::id).collect();
        assert_eq!(ids, vec![6, 5]);
    }

    #[tokio::test]
    async fn test_cancelled_export_has_no_partial() {
        let upstream = channel_with((1..=4).map(|d| msg(u64::from(d), d, "x")).collect());
        upstream.fail_fetch(
            2,
            UpstreamError::Throttled {
                retry_after: Duration::from_secs(1),
            },
        );
        let cancel = CancelHandle::new();
        cancel.cancel();
        let request = ExportRequest::parse("chan_one", "2024-04-01", "2024-04-04").unwrap();

        let err = exporter(upstream)
            .run_export_with_cancel(request, cancel)
            .await
            .unwrap_err();
        assert!(matches!(err.kind(), PostpackError::Cancelled));
        assert!(err.partial.is_empty());
    }

    #[tokio::test]
    async fn test_export_document_render_failure() {
        let upstream = channel_with(vec![msg(1, 1, "hello")]);
        let exporter = Exporter::new(upstream, ExportConfig::default().with_max_document_bytes(10))
            .with_sleeper(Arc::new(RecordingSleeper::new()));
        let request = ExportRequest::parse("chan_one", "2024-04-01", "2024-04-01").unwrap();

        let err = exporter
            .export_document(request, DocumentFormat::Html)
            .await
            .unwrap_err();
        assert_eq!(err.stage, Stage::Rendering);
        assert!(err.kind().is_render());
        assert!(err.partial.is_empty());
    }

    #[test]
    fn test_blocking_wrapper() {
        let upstream = channel_with(vec![msg(1, 1, "hello")]);
        let request = ExportRequest::parse("chan_one", "2024-04-01", "2024-04-01").unwrap();
        let result = exporter(upstream).run_export_blocking(request).unwrap();
        assert_eq!(result.ids(), vec![1]);
    }

    #[test]
    fn test_from_config_demo() {
        let request = ExportRequest::parse("anything_here", "2024-01-01", "2024-01-03").unwrap();
        let exporter = Exporter::from_config(ExportConfig::default(), &request).unwrap();
        assert_eq!(exporter.upstream_name(), "Fixture");
    }
}
