//! # Postpack
//!
//! Export every post of a public messaging channel within a date range into a
//! single ordered document.
//!
//! ## Overview
//!
//! The library is an acquisition-and-assembly pipeline:
//!
//! - **Resolve** a channel reference (`@name`, `t.me/name`, links) to a
//!   channel identity
//! - **Walk** its history newest to oldest in bounded pages, stopping at the
//!   first post older than the period
//! - **Normalize** raw messages into [`PostRecord`]s (plain text, links,
//!   reaction and view counters)
//! - **Deduplicate** posts repeated across page boundaries and **sort** them
//!   by date, reactions or views
//! - **Assemble** one document: HTML for printing, Markdown, CSV, JSON or JSONL
//!
//! Every upstream call goes through a rate-limited transport that waits out
//! throttling and retries transient failures within the bounds of a
//! [`RetryPolicy`](transport::RetryPolicy).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use postpack::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
//!     let request = ExportRequest::parse("@rustlang", "2024-06-01", "2024-06-30")?
//!         .with_sort(SortKey::Reactions, SortDirection::Desc);
//!
//!     // Live gateway from POSTPACK_API_URL, demo channel otherwise
//!     let exporter = Exporter::from_config(ExportConfig::from_env()?, &request)?;
//!
//!     let (result, document) = exporter.export_document(request.clone(), DocumentFormat::Html).await?;
//!     document.write_to(request.output_filename(document.format.extension()))?;
//!     println!("{} posts", result.stats.total);
//!     Ok(())
//! }
//! ```
//!
//! ## Module Structure
//!
//! - [`request`] — [`ExportRequest`], sort keys, the UTC date window
//! - [`channel`] — reference normalization and resolution
//! - [`upstream`] — the [`Upstream`](upstream::Upstream) trait, HTTP and fixture implementations
//! - [`transport`] — throttling and backoff around upstream calls
//! - [`paginator`] — the bounded history walk
//! - [`normalize`], [`dedupe`], [`sort`] — record processing
//! - [`document`] — renderers and document assembly
//! - [`pipeline`] — [`Exporter`], [`ExportResult`]
//! - [`config`] — [`ExportConfig`] and environment loading
//! - [`context`] — run-scoped state and cancellation
//! - [`error`] — [`PostpackError`], [`ExportError`], [`Result`]
//! - [`prelude`] — Convenient re-exports

pub mod channel;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod context;
pub mod dedupe;
pub mod document;
pub mod error;
pub mod normalize;
pub mod paginator;
pub mod pipeline;
pub mod record;
pub mod request;
pub mod sort;
pub mod transport;
pub mod upstream;

// Re-export the main types at the crate root for convenience
pub use config::ExportConfig;
pub use error::{ExportError, PostpackError, Result, Stage};
pub use pipeline::{ExportResult, ExportStats, Exporter};
pub use record::{PostRecord, ReactionCount};
pub use request::ExportRequest;

/// Convenient re-exports for common usage.
///
/// ```rust
/// use postpack::prelude::*;
/// ```
pub mod prelude {
    // Records and requests
    pub use crate::record::{PostRecord, ReactionCount};
    pub use crate::request::{DateWindow, ExportRequest, SortDirection, SortKey};

    // Error types
    pub use crate::error::{ExportError, PostpackError, Result, Stage};

    // Pipeline
    pub use crate::channel::ChannelIdentity;
    pub use crate::context::CancelHandle;
    pub use crate::pipeline::{ExportResult, ExportStats, Exporter};

    // Configuration
    pub use crate::config::{ExportConfig, UpstreamConfig};
    pub use crate::transport::{RecordingSleeper, RetryPolicy, Sleeper, TokioSleeper};

    // Upstreams
    #[cfg(feature = "http")]
    pub use crate::upstream::HttpUpstream;
    pub use crate::upstream::{FixtureUpstream, Upstream, UpstreamError};

    // Documents
    pub use crate::document::{Document, DocumentFormat, DocumentRenderer, ExportSummary};
}
