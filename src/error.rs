//! Unified error types for postpack.
//!
//! Two layers:
//!
//! - [`PostpackError`]: what went wrong. Every component returns it.
//! - [`ExportError`]: what went wrong *during which export*. It wraps a
//!   [`PostpackError`] with the channel reference, the requested period, the
//!   pipeline [`Stage`] that was reached, and any records produced before the
//!   failure.
//!
//! # Error Handling Philosophy
//!
//! - **Library users** get typed errors they can match on
//! - **Application users** get clear, actionable error messages
//! - **Terminal outcomes** (`ChannelNotFound`, `ChannelPrivate`, `Render`) are never
//!   retried; throttling and transient network failures are retried inside the
//!   transport and only surface once its bounds are exhausted

use std::fmt;
use std::io;
use std::time::Duration;

use chrono::NaiveDate;
use thiserror::Error;

use crate::record::PostRecord;

/// A specialized [`Result`] type for postpack operations.
///
/// # Example
///
/// ```rust
/// use postpack::error::Result;
/// use postpack::PostRecord;
///
/// fn my_function() -> Result<Vec<PostRecord>> {
///     Ok(vec![])
/// }
/// ```
pub type Result<T> = std::result::Result<T, PostpackError>;

/// The error type for all postpack operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PostpackError {
    /// An I/O error occurred (typically while writing the document).
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization error.
    ///
    /// This can occur when writing JSON or JSONL documents.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV serialization error.
    #[cfg(feature = "csv-output")]
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// The export request is malformed.
    ///
    /// Raised before any network call: empty or unparseable channel reference,
    /// `date_from` later than `date_to`, zero page size.
    #[error("Invalid request: {message}")]
    InvalidRequest {
        /// Description of what's wrong
        message: String,
    },

    /// A date could not be parsed.
    #[error("Invalid date '{input}'. Expected format: {expected}")]
    InvalidDate {
        /// The invalid date string that was provided
        input: String,
        /// Expected format description
        expected: &'static str,
    },

    /// The upstream reports no channel for this reference.
    #[error("Channel '{reference}' not found")]
    ChannelNotFound {
        /// The reference as given by the caller
        reference: String,
    },

    /// The channel exists but is not publicly readable.
    #[error("Channel '{reference}' is private or not accessible")]
    ChannelPrivate {
        /// The reference as given by the caller
        reference: String,
    },

    /// Upstream kept throttling past the retry bound.
    #[error("Rate limited during {operation}: gave up after {attempts} attempts (last retry-after {}s)", retry_after.as_secs())]
    RateLimited {
        /// The logical operation that was throttled
        operation: &'static str,
        /// Total attempts made, including the first one
        attempts: u32,
        /// The last delay requested by upstream
        retry_after: Duration,
    },

    /// A network failure that could not be recovered.
    #[error("Network error during {operation}: {message}")]
    Network {
        /// The logical operation that failed
        operation: &'static str,
        /// Description of the failure
        message: String,
    },

    /// The rendering backend rejected the input.
    #[error("Failed to render {format} document: {message}")]
    Render {
        /// The document format being produced
        format: &'static str,
        /// Description of the failure
        message: String,
    },

    /// The export was cancelled by the caller.
    #[error("Export cancelled")]
    Cancelled,
}

// ============================================================================
// Convenience constructors
// ============================================================================

impl PostpackError {
    /// Creates an invalid request error.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        PostpackError::InvalidRequest {
            message: message.into(),
        }
    }

    /// Creates an invalid date error.
    pub fn invalid_date(input: impl Into<String>) -> Self {
        PostpackError::InvalidDate {
            input: input.into(),
            expected: "YYYY-MM-DD",
        }
    }

    /// Creates a channel-not-found error.
    pub fn channel_not_found(reference: impl Into<String>) -> Self {
        PostpackError::ChannelNotFound {
            reference: reference.into(),
        }
    }

    /// Creates a private-channel error.
    pub fn channel_private(reference: impl Into<String>) -> Self {
        PostpackError::ChannelPrivate {
            reference: reference.into(),
        }
    }

    /// Creates a network error.
    pub fn network(operation: &'static str, message: impl Into<String>) -> Self {
        PostpackError::Network {
            operation,
            message: message.into(),
        }
    }

    /// Creates a render error.
    pub fn render(format: &'static str, message: impl Into<String>) -> Self {
        PostpackError::Render {
            format,
            message: message.into(),
        }
    }

    /// Returns `true` if this is an invalid request or date error.
    pub fn is_invalid_request(&self) -> bool {
        matches!(
            self,
            PostpackError::InvalidRequest { .. } | PostpackError::InvalidDate { .. }
        )
    }

    /// Returns `true` if the channel could not be found or read.
    pub fn is_channel_error(&self) -> bool {
        matches!(
            self,
            PostpackError::ChannelNotFound { .. } | PostpackError::ChannelPrivate { .. }
        )
    }

    /// Returns `true` if this is a rate limit error.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, PostpackError::RateLimited { .. })
    }

    /// Returns `true` if this is a network error.
    pub fn is_network(&self) -> bool {
        matches!(self, PostpackError::Network { .. })
    }

    /// Returns `true` if this is a render error.
    pub fn is_render(&self) -> bool {
        matches!(self, PostpackError::Render { .. })
    }

    /// Returns `true` if running the whole export again may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PostpackError::RateLimited { .. } | PostpackError::Network { .. }
        )
    }
}

// ============================================================================
// Export-level error
// ============================================================================

/// Pipeline stage reached when an export failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Request validation, before any network call.
    Validation,
    /// Channel lookup.
    Resolution,
    /// History walk, normalization and deduplication.
    Pagination,
    /// Document assembly.
    Rendering,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Validation => write!(f, "validation"),
            Stage::Resolution => write!(f, "channel resolution"),
            Stage::Pagination => write!(f, "pagination"),
            Stage::Rendering => write!(f, "rendering"),
        }
    }
}

/// A failed export, with enough context to report it precisely.
///
/// `partial` holds the records produced before a mid-pagination failure, in
/// pipeline order. It is empty for every other kind of failure; the caller
/// decides whether a partial result is worth presenting.
#[derive(Debug, Error)]
#[error("Export of '{channel}' ({date_from} to {date_to}) failed during {stage}: {source}")]
pub struct ExportError {
    /// The channel reference as given by the caller.
    pub channel: String,
    /// Requested start date.
    pub date_from: NaiveDate,
    /// Requested end date.
    pub date_to: NaiveDate,
    /// Stage reached.
    pub stage: Stage,
    /// The underlying error.
    #[source]
    pub source: PostpackError,
    /// Records produced before the failure.
    pub partial: Vec<PostRecord>,
}

impl ExportError {
    /// Returns the underlying error kind.
    pub fn kind(&self) -> &PostpackError {
        &self.source
    }

    /// Returns `true` if some records were produced before the failure.
    pub fn has_partial(&self) -> bool {
        !self.partial.is_empty()
    }
}
