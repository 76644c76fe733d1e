//! Configuration types for the export pipeline.
//!
//! This module provides plain configuration structs for library usage,
//! without any CLI framework dependencies:
//!
//! - [`ExportConfig`] - pipeline settings (page size, retries, render limits)
//! - [`RetryPolicy`](crate::transport::RetryPolicy) - throttling and backoff bounds
//! - [`UpstreamConfig`] - where the upstream API lives and how to reach it
//!
//! # Example
//!
//! ```rust
//! use postpack::config::ExportConfig;
//!
//! let config = ExportConfig::new()
//!     .with_page_size(50)
//!     .with_include_empty(true);
//!
//! assert!(config.validate().is_ok());
//! ```
//!
//! # Environment
//!
//! [`ExportConfig::from_env`] reads:
//!
//! | Variable | Meaning | Default |
//! |----------|---------|---------|
//! | `POSTPACK_API_URL` | Upstream gateway base URL | unset (demo mode) |
//! | `POSTPACK_API_TOKEN` | Bearer token | unset |
//! | `POSTPACK_DEMO` | Force demo mode (`1`/`true`) | `false` |
//! | `POSTPACK_PAGE_SIZE` | History page size | `100` |
//! | `POSTPACK_TIMEOUT_SECS` | Per-request timeout | `30` |

use serde::{Deserialize, Serialize};

use crate::error::{PostpackError, Result};
use crate::transport::RetryPolicy;
use crate::upstream::MAX_PAGE_SIZE;

/// Where the upstream lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Gateway base URL; demo mode when absent
    pub base_url: Option<String>,

    /// Bearer token sent with every request
    #[serde(skip_serializing)]
    pub token: Option<String>,

    /// Per-request timeout in seconds (default: 30)
    pub timeout_secs: u64,

    /// Serve the demo channel instead of calling upstream (default: false)
    pub demo: bool,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            token: None,
            timeout_secs: 30,
            demo: false,
        }
    }
}

impl UpstreamConfig {
    /// Returns `true` if the demo channel should be used.
    pub fn is_demo(&self) -> bool {
        self.demo
            || self
                .base_url
                .as_deref()
                .is_none_or(|url| url.trim().is_empty())
    }
}

/// Settings for one export pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Messages per history page (default: 100, the upstream maximum)
    pub page_size: u32,

    /// Extra attempts for a failed page fetch at the paginator (default: 1)
    pub page_retries: u32,

    /// Keep posts without text, e.g. bare media (default: false)
    pub include_empty: bool,

    /// Largest document the renderer may produce (default: 64MB)
    pub max_document_bytes: usize,

    /// Throttling and backoff bounds
    pub retry: RetryPolicy,

    /// Upstream endpoint
    pub upstream: UpstreamConfig,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            page_size: MAX_PAGE_SIZE,
            page_retries: 1,
            include_empty: false,
            max_document_bytes: 64 * 1024 * 1024, // 64MB
            retry: RetryPolicy::default(),
            upstream: UpstreamConfig::default(),
        }
    }
}

impl ExportConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a configuration from `POSTPACK_*` environment variables.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        config.upstream.base_url = std::env::var("POSTPACK_API_URL")
            .ok()
            .filter(|v| !v.trim().is_empty());
        config.upstream.token = std::env::var("POSTPACK_API_TOKEN")
            .ok()
            .filter(|v| !v.trim().is_empty());
        config.upstream.demo = std::env::var("POSTPACK_DEMO")
            .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        if let Ok(value) = std::env::var("POSTPACK_PAGE_SIZE") {
            config.page_size = value.trim().parse().map_err(|_| {
                PostpackError::invalid_request(format!("POSTPACK_PAGE_SIZE is not a number: '{}'", value))
            })?;
        }
        if let Ok(value) = std::env::var("POSTPACK_TIMEOUT_SECS") {
            config.upstream.timeout_secs = value.trim().parse().map_err(|_| {
                PostpackError::invalid_request(format!("POSTPACK_TIMEOUT_SECS is not a number: '{}'", value))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Checks value ranges.
    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            return Err(PostpackError::invalid_request(format!(
                "page size must be between 1 and {}, got {}",
                MAX_PAGE_SIZE, self.page_size
            )));
        }
        if self.upstream.timeout_secs == 0 {
            return Err(PostpackError::invalid_request("timeout must be at least 1 second"));
        }
        Ok(())
    }

    #[must_use]
    pub fn with_page_size(mut self, size: u32) -> Self {
        self.page_size = size;
        self
    }

    #[must_use]
    pub fn with_page_retries(mut self, retries: u32) -> Self {
        self.page_retries = retries;
        self
    }

    #[must_use]
    pub fn with_include_empty(mut self, include: bool) -> Self {
        self.include_empty = include;
        self
    }

    #[must_use]
    pub fn with_max_document_bytes(mut self, bytes: usize) -> Self {
        self.max_document_bytes = bytes;
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn with_upstream(mut self, upstream: UpstreamConfig) -> Self {
        self.upstream = upstream;
        self
    }

    #[must_use]
    pub fn with_demo(mut self, demo: bool) -> Self {
        self.upstream.demo = demo;
        self
    }
}
