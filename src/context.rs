//! Run-scoped state.
//!
//! Every export gets its own [`ExportContext`]; nothing in it outlives the run
//! and nothing is shared between runs except what the caller passes in
//! explicitly (the upstream and the [`CancelHandle`]).

use tokio_util::sync::CancellationToken;

use crate::config::ExportConfig;
use crate::error::{PostpackError, Result};
use crate::request::{DateWindow, ExportRequest};

/// Cooperative cancellation for one export.
///
/// Cloning yields a handle to the same token, so a caller can keep one clone
/// and give the other to the exporter.
///
/// ```rust
/// use postpack::context::CancelHandle;
///
/// let handle = CancelHandle::new();
/// let for_caller = handle.clone();
/// for_caller.cancel();
/// assert!(handle.is_cancelled());
/// assert!(handle.check().is_err());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    token: CancellationToken,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps an existing token, e.g. a child of a service-wide one.
    pub fn from_token(token: CancellationToken) -> Self {
        Self { token }
    }

    /// The underlying token.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Requests cancellation and wakes any pending wait.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Returns [`PostpackError::Cancelled`] once cancellation was requested.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(PostpackError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Completes when cancellation is requested.
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }
}

/// Everything one export run needs, owned by that run.
#[derive(Debug, Clone)]
pub struct ExportContext {
    pub request: ExportRequest,
    pub window: DateWindow,
    pub config: ExportConfig,
    pub cancel: CancelHandle,
}

impl ExportContext {
    /// Validates the request and builds the context. No network access.
    pub fn new(request: ExportRequest, config: ExportConfig, cancel: CancelHandle) -> Result<Self> {
        request.validate()?;
        config.validate()?;
        let window = request.window();
        Ok(Self {
            request,
            window,
            config,
            cancel,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_cancelled_wakes_waiter() {
        let handle = CancelHandle::new();
        let waiter = handle.clone();
        let task = tokio::spawn(async move { waiter.cancelled().await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        handle.cancel();

        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("waiter should wake")
            .unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_returns_immediately_when_already_cancelled() {
        let handle = CancelHandle::new();
        handle.cancel();
        tokio::time::timeout(Duration::from_millis(100), handle.cancelled())
            .await
            .expect("already cancelled");
    }

    #[test]
    fn test_child_token_follows_parent() {
        let parent = CancellationToken::new();
        let handle = CancelHandle::from_token(parent.child_token());
        assert!(handle.check().is_ok());

        parent.cancel();
        assert!(handle.is_cancelled());
        assert!(matches!(handle.check(), Err(PostpackError::Cancelled)));
    }

    #[test]
    fn test_context_rejects_invalid_request() {
        let request = ExportRequest::parse("@chan", "2024-02-01", "2024-01-01").unwrap();
        let err = ExportContext::new(request, ExportConfig::default(), CancelHandle::new())
            .unwrap_err();
        assert!(err.is_invalid_request());
    }

    #[test]
    fn test_context_window() {
        let request = ExportRequest::parse("@chan", "2024-01-01", "2024-01-31").unwrap();
        let ctx = ExportContext::new(request.clone(), ExportConfig::default(), CancelHandle::new())
            .unwrap();
        assert_eq!(ctx.window, request.window());
    }
}
