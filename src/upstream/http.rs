//! JSON-over-HTTP upstream.
//!
//! Talks to a gateway exposing the channel API as two endpoints:
//!
//! ```text
//! GET {base}/channels/{handle}
//!     -> {"id": 1, "title": "Rust", "username": "rustlang"}
//!
//! GET {base}/channels/{id}/messages?limit=100&offset_id=…&offset_date=…
//!     -> {"messages": [...], "next_offset": "…" | null}
//! ```
//!
//! Status mapping:
//!
//! | Status | Error |
//! |--------|-------|
//! | 429 | [`UpstreamError::Throttled`] (`Retry-After` header or `retry_after` body field) |
//! | 404 | [`UpstreamError::NotFound`] |
//! | 403 | [`UpstreamError::Private`] |
//! | 410 | [`UpstreamError::Gone`] |
//! | 408, 5xx, timeouts, connection errors | [`UpstreamError::Transient`] |
//! | anything else | [`UpstreamError::Protocol`] |

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;

use super::{HistoryPage, HistoryQuery, RawChannel, Upstream, UpstreamError};
use crate::config::UpstreamConfig;
use crate::error::{PostpackError, Result};

/// Delay assumed when a 429 carries no hint.
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(1);

/// Longest error body kept in messages.
const MAX_ERROR_BODY: usize = 256;

/// Upstream reached over HTTP.
#[derive(Debug, Clone)]
pub struct HttpUpstream {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpUpstream {
    /// Creates a client for the gateway at `base_url`.
    pub fn new(base_url: &str, token: Option<String>, timeout: Duration) -> Result<Self> {
        let base_url = base_url.trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(PostpackError::invalid_request("upstream base URL is empty"));
        }

        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("postpack/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PostpackError::network("client setup", e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            token,
        })
    }

    /// Creates a client from configuration.
    pub fn from_config(config: &UpstreamConfig) -> Result<Self> {
        let base_url = config
            .base_url
            .as_deref()
            .ok_or_else(|| PostpackError::invalid_request("upstream base URL is not configured"))?;
        Self::new(
            base_url,
            config.token.clone(),
            Duration::from_secs(config.timeout_secs),
        )
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> std::result::Result<T, UpstreamError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, "upstream request");

        let mut request = self.client.get(&url).query(query);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(classify_transport_error)?;
        let status = response.status();
        if status.is_success() {
            // reqwest reports a body cut short as a decode error. No content
            // decoders are enabled, so any failure here is the connection's;
            // only a complete body that does not parse is a protocol error.
            let body = response
                .bytes()
                .await
                .map_err(|e| UpstreamError::Transient(format!("reading response body: {}", e)))?;
            return serde_json::from_slice::<T>(&body)
                .map_err(|e| UpstreamError::Protocol(format!("invalid response body: {}", e)));
        }

        let header_hint = parse_retry_after(&response);
        let body = response.text().await.unwrap_or_default();
        Err(error_for_status(status, header_hint, &body))
    }
}

#[async_trait]
impl Upstream for HttpUpstream {
    fn name(&self) -> &'static str {
        "HTTP"
    }

    async fn lookup_channel(&self, handle: &str) -> std::result::Result<RawChannel, UpstreamError> {
        self.get_json(&format!("/channels/{}", handle), &[]).await
    }

    async fn fetch_history(
        &self,
        query: &HistoryQuery,
    ) -> std::result::Result<HistoryPage, UpstreamError> {
        let mut params = vec![("limit", query.limit.to_string())];
        if let Some(cursor) = &query.cursor {
            params.push(("offset_id", cursor.as_str().to_string()));
        }
        if let Some(offset_date) = query.offset_date {
            params.push(("offset_date", offset_date.timestamp().to_string()));
        }
        self.get_json(&format!("/channels/{}/messages", query.channel_id), &params)
            .await
    }
}

fn classify_transport_error(err: reqwest::Error) -> UpstreamError {
    if err.is_decode() {
        UpstreamError::Protocol(err.to_string())
    } else {
        // Timeouts, refused or reset connections, broken bodies.
        UpstreamError::Transient(err.to_string())
    }
}

fn parse_retry_after(response: &Response) -> Option<Duration> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

fn body_retry_after(body: &str) -> Option<Duration> {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()?
        .get("retry_after")?
        .as_u64()
        .map(Duration::from_secs)
}

fn truncate(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY {
        return body.to_string();
    }
    let mut end = MAX_ERROR_BODY;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... [truncated]", &body[..end])
}

fn error_for_status(status: StatusCode, header_hint: Option<Duration>, body: &str) -> UpstreamError {
    match status.as_u16() {
        429 => UpstreamError::Throttled {
            retry_after: header_hint
                .or_else(|| body_retry_after(body))
                .unwrap_or(DEFAULT_RETRY_AFTER),
        },
        404 => UpstreamError::NotFound,
        403 => UpstreamError::Private,
        410 => UpstreamError::Gone(truncate(body)),
        408 | 500..=599 => UpstreamError::Transient(format!("HTTP {}: {}", status, truncate(body))),
        _ => UpstreamError::Protocol(format!("HTTP {}: {}", status, truncate(body))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            error_for_status(StatusCode::NOT_FOUND, None, ""),
            UpstreamError::NotFound
        );
        assert_eq!(
            error_for_status(StatusCode::FORBIDDEN, None, ""),
            UpstreamError::Private
        );
        assert!(matches!(
            error_for_status(StatusCode::GONE, None, "deleted"),
            UpstreamError::Gone(_)
        ));
        assert!(matches!(
            error_for_status(StatusCode::BAD_GATEWAY, None, ""),
            UpstreamError::Transient(_)
        ));
        assert!(matches!(
            error_for_status(StatusCode::UNAUTHORIZED, None, ""),
            UpstreamError::Protocol(_)
        ));
    }

    #[test]
    fn test_throttle_hint_precedence() {
        let header = Some(Duration::from_secs(7));
        assert_eq!(
            error_for_status(StatusCode::TOO_MANY_REQUESTS, header, r#"{"retry_after": 3}"#),
            UpstreamError::Throttled {
                retry_after: Duration::from_secs(7)
            }
        );
        assert_eq!(
            error_for_status(StatusCode::TOO_MANY_REQUESTS, None, r#"{"retry_after": 3}"#),
            UpstreamError::Throttled {
                retry_after: Duration::from_secs(3)
            }
        );
        assert_eq!(
            error_for_status(StatusCode::TOO_MANY_REQUESTS, None, "slow down"),
            UpstreamError::Throttled {
                retry_after: DEFAULT_RETRY_AFTER
            }
        );
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let body = "я".repeat(300);
        let truncated = truncate(&body);
        assert!(truncated.ends_with("[truncated]"));
    }

    #[test]
    fn test_empty_base_url_rejected() {
        let err = HttpUpstream::new("  ", None, Duration::from_secs(5)).unwrap_err();
        assert!(err.is_invalid_request());
    }
}
