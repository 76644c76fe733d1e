//! Channel reference parsing and resolution.
//!
//! Users type channels in many shapes: `@rustlang`, `rustlang`,
//! `t.me/rustlang`, `https://t.me/s/rustlang?before=10`. All of them reduce
//! to one canonical handle via [`normalize_reference`], which is pure and
//! runs during request validation. [`resolve`] then asks the upstream who
//! the handle belongs to.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{PostpackError, Result};
use crate::transport::{RateLimitedTransport, TransportError};
use crate::upstream::{RawChannel, UpstreamError};

static HANDLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_]{3,64}$").expect("valid regex"));

/// A channel the upstream confirmed to exist and be readable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelIdentity {
    /// Upstream id, used for history requests.
    pub id: u64,
    /// Display title.
    pub title: String,
    /// Canonical handle, without `@`.
    pub handle: String,
}

impl ChannelIdentity {
    /// Title when known, `@handle` otherwise.
    pub fn display_name(&self) -> String {
        if self.title.trim().is_empty() {
            format!("@{}", self.handle)
        } else {
            self.title.clone()
        }
    }
}

/// Reduces a user-supplied reference to its canonical handle.
///
/// ```rust
/// use postpack::channel::normalize_reference;
///
/// assert_eq!(normalize_reference("@rustlang").unwrap(), "rustlang");
/// assert_eq!(normalize_reference("https://t.me/s/rustlang/").unwrap(), "rustlang");
/// assert!(normalize_reference("").is_err());
/// ```
pub fn normalize_reference(reference: &str) -> Result<String> {
    let mut handle = reference.trim();

    for scheme in ["https://", "http://"] {
        if let Some(rest) = strip_prefix_ignore_case(handle, scheme) {
            handle = rest;
        }
    }
    if let Some(rest) = strip_prefix_ignore_case(handle, "www.") {
        handle = rest;
    }
    for host in ["t.me/s/", "t.me/", "telegram.me/"] {
        if let Some(rest) = strip_prefix_ignore_case(handle, host) {
            handle = rest;
            break;
        }
    }

    let handle = handle
        .split(['?', '#'])
        .next()
        .unwrap_or_default()
        .trim_end_matches('/')
        .trim_start_matches('@');

    if handle.is_empty() {
        return Err(PostpackError::invalid_request("channel reference is empty"));
    }
    if !HANDLE.is_match(handle) {
        return Err(PostpackError::invalid_request(format!(
            "'{}' is not a valid channel handle",
            reference.trim()
        )));
    }
    Ok(handle.to_string())
}

fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    if s.len() >= prefix.len()
        && s.is_char_boundary(prefix.len())
        && s[..prefix.len()].eq_ignore_ascii_case(prefix)
    {
        Some(&s[prefix.len()..])
    } else {
        None
    }
}

/// Resolves `reference` to a channel identity.
///
/// Absence and privacy are distinct, terminal outcomes and are reported with
/// the reference exactly as the caller typed it.
pub async fn resolve(transport: &RateLimitedTransport, reference: &str) -> Result<ChannelIdentity> {
    let handle = normalize_reference(reference)?;
    let upstream = transport.upstream();

    let raw: RawChannel = transport
        .call("lookup_channel", || upstream.lookup_channel(&handle))
        .await
        .map_err(|err| match err {
            TransportError::Terminal(UpstreamError::NotFound) => {
                PostpackError::channel_not_found(reference)
            }
            TransportError::Terminal(UpstreamError::Private) => {
                PostpackError::channel_private(reference)
            }
            other => other.into_network("lookup_channel"),
        })?;

    debug!(id = raw.id, title = %raw.title, "channel resolved");

    Ok(ChannelIdentity {
        id: raw.id,
        title: raw.title,
        handle: raw.username.unwrap_or(handle),
    })
}
