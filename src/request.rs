//! Export requests and the date window they describe.
//!
//! An [`ExportRequest`] names a channel, an inclusive calendar period in UTC
//! and a sort order. [`ExportRequest::validate`] rejects malformed requests
//! before anything touches the network.
//!
//! # Example
//!
//! ```
//! use postpack::request::{ExportRequest, SortDirection, SortKey};
//!
//! # fn main() -> postpack::Result<()> {
//! let request = ExportRequest::parse("@rustlang", "2024-06-01", "2024-06-30")?
//!     .with_sort(SortKey::Reactions, SortDirection::Desc);
//!
//! request.validate()?;
//! assert_eq!(request.default_filename("html"), "rustlang_2024-06-01_2024-06-30.html");
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::channel::normalize_reference;
use crate::error::{PostpackError, Result};

/// Field the records are ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    /// Publication time
    #[default]
    Date,
    /// Total reaction count
    Reactions,
    /// View count
    Views,
}

impl SortKey {
    /// Returns all supported key names.
    pub fn all_names() -> &'static [&'static str] {
        &["date", "reactions", "views"]
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortKey::Date => write!(f, "date"),
            SortKey::Reactions => write!(f, "reactions"),
            SortKey::Views => write!(f, "views"),
        }
    }
}

impl FromStr for SortKey {
    type Err = PostpackError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "date" => Ok(SortKey::Date),
            "reactions" => Ok(SortKey::Reactions),
            "views" => Ok(SortKey::Views),
            _ => Err(PostpackError::invalid_request(format!(
                "Unknown sort key: '{}'. Expected one of: {}",
                s,
                SortKey::all_names().join(", ")
            ))),
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortDirection::Asc => write!(f, "ascending"),
            SortDirection::Desc => write!(f, "descending"),
        }
    }
}

impl FromStr for SortDirection {
    type Err = PostpackError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "asc" | "ascending" => Ok(SortDirection::Asc),
            "desc" | "descending" => Ok(SortDirection::Desc),
            _ => Err(PostpackError::invalid_request(format!(
                "Unknown sort direction: '{}'. Expected asc or desc",
                s
            ))),
        }
    }
}

/// Inclusive calendar period, resolved to UTC instants.
///
/// `start` is midnight of the first day; `end` is midnight *after* the last
/// day and is exclusive, so a post at `23:59:59.999` on the last day is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateWindow {
    /// Builds the window covering `from..=to`.
    pub fn from_dates(from: NaiveDate, to: NaiveDate) -> Self {
        let start = from.and_time(NaiveTime::MIN).and_utc();
        let end = to
            .succ_opt()
            .map(|next| next.and_time(NaiveTime::MIN).and_utc())
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self { start, end }
    }

    /// Returns `true` if `ts` falls inside the window.
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && ts < self.end
    }

    /// Returns `true` if `ts` is after the last day of the window.
    pub fn is_newer(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.end
    }

    /// Returns `true` if `ts` is before the first day of the window.
    pub fn is_older(&self, ts: DateTime<Utc>) -> bool {
        ts < self.start
    }
}

/// Parses a `YYYY-MM-DD` date.
pub fn parse_date(date_str: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(date_str.trim(), "%Y-%m-%d")
        .map_err(|_| PostpackError::invalid_date(date_str))
}

/// One bounded export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportRequest {
    /// Channel handle or link, as typed by the user.
    pub channel: String,

    /// First day of the period (inclusive, UTC).
    pub date_from: NaiveDate,

    /// Last day of the period (inclusive, UTC).
    pub date_to: NaiveDate,

    #[serde(default)]
    pub sort_key: SortKey,

    #[serde(default)]
    pub sort_direction: SortDirection,

    /// Output filename; derived from the channel and period when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

impl ExportRequest {
    /// Creates a request sorted by date, ascending.
    pub fn new(channel: impl Into<String>, date_from: NaiveDate, date_to: NaiveDate) -> Self {
        Self {
            channel: channel.into(),
            date_from,
            date_to,
            sort_key: SortKey::default(),
            sort_direction: SortDirection::default(),
            filename: None,
        }
    }

    /// Creates a request from `YYYY-MM-DD` date strings.
    pub fn parse(channel: impl Into<String>, date_from: &str, date_to: &str) -> Result<Self> {
        Ok(Self::new(channel, parse_date(date_from)?, parse_date(date_to)?))
    }

    #[must_use]
    pub fn with_sort(mut self, key: SortKey, direction: SortDirection) -> Self {
        self.sort_key = key;
        self.sort_direction = direction;
        self
    }

    #[must_use]
    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    /// Checks the request without any network access.
    pub fn validate(&self) -> Result<()> {
        if self.date_from > self.date_to {
            return Err(PostpackError::invalid_request(format!(
                "date_from {} is later than date_to {}",
                self.date_from, self.date_to
            )));
        }
        normalize_reference(&self.channel)?;
        Ok(())
    }

    /// The UTC window covered by this request.
    pub fn window(&self) -> DateWindow {
        DateWindow::from_dates(self.date_from, self.date_to)
    }

    /// Human-readable sort description, e.g. `"reactions, descending"`.
    pub fn sort_description(&self) -> String {
        format!("{}, {}", self.sort_key, self.sort_direction)
    }

    /// Filename derived from the channel and period.
    pub fn default_filename(&self, extension: &str) -> String {
        let clean = normalize_reference(&self.channel).unwrap_or_else(|_| {
            self.channel
                .trim()
                .replace('@', "")
                .replace(['/', '\\'], "_")
        });
        format!(
            "{}_{}_{}.{}",
            clean, self.date_from, self.date_to, extension
        )
    }

    /// The requested filename with `extension` appended when missing, or the
    /// default one.
    pub fn output_filename(&self, extension: &str) -> String {
        match &self.filename {
            Some(name) if !name.trim().is_empty() => {
                let suffix = format!(".{}", extension);
                if name.to_lowercase().ends_with(&suffix) {
                    name.clone()
                } else {
                    format!("{}{}", name, suffix)
                }
            }
            _ => self.default_filename(extension),
        }
    }
}
