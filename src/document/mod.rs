//! Document assembly.
//!
//! Turns an [`ExportResult`] into the bytes of a single document plus a
//! cover [`ExportSummary`]. Each format has its own [`DocumentRenderer`]:
//!
//! | Format | Renderer | Notes |
//! |--------|----------|-------|
//! | [`Html`](DocumentFormat::Html) | [`HtmlRenderer`] | A4 print layout, default |
//! | [`Markdown`](DocumentFormat::Markdown) | [`MarkdownRenderer`] | |
//! | [`Csv`](DocumentFormat::Csv) | [`CsvRenderer`] | `;` delimited, records only |
//! | [`Json`](DocumentFormat::Json) | [`JsonRenderer`] | `{summary, posts}` |
//! | [`Jsonl`](DocumentFormat::Jsonl) | [`JsonlRenderer`] | summary line, then one post per line |
//!
//! Assembly is all-or-nothing: a renderer error or a document larger than
//! the configured limit yields [`PostpackError::Render`] and no bytes.
//!
//! # Example
//!
//! ```rust
//! use postpack::document::DocumentFormat;
//! use std::str::FromStr;
//!
//! let format = DocumentFormat::from_str("md").unwrap();
//! assert_eq!(format, DocumentFormat::Markdown);
//! assert_eq!(format.extension(), "md");
//! assert_eq!(DocumentFormat::default(), DocumentFormat::Html);
//! ```

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{PostpackError, Result};
use crate::pipeline::ExportResult;
use crate::record::PostRecord;
use crate::request::{SortDirection, SortKey};

#[cfg(feature = "csv-output")]
mod csv_writer;
mod html;
#[cfg(feature = "json-output")]
mod json_writer;
#[cfg(feature = "json-output")]
mod jsonl_writer;
mod markdown;

#[cfg(feature = "csv-output")]
pub use csv_writer::CsvRenderer;
pub use html::HtmlRenderer;
#[cfg(feature = "json-output")]
pub use json_writer::JsonRenderer;
#[cfg(feature = "json-output")]
pub use jsonl_writer::JsonlRenderer;
pub use markdown::MarkdownRenderer;

/// Document format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum DocumentFormat {
    /// Paginated print document
    #[default]
    Html,
    Markdown,
    /// Semicolon-delimited table
    Csv,
    /// Single JSON object
    Json,
    /// JSON Lines
    Jsonl,
}

impl DocumentFormat {
    /// Returns the file extension for this format (without dot).
    pub fn extension(&self) -> &'static str {
        match self {
            DocumentFormat::Html => "html",
            DocumentFormat::Markdown => "md",
            DocumentFormat::Csv => "csv",
            DocumentFormat::Json => "json",
            DocumentFormat::Jsonl => "jsonl",
        }
    }

    /// Returns the MIME type for this format.
    pub fn mime_type(&self) -> &'static str {
        match self {
            DocumentFormat::Html => "text/html",
            DocumentFormat::Markdown => "text/markdown",
            DocumentFormat::Csv => "text/csv",
            DocumentFormat::Json => "application/json",
            DocumentFormat::Jsonl => "application/x-ndjson",
        }
    }

    /// Short label used in messages.
    pub fn label(&self) -> &'static str {
        match self {
            DocumentFormat::Html => "HTML",
            DocumentFormat::Markdown => "Markdown",
            DocumentFormat::Csv => "CSV",
            DocumentFormat::Json => "JSON",
            DocumentFormat::Jsonl => "JSONL",
        }
    }

    /// Returns all supported format names.
    pub fn all_names() -> &'static [&'static str] {
        &["html", "md", "csv", "json", "jsonl"]
    }

    /// Detects format from a file path based on extension.
    ///
    /// ```rust
    /// use postpack::document::DocumentFormat;
    ///
    /// assert_eq!(DocumentFormat::from_path("out/posts.ndjson").unwrap(), DocumentFormat::Jsonl);
    /// assert!(DocumentFormat::from_path("posts.pdf").is_err());
    /// ```
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let ext = path
            .as_ref()
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();
        ext.parse().map_err(|_| {
            PostpackError::invalid_request(format!(
                "Unknown file extension: '.{}'. Expected one of: {}",
                ext,
                DocumentFormat::all_names().join(", ")
            ))
        })
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for DocumentFormat {
    type Err = PostpackError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "html" | "htm" => Ok(DocumentFormat::Html),
            "md" | "markdown" => Ok(DocumentFormat::Markdown),
            "csv" => Ok(DocumentFormat::Csv),
            "json" => Ok(DocumentFormat::Json),
            "jsonl" | "ndjson" => Ok(DocumentFormat::Jsonl),
            _ => Err(PostpackError::invalid_request(format!(
                "Unknown format: '{}'. Expected one of: {}",
                s,
                DocumentFormat::all_names().join(", ")
            ))),
        }
    }
}

/// Cover information printed ahead of the posts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportSummary {
    pub channel_id: u64,
    pub channel_title: String,
    pub channel_handle: String,
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
    pub sort_key: SortKey,
    pub sort_direction: SortDirection,
    /// e.g. `"reactions, descending"`
    pub sort: String,
    pub total: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub earliest: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest: Option<DateTime<Utc>>,
}

impl ExportSummary {
    pub fn from_result(result: &ExportResult) -> Self {
        Self {
            channel_id: result.channel.id,
            channel_title: result.channel.display_name(),
            channel_handle: result.channel.handle.clone(),
            date_from: result.request.date_from,
            date_to: result.request.date_to,
            sort_key: result.request.sort_key,
            sort_direction: result.request.sort_direction,
            sort: result.request.sort_description(),
            total: result.stats.total,
            earliest: result.stats.earliest,
            latest: result.stats.latest,
        }
    }
}

/// A rendering backend.
pub trait DocumentRenderer {
    /// Format produced by this renderer.
    fn format(&self) -> DocumentFormat;

    /// Renders the ordered records and their summary.
    fn render(&self, records: &[PostRecord], summary: &ExportSummary) -> Result<Vec<u8>>;
}

/// Returns the built-in renderer for `format`.
pub fn renderer_for(format: DocumentFormat) -> Result<Box<dyn DocumentRenderer>> {
    match format {
        DocumentFormat::Html => Ok(Box::new(HtmlRenderer)),
        DocumentFormat::Markdown => Ok(Box::new(MarkdownRenderer)),
        #[cfg(feature = "csv-output")]
        DocumentFormat::Csv => Ok(Box::new(CsvRenderer)),
        #[cfg(feature = "json-output")]
        DocumentFormat::Json => Ok(Box::new(JsonRenderer)),
        #[cfg(feature = "json-output")]
        DocumentFormat::Jsonl => Ok(Box::new(JsonlRenderer)),
        #[allow(unreachable_patterns)]
        _ => Err(PostpackError::render(
            format.label(),
            format!(
                "format requires the '{}' feature to be enabled",
                match format {
                    DocumentFormat::Csv => "csv-output",
                    _ => "json-output",
                }
            ),
        )),
    }
}

/// A finished document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub bytes: Vec<u8>,
    pub format: DocumentFormat,
    pub summary: ExportSummary,
}

impl Document {
    /// Size in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// The document as text. All built-in formats are UTF-8.
    pub fn as_text(&self) -> Option<&str> {
        std::str::from_utf8(&self.bytes).ok()
    }

    /// Writes the document to `path`, creating parent directories.
    pub fn write_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, &self.bytes)?;
        Ok(())
    }
}

/// Assembles `result` with the built-in renderer for `format`.
pub fn assemble(result: &ExportResult, format: DocumentFormat, max_bytes: usize) -> Result<Document> {
    let renderer = renderer_for(format)?;
    assemble_with(renderer.as_ref(), result, max_bytes)
}

/// Assembles `result` with a caller-supplied renderer.
pub fn assemble_with(
    renderer: &dyn DocumentRenderer,
    result: &ExportResult,
    max_bytes: usize,
) -> Result<Document> {
    let format = renderer.format();
    let summary = ExportSummary::from_result(result);

    let bytes = renderer
        .render(&result.records, &summary)
        .map_err(|err| match err {
            PostpackError::Render { .. } => err,
            other => PostpackError::render(format.label(), other.to_string()),
        })?;

    if bytes.len() > max_bytes {
        return Err(PostpackError::render(
            format.label(),
            format!(
                "document is {} bytes, limit is {} bytes",
                bytes.len(),
                max_bytes
            ),
        ));
    }

    debug!(format = %format, bytes = bytes.len(), records = result.records.len(), "document assembled");
    Ok(Document {
        bytes,
        format,
        summary,
    })
}

/// `dd.mm.yyyy`, the date style of the post headers.
pub(crate) fn header_date(ts: DateTime<Utc>) -> String {
    ts.format("%d.%m.%Y").to_string()
}

/// `dd.mm.yyyy`, for calendar dates.
pub(crate) fn period_date(date: NaiveDate) -> String {
    date.format("%d.%m.%Y").to_string()
}
