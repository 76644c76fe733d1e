//! HTML print document.
//!
//! A4 pages, one block per post, blocks never split across pages. Each post
//! starts with a header line:
//!
//! ```text
//! [02.03.2024] / 🔥 9  👍 3 / Reactions: 12 / Views: 340
//! ```
//!
//! The top-reactions part is omitted when the post has none.

use std::fmt::Write as _;

use super::{DocumentFormat, DocumentRenderer, ExportSummary, header_date, period_date};
use crate::error::{PostpackError, Result};
use crate::record::PostRecord;

const STYLE: &str = r#"
@page { size: A4; margin: 2cm; }
body {
    font-family: "Noto Sans", "DejaVu Sans", "Segoe UI", "Apple Color Emoji", "Noto Color Emoji", sans-serif;
    font-size: 12pt;
    line-height: 1.6;
    color: #333;
}
h1 {
    font-size: 18pt;
    font-weight: 600;
    color: #000;
    margin-bottom: 0.5em;
    padding-bottom: 0.5em;
    border-bottom: 2px solid #e0e0e0;
}
.summary { color: #555; font-size: 10pt; margin-bottom: 2em; }
.summary dt { font-weight: 600; float: left; clear: left; width: 8em; }
.summary dd { margin-left: 8em; }
.post { margin-bottom: 2em; page-break-inside: avoid; break-inside: avoid; }
.post-header { font-size: 11pt; color: #666; margin-bottom: 0.5em; font-weight: 500; }
.post-date { color: #0066cc; font-weight: 600; }
.post-reactions, .post-views, .post-total { color: #555; }
.post-text { white-space: pre-wrap; word-wrap: break-word; }
.post-links { font-size: 10pt; margin-top: 0.5em; padding-left: 1.2em; }
.post-links a { color: #0066cc; word-break: break-all; }
.separator { border-bottom: 1px solid #e0e0e0; margin: 1.5em 0; }
.empty { color: #888; font-style: italic; }
"#;

/// Renders the HTML print document.
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlRenderer;

impl DocumentRenderer for HtmlRenderer {
    fn format(&self) -> DocumentFormat {
        DocumentFormat::Html
    }

    fn render(&self, records: &[PostRecord], summary: &ExportSummary) -> Result<Vec<u8>> {
        render_html(records, summary)
            .map(String::into_bytes)
            .map_err(|e| PostpackError::render("HTML", e.to_string()))
    }
}

fn render_html(records: &[PostRecord], summary: &ExportSummary) -> std::result::Result<String, std::fmt::Error> {
    let mut out = String::with_capacity(4096 + records.len() * 512);

    writeln!(out, "<!DOCTYPE html>")?;
    writeln!(out, "<html>")?;
    writeln!(out, "<head>")?;
    writeln!(out, "<meta charset=\"UTF-8\">")?;
    writeln!(out, "<title>{}</title>", escape(&summary.channel_title))?;
    writeln!(out, "<style>{}</style>", STYLE)?;
    writeln!(out, "</head>")?;
    writeln!(out, "<body>")?;
    writeln!(out, "<h1>Posts from {}</h1>", escape(&summary.channel_title))?;

    writeln!(out, "<dl class=\"summary\">")?;
    writeln!(out, "<dt>Channel</dt><dd>@{}</dd>", escape(&summary.channel_handle))?;
    writeln!(
        out,
        "<dt>Period</dt><dd>{} to {}</dd>",
        period_date(summary.date_from),
        period_date(summary.date_to)
    )?;
    writeln!(out, "<dt>Sorted by</dt><dd>{}</dd>", escape(&summary.sort))?;
    writeln!(out, "<dt>Posts</dt><dd>{}</dd>", summary.total)?;
    writeln!(out, "</dl>")?;

    if records.is_empty() {
        writeln!(out, "<p class=\"empty\">No posts in this period.</p>")?;
    }

    for (i, record) in records.iter().enumerate() {
        if i > 0 {
            writeln!(out, "<div class=\"separator\"></div>")?;
        }
        write_post(&mut out, record)?;
    }

    writeln!(out, "</body>")?;
    writeln!(out, "</html>")?;
    Ok(out)
}

fn write_post(out: &mut String, record: &PostRecord) -> std::fmt::Result {
    let mut header = vec![format!(
        "<span class=\"post-date\">[{}]</span>",
        header_date(record.timestamp())
    )];
    if !record.top_reactions().is_empty() {
        let top = record
            .top_reactions()
            .iter()
            .map(|r| format!("{}&nbsp;{}", escape(&r.emoji), r.count))
            .collect::<Vec<_>>()
            .join("&nbsp;&nbsp;");
        header.push(format!("<span class=\"post-reactions\">{}</span>", top));
    }
    header.push(format!(
        "<span class=\"post-total\">Reactions: {}</span>",
        record.reactions()
    ));
    header.push(format!(
        "<span class=\"post-views\">Views: {}</span>",
        record.views()
    ));

    writeln!(out, "<div class=\"post\" id=\"post-{}\">", record.id())?;
    writeln!(out, "<div class=\"post-header\">{}</div>", header.join(" / "))?;
    writeln!(out, "<div class=\"post-text\">{}</div>", escape(record.text()))?;
    if !record.links().is_empty() {
        writeln!(out, "<ul class=\"post-links\">")?;
        for link in record.links() {
            let href = if link.contains("://") {
                link.clone()
            } else {
                format!("https://{}", link)
            };
            writeln!(
                out,
                "<li><a href=\"{}\">{}</a></li>",
                escape(&href),
                escape(link)
            )?;
        }
        writeln!(out, "</ul>")?;
    }
    writeln!(out, "</div>")
}

/// Escapes text for HTML element and attribute content.
pub(crate) fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
