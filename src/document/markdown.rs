//! Markdown document.

use std::fmt::Write as _;

use super::{DocumentFormat, DocumentRenderer, ExportSummary, period_date};
use crate::error::{PostpackError, Result};
use crate::record::PostRecord;

/// Renders a Markdown document: cover list, then one section per post.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkdownRenderer;

impl DocumentRenderer for MarkdownRenderer {
    fn format(&self) -> DocumentFormat {
        DocumentFormat::Markdown
    }

    fn render(&self, records: &[PostRecord], summary: &ExportSummary) -> Result<Vec<u8>> {
        render_markdown(records, summary)
            .map(String::into_bytes)
            .map_err(|e| PostpackError::render("Markdown", e.to_string()))
    }
}

fn render_markdown(records: &[PostRecord], summary: &ExportSummary) -> std::result::Result<String, std::fmt::Error> {
    let mut out = String::new();

    writeln!(out, "# Posts from {}", summary.channel_title)?;
    writeln!(out)?;
    writeln!(out, "- Channel: @{}", summary.channel_handle)?;
    writeln!(
        out,
        "- Period: {} to {}",
        period_date(summary.date_from),
        period_date(summary.date_to)
    )?;
    writeln!(out, "- Sorted by: {}", summary.sort)?;
    writeln!(out, "- Posts: {}", summary.total)?;

    if records.is_empty() {
        writeln!(out)?;
        writeln!(out, "_No posts in this period._")?;
    }

    for record in records {
        writeln!(out)?;
        writeln!(out, "---")?;
        writeln!(out)?;
        writeln!(
            out,
            "## [{}] #{}",
            record.timestamp().format("%d.%m.%Y %H:%M"),
            record.id()
        )?;
        writeln!(out)?;
        if !record.text().is_empty() {
            writeln!(out, "{}", record.text())?;
            writeln!(out)?;
        }

        let mut counters = Vec::new();
        if !record.top_reactions().is_empty() {
            counters.push(
                record
                    .top_reactions()
                    .iter()
                    .map(|r| format!("{} {}", r.emoji, r.count))
                    .collect::<Vec<_>>()
                    .join("  "),
            );
        }
        counters.push(format!("Reactions: {}", record.reactions()));
        counters.push(format!("Views: {}", record.views()));
        writeln!(out, "*{}*", counters.join(" / "))?;

        if !record.links().is_empty() {
            writeln!(out)?;
            for link in record.links() {
                writeln!(out, "- <{}>", link)?;
            }
        }
    }

    Ok(out)
}
