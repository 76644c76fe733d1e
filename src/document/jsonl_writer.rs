//! JSON Lines document.
//!
//! The first line is the summary, wrapped as `{"summary": {...}}`; every
//! following line is one post. Convenient for streaming consumers and
//! line-oriented tools.

use std::io::Write;

use serde::Serialize;

use super::{DocumentFormat, DocumentRenderer, ExportSummary};
use crate::error::Result;
use crate::record::PostRecord;

#[derive(Serialize)]
struct SummaryLine<'a> {
    summary: &'a ExportSummary,
}

/// Renders a summary line followed by one JSON object per post.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonlRenderer;

impl DocumentRenderer for JsonlRenderer {
    fn format(&self) -> DocumentFormat {
        DocumentFormat::Jsonl
    }

    fn render(&self, records: &[PostRecord], summary: &ExportSummary) -> Result<Vec<u8>> {
        let mut out = Vec::new();

        serde_json::to_writer(&mut out, &SummaryLine { summary })?;
        writeln!(out)?;

        for record in records {
            serde_json::to_writer(&mut out, record)?;
            writeln!(out)?;
        }

        Ok(out)
    }
}
