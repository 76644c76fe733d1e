//! JSON document.

use serde::Serialize;

use super::{DocumentFormat, DocumentRenderer, ExportSummary};
use crate::error::Result;
use crate::record::PostRecord;

#[derive(Serialize)]
struct JsonDocument<'a> {
    summary: &'a ExportSummary,
    posts: &'a [PostRecord],
}

/// Renders `{"summary": {...}, "posts": [...]}`, pretty-printed.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonRenderer;

impl DocumentRenderer for JsonRenderer {
    fn format(&self) -> DocumentFormat {
        DocumentFormat::Json
    }

    fn render(&self, records: &[PostRecord], summary: &ExportSummary) -> Result<Vec<u8>> {
        let mut bytes = serde_json::to_vec_pretty(&JsonDocument {
            summary,
            posts: records,
        })?;
        bytes.push(b'\n');
        Ok(bytes)
    }
}
