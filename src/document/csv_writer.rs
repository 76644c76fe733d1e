//! CSV document.

use super::{DocumentFormat, DocumentRenderer, ExportSummary};
use crate::error::Result;
use crate::record::PostRecord;

/// Renders posts as a semicolon-delimited table.
///
/// # Format
/// - Delimiter: `;`
/// - Columns: `ID`, `Timestamp`, `Text`, `Links`, `Reactions`, `Views`
/// - `Links` holds the post's links separated by spaces
/// - Encoding: UTF-8
///
/// The cover summary has no place in a flat table and is only available on
/// the [`Document`](super::Document).
#[derive(Debug, Clone, Copy, Default)]
pub struct CsvRenderer;

impl DocumentRenderer for CsvRenderer {
    fn format(&self) -> DocumentFormat {
        DocumentFormat::Csv
    }

    fn render(&self, records: &[PostRecord], _summary: &ExportSummary) -> Result<Vec<u8>> {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(b';')
            .from_writer(Vec::new());

        writer.write_record(["ID", "Timestamp", "Text", "Links", "Reactions", "Views"])?;

        for record in records {
            writer.write_record([
                record.id().to_string(),
                record.timestamp().format("%Y-%m-%d %H:%M:%S").to_string(),
                record.text().to_string(),
                record.links().join(" "),
                record.reactions().to_string(),
                record.views().to_string(),
            ])?;
        }

        writer
            .into_inner()
            .map_err(|e| std::io::Error::other(e.to_string()).into())
    }
}
