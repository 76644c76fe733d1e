//! Command-line interface definition using clap.
//!
//! This module defines:
//! - [`Args`] - CLI argument structure (for use with clap)
//! - [`FormatArg`], [`SortArg`], [`OrderArg`] - value enums mapped onto the
//!   library's [`DocumentFormat`], [`SortKey`] and [`SortDirection`]
//!
//! ```rust
//! use clap::Parser;
//! use postpack::cli::Args;
//! use postpack::document::DocumentFormat;
//!
//! let args = Args::parse_from(["postpack", "@rustlang", "--from", "2024-01-01", "--to", "2024-01-31", "-f", "md"]);
//! assert_eq!(DocumentFormat::from(args.format), DocumentFormat::Markdown);
//! ```

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::document::DocumentFormat;
use crate::error::Result;
use crate::request::{ExportRequest, SortDirection, SortKey};

/// Export the posts of a public channel for a period into one document.
#[derive(Parser, Debug, Clone)]
#[command(name = "postpack")]
#[command(version, about, long_about = None)]
#[command(after_help = "EXAMPLES:
    postpack @rustlang --from 2024-01-01 --to 2024-01-31
    postpack https://t.me/rustlang --from 2024-01-01 --to 2024-03-31 --sort reactions --order desc
    postpack rustlang --from 2024-06-01 --to 2024-06-30 -f md -o june.md
    postpack demo --from 2024-01-01 --to 2024-01-07 --demo

ENVIRONMENT:
    POSTPACK_API_URL, POSTPACK_API_TOKEN, POSTPACK_DEMO,
    POSTPACK_PAGE_SIZE, POSTPACK_TIMEOUT_SECS, RUST_LOG")]
pub struct Args {
    /// Channel handle or link (@name, name, t.me/name, https://t.me/s/name)
    pub channel: String,

    /// First day of the period (YYYY-MM-DD, inclusive)
    #[arg(long, value_name = "DATE")]
    pub from: String,

    /// Last day of the period (YYYY-MM-DD, inclusive)
    #[arg(long, value_name = "DATE")]
    pub to: String,

    /// Sort key
    #[arg(short, long, value_enum, default_value = "date")]
    pub sort: SortArg,

    /// Sort direction
    #[arg(long, value_enum, default_value = "asc")]
    pub order: OrderArg,

    /// Output file name; derived from channel and period when omitted
    #[arg(short, long)]
    pub output: Option<String>,

    /// Document format
    #[arg(short, long, value_enum, default_value = "html")]
    pub format: FormatArg,

    /// Directory the document is written to
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub output_dir: PathBuf,

    /// Use the built-in demo channel instead of the upstream API
    #[arg(long)]
    pub demo: bool,

    /// Messages per history page (1-100)
    #[arg(long, value_name = "N")]
    pub page_size: Option<u32>,

    /// Keep posts without text
    #[arg(long)]
    pub include_empty: bool,
}

impl Args {
    /// Builds the export request described by the arguments.
    pub fn to_request(&self) -> Result<ExportRequest> {
        let mut request = ExportRequest::parse(self.channel.clone(), &self.from, &self.to)?
            .with_sort(self.sort.into(), self.order.into());
        if let Some(name) = &self.output {
            request = request.with_filename(name.clone());
        }
        Ok(request)
    }

    /// Full path of the output document.
    pub fn output_path(&self, request: &ExportRequest) -> PathBuf {
        let format: DocumentFormat = self.format.into();
        self.output_dir
            .join(request.output_filename(format.extension()))
    }
}

/// Sort key options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, Default)]
pub enum SortArg {
    /// Publication time
    #[default]
    Date,
    /// Total reactions
    Reactions,
    /// View count
    Views,
}

impl From<SortArg> for SortKey {
    fn from(arg: SortArg) -> Self {
        match arg {
            SortArg::Date => SortKey::Date,
            SortArg::Reactions => SortKey::Reactions,
            SortArg::Views => SortKey::Views,
        }
    }
}

/// Sort direction options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, Default)]
pub enum OrderArg {
    /// Oldest / smallest first
    #[default]
    #[value(alias = "ascending")]
    Asc,
    /// Newest / largest first
    #[value(alias = "descending")]
    Desc,
}

impl From<OrderArg> for SortDirection {
    fn from(arg: OrderArg) -> Self {
        match arg {
            OrderArg::Asc => SortDirection::Asc,
            OrderArg::Desc => SortDirection::Desc,
        }
    }
}

/// Document format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, Default)]
pub enum FormatArg {
    /// Paginated print document
    #[default]
    Html,
    /// Markdown
    #[value(alias = "markdown")]
    Md,
    /// Semicolon-delimited table
    Csv,
    /// Single JSON document
    Json,
    /// JSON Lines
    #[value(alias = "ndjson")]
    Jsonl,
}

impl From<FormatArg> for DocumentFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Html => DocumentFormat::Html,
            FormatArg::Md => DocumentFormat::Markdown,
            FormatArg::Csv => DocumentFormat::Csv,
            FormatArg::Json => DocumentFormat::Json,
            FormatArg::Jsonl => DocumentFormat::Jsonl,
        }
    }
}

impl std::fmt::Display for FormatArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", DocumentFormat::from(*self))
    }
}
