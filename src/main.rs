//! # postpack CLI
//!
//! Command-line interface for the postpack library.

use std::process;
use std::time::Instant;

use clap::Parser as ClapParser;
use tracing_subscriber::EnvFilter;

use postpack::cli::Args;
use postpack::document::DocumentFormat;
use postpack::{ExportConfig, Exporter, PostpackError};

fn main() {
    // A missing .env file is fine.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run() {
        eprintln!("❌ Error: {}", e);
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let total_start = Instant::now();
    let args = <Args as ClapParser>::parse();

    let request = args.to_request()?;
    let format: DocumentFormat = args.format.into();
    let output_path = args.output_path(&request);

    let mut config = ExportConfig::from_env()?
        .with_include_empty(args.include_empty);
    if args.demo {
        config = config.with_demo(true);
    }
    if let Some(page_size) = args.page_size {
        config = config.with_page_size(page_size);
    }
    config.validate()?;

    let exporter = Exporter::from_config(config, &request)?;

    // Print header
    println!("📦 postpack v{}", env!("CARGO_PKG_VERSION"));
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("📢 Channel: {}", request.channel);
    println!("📅 Period:  {} to {}", request.date_from, request.date_to);
    println!("🔀 Sort:    {}", request.sort_description());
    println!("📄 Format:  {}", format);
    println!("💾 Output:  {}", output_path.display());
    if exporter.config().upstream.is_demo() {
        println!("🧪 Mode:    Demo (no upstream configured)");
    }
    println!();

    println!("⏳ Fetching posts via {}...", exporter.upstream_name());
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(PostpackError::from)?;

    let fetch_start = Instant::now();
    let (result, document) = runtime.block_on(exporter.export_document(request, format))?;
    println!(
        "   Found {} posts on {} pages ({:.2}s)",
        result.stats.total,
        result.stats.pages_fetched,
        fetch_start.elapsed().as_secs_f64()
    );

    if result.is_empty() {
        println!();
        println!("ℹ️  No posts found in this period. Nothing written.");
        return Ok(());
    }

    println!("💾 Writing {}...", format);
    document.write_to(&output_path)?;

    println!();
    println!("✅ Done! Output saved to {}", output_path.display());

    // Summary
    println!();
    println!("📊 Summary:");
    println!("   Channel:     {} (@{})", result.channel.display_name(), result.channel.handle);
    println!("   Posts:       {}", result.stats.total);
    if let (Some(earliest), Some(latest)) = (result.stats.earliest, result.stats.latest) {
        println!(
            "   Span:        {} to {}",
            earliest.format("%Y-%m-%d %H:%M"),
            latest.format("%Y-%m-%d %H:%M")
        );
    }
    if result.stats.duplicates_dropped > 0 {
        println!("   Duplicates:  {} dropped", result.stats.duplicates_dropped);
    }
    if result.stats.skipped_empty > 0 {
        println!("   Empty posts: {} skipped", result.stats.skipped_empty);
    }
    if result.stats.throttle_waits > 0 {
        println!("   Throttled:   {} waits", result.stats.throttle_waits);
    }
    println!("   Size:        {} bytes", document.len());

    println!();
    println!("⚡ Total time: {:.2}s", total_start.elapsed().as_secs_f64());

    Ok(())
}
