mod analysis;
mod browser;
mod config;
mod db;
mod error;
mod export;
mod model;
mod parser;
mod scraper;
mod scroll;
mod session;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use tracing::warn;

use crate::browser::ChromeBrowser;
use crate::error::{ExtractionError, RunFailure};
use crate::model::{Category, ExtractionStats};
use crate::scraper::{Extraction, ExtractionRequest, RunContext};
use crate::session::Session;

#[derive(Parser)]
#[command(name = "menu_intel", about = "Dispensary menu extraction and competitive analysis")]
struct Cli {
    /// Debug-level logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract a dispensary's full menu
    Extract {
        /// Dispensary slug as it appears in the storefront URL
        dispensary: String,
        /// Categories to extract (default: all)
        #[arg(short, long, value_enum, value_delimiter = ',', num_args = 1..)]
        categories: Vec<Category>,
        /// Keep products with THC % at or above this value
        #[arg(long)]
        min_thc: Option<f64>,
        /// Keep products priced at or below this value
        #[arg(long)]
        max_price: Option<f64>,
        /// Output directory
        #[arg(short, long, default_value = "output")]
        output: PathBuf,
        /// Run competitive analysis on the result
        #[arg(long)]
        analysis: bool,
        /// Show the browser window
        #[arg(long)]
        headful: bool,
        /// Skip writing the run to the history database
        #[arg(long)]
        no_store: bool,
    },
    /// Competitive analysis of a saved products file
    Analyze {
        /// `<slug>_products.json` from a previous extraction
        products: PathBuf,
        /// Dispensary name used in output file names (default: from file name)
        #[arg(long)]
        name: Option<String>,
        /// Output directory
        #[arg(short, long, default_value = "output")]
        output: PathBuf,
    },
    /// Compare several dispensaries' saved products files
    Compare {
        #[arg(required = true, num_args = 1..)]
        files: Vec<PathBuf>,
        /// Write the comparison report as JSON here
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Show run history statistics
    Stats,
    /// Products table from the latest stored runs
    Overview {
        /// Filter by dispensary slug
        #[arg(short, long)]
        dispensary: Option<String>,
        /// Filter by category
        #[arg(short, long, value_enum)]
        category: Option<Category>,
        /// Max rows to display
        #[arg(short = 'n', long, default_value = "50")]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_level.into()),
        )
        .init();

    let t0 = Instant::now();
    let settings = config::Settings::load()?;

    let result = match cli.command {
        Commands::Extract {
            dispensary,
            categories,
            min_thc,
            max_price,
            output,
            analysis,
            headful,
            no_store,
        } => {
            let mut settings = settings;
            if headful {
                settings.browser.headless = false;
            }
            let db_path = settings.db_path.clone();

            let ctx = RunContext::new(settings);
            let cancel = Arc::clone(&ctx.cancel);
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupt received, stopping at the next checkpoint");
                    cancel.store(true, Ordering::Relaxed);
                }
            });

            let request = ExtractionRequest {
                dispensary: dispensary.clone(),
                categories: (!categories.is_empty()).then_some(categories),
                min_thc,
                max_price,
            };
            println!("Extracting menu for {}...", dispensary);
            let outcome = tokio::task::spawn_blocking(move || run_extraction(&ctx, &request)).await?;

            let (records, stats, failure) = match outcome {
                Ok(Extraction { records, stats }) => (records, stats, None),
                Err(e) => {
                    if e.is_cancelled() {
                        println!("Run cancelled, keeping partial results.");
                    }
                    (e.partial, e.stats, Some(e.cause))
                }
            };
            print_run_summary(&stats);

            let paths = export::export_run(&records, &stats, &output, &dispensary)?;
            println!("Products: {}", paths.products_json.display());
            println!("CSV:      {}", paths.products_csv.display());
            println!("Stats:    {}", paths.stats_json.display());
            println!("Workbook: {}", paths.workbook.display());

            if !no_store {
                let status = match &failure {
                    None => db::RunStatus::Completed,
                    Some(RunFailure::Cancelled) => db::RunStatus::Cancelled,
                    Some(_) => db::RunStatus::Failed,
                };
                let message = failure.as_ref().map(|e| e.to_string());
                let conn = db::connect(&db_path)?;
                db::init_schema(&conn)?;
                let run_id = db::save_run(&conn, &stats, &records, status, message.as_deref())?;
                println!("Stored as run #{} ({})", run_id, status.as_str());
            }

            match failure {
                Some(cause) => {
                    Err(anyhow::Error::new(cause).context(format!("extraction of {} failed", dispensary)))
                }
                None => {
                    if analysis {
                        let result = analysis::analyze(&records);
                        let path = export::export_analysis(&result, &records, &output, &dispensary)?;
                        print_executive_summary(&dispensary, &result.executive_summary);
                        println!("Pricing:        {}", result.pricing_analysis.pricing_strategy.as_str());
                        println!("Analysis: {}", path.display());
                    }
                    Ok(())
                }
            }
        }
        Commands::Analyze {
            products,
            name,
            output,
        } => {
            let records = export::load_products(&products)?;
            let name = name.unwrap_or_else(|| dispensary_name(&products));
            let result = analysis::analyze(&records);
            let path = export::export_analysis(&result, &records, &output, &name)?;
            print_executive_summary(&name, &result.executive_summary);
            println!("Pricing:        {}", result.pricing_analysis.pricing_strategy.as_str());
            println!("\nAnalysis: {}", path.display());
            Ok(())
        }
        Commands::Compare { files, output } => {
            let mut dispensaries = BTreeMap::new();
            for file in &files {
                dispensaries.insert(dispensary_name(file), export::load_products(file)?);
            }
            let report = analysis::compare::compare(&dispensaries);

            println!(
                "{:<24} | {:>8} | {:>5} | {:<18} | {:>5}",
                "Dispensary", "Products", "Cats", "Position", "Score"
            );
            println!("{}", "-".repeat(72));
            for (name, s) in &report.dispensary_summaries {
                println!(
                    "{:<24} | {:>8} | {:>5} | {:<18} | {:>5}",
                    truncate(name, 24),
                    s.total_products,
                    s.categories_covered,
                    s.market_position.as_str(),
                    s.strength_score
                );
            }
            if let Some(leader) = &report.market_leaders.most_products {
                println!("\nMost products: {}", leader);
            }
            if let Some(path) = output {
                export::write_json(&report, &path)?;
                println!("Report: {}", path.display());
            }
            Ok(())
        }
        Commands::Overview {
            dispensary,
            category,
            limit,
        } => {
            let conn = db::connect(&settings.db_path)?;
            db::init_schema(&conn)?;
            let rows = db::fetch_overview(
                &conn,
                dispensary.as_deref(),
                category.map(|c| c.slug()),
                limit,
            )?;
            if rows.is_empty() {
                println!("No products found. Run 'extract' first.");
                return Ok(());
            }

            println!(
                "{:>3} | {:<16} | {:<28} | {:<12} | {:<16} | {:<6} | {:>6} | {:>8} | {:<5}",
                "#", "Dispensary", "Product", "Category", "Brand", "Strain", "THC", "Price", "Stock"
            );
            println!("{}", "-".repeat(120));

            for (i, r) in rows.iter().enumerate() {
                let price = r.price.map(|p| format!("{:.2}", p)).unwrap_or_else(|| "-".into());
                let stock = if r.stock_status == "in_stock" { "yes" } else { "no" };
                println!(
                    "{:>3} | {:<16} | {:<28} | {:<12} | {:<16} | {:<6} | {:>6} | {:>8} | {:<5}",
                    i + 1,
                    truncate(&r.dispensary, 16),
                    truncate(&r.name, 28),
                    r.category,
                    truncate(&r.brand, 16),
                    r.strain_type,
                    r.thc_percent,
                    price,
                    stock
                );
            }

            println!("\n{} products", rows.len());
            Ok(())
        }
        Commands::Stats => {
            let conn = db::connect(&settings.db_path)?;
            db::init_schema(&conn)?;
            let s = db::get_stats(&conn)?;
            println!("Runs:          {}", s.runs);
            println!("  Completed:   {}", s.completed);
            println!("  Failed:      {}", s.failed);
            println!("  Cancelled:   {}", s.cancelled);
            println!("Dispensaries:  {}", s.dispensaries);
            println!("Products:      {}", s.products);
            println!("Failed entries: {}", s.failed_entries);
            println!("Last run:      {}", s.last_run.as_deref().unwrap_or("-"));
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

/// Blocking part of `extract`: launch Chrome and drive the run. A launch
/// failure is reported like any other run failure, with empty stats.
fn run_extraction(
    ctx: &RunContext,
    request: &ExtractionRequest,
) -> Result<Extraction, ExtractionError> {
    let browser = match ChromeBrowser::launch(&ctx.settings.browser) {
        Ok(b) => b,
        Err(e) => {
            let mut stats = ExtractionStats::start(&request.dispensary);
            stats.finalize(0);
            return Err(ExtractionError {
                cause: RunFailure::Browser(e),
                stats,
                partial: Vec::new(),
            });
        }
    };
    let session = Session::new(browser, &ctx.settings);
    scraper::extract_dispensary(session, ctx, request)
}

fn print_run_summary(stats: &ExtractionStats) {
    println!(
        "\n{:<13} | {:>6} | {:>9} | {:>6} | {:>5} | {:>8} | {:>5} | {:<9} | {}",
        "Category", "Found", "Extracted", "Failed", "Dups", "Filtered", "Kept", "Scroll", "Error"
    );
    println!("{}", "-".repeat(100));
    for c in &stats.categories {
        println!(
            "{:<13} | {:>6} | {:>9} | {:>6} | {:>5} | {:>8} | {:>5} | {:<9} | {}",
            c.category.slug(),
            c.entries_found,
            c.extracted,
            c.failed,
            c.duplicates,
            c.filtered_out,
            c.kept,
            c.scroll_outcome.map(|s| s.as_str()).unwrap_or("-"),
            c.error.as_deref().map(|e| truncate(e, 40)).unwrap_or_default()
        );
    }

    println!("\nTotal products:      {}", stats.total_products);
    println!("Categories:          {}", stats.categories_processed);
    println!("Extracted entries:   {}", stats.successful_extractions);
    println!("Failed entries:      {}", stats.failed_extractions);
    println!("Duplicates skipped:  {}", stats.duplicates_skipped);
    println!("Filtered out:        {}", stats.filtered_out);
    let failed = stats.failed_categories().count();
    if failed > 0 {
        println!("Failed categories:   {}", failed);
    }
    if let Some(secs) = stats.duration_seconds {
        println!(
            "Duration:            {}",
            format_duration(Duration::from_secs_f64(secs.max(0.0)))
        );
    }
}

fn print_executive_summary(name: &str, s: &analysis::ExecutiveSummary) {
    println!("\n--- {} ---", name);
    println!("Products:       {}", s.total_products);
    println!("Categories:     {}", s.categories_covered);
    println!("Position:       {}", s.market_position.as_str());
    println!("Strength score: {}/100", s.strength_score);
    for a in &s.key_advantages {
        println!("  + {}", a);
    }
    for r in &s.top_recommendations {
        println!("  > {}", r);
    }
}

/// `green-leaf_products.json` -> `green-leaf`.
fn dispensary_name(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    match stem.strip_suffix("_products") {
        Some(name) => name.to_string(),
        None => stem,
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
