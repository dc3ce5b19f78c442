use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, error, info, warn};

use crate::browser::Browser;
use crate::config::Settings;
use crate::error::{ExtractionError, RunFailure};
use crate::model::{Category, CategoryReport, ExtractionStats, ProductRecord};
use crate::parser;
use crate::scroll::{self, ScrollPolicy};
use crate::session::Session;

/// Explicit per-run context passed down the pipeline instead of globals.
pub struct RunContext {
    pub settings: Settings,
    pub cancel: Arc<AtomicBool>,
    pub progress: bool,
}

impl RunContext {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            cancel: Arc::new(AtomicBool::new(false)),
            progress: true,
        }
    }

    fn check_cancelled(&self) -> Result<(), RunFailure> {
        if self.cancel.load(Ordering::Relaxed) {
            Err(RunFailure::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExtractionRequest {
    pub dispensary: String,
    /// `None` means every category.
    pub categories: Option<Vec<Category>>,
    pub min_thc: Option<f64>,
    pub max_price: Option<f64>,
}

pub struct Extraction {
    pub records: Vec<ProductRecord>,
    pub stats: ExtractionStats,
}

/// THC / price predicates. Each bound is inclusive and only applies when set.
#[derive(Debug, Clone, Copy, Default)]
pub struct Filters {
    pub min_thc: Option<f64>,
    pub max_price: Option<f64>,
    /// Otherwise a missing THC reading is compared as 0.
    pub keep_missing_thc: bool,
}

impl Filters {
    pub fn is_active(&self) -> bool {
        self.min_thc.is_some() || self.max_price.is_some()
    }

    pub fn keeps(&self, record: &ProductRecord) -> bool {
        if let Some(min) = self.min_thc {
            let passes = match record.thc_numeric {
                Some(thc) => thc >= min,
                None => self.keep_missing_thc || 0.0 >= min,
            };
            if !passes {
                return false;
            }
        }
        if let Some(max) = self.max_price {
            // unpriced records never satisfy a price ceiling
            if !record.price.is_some_and(|p| p <= max) {
                return false;
            }
        }
        true
    }
}

/// Extract every requested category of one dispensary.
///
/// The session is consumed: it is closed before this returns, whether the
/// run succeeds, fails or is cancelled. On failure the error carries the
/// finalized stats and every record kept before the failure.
pub fn extract_dispensary<B: Browser>(
    mut session: Session<B>,
    ctx: &RunContext,
    request: &ExtractionRequest,
) -> Result<Extraction, ExtractionError> {
    info!("Starting extraction for dispensary: {}", request.dispensary);
    let mut stats = ExtractionStats::start(&request.dispensary);
    let mut records = Vec::new();

    let categories = request
        .categories
        .clone()
        .unwrap_or_else(|| Category::ALL.to_vec());
    let filters = Filters {
        min_thc: request.min_thc,
        max_price: request.max_price,
        keep_missing_thc: ctx.settings.run.keep_missing_thc,
    };

    let outcome = run_categories(
        &mut session,
        ctx,
        &request.dispensary,
        &categories,
        &filters,
        &mut stats,
        &mut records,
    );

    session.close();
    stats.finalize(records.len());

    match outcome {
        Ok(()) => {
            info!(
                "Extraction completed: {} products extracted ({} failed entries)",
                records.len(),
                stats.failed_extractions
            );
            Ok(Extraction { records, stats })
        }
        Err(cause) => {
            error!("Extraction failed: {}", cause);
            Err(ExtractionError {
                cause,
                stats,
                partial: records,
            })
        }
    }
}

fn run_categories<B: Browser>(
    session: &mut Session<B>,
    ctx: &RunContext,
    dispensary: &str,
    categories: &[Category],
    filters: &Filters,
    stats: &mut ExtractionStats,
    records: &mut Vec<ProductRecord>,
) -> Result<(), RunFailure> {
    for (i, &category) in categories.iter().enumerate() {
        ctx.check_cancelled()?;
        if i > 0 {
            // courtesy pause so the storefront is not hammered
            std::thread::sleep(ctx.settings.run.category_pause());
        }

        let mut report = CategoryReport::new(category);
        let result = process_category(
            session,
            ctx,
            dispensary,
            category,
            filters,
            &mut report,
            stats,
            records,
        );
        if let Err(e) = &result {
            report.error = Some(e.to_string());
        }
        stats.categories.push(report);
        result?;
        stats.categories_processed += 1;
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn process_category<B: Browser>(
    session: &mut Session<B>,
    ctx: &RunContext,
    dispensary: &str,
    category: Category,
    filters: &Filters,
    report: &mut CategoryReport,
    stats: &mut ExtractionStats,
    records: &mut Vec<ProductRecord>,
) -> Result<(), RunFailure> {
    info!("Processing category: {}", category);
    let url = ctx.settings.category_url(dispensary, category);
    session.open(&url)?;
    session.dismiss_age_gate()?;

    let policy = ScrollPolicy::from(&ctx.settings.scroll);
    let loaded = scroll::load_all(
        session.browser(),
        &ctx.settings.scroll.entry_selector,
        &policy,
        &ctx.cancel,
    )?;
    report.entries_found = loaded.entries.len();
    report.scroll_outcome = Some(loaded.end);
    info!(
        "Found {} products in {} ({} after {} scrolls)",
        loaded.entries.len(),
        category,
        loaded.end.as_str(),
        loaded.iterations
    );

    let pb = progress_bar(ctx.progress, loaded.entries.len());
    let mut seen = HashSet::new();
    let mut category_records = Vec::with_capacity(loaded.entries.len());

    for (i, entry) in loaded.entries.iter().enumerate() {
        ctx.check_cancelled()?;
        match parser::extract_entry(&**entry) {
            Ok(parsed) => {
                stats.successful_extractions += 1;
                report.extracted += 1;
                let record = parsed.into_record(category);
                let key = record
                    .product_url
                    .clone()
                    .unwrap_or_else(|| record.raw_text.clone());
                if seen.insert(key) {
                    category_records.push(record);
                } else {
                    debug!("Duplicate entry skipped: {}", record.name);
                    stats.duplicates_skipped += 1;
                    report.duplicates += 1;
                }
            }
            Err(e) => {
                warn!("Failed to extract product data ({} #{}): {}", category, i + 1, e);
                stats.failed_extractions += 1;
                report.failed += 1;
            }
        }
        pb.inc(1);
        if (i + 1) % 50 == 0 {
            debug!("Processed {}/{} products", i + 1, loaded.entries.len());
        }
    }
    pb.finish_and_clear();
    info!("Extracted {} products from {}", category_records.len(), category);

    if filters.is_active() {
        let before = category_records.len();
        category_records.retain(|r| filters.keeps(r));
        let removed = before - category_records.len();
        report.filtered_out = removed;
        stats.filtered_out += removed;
        info!("Applied filters: {} -> {} products", before, category_records.len());
    }

    report.kept = category_records.len();
    records.extend(category_records);
    Ok(())
}

fn progress_bar(enabled: bool, len: usize) -> ProgressBar {
    if !enabled {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );
    pb
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::fake::{FakeBrowser, FakeEntry, FakePage, Tracker};
    use crate::model::StockStatus;
    use crate::scroll::ScrollEnd;
    use crate::session::tests::instant_settings;
    use chrono::Utc;

    const SLUG: &str = "green-leaf";

    fn ctx() -> RunContext {
        RunContext {
            progress: false,
            ..RunContext::new(instant_settings())
        }
    }

    fn url(ctx: &RunContext, category: Category) -> String {
        ctx.settings.category_url(SLUG, category)
    }

    fn request(categories: &[Category]) -> ExtractionRequest {
        ExtractionRequest {
            dispensary: SLUG.into(),
            categories: Some(categories.to_vec()),
            ..Default::default()
        }
    }

    fn run(ctx: &RunContext, browser: FakeBrowser, req: &ExtractionRequest) -> (Result<Extraction, ExtractionError>, Tracker) {
        let tracker = browser.tracker();
        let session = Session::new(browser, &ctx.settings);
        (extract_dispensary(session, ctx, req), tracker)
    }

    fn record(thc: Option<f64>, price: Option<f64>) -> ProductRecord {
        ProductRecord {
            name: "Test".into(),
            category: Category::Flower,
            brand: None,
            strain_type: None,
            thc_percent: thc.map(|t| format!("{}%", t)),
            thc_numeric: thc,
            cbd_percent: None,
            cbd_numeric: None,
            size_weight: None,
            price,
            price_raw: price.map(|p| format!("${}", p)),
            stock_status: StockStatus::InStock,
            product_url: None,
            date_captured_utc: Utc::now(),
            raw_text: String::new(),
        }
    }

    #[test]
    fn three_categories_one_empty() {
        let ctx = ctx();
        let cats = [Category::Flower, Category::PreRolls, Category::Edibles];
        let browser = FakeBrowser::new()
            .page(&url(&ctx, Category::Flower), FakePage::fixed(5))
            .page(&url(&ctx, Category::PreRolls), FakePage::fixed(0))
            .page(&url(&ctx, Category::Edibles), FakePage::growing(4, 4, 12));

        let (result, tracker) = run(&ctx, browser, &request(&cats));
        let out = result.unwrap();

        assert_eq!(out.stats.categories_processed, 3);
        assert_eq!(out.stats.total_products, 17);
        assert_eq!(out.records.len(), 17);
        assert_eq!(out.stats.failed_extractions, 0);
        assert_eq!(out.stats.successful_extractions, 17);
        assert_eq!(out.stats.categories[1].scroll_outcome, Some(ScrollEnd::Empty));
        assert!(out.records[..5].iter().all(|r| r.category == Category::Flower));
        assert!(out.records[5..].iter().all(|r| r.category == Category::Edibles));
        assert!(out.stats.end_time.is_some());
        assert!(tracker.closed.get());
    }

    #[test]
    fn defaults_to_every_category() {
        let ctx = ctx();
        let req = ExtractionRequest {
            dispensary: SLUG.into(),
            ..Default::default()
        };
        let (result, tracker) = run(&ctx, FakeBrowser::new(), &req);
        assert_eq!(result.unwrap().stats.categories_processed, 6);
        let opens = tracker.opens.borrow();
        assert_eq!(opens.len(), 6);
        assert!(opens[1].ends_with("/products/pre-rolls"));
    }

    #[test]
    fn unreadable_entries_are_counted_not_fatal() {
        fn every_third_stale(i: usize) -> FakeEntry {
            if i % 3 == 0 {
                FakeEntry::stale()
            } else {
                FakeEntry::new(&format!("Item {i}\nBrand\n$10"))
            }
        }
        let ctx = ctx();
        let browser = FakeBrowser::new().page(
            &url(&ctx, Category::Flower),
            FakePage::fixed(9).with_entry(every_third_stale),
        );
        let (result, _) = run(&ctx, browser, &request(&[Category::Flower]));
        let out = result.unwrap();
        assert_eq!(out.stats.failed_extractions, 3);
        assert_eq!(out.stats.successful_extractions, 6);
        assert_eq!(out.records.len(), 6);
        assert_eq!(out.stats.categories[0].failed, 3);
    }

    #[test]
    fn duplicate_entries_are_dropped_and_counted() {
        fn same_link(i: usize) -> FakeEntry {
            FakeEntry::new(&format!("Item {}\n$10", i % 2)).with_link(&format!("https://menu.test/p/{}", i % 2))
        }
        let ctx = ctx();
        let browser = FakeBrowser::new()
            .page(&url(&ctx, Category::Flower), FakePage::fixed(6).with_entry(same_link));
        let (result, _) = run(&ctx, browser, &request(&[Category::Flower]));
        let out = result.unwrap();
        assert_eq!(out.records.len(), 2);
        assert_eq!(out.stats.duplicates_skipped, 4);
    }

    #[test]
    fn navigation_failure_aborts_with_partial_results() {
        let ctx = ctx();
        let cats = [Category::Flower, Category::Vaporizers, Category::Edibles];
        let browser = FakeBrowser::new()
            .page(&url(&ctx, Category::Flower), FakePage::fixed(4))
            .page(
                &url(&ctx, Category::Vaporizers),
                FakePage::fixed(4).failing_navigation(u32::MAX),
            );

        let (result, tracker) = run(&ctx, browser, &request(&cats));
        let err = result.err().unwrap();

        assert!(matches!(err.cause, RunFailure::Navigation(_)));
        assert_eq!(err.stats.categories_processed, 1);
        assert_eq!(err.partial.len(), 4);
        assert_eq!(err.stats.total_products, 4);
        assert!(err.stats.end_time.is_some());
        assert_eq!(err.stats.categories.len(), 2);
        assert!(err.stats.categories[1].error.is_some());
        assert_eq!(err.stats.failed_categories().count(), 1);
        assert!(tracker.closed.get());
        // edibles never attempted
        assert!(!tracker.opens.borrow().iter().any(|u| u.ends_with("edibles")));
    }

    #[test]
    fn cancelled_run_still_releases_browser() {
        let ctx = ctx();
        ctx.cancel.store(true, Ordering::Relaxed);
        let (result, tracker) = run(&ctx, FakeBrowser::new(), &request(&[Category::Flower]));
        let err = result.err().unwrap();
        assert!(err.is_cancelled());
        assert!(tracker.closed.get());
        assert!(tracker.opens.borrow().is_empty());
    }

    #[test]
    fn age_gate_handled_per_category() {
        let ctx = ctx();
        let browser = FakeBrowser::new()
            .page(&url(&ctx, Category::Flower), FakePage::fixed(2).with_age_gate());
        let (result, tracker) = run(&ctx, browser, &request(&[Category::Flower]));
        assert_eq!(result.unwrap().records.len(), 2);
        assert_eq!(tracker.gate_clicks.get(), 1);
    }

    #[test]
    fn filters_applied_and_counted() {
        fn priced(i: usize) -> FakeEntry {
            FakeEntry::new(&format!("Item {i}\nBrand\nTHC: {}%\n${}", 15 + i, 40 + i * 5))
        }
        let ctx = ctx();
        let browser = FakeBrowser::new()
            .page(&url(&ctx, Category::Flower), FakePage::fixed(5).with_entry(priced));
        let req = ExtractionRequest {
            min_thc: Some(17.0),
            max_price: Some(55.0),
            ..request(&[Category::Flower])
        };
        let (result, _) = run(&ctx, browser, &req);
        let out = result.unwrap();
        // THC 15..19, price 40..60: keep i = 2, 3
        assert_eq!(out.records.len(), 2);
        assert_eq!(out.stats.filtered_out, 3);
        assert_eq!(out.stats.categories[0].kept, 2);
    }

    #[test]
    fn min_thc_is_inclusive() {
        let f = Filters {
            min_thc: Some(20.0),
            ..Default::default()
        };
        assert!(!f.keeps(&record(Some(19.9), Some(10.0))));
        assert!(f.keeps(&record(Some(20.0), Some(10.0))));
    }

    #[test]
    fn max_price_is_inclusive() {
        let f = Filters {
            max_price: Some(50.0),
            ..Default::default()
        };
        assert!(f.keeps(&record(None, Some(50.0))));
        assert!(!f.keeps(&record(None, Some(50.01))));
        assert!(!f.keeps(&record(None, None)));
    }

    #[test]
    fn missing_thc_counts_as_zero_unless_configured() {
        let strict = Filters {
            min_thc: Some(20.0),
            ..Default::default()
        };
        assert!(!strict.keeps(&record(None, Some(10.0))));

        let lenient = Filters {
            keep_missing_thc: true,
            ..strict
        };
        assert!(lenient.keeps(&record(None, Some(10.0))));

        let zero = Filters {
            min_thc: Some(0.0),
            ..Default::default()
        };
        assert!(zero.keeps(&record(None, None)));
    }

    #[test]
    fn inactive_filters_keep_everything() {
        let f = Filters::default();
        assert!(!f.is_active());
        assert!(f.keeps(&record(None, None)));
    }
}
