use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use csv::Writer;
use serde::Serialize;
use tracing::{debug, info};

use crate::analysis::{stats, AnalysisResult};
use crate::model::{Category, ExtractionStats, ProductRecord, StockStatus};

const PRODUCT_HEADERS: [&str; 15] = [
    "product_name",
    "category",
    "brand",
    "strain_type",
    "thc_percent",
    "thc_numeric",
    "cbd_percent",
    "cbd_numeric",
    "size_weight",
    "price",
    "price_raw",
    "stock_status",
    "product_url",
    "date_captured_utc",
    "raw_text",
];

/// Files written for one run.
#[derive(Debug, Default)]
pub struct ExportPaths {
    pub products_json: PathBuf,
    pub products_csv: PathBuf,
    pub stats_json: PathBuf,
    pub workbook: PathBuf,
}

/// Write every run artifact for `slug` into `out_dir`.
pub fn export_run(
    records: &[ProductRecord],
    stats: &ExtractionStats,
    out_dir: &Path,
    slug: &str,
) -> Result<ExportPaths> {
    fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create output directory {}", out_dir.display()))?;

    let paths = ExportPaths {
        products_json: out_dir.join(format!("{}_products.json", slug)),
        products_csv: out_dir.join(format!("{}_products.csv", slug)),
        stats_json: out_dir.join(format!("{}_extraction_stats.json", slug)),
        workbook: out_dir.join(format!("{}_workbook", slug)),
    };
    write_json(records, &paths.products_json)?;
    export_products_csv(records, &paths.products_csv)?;
    write_json(stats, &paths.stats_json)?;
    export_workbook(records, &paths.workbook)?;

    info!("Exported {} products to {}", records.len(), out_dir.display());
    Ok(paths)
}

pub fn write_json<T: Serialize + ?Sized>(value: &T, path: &Path) -> Result<()> {
    debug!("Writing JSON: {}", path.display());
    let json = serde_json::to_string_pretty(value)?;
    let mut file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    file.write_all(json.as_bytes())?;
    Ok(())
}

/// Read a products file written by [`export_run`].
pub fn load_products(path: &Path) -> Result<Vec<ProductRecord>> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let records = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("{} is not a products file", path.display()))?;
    Ok(records)
}

fn opt<T: ToString>(v: &Option<T>) -> String {
    v.as_ref().map(|x| x.to_string()).unwrap_or_default()
}

pub fn export_products_csv(records: &[ProductRecord], path: &Path) -> Result<()> {
    debug!("Exporting {} products to CSV: {}", records.len(), path.display());
    let file = File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut wtr = Writer::from_writer(file);

    wtr.write_record(PRODUCT_HEADERS)?;
    for r in records {
        wtr.write_record([
            r.name.clone(),
            r.category.to_string(),
            opt(&r.brand),
            r.strain_type.map(|s| s.as_str().to_string()).unwrap_or_default(),
            opt(&r.thc_percent),
            opt(&r.thc_numeric),
            opt(&r.cbd_percent),
            opt(&r.cbd_numeric),
            opt(&r.size_weight),
            opt(&r.price),
            opt(&r.price_raw),
            r.stock_status.as_str().to_string(),
            opt(&r.product_url),
            r.date_captured_utc.to_rfc3339(),
            r.raw_text.clone(),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}

/// Multi-sheet export as a directory: every product, one sheet per category
/// present, and a summary sheet.
pub fn export_workbook(records: &[ProductRecord], dir: &Path) -> Result<()> {
    fs::create_dir_all(dir)?;
    export_products_csv(records, &dir.join("all_products.csv"))?;

    let mut by_category: BTreeMap<Category, Vec<ProductRecord>> = BTreeMap::new();
    for r in records {
        by_category.entry(r.category).or_default().push(r.clone());
    }
    for (category, rows) in &by_category {
        export_products_csv(rows, &dir.join(format!("{}.csv", category.slug())))?;
    }

    let prices: Vec<f64> = records.iter().filter_map(|r| r.price).collect();
    let thc: Vec<f64> = records.iter().filter_map(|r| r.thc_numeric).collect();
    let in_stock = records
        .iter()
        .filter(|r| r.stock_status == StockStatus::InStock)
        .count();

    let mut wtr = Writer::from_path(dir.join("summary.csv"))?;
    wtr.write_record(["Metric", "Value"])?;
    let rows = [
        ("Total Products", records.len().to_string()),
        ("Categories", by_category.len().to_string()),
        ("Average Price", fmt_opt(stats::mean(&prices))),
        ("Average THC", fmt_opt(stats::mean(&thc))),
        ("In Stock", in_stock.to_string()),
        ("Out of Stock", (records.len() - in_stock).to_string()),
    ];
    for (metric, value) in rows {
        wtr.write_record([metric, value.as_str()])?;
    }
    wtr.flush()?;
    Ok(())
}

fn fmt_opt(v: Option<f64>) -> String {
    v.map(|x| format!("{:.2}", x)).unwrap_or_default()
}

/// `{slug}_competitive_analysis.json` plus a directory with the summary and
/// per-category sheets. Returns the JSON path.
pub fn export_analysis(
    analysis: &AnalysisResult,
    records: &[ProductRecord],
    out_dir: &Path,
    slug: &str,
) -> Result<PathBuf> {
    fs::create_dir_all(out_dir)?;
    let json_path = out_dir.join(format!("{}_competitive_analysis.json", slug));
    write_json(analysis, &json_path)?;

    let sheets = out_dir.join(format!("{}_competitive_analysis", slug));
    fs::create_dir_all(&sheets)?;
    write_analysis_summary(analysis, &sheets.join("analysis_summary.csv"))?;
    write_category_analysis(records, &sheets.join("category_analysis.csv"))?;

    info!("Analysis saved to: {}", out_dir.display());
    Ok(json_path)
}

/// One row per top-level metric of each analysis section.
fn write_analysis_summary(analysis: &AnalysisResult, path: &Path) -> Result<()> {
    let value = serde_json::to_value(analysis)?;
    let mut wtr = Writer::from_path(path)?;
    wtr.write_record(["Analysis Type", "Metric", "Value"])?;

    if let serde_json::Value::Object(sections) = value {
        for (section, body) in sections {
            let serde_json::Value::Object(metrics) = body else {
                continue;
            };
            for (metric, v) in metrics {
                let text = match v {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                };
                wtr.write_record([section.as_str(), metric.as_str(), text.as_str()])?;
            }
        }
    }
    wtr.flush()?;
    Ok(())
}

fn write_category_analysis(records: &[ProductRecord], path: &Path) -> Result<()> {
    let mut by_category: BTreeMap<Category, Vec<&ProductRecord>> = BTreeMap::new();
    for r in records {
        by_category.entry(r.category).or_default().push(r);
    }

    let mut wtr = Writer::from_path(path)?;
    wtr.write_record([
        "category",
        "price_count",
        "price_mean",
        "price_min",
        "price_max",
        "thc_mean",
        "cbd_mean",
    ])?;
    for (category, rows) in by_category {
        let prices: Vec<f64> = rows.iter().filter_map(|r| r.price).collect();
        let thc: Vec<f64> = rows.iter().filter_map(|r| r.thc_numeric).collect();
        let cbd: Vec<f64> = rows.iter().filter_map(|r| r.cbd_numeric).collect();
        wtr.write_record([
            category.slug().to_string(),
            prices.len().to_string(),
            fmt_opt(stats::mean(&prices).map(stats::round2)),
            fmt_opt(stats::min(&prices)),
            fmt_opt(stats::max(&prices)),
            fmt_opt(stats::mean(&thc).map(stats::round2)),
            fmt_opt(stats::mean(&cbd).map(stats::round2)),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{self, tests::product};

    fn sample() -> Vec<ProductRecord> {
        let mut a = product(Category::Flower, Some(40.0), "Cresco");
        a.thc_numeric = Some(24.0);
        a.raw_text = "Blue Dream\nCresco\n$40".into();
        let mut b = product(Category::Edibles, Some(20.0), "Wana");
        b.stock_status = StockStatus::OutOfStock;
        let c = product(Category::Flower, None, "Cresco");
        vec![a, b, c]
    }

    fn read_rows(path: &Path) -> Vec<Vec<String>> {
        csv::Reader::from_path(path)
            .unwrap()
            .records()
            .map(|r| r.unwrap().iter().map(str::to_string).collect())
            .collect()
    }

    #[test]
    fn run_artifacts_written() {
        let dir = tempfile::tempdir().unwrap();
        let records = sample();
        let mut stats = ExtractionStats::start("green-leaf");
        stats.finalize(records.len());

        let paths = export_run(&records, &stats, dir.path(), "green-leaf").unwrap();
        assert!(paths.products_json.ends_with("green-leaf_products.json"));
        assert!(paths.stats_json.exists());

        let loaded = load_products(&paths.products_json).unwrap();
        assert_eq!(loaded, records);

        let rows = read_rows(&paths.products_csv);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0][0], "flower item");
        assert_eq!(rows[0][14], "Blue Dream\nCresco\n$40");
        // absent price is an empty cell, not zero
        assert_eq!(rows[2][9], "");
    }

    #[test]
    fn workbook_has_sheet_per_category() {
        let dir = tempfile::tempdir().unwrap();
        let wb = dir.path().join("wb");
        export_workbook(&sample(), &wb).unwrap();

        assert_eq!(read_rows(&wb.join("flower.csv")).len(), 2);
        assert_eq!(read_rows(&wb.join("edibles.csv")).len(), 1);
        assert!(!wb.join("tinctures.csv").exists());

        let summary = read_rows(&wb.join("summary.csv"));
        let get = |m: &str| summary.iter().find(|r| r[0] == m).unwrap()[1].clone();
        assert_eq!(get("Total Products"), "3");
        assert_eq!(get("Categories"), "2");
        assert_eq!(get("Average Price"), "30.00");
        assert_eq!(get("Out of Stock"), "1");
    }

    #[test]
    fn analysis_sheets() {
        let dir = tempfile::tempdir().unwrap();
        let records = sample();
        let result = analysis::analyze(&records);
        let json = export_analysis(&result, &records, dir.path(), "green-leaf").unwrap();
        assert!(json.exists());

        let sheets = dir.path().join("green-leaf_competitive_analysis");
        let summary = read_rows(&sheets.join("analysis_summary.csv"));
        assert!(summary
            .iter()
            .any(|r| r[0] == "executive_summary" && r[1] == "market_position" && r[2] == "Niche Player"));

        let cats = read_rows(&sheets.join("category_analysis.csv"));
        assert_eq!(cats[0], vec!["flower", "1", "40.00", "40.00", "40.00", "24.00", ""]);
    }

    #[test]
    fn load_rejects_non_product_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, "{\"not\": \"a list\"}").unwrap();
        assert!(load_products(&path).is_err());
    }
}
