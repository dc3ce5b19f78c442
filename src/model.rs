use std::fmt;

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::scroll::ScrollEnd;

/// Menu sections a storefront partitions its catalog into.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    Flower,
    PreRolls,
    Vaporizers,
    Edibles,
    Concentrates,
    Tinctures,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Flower,
        Category::PreRolls,
        Category::Vaporizers,
        Category::Edibles,
        Category::Concentrates,
        Category::Tinctures,
    ];

    /// Path segment used in storefront URLs and export file names.
    pub fn slug(self) -> &'static str {
        match self {
            Category::Flower => "flower",
            Category::PreRolls => "pre-rolls",
            Category::Vaporizers => "vaporizers",
            Category::Edibles => "edibles",
            Category::Concentrates => "concentrates",
            Category::Tinctures => "tinctures",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StrainType {
    Sativa,
    Indica,
    Hybrid,
}

impl StrainType {
    /// Case-insensitive lookup; `"INDICA"` and `"indica"` both map to `Indica`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sativa" => Some(StrainType::Sativa),
            "indica" => Some(StrainType::Indica),
            "hybrid" => Some(StrainType::Hybrid),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StrainType::Sativa => "Sativa",
            StrainType::Indica => "Indica",
            StrainType::Hybrid => "Hybrid",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockStatus {
    #[default]
    InStock,
    OutOfStock,
}

impl StockStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            StockStatus::InStock => "in_stock",
            StockStatus::OutOfStock => "out_of_stock",
        }
    }
}

/// One catalog entry as captured from a storefront.
///
/// Numeric fields are `None` when the entry text carried no parseable
/// value; they are never defaulted to zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    #[serde(rename = "product_name")]
    pub name: String,
    pub category: Category,
    pub brand: Option<String>,
    pub strain_type: Option<StrainType>,
    pub thc_percent: Option<String>,
    pub thc_numeric: Option<f64>,
    pub cbd_percent: Option<String>,
    pub cbd_numeric: Option<f64>,
    pub size_weight: Option<String>,
    pub price: Option<f64>,
    pub price_raw: Option<String>,
    pub stock_status: StockStatus,
    pub product_url: Option<String>,
    pub date_captured_utc: DateTime<Utc>,
    pub raw_text: String,
}

/// Per-category outcome of one run, in processing order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryReport {
    pub category: Category,
    pub entries_found: usize,
    pub extracted: usize,
    pub failed: usize,
    pub duplicates: usize,
    pub filtered_out: usize,
    pub kept: usize,
    pub scroll_outcome: Option<ScrollEnd>,
    pub error: Option<String>,
}

impl CategoryReport {
    pub fn new(category: Category) -> Self {
        Self {
            category,
            entries_found: 0,
            extracted: 0,
            failed: 0,
            duplicates: 0,
            filtered_out: 0,
            kept: 0,
            scroll_outcome: None,
            error: None,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Counters for a single extraction run. Owned by the orchestrator for the
/// lifetime of the run and never shared between runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionStats {
    pub dispensary: String,
    pub total_products: usize,
    pub successful_extractions: usize,
    pub failed_extractions: usize,
    pub duplicates_skipped: usize,
    pub filtered_out: usize,
    pub categories_processed: usize,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_seconds: Option<f64>,
    pub categories: Vec<CategoryReport>,
}

impl ExtractionStats {
    pub fn start(dispensary: &str) -> Self {
        Self {
            dispensary: dispensary.to_string(),
            total_products: 0,
            successful_extractions: 0,
            failed_extractions: 0,
            duplicates_skipped: 0,
            filtered_out: 0,
            categories_processed: 0,
            start_time: Utc::now(),
            end_time: None,
            duration_seconds: None,
            categories: Vec::new(),
        }
    }

    /// Stamp the end instant and compute the duration. Called exactly once,
    /// on success and failure alike.
    pub fn finalize(&mut self, total_products: usize) {
        let end = Utc::now();
        self.total_products = total_products;
        self.end_time = Some(end);
        self.duration_seconds = Some((end - self.start_time).num_milliseconds() as f64 / 1000.0);
    }

    pub fn failed_categories(&self) -> impl Iterator<Item = &CategoryReport> {
        self.categories.iter().filter(|c| !c.succeeded())
    }
}
