pub mod fields;

use chrono::{DateTime, Utc};

use crate::browser::CatalogEntry;
use crate::error::ExtractionEntryError;
use crate::model::{Category, ProductRecord, StockStatus, StrainType};

/// Everything read off one catalog entry. Category is not known here; the
/// orchestrator attaches it via [`ParsedEntry::into_record`].
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedEntry {
    pub name: String,
    pub brand: Option<String>,
    pub strain_type: Option<StrainType>,
    pub thc: Option<fields::Potency>,
    pub cbd: Option<fields::Potency>,
    pub size_weight: Option<String>,
    pub price: Option<fields::Price>,
    pub stock_status: StockStatus,
    pub product_url: Option<String>,
    pub captured_at: DateTime<Utc>,
    pub raw_text: String,
}

impl ParsedEntry {
    pub fn into_record(self, category: Category) -> ProductRecord {
        let (thc_percent, thc_numeric) = split_potency(self.thc);
        let (cbd_percent, cbd_numeric) = split_potency(self.cbd);
        let (price, price_raw) = match self.price {
            Some(p) => (Some(p.value), Some(p.raw)),
            None => (None, None),
        };
        ProductRecord {
            name: self.name,
            category,
            brand: self.brand,
            strain_type: self.strain_type,
            thc_percent,
            thc_numeric,
            cbd_percent,
            cbd_numeric,
            size_weight: self.size_weight,
            price,
            price_raw,
            stock_status: self.stock_status,
            product_url: self.product_url,
            date_captured_utc: self.captured_at,
            raw_text: self.raw_text,
        }
    }
}

fn split_potency(p: Option<fields::Potency>) -> (Option<String>, Option<f64>) {
    match p {
        Some(p) => (Some(p.percent), Some(p.value)),
        None => (None, None),
    }
}

/// Read one live entry and parse it.
pub fn extract_entry(entry: &dyn CatalogEntry) -> Result<ParsedEntry, ExtractionEntryError> {
    let text = entry.text()?;
    let link = entry.link()?;
    parse_text(&text, link)
}

/// Parse an entry's rendered text. Only a blank block is rejected; any other
/// missing field is simply left empty.
pub fn parse_text(text: &str, link: Option<String>) -> Result<ParsedEntry, ExtractionEntryError> {
    let name = fields::name(text).ok_or(ExtractionEntryError::Blank)?;

    Ok(ParsedEntry {
        name,
        brand: fields::brand(text),
        strain_type: fields::strain(text),
        thc: fields::thc(text),
        cbd: fields::cbd(text),
        size_weight: fields::size(text),
        price: fields::price(text),
        stock_status: fields::stock_status(text),
        product_url: link.filter(|l| !l.is_empty()),
        captured_at: Utc::now(),
        raw_text: text.to_string(),
    })
}

// ── Tests ──
