//! Field matchers over a catalog entry's rendered text. Each matcher is
//! case-insensitive, takes the first match, and is independent of the rest.

use std::sync::LazyLock;

use regex::Regex;

use crate::model::{StockStatus, StrainType};

static STRAIN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(sativa|indica|hybrid)\b").unwrap());
static THC_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)THC:\s*(\d+(?:\.\d*)?)\s*%").unwrap());
static CBD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)CBD:\s*(\d+(?:\.\d*)?)\s*%").unwrap());
static PRICE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\s*(\d+(?:,\d{3})*(?:\.\d+)?)").unwrap());
static SIZE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d+(?:\.\d+)?\s*(?:mg|g|oz))").unwrap());

const OUT_OF_STOCK_MARKERS: &[&str] = &["out of stock", "sold out"];

/// A potency reading kept both as printed and as a number.
#[derive(Debug, Clone, PartialEq)]
pub struct Potency {
    pub percent: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Price {
    pub value: f64,
    pub raw: String,
}

/// Non-empty, trimmed lines in display order.
fn lines(text: &str) -> impl Iterator<Item = &str> {
    text.lines().map(str::trim).filter(|l| !l.is_empty())
}

pub fn name(text: &str) -> Option<String> {
    lines(text).next().map(str::to_string)
}

pub fn brand(text: &str) -> Option<String> {
    lines(text).nth(1).map(str::to_string)
}

pub fn strain(text: &str) -> Option<StrainType> {
    STRAIN_RE
        .captures(text)
        .and_then(|c| StrainType::parse(&c[1]))
}

pub fn thc(text: &str) -> Option<Potency> {
    potency(&THC_RE, text)
}

pub fn cbd(text: &str) -> Option<Potency> {
    potency(&CBD_RE, text)
}

/// Readings outside 0–100 are treated as absent rather than clamped.
fn potency(re: &Regex, text: &str) -> Option<Potency> {
    let caps = re.captures(text)?;
    let number = &caps[1];
    let value: f64 = number.parse().ok()?;
    if !(0.0..=100.0).contains(&value) {
        return None;
    }
    Some(Potency {
        percent: format!("{}%", number),
        value,
    })
}

pub fn price(text: &str) -> Option<Price> {
    let caps = PRICE_RE.captures(text)?;
    let value: f64 = caps[1].replace(',', "").parse().ok()?;
    Some(Price {
        value,
        raw: caps[0].to_string(),
    })
}

pub fn size(text: &str) -> Option<String> {
    SIZE_RE.captures(text).map(|c| c[1].to_string())
}

pub fn stock_status(text: &str) -> StockStatus {
    let lower = text.to_lowercase();
    if OUT_OF_STOCK_MARKERS.iter().any(|m| lower.contains(m)) {
        StockStatus::OutOfStock
    } else {
        StockStatus::InStock
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_and_brand_skip_blank_lines() {
        let text = "\n  Blue Dream \n\nCresco\nHybrid";
        assert_eq!(name(text).as_deref(), Some("Blue Dream"));
        assert_eq!(brand(text).as_deref(), Some("Cresco"));
    }

    #[test]
    fn brand_absent_on_single_line() {
        assert_eq!(brand("Blue Dream"), None);
    }

    #[test]
    fn strain_is_whole_word() {
        assert_eq!(strain("INDICA dominant"), Some(StrainType::Indica));
        assert_eq!(strain("Hybridized genetics"), None);
        assert_eq!(strain("sativa / indica"), Some(StrainType::Sativa));
    }

    #[test]
    fn thc_keeps_printed_and_numeric() {
        let p = thc("thc: 24.3%").unwrap();
        assert_eq!(p.percent, "24.3%");
        assert_eq!(p.value, 24.3);
    }

    #[test]
    fn potency_over_hundred_is_absent() {
        assert_eq!(thc("THC: 240%"), None);
    }

    #[test]
    fn thc_requires_percent() {
        assert_eq!(thc("THC: 100mg"), None);
    }

    #[test]
    fn price_handles_thousands_separator() {
        let p = price("now $1,050.00 was $1,200").unwrap();
        assert_eq!(p.value, 1050.0);
        assert_eq!(p.raw, "$1,050.00");
    }

    #[test]
    fn size_units() {
        assert_eq!(size("3.5g jar").as_deref(), Some("3.5g"));
        assert_eq!(size("100 mg total").as_deref(), Some("100 mg"));
        assert_eq!(size("1oz").as_deref(), Some("1oz"));
        // unit may run into the next word
        assert_eq!(size("3.5 grams").as_deref(), Some("3.5 g"));
        assert_eq!(size("100mgTHC").as_deref(), Some("100mg"));
    }

    #[test]
    fn stock_markers() {
        assert_eq!(stock_status("SOLD OUT"), StockStatus::OutOfStock);
        assert_eq!(stock_status("Currently out of stock"), StockStatus::OutOfStock);
        assert_eq!(stock_status("Add to cart"), StockStatus::InStock);
    }
}
