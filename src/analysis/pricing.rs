use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::stats;
use crate::model::{Category, ProductRecord};

/// Price bucket relative to the run's own price quartiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PricingTier {
    Value,
    #[serde(rename = "Mid-Tier")]
    MidTier,
    Premium,
    Unclassified,
}

impl PricingTier {
    pub const ALL: [PricingTier; 4] = [
        PricingTier::Value,
        PricingTier::MidTier,
        PricingTier::Premium,
        PricingTier::Unclassified,
    ];

    pub const PRICED: [PricingTier; 3] =
        [PricingTier::Value, PricingTier::MidTier, PricingTier::Premium];

    pub fn as_str(self) -> &'static str {
        match self {
            PricingTier::Value => "Value",
            PricingTier::MidTier => "Mid-Tier",
            PricingTier::Premium => "Premium",
            PricingTier::Unclassified => "Unclassified",
        }
    }
}

impl fmt::Display for PricingTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Q1 / Q3 of the present prices.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierBounds {
    pub q1: f64,
    pub q3: f64,
}

impl TierBounds {
    pub fn from_records(records: &[ProductRecord]) -> Option<Self> {
        let prices = stats::sorted(records.iter().filter_map(|r| r.price).collect());
        Some(Self {
            q1: stats::quantile(&prices, 0.25)?,
            q3: stats::quantile(&prices, 0.75)?,
        })
    }

    pub fn tier(&self, price: Option<f64>) -> PricingTier {
        match price {
            None => PricingTier::Unclassified,
            Some(p) if p <= self.q1 => PricingTier::Value,
            Some(p) if p <= self.q3 => PricingTier::MidTier,
            Some(_) => PricingTier::Premium,
        }
    }
}

/// Tag each record, in order. With no prices at all everything is unclassified.
pub fn assign_tiers(records: &[ProductRecord]) -> Vec<PricingTier> {
    let bounds = TierBounds::from_records(records);
    records
        .iter()
        .map(|r| match &bounds {
            Some(b) => b.tier(r.price),
            None => PricingTier::Unclassified,
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PricingStrategy {
    #[serde(rename = "Premium Positioning")]
    Premium,
    #[serde(rename = "Value Positioning")]
    Value,
    #[serde(rename = "Balanced Positioning")]
    Balanced,
}

impl PricingStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            PricingStrategy::Premium => "Premium Positioning",
            PricingStrategy::Value => "Value Positioning",
            PricingStrategy::Balanced => "Balanced Positioning",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceStatistics {
    pub min_price: f64,
    pub max_price: f64,
    pub mean_price: f64,
    pub median_price: f64,
    /// Undefined for a single price.
    pub std_price: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierBreakdown {
    pub bounds: Option<TierBounds>,
    pub distribution: BTreeMap<PricingTier, usize>,
    /// Share of all records, unclassified included.
    pub percentages: BTreeMap<PricingTier, f64>,
}

impl TierBreakdown {
    pub fn percent(&self, tier: PricingTier) -> f64 {
        self.percentages.get(&tier).copied().unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryPricing {
    pub mean_price: Option<f64>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub product_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingAnalysis {
    /// `None` when no record carries a price.
    pub overall_statistics: Option<PriceStatistics>,
    pub pricing_tiers: TierBreakdown,
    pub category_pricing: BTreeMap<Category, CategoryPricing>,
    pub pricing_strategy: PricingStrategy,
}

pub fn analyze(records: &[ProductRecord], tiers: &[PricingTier]) -> PricingAnalysis {
    let prices = stats::sorted(records.iter().filter_map(|r| r.price).collect());
    let overall_statistics = price_statistics(&prices);

    let mut distribution: BTreeMap<PricingTier, usize> =
        PricingTier::ALL.iter().map(|&t| (t, 0)).collect();
    for &t in tiers {
        *distribution.entry(t).or_default() += 1;
    }
    let percentages = distribution
        .iter()
        .map(|(&t, &n)| (t, stats::percent(n, records.len())))
        .collect();
    let pricing_tiers = TierBreakdown {
        bounds: TierBounds::from_records(records),
        distribution,
        percentages,
    };

    let mut by_category: BTreeMap<Category, Vec<&ProductRecord>> = BTreeMap::new();
    for r in records {
        by_category.entry(r.category).or_default().push(r);
    }
    let category_pricing = by_category
        .into_iter()
        .map(|(c, rs)| {
            let p: Vec<f64> = rs.iter().filter_map(|r| r.price).collect();
            let summary = CategoryPricing {
                mean_price: stats::mean(&p),
                min_price: stats::min(&p),
                max_price: stats::max(&p),
                product_count: rs.len(),
            };
            (c, summary)
        })
        .collect();

    PricingAnalysis {
        overall_statistics,
        pricing_strategy: strategy(&pricing_tiers),
        pricing_tiers,
        category_pricing,
    }
}

fn price_statistics(sorted: &[f64]) -> Option<PriceStatistics> {
    Some(PriceStatistics {
        min_price: stats::min(sorted)?,
        max_price: stats::max(sorted)?,
        mean_price: stats::mean(sorted)?,
        median_price: stats::median(sorted)?,
        std_price: stats::std_dev(sorted),
    })
}

pub fn strategy(tiers: &TierBreakdown) -> PricingStrategy {
    if tiers.percent(PricingTier::Premium) > 40.0 {
        PricingStrategy::Premium
    } else if tiers.percent(PricingTier::Value) > 40.0 {
        PricingStrategy::Value
    } else {
        PricingStrategy::Balanced
    }
}
