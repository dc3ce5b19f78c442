use std::collections::BTreeMap;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::ExecutiveSummary;
use crate::model::ProductRecord;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparativeMetrics {
    pub product_counts: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketLeaders {
    pub most_products: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonReport {
    pub dispensary_count: usize,
    pub dispensary_summaries: BTreeMap<String, ExecutiveSummary>,
    pub comparative_metrics: ComparativeMetrics,
    pub market_leaders: MarketLeaders,
}

/// Analyze each dispensary independently and line the summaries up.
/// Keys are dispensary names, so output order does not depend on scheduling.
pub fn compare(dispensaries: &BTreeMap<String, Vec<ProductRecord>>) -> ComparisonReport {
    info!("Comparing {} dispensaries", dispensaries.len());

    let dispensary_summaries: BTreeMap<String, ExecutiveSummary> = dispensaries
        .par_iter()
        .map(|(name, records)| (name.clone(), super::analyze(records).executive_summary))
        .collect::<Vec<_>>()
        .into_iter()
        .collect();

    let product_counts: BTreeMap<String, usize> = dispensaries
        .iter()
        .map(|(name, records)| (name.clone(), records.len()))
        .collect();

    // earliest name wins a tie
    let most_products = product_counts
        .iter()
        .fold(None, |best: Option<(&String, usize)>, (name, &n)| match best {
            Some((_, m)) if m >= n => best,
            _ => Some((name, n)),
        })
        .map(|(name, _)| name.clone());

    ComparisonReport {
        dispensary_count: dispensaries.len(),
        dispensary_summaries,
        comparative_metrics: ComparativeMetrics { product_counts },
        market_leaders: MarketLeaders { most_products },
    }
}
