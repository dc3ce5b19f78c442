use serde::{Deserialize, Serialize};

use super::stats;
use crate::model::ProductRecord;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThcStatistics {
    pub min_thc: f64,
    pub max_thc: f64,
    pub mean_thc: f64,
    pub median_thc: f64,
    pub products_with_thc: usize,
}

/// Upper bounds are inclusive: 15.0 is low, 25.0 is medium.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThcRanges {
    pub low_thc_0_15: usize,
    pub medium_thc_15_25: usize,
    pub high_thc_25_plus: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CbdStatistics {
    pub min_cbd: f64,
    pub max_cbd: f64,
    pub mean_cbd: f64,
    /// Products with a CBD reading above zero.
    pub products_with_cbd: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PotencyAnalysis {
    pub thc_analysis: Option<ThcStatistics>,
    pub thc_ranges: Option<ThcRanges>,
    pub cbd_analysis: Option<CbdStatistics>,
}

pub fn analyze(records: &[ProductRecord]) -> PotencyAnalysis {
    let thc = stats::sorted(records.iter().filter_map(|r| r.thc_numeric).collect());
    let cbd: Vec<f64> = records.iter().filter_map(|r| r.cbd_numeric).collect();

    PotencyAnalysis {
        thc_analysis: thc_statistics(&thc),
        thc_ranges: (!thc.is_empty()).then(|| thc_ranges(&thc)),
        cbd_analysis: cbd_statistics(&cbd),
    }
}

fn thc_statistics(sorted: &[f64]) -> Option<ThcStatistics> {
    Some(ThcStatistics {
        min_thc: stats::min(sorted)?,
        max_thc: stats::max(sorted)?,
        mean_thc: stats::mean(sorted)?,
        median_thc: stats::median(sorted)?,
        products_with_thc: sorted.len(),
    })
}

fn thc_ranges(values: &[f64]) -> ThcRanges {
    let mut ranges = ThcRanges {
        low_thc_0_15: 0,
        medium_thc_15_25: 0,
        high_thc_25_plus: 0,
    };
    for &v in values {
        if v <= 15.0 {
            ranges.low_thc_0_15 += 1;
        } else if v <= 25.0 {
            ranges.medium_thc_15_25 += 1;
        } else {
            ranges.high_thc_25_plus += 1;
        }
    }
    ranges
}

fn cbd_statistics(values: &[f64]) -> Option<CbdStatistics> {
    Some(CbdStatistics {
        min_cbd: stats::min(values)?,
        max_cbd: stats::max(values)?,
        mean_cbd: stats::mean(values)?,
        products_with_cbd: values.iter().filter(|&&v| v > 0.0).count(),
    })
}
