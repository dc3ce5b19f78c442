//! Competitive-intelligence analysis over a finished record set.
//!
//! Everything here is a pure function of the records: no I/O, no clock other
//! than the metadata timestamp. Empty input yields zeros and `None`s.

pub mod compare;
pub mod composition;
pub mod positioning;
pub mod potency;
pub mod pricing;
pub mod stats;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::model::ProductRecord;
use composition::MenuComposition;
use positioning::{CompetitivePositioning, MarketPosition};
use potency::PotencyAnalysis;
use pricing::PricingAnalysis;

pub const ANALYSIS_VERSION: &str = "1.0";
const SUMMARY_RECOMMENDATIONS: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutiveSummary {
    pub total_products: usize,
    pub categories_covered: usize,
    pub market_position: MarketPosition,
    pub strength_score: u32,
    pub key_advantages: Vec<String>,
    pub top_recommendations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisMetadata {
    pub generated_at: DateTime<Utc>,
    pub data_points: usize,
    pub analysis_version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub executive_summary: ExecutiveSummary,
    pub menu_composition: MenuComposition,
    pub pricing_analysis: PricingAnalysis,
    pub potency_analysis: PotencyAnalysis,
    pub competitive_positioning: CompetitivePositioning,
    pub analysis_metadata: AnalysisMetadata,
}

pub fn analyze(records: &[ProductRecord]) -> AnalysisResult {
    let tiers = pricing::assign_tiers(records);

    let menu = composition::analyze(records);
    let pricing = pricing::analyze(records, &tiers);
    let potency = potency::analyze(records);
    let positioning = positioning::analyze(records, &menu, &pricing.pricing_tiers);

    let executive_summary = ExecutiveSummary {
        total_products: menu.total_products,
        categories_covered: menu.categories_covered(),
        market_position: positioning.market_position,
        strength_score: positioning.overall_strength_score,
        key_advantages: positioning.competitive_advantages.clone(),
        top_recommendations: positioning
            .strategic_recommendations
            .iter()
            .take(SUMMARY_RECOMMENDATIONS)
            .cloned()
            .collect(),
    };
    info!(
        "Analysis complete: {} products, {} ({}/100)",
        executive_summary.total_products,
        executive_summary.market_position.as_str(),
        executive_summary.strength_score
    );

    AnalysisResult {
        executive_summary,
        menu_composition: menu,
        pricing_analysis: pricing,
        potency_analysis: potency,
        competitive_positioning: positioning,
        analysis_metadata: AnalysisMetadata {
            generated_at: Utc::now(),
            data_points: records.len(),
            analysis_version: ANALYSIS_VERSION.to_string(),
        },
    }
}
