use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::composition::{self, MenuComposition};
use super::pricing::{PricingTier, TierBreakdown};
use crate::model::{Category, ProductRecord};

/// Expected share of a typical menu, in percent.
const CATEGORY_BENCHMARKS: [(Category, f64); 6] = [
    (Category::Flower, 35.0),
    (Category::Edibles, 25.0),
    (Category::Vaporizers, 20.0),
    (Category::PreRolls, 15.0),
    (Category::Concentrates, 10.0),
    (Category::Tinctures, 5.0),
];

/// Every tier present on the menu must hold more than this share of it.
const BALANCED_TIER_SHARE: f64 = 15.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarketPosition {
    #[serde(rename = "Market Leader")]
    MarketLeader,
    #[serde(rename = "Strong Competitor")]
    StrongCompetitor,
    #[serde(rename = "Niche Player")]
    NichePlayer,
}

impl MarketPosition {
    pub fn from_total(total: usize) -> Self {
        if total > 300 {
            MarketPosition::MarketLeader
        } else if total > 150 {
            MarketPosition::StrongCompetitor
        } else {
            MarketPosition::NichePlayer
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MarketPosition::MarketLeader => "Market Leader",
            MarketPosition::StrongCompetitor => "Strong Competitor",
            MarketPosition::NichePlayer => "Niche Player",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Benchmark {
    Above,
    Below,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryPerformance {
    pub actual_percentage: f64,
    pub benchmark_percentage: f64,
    pub performance_vs_benchmark: Benchmark,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompetitivePositioning {
    pub market_position: MarketPosition,
    pub competitive_advantages: Vec<String>,
    pub category_performance: BTreeMap<Category, CategoryPerformance>,
    pub overall_strength_score: u32,
    pub strategic_recommendations: Vec<String>,
}

pub fn analyze(
    records: &[ProductRecord],
    menu: &MenuComposition,
    tiers: &TierBreakdown,
) -> CompetitivePositioning {
    let total = menu.total_products;

    let mut advantages = Vec::new();
    if total > 200 {
        advantages.push("Extensive product selection".to_string());
    }
    if menu.categories_covered() >= 5 {
        advantages.push("Comprehensive category coverage".to_string());
    }

    let category_performance = CATEGORY_BENCHMARKS
        .iter()
        .map(|&(category, benchmark)| {
            let actual = menu.category_percent(category);
            let perf = CategoryPerformance {
                actual_percentage: actual,
                benchmark_percentage: benchmark,
                performance_vs_benchmark: if actual > benchmark {
                    Benchmark::Above
                } else {
                    Benchmark::Below
                },
            };
            (category, perf)
        })
        .collect();

    CompetitivePositioning {
        market_position: MarketPosition::from_total(total),
        competitive_advantages: advantages,
        category_performance,
        overall_strength_score: strength_score(
            total,
            menu.categories_covered(),
            tiers,
            composition::distinct_brands(records),
        ),
        strategic_recommendations: recommendations(menu, tiers),
    }
}

/// Additive 0–100 score: breadth (30), category coverage (25), pricing
/// balance (25), brand diversity (20). An empty menu scores 0.
pub fn strength_score(
    total: usize,
    categories: usize,
    tiers: &TierBreakdown,
    brands: usize,
) -> u32 {
    if total == 0 {
        return 0;
    }

    let breadth = if total > 300 {
        30
    } else if total > 150 {
        20
    } else {
        10
    };

    let coverage = (categories as u32 * 4).min(25);

    // unclassified counts as a tier; absent tiers are skipped
    let balanced = tiers
        .distribution
        .iter()
        .filter(|&(_, &n)| n > 0)
        .all(|(&t, _)| tiers.percent(t) > BALANCED_TIER_SHARE);
    let pricing = if balanced { 25 } else { 15 };

    let diversity = (brands as u32 * 2).min(20);

    (breadth + coverage + pricing + diversity).min(100)
}

/// Rule list evaluated in a fixed order.
pub fn recommendations(menu: &MenuComposition, tiers: &TierBreakdown) -> Vec<String> {
    let rules: [(bool, &str); 4] = [
        (
            menu.category_percent(Category::Flower) < 30.0,
            "Consider expanding flower selection to match market demand",
        ),
        (
            menu.category_percent(Category::Edibles) < 20.0,
            "Opportunity to grow edibles category for higher margins",
        ),
        (
            tiers.percent(PricingTier::Premium) < 20.0,
            "Consider adding premium products to improve margins",
        ),
        (
            tiers.percent(PricingTier::Value) < 15.0,
            "Add value-tier products to capture price-sensitive customers",
        ),
    ];
    rules
        .into_iter()
        .filter(|(fires, _)| *fires)
        .map(|(_, text)| text.to_string())
        .collect()
}
