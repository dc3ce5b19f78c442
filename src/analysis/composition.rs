use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use super::stats::percent;
use crate::model::{Category, ProductRecord};

const TOP_BRANDS: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryDistribution {
    pub counts: BTreeMap<Category, usize>,
    pub percentages: BTreeMap<Category, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrandCount {
    pub brand: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MenuComposition {
    pub total_products: usize,
    pub category_distribution: CategoryDistribution,
    /// Most frequent brands, count descending then name ascending.
    pub top_brands: Vec<BrandCount>,
    /// Flower only.
    pub strain_distribution: BTreeMap<String, usize>,
    pub largest_category: Option<Category>,
    pub category_diversity_score: f64,
}

impl MenuComposition {
    pub fn category_percent(&self, category: Category) -> f64 {
        self.category_distribution
            .percentages
            .get(&category)
            .copied()
            .unwrap_or(0.0)
    }

    pub fn categories_covered(&self) -> usize {
        self.category_distribution.counts.len()
    }
}

pub fn analyze(records: &[ProductRecord]) -> MenuComposition {
    let total = records.len();

    let mut counts: BTreeMap<Category, usize> = BTreeMap::new();
    for r in records {
        *counts.entry(r.category).or_default() += 1;
    }
    let percentages = counts
        .iter()
        .map(|(&c, &n)| (c, percent(n, total)))
        .collect();

    // first in menu order wins a tie
    let largest_category = counts
        .iter()
        .fold(None, |best: Option<(Category, usize)>, (&c, &n)| match best {
            Some((_, m)) if m >= n => best,
            _ => Some((c, n)),
        })
        .map(|(c, _)| c);

    let mut strain_distribution = BTreeMap::new();
    for r in records.iter().filter(|r| r.category == Category::Flower) {
        if let Some(s) = r.strain_type {
            *strain_distribution.entry(s.as_str().to_string()).or_default() += 1;
        }
    }

    let category_diversity_score =
        counts.len() as f64 / Category::ALL.len() as f64 * 100.0;

    MenuComposition {
        total_products: total,
        category_distribution: CategoryDistribution {
            counts,
            percentages,
        },
        top_brands: top_brands(records, TOP_BRANDS),
        strain_distribution,
        largest_category,
        category_diversity_score,
    }
}

fn top_brands(records: &[ProductRecord], n: usize) -> Vec<BrandCount> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for brand in records.iter().filter_map(|r| r.brand.as_deref()) {
        *counts.entry(brand).or_default() += 1;
    }
    let mut brands: Vec<BrandCount> = counts
        .into_iter()
        .map(|(brand, count)| BrandCount {
            brand: brand.to_string(),
            count,
        })
        .collect();
    brands.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.brand.cmp(&b.brand)));
    brands.truncate(n);
    brands
}

pub fn distinct_brands(records: &[ProductRecord]) -> usize {
    records
        .iter()
        .filter_map(|r| r.brand.as_deref())
        .collect::<HashSet<_>>()
        .len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::tests::product;
    use crate::model::StrainType;

    #[test]
    fn distribution_and_largest() {
        let mut records = vec![
            product(Category::Edibles, Some(10.0), "A"),
            product(Category::Flower, Some(10.0), "A"),
            product(Category::Edibles, Some(10.0), "B"),
        ];
        records[1].strain_type = Some(StrainType::Indica);
        let c = analyze(&records);
        assert_eq!(c.total_products, 3);
        assert_eq!(c.category_distribution.counts[&Category::Edibles], 2);
        assert_eq!(c.category_percent(Category::Edibles), 66.7);
        assert_eq!(c.category_percent(Category::Tinctures), 0.0);
        assert_eq!(c.largest_category, Some(Category::Edibles));
        assert_eq!(c.strain_distribution.get("Indica"), Some(&1));
        assert!((c.category_diversity_score - 33.333).abs() < 0.01);
    }

    #[test]
    fn tie_goes_to_menu_order() {
        let records = vec![
            product(Category::Vaporizers, None, "A"),
            product(Category::Flower, None, "A"),
        ];
        assert_eq!(analyze(&records).largest_category, Some(Category::Flower));
    }

    #[test]
    fn top_brands_capped_and_ordered() {
        let mut records = Vec::new();
        for i in 0..12 {
            for _ in 0..=i {
                records.push(product(Category::Flower, None, &format!("Brand {:02}", i)));
            }
        }
        let c = analyze(&records);
        assert_eq!(c.top_brands.len(), 10);
        assert_eq!(c.top_brands[0].brand, "Brand 11");
        assert_eq!(c.top_brands[0].count, 12);
        assert_eq!(distinct_brands(&records), 12);
    }

    #[test]
    fn empty_set() {
        let c = analyze(&[]);
        assert_eq!(c.total_products, 0);
        assert_eq!(c.largest_category, None);
        assert_eq!(c.category_diversity_score, 0.0);
        assert!(c.top_brands.is_empty());
    }
}
