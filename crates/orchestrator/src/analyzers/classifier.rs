use async_trait::async_trait;
use insights_core::{ClassificationReport, ItemClassification, MenuItem, Quadrant, SalesSummary};

use super::{AnalyzerResult, ClassificationEngine};
use crate::error::AnalyzerError;

/// Kasavana-Smith menu engineering.
///
/// An item is popular when its share of units sold reaches `popularity_factor`
/// of the fair share (`1 / n`). It is profitable when its contribution margin
/// reaches the sales-weighted average margin. Without sales every item gets the
/// fair share, so only margin separates the quadrants.
#[derive(Debug, Clone, Copy)]
pub struct MenuEngineeringClassifier {
    pub popularity_factor: f64,
}

impl Default for MenuEngineeringClassifier {
    fn default() -> Self {
        Self {
            popularity_factor: 0.7,
        }
    }
}

impl MenuEngineeringClassifier {
    pub fn classify_items(
        &self,
        items: &[MenuItem],
        sales: Option<&SalesSummary>,
    ) -> AnalyzerResult<ClassificationReport> {
        if items.is_empty() {
            return Err(AnalyzerError::InvalidInput(
                "cannot classify an empty menu".to_string(),
            ));
        }

        let units: Vec<f64> = items
            .iter()
            .map(|item| {
                sales
                    .and_then(|s| s.item(&item.name))
                    .map(|s| s.units as f64)
                    .unwrap_or(0.0)
            })
            .collect();
        let total_units: f64 = units.iter().sum();
        let count = items.len() as f64;

        let shares: Vec<f64> = if total_units > 0.0 {
            units.iter().map(|u| u / total_units).collect()
        } else {
            vec![1.0 / count; items.len()]
        };

        let average_margin = if total_units > 0.0 {
            items
                .iter()
                .zip(&units)
                .map(|(item, u)| item.margin() * u)
                .sum::<f64>()
                / total_units
        } else {
            items.iter().map(MenuItem::margin).sum::<f64>() / count
        };

        let popularity_threshold = self.popularity_factor / count;

        let classifications: Vec<ItemClassification> = items
            .iter()
            .zip(shares)
            .map(|(item, share)| {
                let margin = item.margin();
                ItemClassification {
                    item_name: item.name.clone(),
                    quadrant: Quadrant::from_scores(
                        share >= popularity_threshold,
                        margin >= average_margin,
                    ),
                    popularity: share,
                    margin,
                }
            })
            .collect();

        let count_of = |q: Quadrant| classifications.iter().filter(|c| c.quadrant == q).count();
        let mut summary = format!(
            "{} stars, {} plowhorses, {} puzzles, {} dogs (average margin {:.2})",
            count_of(Quadrant::Star),
            count_of(Quadrant::Plowhorse),
            count_of(Quadrant::Puzzle),
            count_of(Quadrant::Dog),
            average_margin
        );
        if total_units <= 0.0 {
            summary.push_str("; no sales history, popularity assumed equal");
        }

        Ok(ClassificationReport {
            classifications,
            summary,
        })
    }
}

#[async_trait]
impl ClassificationEngine for MenuEngineeringClassifier {
    async fn classify(
        &self,
        items: &[MenuItem],
        sales: Option<&SalesSummary>,
    ) -> AnalyzerResult<ClassificationReport> {
        self.classify_items(items, sales)
    }
}
