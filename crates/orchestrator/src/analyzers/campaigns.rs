use async_trait::async_trait;
use insights_core::{Campaign, ClassificationReport, PredictionSet, Quadrant};

use super::{AnalyzerResult, CampaignGenerator};
use crate::error::AnalyzerError;

/// One campaign per non-empty quadrant, built from fixed templates.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateCampaignGenerator;

struct Template {
    quadrant: Quadrant,
    title: &'static str,
    channel: &'static str,
    pitch: &'static str,
}

const TEMPLATES: [Template; 4] = [
    Template {
        quadrant: Quadrant::Star,
        title: "Signature spotlight",
        channel: "social_media",
        pitch: "Feature these house favourites prominently and keep quality consistent",
    },
    Template {
        quadrant: Quadrant::Plowhorse,
        title: "Value bundle",
        channel: "in_store",
        pitch: "Pair these crowd pleasers with high-margin sides to lift the ticket",
    },
    Template {
        quadrant: Quadrant::Puzzle,
        title: "Hidden gems",
        channel: "email",
        pitch: "Promote these profitable dishes with tastings and server recommendations",
    },
    Template {
        quadrant: Quadrant::Dog,
        title: "Menu refresh",
        channel: "internal",
        pitch: "Rework, reprice or retire these dishes",
    },
];

impl TemplateCampaignGenerator {
    pub fn build(
        &self,
        classification: &ClassificationReport,
        predictions: Option<&PredictionSet>,
    ) -> AnalyzerResult<Vec<Campaign>> {
        if classification.classifications.is_empty() {
            return Err(AnalyzerError::InvalidInput(
                "classification has no items".to_string(),
            ));
        }

        let expected = |name: &str| -> f64 {
            predictions
                .map(|p| {
                    p.forecasts
                        .iter()
                        .filter(|f| f.item_name == name)
                        .map(|f| f.expected_units)
                        .fold(0.0, f64::max)
                })
                .unwrap_or(0.0)
        };

        let mut campaigns = Vec::new();
        for template in &TEMPLATES {
            let mut targets: Vec<&str> = classification
                .items_in(template.quadrant)
                .map(|c| c.item_name.as_str())
                .collect();
            if targets.is_empty() {
                continue;
            }
            targets.sort_by(|a, b| expected(b).total_cmp(&expected(a)));

            campaigns.push(Campaign {
                title: template.title.to_string(),
                quadrant: Some(template.quadrant),
                target_items: targets.iter().map(|t| t.to_string()).collect(),
                channel: template.channel.to_string(),
                message: format!("{}: {}", template.pitch, targets.join(", ")),
            });
        }
        Ok(campaigns)
    }
}

#[async_trait]
impl CampaignGenerator for TemplateCampaignGenerator {
    async fn generate(
        &self,
        classification: &ClassificationReport,
        predictions: Option<&PredictionSet>,
    ) -> AnalyzerResult<Vec<Campaign>> {
        self.build(classification, predictions)
    }
}
