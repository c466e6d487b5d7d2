use async_trait::async_trait;
use insights_core::{Quadrant, Stage};

use crate::error::StageError;
use crate::stage::{Requirement, StageContext, StageHandler};

#[derive(Debug, Clone, Copy)]
pub struct BcgClassificationStage;

#[async_trait]
impl StageHandler for BcgClassificationStage {
    fn stage(&self) -> Stage {
        Stage::BcgClassification
    }

    fn requirement(&self) -> Requirement {
        Requirement::MenuItems
    }

    async fn execute(&self, ctx: &mut StageContext<'_>) -> Result<(), StageError> {
        let classifier = ctx.analyzers.classifier.clone();
        let data = &ctx.session.data;
        let report = classifier
            .classify(data.menu_items(), data.sales_summary.as_ref())
            .await
            .map_err(|e| StageError::analyzer("classification engine", e))?;

        let observations = [Quadrant::Star, Quadrant::Plowhorse, Quadrant::Puzzle, Quadrant::Dog]
            .iter()
            .filter_map(|q| {
                let names: Vec<&str> = report.items_in(*q).map(|c| c.item_name.as_str()).collect();
                (!names.is_empty()).then(|| format!("{}: {}", q.as_str(), names.join(", ")))
            })
            .collect();
        let has_sales = ctx.session.data.sales_summary.is_some();
        let decisions = if has_sales {
            vec![]
        } else {
            vec!["classified on margin alone for lack of sales data".to_string()]
        };
        let reasoning = report.summary.clone();

        ctx.session.data.classification = Some(report);
        ctx.think(reasoning, observations, decisions, if has_sales { 0.85 } else { 0.5 });
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SalesPredictionStage;

#[async_trait]
impl StageHandler for SalesPredictionStage {
    fn stage(&self) -> Stage {
        Stage::SalesPrediction
    }

    fn requirement(&self) -> Requirement {
        Requirement::Classification
    }

    async fn execute(&self, ctx: &mut StageContext<'_>) -> Result<(), StageError> {
        let forecaster = ctx.analyzers.forecaster.clone();
        let horizon = ctx.config.forecast_horizon_days;
        let scenarios = ctx.config.scenarios.clone();
        let data = &ctx.session.data;
        let set = forecaster
            .predict(data.menu_items(), data.sales_summary.as_ref(), horizon, &scenarios)
            .await
            .map_err(|e| StageError::analyzer("forecaster", e))?;

        let has_sales = ctx.session.data.sales_summary.is_some();
        let observations = if has_sales {
            vec![]
        } else {
            vec!["no sales history, forecasts use a nominal daily rate".to_string()]
        };
        let reasoning = format!(
            "Projected {} items over {horizon} days under {} scenarios",
            ctx.session.data.menu_items().len(),
            scenarios.len()
        );

        ctx.session.data.predictions = Some(set);
        ctx.think(reasoning, observations, vec![], if has_sales { 0.7 } else { 0.3 });
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CampaignGenerationStage;

#[async_trait]
impl StageHandler for CampaignGenerationStage {
    fn stage(&self) -> Stage {
        Stage::CampaignGeneration
    }

    fn requirement(&self) -> Requirement {
        Requirement::Classification
    }

    async fn execute(&self, ctx: &mut StageContext<'_>) -> Result<(), StageError> {
        let generator = ctx.analyzers.campaign_generator.clone();
        let data = &ctx.session.data;
        let Some(classification) = data.classification.as_ref() else {
            return Err(StageError::MissingData("menu classification".to_string()));
        };
        let campaigns = generator
            .generate(classification, data.predictions.as_ref())
            .await
            .map_err(|e| StageError::analyzer("campaign generator", e))?;

        let decisions = campaigns
            .iter()
            .map(|c| format!("{} via {} for {}", c.title, c.channel, c.target_items.join(", ")))
            .collect();
        let reasoning = format!("Drafted {} campaigns", campaigns.len());

        ctx.session.data.campaigns = Some(campaigns);
        ctx.think(reasoning, vec![], decisions, 0.6);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::test_support::Harness;
    use insights_core::{MenuCatalog, MenuItem};

    fn harness_with_menu() -> Harness {
        let mut harness = Harness::new();
        harness.session.data.menu = Some(MenuCatalog {
            items: vec![
                MenuItem::new("Curry", 15.0).with_cost(5.0),
                MenuItem::new("Naan", 3.0).with_cost(1.0),
            ],
            confidence: 1.0,
            images_processed: 1,
            images_failed: 0,
        });
        harness
    }

    #[tokio::test]
    async fn test_strategy_chain_without_sales() {
        let mut harness = harness_with_menu();

        harness.run(&BcgClassificationStage).await.unwrap();
        harness.run(&SalesPredictionStage).await.unwrap();
        harness.run(&CampaignGenerationStage).await.unwrap();

        let data = &harness.session.data;
        assert_eq!(data.classification.as_ref().unwrap().classifications.len(), 2);
        // Two items, three default scenarios.
        assert_eq!(data.predictions.as_ref().unwrap().forecasts.len(), 6);
        assert!(!data.campaigns.as_ref().unwrap().is_empty());
        assert_eq!(harness.session.thought_traces.len(), 3);
    }

    #[tokio::test]
    async fn test_campaigns_need_classification() {
        let mut harness = harness_with_menu();
        let err = harness.run(&CampaignGenerationStage).await.unwrap_err();
        assert!(matches!(err, StageError::MissingData(_)));
    }
}
