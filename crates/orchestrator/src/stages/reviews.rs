use async_trait::async_trait;
use insights_core::Stage;

use crate::error::StageError;
use crate::stage::{Requirement, StageContext, StageHandler};

#[derive(Debug, Clone, Copy)]
pub struct SentimentAnalysisStage;

#[async_trait]
impl StageHandler for SentimentAnalysisStage {
    fn stage(&self) -> Stage {
        Stage::SentimentAnalysis
    }

    fn requirement(&self) -> Requirement {
        Requirement::Reviews
    }

    async fn execute(&self, ctx: &mut StageContext<'_>) -> Result<(), StageError> {
        let reviews: Vec<String> = ctx
            .inputs
            .reviews
            .iter()
            .filter(|r| !r.trim().is_empty())
            .cloned()
            .collect();
        let analyzer = ctx.analyzers.sentiment.clone();
        let report = analyzer
            .analyze(&reviews)
            .await
            .map_err(|e| StageError::analyzer("sentiment analyzer", e))?;

        let observations = vec![
            format!(
                "{} positive, {} negative, {} neutral",
                report.positive, report.negative, report.neutral
            ),
            format!("recurring themes: {}", report.themes.join(", ")),
        ];
        let reasoning = format!(
            "Scored {} reviews at overall polarity {:.2}",
            reviews.len(),
            report.score
        );
        let confidence = (reviews.len() as f64 / 20.0).min(1.0);
        ctx.session.data.sentiment = Some(report);
        ctx.think(reasoning, observations, vec![], confidence);
        Ok(())
    }
}
