use async_trait::async_trait;
use insights_core::{ImageAnalysisReport, Stage, VisualGap, VisualGapReport};
use tracing::warn;

use super::all_unavailable;
use crate::error::StageError;
use crate::stage::{Requirement, StageContext, StageHandler};

#[derive(Debug, Clone, Copy)]
pub struct ImageAnalysisStage;

#[async_trait]
impl StageHandler for ImageAnalysisStage {
    fn stage(&self) -> Stage {
        Stage::ImageAnalysis
    }

    fn requirement(&self) -> Requirement {
        Requirement::DishImages
    }

    async fn execute(&self, ctx: &mut StageContext<'_>) -> Result<(), StageError> {
        let analyzer = ctx.analyzers.image_analyzer.clone();
        let mut assessments = Vec::new();
        let mut errors = Vec::new();
        let mut observations = Vec::new();

        for image in &ctx.inputs.dish_images {
            match analyzer.analyze(image).await {
                Ok(assessment) => {
                    observations.push(format!(
                        "{}: appeal {:.2}",
                        assessment.dish_name, assessment.appeal_score
                    ));
                    assessments.push(assessment);
                }
                Err(e) => {
                    warn!(session_id = %ctx.session.id, dish = %image.dish_name, error = %e, "Dish image analysis failed");
                    observations.push(format!("{}: {e}", image.dish_name));
                    errors.push(e);
                }
            }
        }

        if assessments.is_empty() && !all_unavailable(&errors) {
            ctx.think("No dish image could be assessed", observations, vec![], 0.0);
            let source = errors.pop().unwrap_or_else(|| {
                crate::error::AnalyzerError::InvalidInput("no dish images".to_string())
            });
            return Err(StageError::analyzer("image analyzer", source));
        }

        let total = assessments.len() + errors.len();
        let confidence = assessments.len() as f64 / total.max(1) as f64;
        let reasoning = format!("Assessed {} of {total} dish photos", assessments.len());
        ctx.session.data.image_analysis = Some(ImageAnalysisReport {
            assessments,
            images_failed: errors.len(),
        });
        ctx.think(reasoning, observations, vec![], confidence);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct VisualGapAnalysisStage;

#[async_trait]
impl StageHandler for VisualGapAnalysisStage {
    fn stage(&self) -> Stage {
        Stage::VisualGapAnalysis
    }

    fn requirement(&self) -> Requirement {
        Requirement::ImageAnalysis
    }

    async fn execute(&self, ctx: &mut StageContext<'_>) -> Result<(), StageError> {
        let threshold = ctx.config.visual_gap_threshold;
        let assessments = ctx
            .session
            .data
            .image_analysis
            .as_ref()
            .map(|r| r.assessments.as_slice())
            .unwrap_or_default();

        let mut gaps: Vec<VisualGap> = assessments
            .iter()
            .filter(|a| a.appeal_score < threshold)
            .map(|a| VisualGap {
                dish_name: a.dish_name.clone(),
                appeal_score: a.appeal_score,
                recommendation: format!(
                    "Reshoot {} with better lighting and plating (appeal {:.2}, target {:.2})",
                    a.dish_name, a.appeal_score, threshold
                ),
            })
            .collect();
        gaps.sort_by(|a, b| a.appeal_score.total_cmp(&b.appeal_score));

        let reasoning = format!(
            "{} of {} dishes fall below the {:.2} appeal target",
            gaps.len(),
            assessments.len(),
            threshold
        );
        let decisions = gaps.iter().map(|g| g.recommendation.clone()).collect();
        ctx.session.data.visual_gaps = Some(VisualGapReport { threshold, gaps });
        ctx.think(reasoning, vec![], decisions, 0.7);
        Ok(())
    }
}
