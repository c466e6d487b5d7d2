//! Handlers for the sixteen pipeline stages, in run order.

mod competitors;
mod context;
mod images;
mod ingestion;
mod menu;
mod reviews;
mod sales;
mod strategy;
mod verification;

use std::sync::Arc;

use crate::error::AnalyzerError;
use crate::stage::StageHandler;

pub use competitors::{
    CompetitorAnalysisStage, CompetitorDiscoveryStage, CompetitorEnrichmentStage,
    CompetitorVerificationStage,
};
pub use context::ContextProcessingStage;
pub use images::{ImageAnalysisStage, VisualGapAnalysisStage};
pub use ingestion::{parse_sales_csv, DataIngestionStage, ParsedSales};
pub use menu::MenuExtractionStage;
pub use reviews::SentimentAnalysisStage;
pub use sales::{summarize_sales, SalesProcessingStage};
pub use strategy::{BcgClassificationStage, CampaignGenerationStage, SalesPredictionStage};
pub use verification::{StrategicVerificationStage, VerificationStage};

/// One handler per executable stage, ordered like `Stage::PIPELINE`.
pub fn default_handlers() -> Vec<Arc<dyn StageHandler>> {
    vec![
        Arc::new(DataIngestionStage),
        Arc::new(MenuExtractionStage),
        Arc::new(CompetitorDiscoveryStage),
        Arc::new(CompetitorEnrichmentStage),
        Arc::new(CompetitorVerificationStage),
        Arc::new(CompetitorAnalysisStage),
        Arc::new(SentimentAnalysisStage),
        Arc::new(ImageAnalysisStage),
        Arc::new(VisualGapAnalysisStage),
        Arc::new(ContextProcessingStage),
        Arc::new(SalesProcessingStage),
        Arc::new(BcgClassificationStage),
        Arc::new(SalesPredictionStage),
        Arc::new(CampaignGenerationStage),
        Arc::new(StrategicVerificationStage),
        Arc::new(VerificationStage),
    ]
}

/// A missing backend degrades a stage instead of failing it.
fn all_unavailable(errors: &[AnalyzerError]) -> bool {
    !errors.is_empty()
        && errors
            .iter()
            .all(|e| matches!(e, AnalyzerError::Unavailable(_)))
}

#[cfg(test)]
pub(crate) mod test_support {
    use insights_core::{AnalysisSession, RestaurantProfile, Stage, StageInputs};

    use crate::analyzers::Analyzers;
    use crate::config::PipelineConfig;
    use crate::error::StageError;
    use crate::stage::{StageContext, StageHandler};
    use crate::trace::ThoughtTraceRecorder;

    pub struct Harness {
        pub session: AnalysisSession,
        pub inputs: StageInputs,
        pub analyzers: Analyzers,
        pub config: PipelineConfig,
        pub recorder: ThoughtTraceRecorder,
    }

    impl Harness {
        pub fn new() -> Self {
            Self {
                session: AnalysisSession::new(RestaurantProfile::new("Test Kitchen")),
                inputs: StageInputs::default(),
                analyzers: Analyzers::default(),
                config: PipelineConfig::default(),
                recorder: ThoughtTraceRecorder::new(events::ProgressBroadcaster::new()),
            }
        }

        pub async fn run(&mut self, handler: &dyn StageHandler) -> Result<(), StageError> {
            let stage: Stage = handler.stage();
            let mut ctx = StageContext::new(
                stage,
                &mut self.session,
                &self.inputs,
                &self.analyzers,
                &self.config,
                &self.recorder,
            );
            handler.execute(&mut ctx).await
        }
    }
}
