//! The contract every pipeline stage implements.

use async_trait::async_trait;
use insights_core::{AnalysisSession, Stage, StageInputs, ThoughtTrace};

use crate::analyzers::Analyzers;
use crate::config::PipelineConfig;
use crate::error::StageError;
use crate::trace::ThoughtTraceRecorder;

/// Input a stage needs before it can run. Unmet requirements skip the stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    None,
    SalesCsv,
    MenuImages,
    Location,
    Competitors,
    CompetitorProfiles,
    Reviews,
    DishImages,
    ImageAnalysis,
    BusinessContext,
    SalesRecords,
    MenuItems,
    Classification,
    CompetitorAnalysis,
}

impl Requirement {
    pub fn is_satisfied(&self, session: &AnalysisSession, inputs: &StageInputs) -> bool {
        let data = &session.data;
        match self {
            Self::None => true,
            Self::SalesCsv => inputs.has_sales_csv(),
            Self::MenuImages => !inputs.menu_images.is_empty(),
            Self::Location => session
                .profile
                .location
                .as_deref()
                .is_some_and(|l| !l.trim().is_empty()),
            Self::Competitors => !data.competitors().is_empty(),
            Self::CompetitorProfiles => data
                .competitor_profiles
                .as_ref()
                .is_some_and(|p| !p.is_empty()),
            Self::Reviews => inputs.reviews.iter().any(|r| !r.trim().is_empty()),
            Self::DishImages => !inputs.dish_images.is_empty(),
            Self::ImageAnalysis => data
                .image_analysis
                .as_ref()
                .is_some_and(|r| !r.assessments.is_empty()),
            Self::BusinessContext => inputs.has_business_context(),
            Self::SalesRecords => !data.sales_records().is_empty(),
            Self::MenuItems => !data.menu_items().is_empty(),
            Self::Classification => data
                .classification
                .as_ref()
                .is_some_and(|c| !c.classifications.is_empty()),
            Self::CompetitorAnalysis => data.competitor_analysis.is_some(),
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            Self::None => "nothing",
            Self::SalesCsv => "a sales CSV",
            Self::MenuImages => "menu images",
            Self::Location => "a restaurant location",
            Self::Competitors => "discovered competitors",
            Self::CompetitorProfiles => "competitor profiles",
            Self::Reviews => "customer reviews",
            Self::DishImages => "dish images",
            Self::ImageAnalysis => "dish image assessments",
            Self::BusinessContext => "business context",
            Self::SalesRecords => "parsed sales records",
            Self::MenuItems => "menu items",
            Self::Classification => "a menu classification",
            Self::CompetitorAnalysis => "a competitor analysis",
        }
    }
}

/// Everything a handler may touch while it runs.
pub struct StageContext<'a> {
    pub session: &'a mut AnalysisSession,
    pub inputs: &'a StageInputs,
    pub analyzers: &'a Analyzers,
    pub config: &'a PipelineConfig,
    recorder: &'a ThoughtTraceRecorder,
    stage: Stage,
}

impl<'a> StageContext<'a> {
    pub fn new(
        stage: Stage,
        session: &'a mut AnalysisSession,
        inputs: &'a StageInputs,
        analyzers: &'a Analyzers,
        config: &'a PipelineConfig,
        recorder: &'a ThoughtTraceRecorder,
    ) -> Self {
        Self {
            session,
            inputs,
            analyzers,
            config,
            recorder,
            stage,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Records a trace under this stage's label.
    pub fn think(
        &mut self,
        reasoning: impl Into<String>,
        observations: Vec<String>,
        decisions: Vec<String>,
        confidence: f64,
    ) {
        let trace = ThoughtTrace::new(
            self.stage.label(),
            reasoning,
            observations,
            decisions,
            confidence,
        );
        self.recorder.record(self.session, self.stage, trace);
    }
}

/// One step of the pipeline.
///
/// Handlers may assume earlier stages ran or were skipped, never that later
/// ones did. Each must record at least one thought trace, even for an empty
/// outcome, and return `Err` only when its mandatory work fails.
#[async_trait]
pub trait StageHandler: Send + Sync {
    fn stage(&self) -> Stage;

    fn requirement(&self) -> Requirement;

    async fn execute(&self, ctx: &mut StageContext<'_>) -> Result<(), StageError>;
}
