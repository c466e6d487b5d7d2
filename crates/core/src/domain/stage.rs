use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

use crate::error::CoreError;

/// Pipeline stage with a fixed total order.
///
/// `Initialized` precedes every executable stage; `Completed` and `Failed`
/// are terminal markers and never executed.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Default, ToSchema,
)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    #[default]
    Initialized,
    DataIngestion,
    MenuExtraction,
    CompetitorDiscovery,
    CompetitorEnrichment,
    CompetitorVerification,
    CompetitorAnalysis,
    SentimentAnalysis,
    ImageAnalysis,
    VisualGapAnalysis,
    ContextProcessing,
    SalesProcessing,
    BcgClassification,
    SalesPrediction,
    CampaignGeneration,
    StrategicVerification,
    Verification,
    Completed,
    Failed,
}

impl Stage {
    /// Executable stages in run order.
    pub const PIPELINE: [Stage; 16] = [
        Stage::DataIngestion,
        Stage::MenuExtraction,
        Stage::CompetitorDiscovery,
        Stage::CompetitorEnrichment,
        Stage::CompetitorVerification,
        Stage::CompetitorAnalysis,
        Stage::SentimentAnalysis,
        Stage::ImageAnalysis,
        Stage::VisualGapAnalysis,
        Stage::ContextProcessing,
        Stage::SalesProcessing,
        Stage::BcgClassification,
        Stage::SalesPrediction,
        Stage::CampaignGeneration,
        Stage::StrategicVerification,
        Stage::Verification,
    ];

    pub fn ordinal(&self) -> u8 {
        *self as u8
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initialized => "initialized",
            Self::DataIngestion => "data_ingestion",
            Self::MenuExtraction => "menu_extraction",
            Self::CompetitorDiscovery => "competitor_discovery",
            Self::CompetitorEnrichment => "competitor_enrichment",
            Self::CompetitorVerification => "competitor_verification",
            Self::CompetitorAnalysis => "competitor_analysis",
            Self::SentimentAnalysis => "sentiment_analysis",
            Self::ImageAnalysis => "image_analysis",
            Self::VisualGapAnalysis => "visual_gap_analysis",
            Self::ContextProcessing => "context_processing",
            Self::SalesProcessing => "sales_processing",
            Self::BcgClassification => "bcg_classification",
            Self::SalesPrediction => "sales_prediction",
            Self::CampaignGeneration => "campaign_generation",
            Self::StrategicVerification => "strategic_verification",
            Self::Verification => "verification",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "initialized" => Some(Self::Initialized),
            "data_ingestion" => Some(Self::DataIngestion),
            "menu_extraction" => Some(Self::MenuExtraction),
            "competitor_discovery" => Some(Self::CompetitorDiscovery),
            "competitor_enrichment" => Some(Self::CompetitorEnrichment),
            "competitor_verification" => Some(Self::CompetitorVerification),
            "competitor_analysis" => Some(Self::CompetitorAnalysis),
            "sentiment_analysis" => Some(Self::SentimentAnalysis),
            "image_analysis" => Some(Self::ImageAnalysis),
            "visual_gap_analysis" => Some(Self::VisualGapAnalysis),
            "context_processing" => Some(Self::ContextProcessing),
            "sales_processing" => Some(Self::SalesProcessing),
            "bcg_classification" => Some(Self::BcgClassification),
            "sales_prediction" => Some(Self::SalesPrediction),
            "campaign_generation" => Some(Self::CampaignGeneration),
            "strategic_verification" => Some(Self::StrategicVerification),
            "verification" => Some(Self::Verification),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Human-readable label used in progress messages and trace steps.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Initialized => "Initialized",
            Self::DataIngestion => "Data Ingestion",
            Self::MenuExtraction => "Menu Extraction",
            Self::CompetitorDiscovery => "Competitor Discovery",
            Self::CompetitorEnrichment => "Competitor Enrichment",
            Self::CompetitorVerification => "Competitor Verification",
            Self::CompetitorAnalysis => "Competitor Analysis",
            Self::SentimentAnalysis => "Sentiment Analysis",
            Self::ImageAnalysis => "Image Analysis",
            Self::VisualGapAnalysis => "Visual Gap Analysis",
            Self::ContextProcessing => "Context Processing",
            Self::SalesProcessing => "Sales Processing",
            Self::BcgClassification => "BCG Classification",
            Self::SalesPrediction => "Sales Prediction",
            Self::CampaignGeneration => "Campaign Generation",
            Self::StrategicVerification => "Strategic Verification",
            Self::Verification => "Verification",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn is_executable(&self) -> bool {
        !self.is_terminal() && *self != Self::Initialized
    }

    /// Fraction of the pipeline done once this stage has finished.
    ///
    /// Terminal stages report `1.0`.
    pub fn progress(&self) -> f32 {
        if self.is_terminal() {
            return 1.0;
        }
        self.ordinal() as f32 / Self::PIPELINE.len() as f32
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| CoreError::UnknownStage(s.to_string()))
    }
}
