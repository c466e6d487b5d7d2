//! Collaborators that do the analytical work behind each stage.
//!
//! The pipeline only sees these traits. Deterministic baselines cover the
//! arithmetic ones; OCR, discovery, enrichment and image scoring default to
//! [`Unconfigured`] until a real backend is plugged in.

mod campaigns;
mod classifier;
mod forecaster;
mod sentiment;
mod unconfigured;
mod verifier;

use async_trait::async_trait;
use insights_core::{
    AnalysisData, Campaign, ClassificationReport, Competitor, CompetitorProfile, DishImage,
    DishImageAssessment, MenuImage, MenuItem, PredictionSet, SalesSummary, Scenario,
    SentimentReport, VerificationReport,
};
use std::sync::Arc;

use crate::error::AnalyzerError;

pub use campaigns::TemplateCampaignGenerator;
pub use classifier::MenuEngineeringClassifier;
pub use forecaster::TrendForecaster;
pub use sentiment::LexiconSentiment;
pub use unconfigured::Unconfigured;
pub use verifier::RuleVerifier;

pub type AnalyzerResult<T> = std::result::Result<T, AnalyzerError>;

/// Items read from one menu image.
#[derive(Debug, Clone, PartialEq)]
pub struct MenuExtraction {
    pub items: Vec<MenuItem>,
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationScope {
    Competitors,
    Strategy,
    Full,
}

impl VerificationScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Competitors => "competitors",
            Self::Strategy => "strategy",
            Self::Full => "full",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct VerificationRequest<'a> {
    pub scope: VerificationScope,
    pub data: &'a AnalysisData,
}

#[async_trait]
pub trait MenuExtractor: Send + Sync {
    async fn extract(&self, image: &MenuImage) -> AnalyzerResult<MenuExtraction>;
}

#[async_trait]
pub trait CompetitorDiscovery: Send + Sync {
    async fn discover(&self, location: &str, cuisine: Option<&str>)
        -> AnalyzerResult<Vec<Competitor>>;
}

#[async_trait]
pub trait CompetitorEnrichment: Send + Sync {
    async fn enrich(&self, competitor: &Competitor) -> AnalyzerResult<CompetitorProfile>;
}

#[async_trait]
pub trait DataVerifier: Send + Sync {
    async fn verify(&self, request: &VerificationRequest<'_>) -> AnalyzerResult<VerificationReport>;
}

#[async_trait]
pub trait ClassificationEngine: Send + Sync {
    async fn classify(
        &self,
        items: &[MenuItem],
        sales: Option<&SalesSummary>,
    ) -> AnalyzerResult<ClassificationReport>;
}

#[async_trait]
pub trait Forecaster: Send + Sync {
    async fn predict(
        &self,
        items: &[MenuItem],
        sales: Option<&SalesSummary>,
        horizon_days: u32,
        scenarios: &[Scenario],
    ) -> AnalyzerResult<PredictionSet>;
}

#[async_trait]
pub trait CampaignGenerator: Send + Sync {
    async fn generate(
        &self,
        classification: &ClassificationReport,
        predictions: Option<&PredictionSet>,
    ) -> AnalyzerResult<Vec<Campaign>>;
}

#[async_trait]
pub trait SentimentAnalyzer: Send + Sync {
    async fn analyze(&self, reviews: &[String]) -> AnalyzerResult<SentimentReport>;
}

#[async_trait]
pub trait ImageAnalyzer: Send + Sync {
    async fn analyze(&self, image: &DishImage) -> AnalyzerResult<DishImageAssessment>;
}

/// The full set of collaborators handed to stage handlers.
#[derive(Clone)]
pub struct Analyzers {
    pub menu_extractor: Arc<dyn MenuExtractor>,
    pub competitor_discovery: Arc<dyn CompetitorDiscovery>,
    pub competitor_enrichment: Arc<dyn CompetitorEnrichment>,
    pub verifier: Arc<dyn DataVerifier>,
    pub classifier: Arc<dyn ClassificationEngine>,
    pub forecaster: Arc<dyn Forecaster>,
    pub campaign_generator: Arc<dyn CampaignGenerator>,
    pub sentiment: Arc<dyn SentimentAnalyzer>,
    pub image_analyzer: Arc<dyn ImageAnalyzer>,
}

impl Default for Analyzers {
    fn default() -> Self {
        Self {
            menu_extractor: Arc::new(Unconfigured::new("menu extractor")),
            competitor_discovery: Arc::new(Unconfigured::new("competitor discovery")),
            competitor_enrichment: Arc::new(Unconfigured::new("competitor enrichment")),
            verifier: Arc::new(RuleVerifier),
            classifier: Arc::new(MenuEngineeringClassifier::default()),
            forecaster: Arc::new(TrendForecaster),
            campaign_generator: Arc::new(TemplateCampaignGenerator),
            sentiment: Arc::new(LexiconSentiment),
            image_analyzer: Arc::new(Unconfigured::new("image analyzer")),
        }
    }
}

impl Analyzers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_menu_extractor(mut self, extractor: Arc<dyn MenuExtractor>) -> Self {
        self.menu_extractor = extractor;
        self
    }

    pub fn with_competitor_discovery(mut self, discovery: Arc<dyn CompetitorDiscovery>) -> Self {
        self.competitor_discovery = discovery;
        self
    }

    pub fn with_competitor_enrichment(
        mut self,
        enrichment: Arc<dyn CompetitorEnrichment>,
    ) -> Self {
        self.competitor_enrichment = enrichment;
        self
    }

    pub fn with_verifier(mut self, verifier: Arc<dyn DataVerifier>) -> Self {
        self.verifier = verifier;
        self
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn ClassificationEngine>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_forecaster(mut self, forecaster: Arc<dyn Forecaster>) -> Self {
        self.forecaster = forecaster;
        self
    }

    pub fn with_campaign_generator(mut self, generator: Arc<dyn CampaignGenerator>) -> Self {
        self.campaign_generator = generator;
        self
    }

    pub fn with_sentiment(mut self, sentiment: Arc<dyn SentimentAnalyzer>) -> Self {
        self.sentiment = sentiment;
        self
    }

    pub fn with_image_analyzer(mut self, analyzer: Arc<dyn ImageAnalyzer>) -> Self {
        self.image_analyzer = analyzer;
        self
    }
}

impl std::fmt::Debug for Analyzers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Analyzers").finish_non_exhaustive()
    }
}
