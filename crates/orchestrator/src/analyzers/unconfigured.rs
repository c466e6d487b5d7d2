use async_trait::async_trait;
use insights_core::{Competitor, CompetitorProfile, DishImage, DishImageAssessment, MenuImage};

use super::{
    AnalyzerResult, CompetitorDiscovery, CompetitorEnrichment, ImageAnalyzer, MenuExtraction,
    MenuExtractor,
};
use crate::error::AnalyzerError;

/// Placeholder for a collaborator with no backend. Every call fails with
/// [`AnalyzerError::Unavailable`].
#[derive(Debug, Clone, Copy)]
pub struct Unconfigured {
    name: &'static str,
}

impl Unconfigured {
    pub const fn new(name: &'static str) -> Self {
        Self { name }
    }

    fn error(&self) -> AnalyzerError {
        AnalyzerError::Unavailable(format!("{} is not configured", self.name))
    }
}

#[async_trait]
impl MenuExtractor for Unconfigured {
    async fn extract(&self, _image: &MenuImage) -> AnalyzerResult<MenuExtraction> {
        Err(self.error())
    }
}

#[async_trait]
impl CompetitorDiscovery for Unconfigured {
    async fn discover(
        &self,
        _location: &str,
        _cuisine: Option<&str>,
    ) -> AnalyzerResult<Vec<Competitor>> {
        Err(self.error())
    }
}

#[async_trait]
impl CompetitorEnrichment for Unconfigured {
    async fn enrich(&self, _competitor: &Competitor) -> AnalyzerResult<CompetitorProfile> {
        Err(self.error())
    }
}

#[async_trait]
impl ImageAnalyzer for Unconfigured {
    async fn analyze(&self, _image: &DishImage) -> AnalyzerResult<DishImageAssessment> {
        Err(self.error())
    }
}
