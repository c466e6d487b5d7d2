//! Typed payloads contributed by each pipeline stage.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct MenuItem {
    pub name: String,
    #[serde(default)]
    pub category: Option<String>,
    pub price: f64,
    /// Food cost per portion, when known.
    #[serde(default)]
    pub cost: Option<f64>,
    #[serde(default)]
    pub description: Option<String>,
}

impl MenuItem {
    pub fn new(name: impl Into<String>, price: f64) -> Self {
        Self {
            name: name.into(),
            category: None,
            price,
            cost: None,
            description: None,
        }
    }

    pub fn with_cost(mut self, cost: f64) -> Self {
        self.cost = Some(cost);
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Contribution margin per portion. Unknown cost counts as zero.
    pub fn margin(&self) -> f64 {
        self.price - self.cost.unwrap_or(0.0)
    }
}

/// Merged menu produced by the extraction stage.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, ToSchema)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct MenuCatalog {
    pub items: Vec<MenuItem>,
    pub confidence: f64,
    pub images_processed: usize,
    pub images_failed: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct SalesRecord {
    pub date: NaiveDate,
    pub item_name: String,
    pub quantity: u32,
    pub unit_price: f64,
}

impl SalesRecord {
    pub fn revenue(&self) -> f64 {
        self.quantity as f64 * self.unit_price
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct Competitor {
    pub name: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub rating: Option<f64>,
    /// 1 (cheap) to 4 (expensive).
    #[serde(default)]
    pub price_level: Option<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct CompetitorProfile {
    pub competitor: Competitor,
    #[serde(default)]
    pub average_price: Option<f64>,
    #[serde(default)]
    pub review_count: Option<u32>,
    #[serde(default)]
    pub highlights: Vec<String>,
    /// False when enrichment failed and the profile only echoes discovery data.
    #[serde(default)]
    pub enriched: bool,
}

impl CompetitorProfile {
    pub fn unenriched(competitor: Competitor) -> Self {
        Self {
            competitor,
            average_price: None,
            review_count: None,
            highlights: Vec::new(),
            enriched: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, ToSchema)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct VerificationReport {
    pub verified: bool,
    pub issues: Vec<String>,
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum PricePosition {
    Below,
    Aligned,
    Above,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct CompetitorAnalysis {
    #[serde(default)]
    pub own_average_price: Option<f64>,
    #[serde(default)]
    pub market_average_price: Option<f64>,
    pub price_position: PricePosition,
    #[serde(default)]
    pub market_average_rating: Option<f64>,
    pub competitors_considered: usize,
    pub insights: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, ToSchema)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct SentimentReport {
    /// Overall polarity in `[-1, 1]`.
    pub score: f64,
    pub positive: u32,
    pub negative: u32,
    pub neutral: u32,
    #[serde(default)]
    pub themes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct DishImageAssessment {
    pub dish_name: String,
    /// Visual appeal in `[0, 1]`.
    pub appeal_score: f64,
    #[serde(default)]
    pub notes: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, ToSchema)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct ImageAnalysisReport {
    pub assessments: Vec<DishImageAssessment>,
    pub images_failed: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct VisualGap {
    pub dish_name: String,
    pub appeal_score: f64,
    pub recommendation: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, ToSchema)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct VisualGapReport {
    pub threshold: f64,
    pub gaps: Vec<VisualGap>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, ToSchema)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct BusinessContext {
    pub goals: Vec<String>,
    pub constraints: Vec<String>,
    #[serde(default)]
    pub budget: Option<f64>,
    pub raw: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct ItemSales {
    pub item_name: String,
    pub units: u64,
    pub revenue: f64,
    /// Share of total units sold, in `[0, 1]`.
    pub share: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, ToSchema)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct SalesSummary {
    pub items: Vec<ItemSales>,
    pub total_units: u64,
    pub total_revenue: f64,
    #[serde(default)]
    pub first_day: Option<NaiveDate>,
    #[serde(default)]
    pub last_day: Option<NaiveDate>,
    pub days: u32,
}

impl SalesSummary {
    pub fn item(&self, name: &str) -> Option<&ItemSales> {
        self.items.iter().find(|i| i.item_name.eq_ignore_ascii_case(name))
    }
}

/// Menu-engineering quadrant.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum Quadrant {
    /// High popularity, high margin.
    Star,
    /// High popularity, low margin.
    Plowhorse,
    /// Low popularity, high margin.
    Puzzle,
    /// Low popularity, low margin.
    Dog,
}

impl Quadrant {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Star => "star",
            Self::Plowhorse => "plowhorse",
            Self::Puzzle => "puzzle",
            Self::Dog => "dog",
        }
    }

    pub fn from_scores(high_popularity: bool, high_margin: bool) -> Self {
        match (high_popularity, high_margin) {
            (true, true) => Self::Star,
            (true, false) => Self::Plowhorse,
            (false, true) => Self::Puzzle,
            (false, false) => Self::Dog,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct ItemClassification {
    pub item_name: String,
    pub quadrant: Quadrant,
    pub popularity: f64,
    pub margin: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, ToSchema)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct ClassificationReport {
    pub classifications: Vec<ItemClassification>,
    pub summary: String,
}

impl ClassificationReport {
    pub fn items_in(&self, quadrant: Quadrant) -> impl Iterator<Item = &ItemClassification> {
        self.classifications
            .iter()
            .filter(move |c| c.quadrant == quadrant)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct Scenario {
    pub name: String,
    /// Demand multiplier applied to the baseline forecast.
    pub multiplier: f64,
}

impl Scenario {
    pub fn new(name: impl Into<String>, multiplier: f64) -> Self {
        Self {
            name: name.into(),
            multiplier,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct ItemForecast {
    pub item_name: String,
    pub scenario: String,
    pub expected_units: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, ToSchema)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct PredictionSet {
    pub horizon_days: u32,
    pub forecasts: Vec<ItemForecast>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct Campaign {
    pub title: String,
    #[serde(default)]
    pub quadrant: Option<Quadrant>,
    pub target_items: Vec<String>,
    pub channel: String,
    pub message: String,
}

/// Accumulated results, one optional slot per stage output.
///
/// A `None` slot means the producing stage has not run, was skipped for a
/// missing input, or failed.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, ToSchema)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(default)]
pub struct AnalysisData {
    pub sales_records: Option<Vec<SalesRecord>>,
    pub menu: Option<MenuCatalog>,
    pub competitors: Option<Vec<Competitor>>,
    pub competitor_profiles: Option<Vec<CompetitorProfile>>,
    pub competitor_verification: Option<VerificationReport>,
    pub competitor_analysis: Option<CompetitorAnalysis>,
    pub sentiment: Option<SentimentReport>,
    pub image_analysis: Option<ImageAnalysisReport>,
    pub visual_gaps: Option<VisualGapReport>,
    pub business_context: Option<BusinessContext>,
    pub sales_summary: Option<SalesSummary>,
    pub classification: Option<ClassificationReport>,
    pub predictions: Option<PredictionSet>,
    pub campaigns: Option<Vec<Campaign>>,
    pub strategic_verification: Option<VerificationReport>,
    pub verification: Option<VerificationReport>,
}

impl AnalysisData {
    pub fn menu_items(&self) -> &[MenuItem] {
        self.menu.as_ref().map(|m| m.items.as_slice()).unwrap_or(&[])
    }

    pub fn sales_records(&self) -> &[SalesRecord] {
        self.sales_records.as_deref().unwrap_or(&[])
    }

    pub fn competitors(&self) -> &[Competitor] {
        self.competitors.as_deref().unwrap_or(&[])
    }
}
