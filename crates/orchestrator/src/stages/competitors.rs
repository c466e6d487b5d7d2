use async_trait::async_trait;
use insights_core::{CompetitorAnalysis, CompetitorProfile, PricePosition, Stage};
use tracing::warn;

use crate::analyzers::{VerificationRequest, VerificationScope};
use crate::error::{AnalyzerError, StageError};
use crate::stage::{Requirement, StageContext, StageHandler};

#[derive(Debug, Clone, Copy)]
pub struct CompetitorDiscoveryStage;

#[async_trait]
impl StageHandler for CompetitorDiscoveryStage {
    fn stage(&self) -> Stage {
        Stage::CompetitorDiscovery
    }

    fn requirement(&self) -> Requirement {
        Requirement::Location
    }

    async fn execute(&self, ctx: &mut StageContext<'_>) -> Result<(), StageError> {
        let location = ctx.session.profile.location.clone().unwrap_or_default();
        let cuisine = ctx.session.profile.cuisine.clone();
        let discovery = ctx.analyzers.competitor_discovery.clone();

        match discovery.discover(&location, cuisine.as_deref()).await {
            Ok(competitors) => {
                let observations = competitors
                    .iter()
                    .take(10)
                    .map(|c| c.name.clone())
                    .collect();
                let reasoning = format!("Found {} competitors near {location}", competitors.len());
                ctx.session.data.competitors = Some(competitors);
                ctx.think(reasoning, observations, vec![], 0.8);
                Ok(())
            }
            Err(e @ AnalyzerError::Unavailable(_)) => {
                ctx.session.data.competitors = Some(Vec::new());
                ctx.think(
                    "Competitor discovery has no backend",
                    vec![e.to_string()],
                    vec!["continued without competitors".to_string()],
                    0.0,
                );
                Ok(())
            }
            Err(e) => Err(StageError::analyzer("competitor discovery", e)),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CompetitorEnrichmentStage;

#[async_trait]
impl StageHandler for CompetitorEnrichmentStage {
    fn stage(&self) -> Stage {
        Stage::CompetitorEnrichment
    }

    fn requirement(&self) -> Requirement {
        Requirement::Competitors
    }

    async fn execute(&self, ctx: &mut StageContext<'_>) -> Result<(), StageError> {
        let enrichment = ctx.analyzers.competitor_enrichment.clone();
        let competitors = ctx.session.data.competitors().to_vec();
        let mut profiles = Vec::with_capacity(competitors.len());
        let mut observations = Vec::new();

        for competitor in competitors {
            match enrichment.enrich(&competitor).await {
                Ok(profile) => profiles.push(profile),
                Err(e) => {
                    warn!(session_id = %ctx.session.id, competitor = %competitor.name, error = %e, "Enrichment failed");
                    observations.push(format!("{}: {e}", competitor.name));
                    profiles.push(CompetitorProfile::unenriched(competitor));
                }
            }
        }

        let enriched = profiles.iter().filter(|p| p.enriched).count();
        let confidence = enriched as f64 / profiles.len().max(1) as f64;
        let reasoning = format!("Enriched {enriched} of {} competitors", profiles.len());
        let decisions = if enriched < profiles.len() {
            vec!["kept unenriched competitors with discovery data only".to_string()]
        } else {
            vec![]
        };
        ctx.session.data.competitor_profiles = Some(profiles);
        ctx.think(reasoning, observations, decisions, confidence);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CompetitorVerificationStage;

#[async_trait]
impl StageHandler for CompetitorVerificationStage {
    fn stage(&self) -> Stage {
        Stage::CompetitorVerification
    }

    fn requirement(&self) -> Requirement {
        Requirement::Competitors
    }

    async fn execute(&self, ctx: &mut StageContext<'_>) -> Result<(), StageError> {
        let verifier = ctx.analyzers.verifier.clone();
        let report = verifier
            .verify(&VerificationRequest {
                scope: VerificationScope::Competitors,
                data: &ctx.session.data,
            })
            .await
            .map_err(|e| StageError::analyzer("data verifier", e))?;

        let reasoning = if report.verified {
            "Competitor data is consistent".to_string()
        } else {
            format!("Competitor data has {} issues", report.issues.len())
        };
        let observations = report.issues.clone();
        let confidence = report.confidence;
        ctx.session.data.competitor_verification = Some(report);
        ctx.think(reasoning, observations, vec![], confidence);
        Ok(())
    }
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    (count > 0).then(|| sum / count as f64)
}

/// Own prices within 10% of the market average count as aligned.
pub(crate) fn price_position(own: Option<f64>, market: Option<f64>) -> PricePosition {
    match (own, market) {
        (Some(own), Some(market)) if market > 0.0 => {
            let ratio = own / market;
            if ratio < 0.9 {
                PricePosition::Below
            } else if ratio > 1.1 {
                PricePosition::Above
            } else {
                PricePosition::Aligned
            }
        }
        _ => PricePosition::Unknown,
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CompetitorAnalysisStage;

#[async_trait]
impl StageHandler for CompetitorAnalysisStage {
    fn stage(&self) -> Stage {
        Stage::CompetitorAnalysis
    }

    fn requirement(&self) -> Requirement {
        Requirement::CompetitorProfiles
    }

    async fn execute(&self, ctx: &mut StageContext<'_>) -> Result<(), StageError> {
        let data = &ctx.session.data;
        let profiles = data.competitor_profiles.as_deref().unwrap_or_default();

        let own_average_price = mean(data.menu_items().iter().map(|i| i.price));
        let market_average_price = mean(profiles.iter().filter_map(|p| p.average_price));
        let market_average_rating = mean(profiles.iter().filter_map(|p| p.competitor.rating));
        let position = price_position(own_average_price, market_average_price);

        let mut insights = Vec::new();
        match position {
            PricePosition::Below => insights.push("menu is priced below the local market".to_string()),
            PricePosition::Above => insights.push("menu is priced above the local market".to_string()),
            PricePosition::Aligned => insights.push("menu pricing matches the local market".to_string()),
            PricePosition::Unknown => {
                insights.push("not enough price data to compare with the market".to_string())
            }
        }
        if let Some(rating) = market_average_rating {
            insights.push(format!("competitors average {rating:.1} stars"));
        }

        let analysis = CompetitorAnalysis {
            own_average_price,
            market_average_price,
            price_position: position,
            market_average_rating,
            competitors_considered: profiles.len(),
            insights: insights.clone(),
        };
        let confidence = if position == PricePosition::Unknown { 0.4 } else { 0.8 };

        ctx.session.data.competitor_analysis = Some(analysis);
        ctx.think("Compared menu pricing with nearby competitors", insights, vec![], confidence);
        Ok(())
    }
}
