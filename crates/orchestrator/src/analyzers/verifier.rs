use async_trait::async_trait;
use insights_core::{AnalysisData, VerificationReport};
use std::collections::HashSet;

use super::{AnalyzerResult, DataVerifier, VerificationRequest, VerificationScope};

/// Consistency checks over the accumulated results.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleVerifier;

impl RuleVerifier {
    pub fn check(&self, request: &VerificationRequest<'_>) -> VerificationReport {
        let issues = match request.scope {
            VerificationScope::Competitors => competitor_issues(request.data),
            VerificationScope::Strategy => strategy_issues(request.data),
            VerificationScope::Full => full_issues(request.data),
        };
        let confidence = (1.0 - 0.1 * issues.len() as f64).max(0.0);
        VerificationReport {
            verified: issues.is_empty(),
            issues,
            confidence,
        }
    }
}

fn competitor_issues(data: &AnalysisData) -> Vec<String> {
    let mut issues = Vec::new();
    let competitors = data.competitors();
    if competitors.is_empty() {
        issues.push("no competitors discovered".to_string());
    }
    let mut seen = HashSet::new();
    for competitor in competitors {
        if !seen.insert(competitor.name.to_lowercase()) {
            issues.push(format!("duplicate competitor: {}", competitor.name));
        }
        if let Some(rating) = competitor.rating {
            if !(0.0..=5.0).contains(&rating) {
                issues.push(format!("{} has rating {rating} outside 0-5", competitor.name));
            }
        }
        if let Some(level) = competitor.price_level {
            if !(1..=4).contains(&level) {
                issues.push(format!("{} has price level {level} outside 1-4", competitor.name));
            }
        }
    }
    issues
}

fn strategy_issues(data: &AnalysisData) -> Vec<String> {
    let mut issues = Vec::new();
    if data.competitor_analysis.is_none() {
        issues.push("competitor analysis missing".to_string());
    }
    match &data.classification {
        None => issues.push("menu classification missing".to_string()),
        Some(report) if report.classifications.is_empty() => {
            issues.push("menu classification is empty".to_string())
        }
        Some(_) => {}
    }
    if data.campaigns.as_ref().map_or(true, |c| c.is_empty()) {
        issues.push("no campaigns generated".to_string());
    }
    issues
}

fn full_issues(data: &AnalysisData) -> Vec<String> {
    let mut issues = Vec::new();
    for item in data.menu_items() {
        if item.price < 0.0 {
            issues.push(format!("{} has a negative price", item.name));
        }
        if let Some(cost) = item.cost {
            if cost < 0.0 {
                issues.push(format!("{} has a negative cost", item.name));
            } else if cost > item.price {
                issues.push(format!("{} costs more than it sells for", item.name));
            }
        }
    }

    let records = data.sales_records();
    if records.is_empty() {
        issues.push("no sales records".to_string());
    }
    if records.iter().any(|r| r.unit_price < 0.0) {
        issues.push("sales records contain negative prices".to_string());
    }

    let menu: HashSet<String> = data
        .menu_items()
        .iter()
        .map(|i| i.name.to_lowercase())
        .collect();
    if !menu.is_empty() {
        let mut unknown: Vec<&str> = records
            .iter()
            .filter(|r| !menu.contains(&r.item_name.to_lowercase()))
            .map(|r| r.item_name.as_str())
            .collect();
        unknown.sort_unstable();
        unknown.dedup();
        for name in unknown {
            issues.push(format!("sold item not on menu: {name}"));
        }
    }
    issues
}

#[async_trait]
impl DataVerifier for RuleVerifier {
    async fn verify(&self, request: &VerificationRequest<'_>) -> AnalyzerResult<VerificationReport> {
        Ok(self.check(request))
    }
}
