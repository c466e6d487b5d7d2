use async_trait::async_trait;
use insights_core::{ItemForecast, MenuItem, PredictionSet, SalesSummary, Scenario};

use super::{AnalyzerResult, Forecaster};
use crate::error::AnalyzerError;

/// Daily rate assumed for items with no sales history.
pub const NOMINAL_DAILY_UNITS: f64 = 1.0;

/// Mean daily units over the observed period, projected over the horizon and
/// scaled by each scenario's multiplier.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrendForecaster;

impl TrendForecaster {
    pub fn forecast(
        &self,
        items: &[MenuItem],
        sales: Option<&SalesSummary>,
        horizon_days: u32,
        scenarios: &[Scenario],
    ) -> AnalyzerResult<PredictionSet> {
        if items.is_empty() {
            return Err(AnalyzerError::InvalidInput(
                "no menu items to forecast".to_string(),
            ));
        }
        if scenarios.is_empty() {
            return Err(AnalyzerError::InvalidInput(
                "at least one scenario is required".to_string(),
            ));
        }

        let mut forecasts = Vec::with_capacity(items.len() * scenarios.len());
        for item in items {
            let daily = sales
                .filter(|s| s.days > 0)
                .and_then(|s| s.item(&item.name).map(|i| i.units as f64 / s.days as f64))
                .unwrap_or(NOMINAL_DAILY_UNITS);
            for scenario in scenarios {
                forecasts.push(ItemForecast {
                    item_name: item.name.clone(),
                    scenario: scenario.name.clone(),
                    expected_units: daily * horizon_days as f64 * scenario.multiplier,
                });
            }
        }

        Ok(PredictionSet {
            horizon_days,
            forecasts,
        })
    }
}

#[async_trait]
impl Forecaster for TrendForecaster {
    async fn predict(
        &self,
        items: &[MenuItem],
        sales: Option<&SalesSummary>,
        horizon_days: u32,
        scenarios: &[Scenario],
    ) -> AnalyzerResult<PredictionSet> {
        self.forecast(items, sales, horizon_days, scenarios)
    }
}
