use async_trait::async_trait;
use insights_core::{ItemSales, SalesRecord, SalesSummary, Stage};
use std::collections::HashMap;

use crate::error::StageError;
use crate::stage::{Requirement, StageContext, StageHandler};

/// Aggregates records per item (names compared case-insensitively), ordered
/// by units sold.
pub fn summarize_sales(records: &[SalesRecord]) -> SalesSummary {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut items: Vec<ItemSales> = Vec::new();

    for record in records {
        let key = record.item_name.to_lowercase();
        let slot = *index.entry(key).or_insert_with(|| {
            items.push(ItemSales {
                item_name: record.item_name.clone(),
                units: 0,
                revenue: 0.0,
                share: 0.0,
            });
            items.len() - 1
        });
        items[slot].units += u64::from(record.quantity);
        items[slot].revenue += record.revenue();
    }

    let total_units: u64 = items.iter().map(|i| i.units).sum();
    let total_revenue: f64 = items.iter().map(|i| i.revenue).sum();
    if total_units > 0 {
        for item in &mut items {
            item.share = item.units as f64 / total_units as f64;
        }
    }
    items.sort_by(|a, b| b.units.cmp(&a.units).then_with(|| a.item_name.cmp(&b.item_name)));

    let first_day = records.iter().map(|r| r.date).min();
    let last_day = records.iter().map(|r| r.date).max();
    let days = match (first_day, last_day) {
        (Some(first), Some(last)) => (last - first).num_days() as u32 + 1,
        _ => 0,
    };

    SalesSummary {
        items,
        total_units,
        total_revenue,
        first_day,
        last_day,
        days,
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SalesProcessingStage;

#[async_trait]
impl StageHandler for SalesProcessingStage {
    fn stage(&self) -> Stage {
        Stage::SalesProcessing
    }

    fn requirement(&self) -> Requirement {
        Requirement::SalesRecords
    }

    async fn execute(&self, ctx: &mut StageContext<'_>) -> Result<(), StageError> {
        let summary = summarize_sales(ctx.session.data.sales_records());
        if !summary.total_revenue.is_finite() {
            return Err(StageError::InvalidInput(
                "sales revenue overflows a finite total".to_string(),
            ));
        }

        let observations = summary
            .items
            .iter()
            .take(3)
            .map(|i| format!("{}: {} units ({:.0}%)", i.item_name, i.units, i.share * 100.0))
            .collect();
        let reasoning = format!(
            "Aggregated {} units across {} items over {} days",
            summary.total_units,
            summary.items.len(),
            summary.days
        );

        ctx.session.data.sales_summary = Some(summary);
        ctx.think(reasoning, observations, vec![], 0.95);
        Ok(())
    }
}
