use async_trait::async_trait;
use insights_core::{MenuCatalog, MenuItem, Stage};
use tracing::warn;

use super::all_unavailable;
use crate::error::{AnalyzerError, StageError};
use crate::stage::{Requirement, StageContext, StageHandler};

fn has_finite_prices(item: &MenuItem) -> bool {
    item.price.is_finite() && item.cost.map_or(true, f64::is_finite)
}

/// Merges `item` into `items`, filling gaps in an existing entry of the same name.
fn merge_item(items: &mut Vec<MenuItem>, item: MenuItem) {
    match items
        .iter_mut()
        .find(|existing| existing.name.eq_ignore_ascii_case(&item.name))
    {
        Some(existing) => {
            existing.cost = existing.cost.or(item.cost);
            existing.category = existing.category.take().or(item.category);
            existing.description = existing.description.take().or(item.description);
        }
        None => items.push(item),
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MenuExtractionStage;

#[async_trait]
impl StageHandler for MenuExtractionStage {
    fn stage(&self) -> Stage {
        Stage::MenuExtraction
    }

    fn requirement(&self) -> Requirement {
        Requirement::MenuImages
    }

    async fn execute(&self, ctx: &mut StageContext<'_>) -> Result<(), StageError> {
        let extractor = ctx.analyzers.menu_extractor.clone();
        let mut items = Vec::new();
        let mut confidences = Vec::new();
        let mut errors: Vec<AnalyzerError> = Vec::new();
        let mut observations = Vec::new();

        for (index, image) in ctx.inputs.menu_images.iter().enumerate() {
            let label = image
                .filename
                .clone()
                .unwrap_or_else(|| format!("image {}", index + 1));
            match extractor.extract(image).await {
                Ok(extraction) => {
                    observations.push(format!(
                        "{label}: {} items at confidence {:.2}",
                        extraction.items.len(),
                        extraction.confidence
                    ));
                    let confidence = if extraction.confidence.is_finite() {
                        extraction.confidence.clamp(0.0, 1.0)
                    } else {
                        0.0
                    };
                    confidences.push(confidence);
                    for item in extraction.items {
                        if has_finite_prices(&item) {
                            merge_item(&mut items, item);
                        } else {
                            observations.push(format!(
                                "{label}: dropped {} with an unreadable price",
                                item.name
                            ));
                        }
                    }
                }
                Err(e) => {
                    warn!(session_id = %ctx.session.id, image = %label, error = %e, "Menu image extraction failed");
                    observations.push(format!("{label}: extraction failed ({e})"));
                    errors.push(e);
                }
            }
        }

        if confidences.is_empty() && all_unavailable(&errors) {
            ctx.session.data.menu = Some(MenuCatalog {
                images_failed: errors.len(),
                ..MenuCatalog::default()
            });
            ctx.think(
                "No menu reader is configured",
                observations,
                vec!["continued without menu items".to_string()],
                0.0,
            );
            return Ok(());
        }

        if confidences.is_empty() {
            let source = errors
                .pop()
                .unwrap_or_else(|| AnalyzerError::InvalidInput("no menu images".to_string()));
            ctx.think(
                "Could not read any menu image",
                observations,
                vec![],
                0.0,
            );
            return Err(StageError::analyzer("menu extractor", source));
        }

        let confidence = confidences.iter().sum::<f64>() / confidences.len() as f64;
        let decisions = vec![format!("kept {} distinct items", items.len())];
        ctx.session.data.menu = Some(MenuCatalog {
            items,
            confidence,
            images_processed: confidences.len(),
            images_failed: errors.len(),
        });
        ctx.think("Merged items read from the menu images", observations, decisions, confidence);
        Ok(())
    }
}
