//! Run with: cargo run --package server --bin generate-types --features typescript

use std::fs;
use std::path::Path;

const OUT_DIR: &str = "frontend/src/types/generated";

#[cfg(feature = "typescript")]
fn export_all(out_dir: &Path) -> anyhow::Result<Vec<&'static str>> {
    use insights_core::*;
    use ts_rs::TS;

    macro_rules! export {
        ($($ty:ident),* $(,)?) => {{
            let mut names = Vec::new();
            $(
                $ty::export_all_to(out_dir)
                    .map_err(|e| anyhow::anyhow!("Failed to export {}: {}", stringify!($ty), e))?;
                names.push(stringify!($ty));
            )*
            names
        }};
    }

    Ok(export!(
        Stage,
        StageState,
        RestaurantProfile,
        Checkpoint,
        SkipReason,
        StageSkip,
        ThoughtTrace,
        AnalysisSession,
        AnalysisData,
        StageInputs,
        MenuImage,
        DishImage,
        MenuItem,
        MenuCatalog,
        SalesRecord,
        SalesSummary,
        ItemSales,
        Competitor,
        CompetitorProfile,
        CompetitorAnalysis,
        PricePosition,
        SentimentReport,
        DishImageAssessment,
        ImageAnalysisReport,
        VisualGap,
        VisualGapReport,
        BusinessContext,
        Quadrant,
        ItemClassification,
        ClassificationReport,
        Scenario,
        ItemForecast,
        PredictionSet,
        Campaign,
        VerificationReport,
    ))
}

#[cfg(feature = "typescript")]
fn write_index(out_dir: &Path, names: &[&str]) -> anyhow::Result<()> {
    let mut index = String::from(
        "// Auto-generated - regenerate with: cargo run --package server --bin generate-types --features typescript\n\n",
    );
    for name in names {
        index.push_str(&format!("export * from './{}';\n", name));
    }
    let index_path = out_dir.join("index.ts");
    fs::write(&index_path, index)?;
    println!("Generated {}", index_path.display());
    Ok(())
}

fn main() -> anyhow::Result<()> {
    println!("Generating TypeScript types...");

    let out_dir = Path::new(OUT_DIR);
    fs::create_dir_all(out_dir)?;

    #[cfg(feature = "typescript")]
    {
        let names = export_all(out_dir)?;
        println!("Types exported to {}", out_dir.display());
        write_index(out_dir, &names)?;
        Ok(())
    }

    #[cfg(not(feature = "typescript"))]
    {
        anyhow::bail!(
            "typescript feature is not enabled; run with: cargo run --package server --bin generate-types --features typescript"
        )
    }
}
