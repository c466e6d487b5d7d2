use async_trait::async_trait;
use insights_core::{Stage, VerificationReport};

use crate::analyzers::{VerificationRequest, VerificationScope};
use crate::error::StageError;
use crate::stage::{Requirement, StageContext, StageHandler};

async fn verify(
    ctx: &mut StageContext<'_>,
    scope: VerificationScope,
) -> Result<VerificationReport, StageError> {
    let verifier = ctx.analyzers.verifier.clone();
    let report = verifier
        .verify(&VerificationRequest {
            scope,
            data: &ctx.session.data,
        })
        .await
        .map_err(|e| StageError::analyzer("data verifier", e))?;

    let reasoning = if report.verified {
        format!("The {} dataset passed verification", scope.as_str())
    } else {
        format!(
            "The {} dataset has {} issues",
            scope.as_str(),
            report.issues.len()
        )
    };
    ctx.think(reasoning, report.issues.clone(), vec![], report.confidence);
    Ok(report)
}

#[derive(Debug, Clone, Copy)]
pub struct StrategicVerificationStage;

#[async_trait]
impl StageHandler for StrategicVerificationStage {
    fn stage(&self) -> Stage {
        Stage::StrategicVerification
    }

    fn requirement(&self) -> Requirement {
        Requirement::CompetitorAnalysis
    }

    async fn execute(&self, ctx: &mut StageContext<'_>) -> Result<(), StageError> {
        let report = verify(ctx, VerificationScope::Strategy).await?;
        ctx.session.data.strategic_verification = Some(report);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct VerificationStage;

#[async_trait]
impl StageHandler for VerificationStage {
    fn stage(&self) -> Stage {
        Stage::Verification
    }

    fn requirement(&self) -> Requirement {
        Requirement::SalesRecords
    }

    async fn execute(&self, ctx: &mut StageContext<'_>) -> Result<(), StageError> {
        let report = verify(ctx, VerificationScope::Full).await?;
        ctx.session.data.verification = Some(report);
        Ok(())
    }
}
