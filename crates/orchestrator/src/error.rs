use insights_core::{AnalysisData, Stage};
use thiserror::Error;
use uuid::Uuid;

/// Failure reported by an analyzer collaborator.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AnalyzerError {
    #[error("Analyzer unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid analyzer input: {0}")]
    InvalidInput(String),

    #[error("Analyzer failed: {0}")]
    Failed(String),
}

#[derive(Debug, Error)]
pub enum StageError {
    #[error("{analyzer} failed: {source}")]
    Analyzer {
        analyzer: &'static str,
        #[source]
        source: AnalyzerError,
    },

    #[error("Missing data: {0}")]
    MissingData(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl StageError {
    pub fn analyzer(analyzer: &'static str, source: AnalyzerError) -> Self {
        Self::Analyzer { analyzer, source }
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Session not found: {0}")]
    SessionNotFound(Uuid),

    #[error("Stage {stage} failed for session {session_id}: {message}")]
    StageExecution {
        session_id: Uuid,
        stage: Stage,
        last_successful_stage: Option<Stage>,
        message: String,
        /// Results accumulated before the failure.
        partial: Box<AnalysisData>,
    },

    /// The session was marked failed while this run was in progress.
    #[error("Session {session_id} was stopped: {reason}")]
    Stopped { session_id: Uuid, reason: String },

    #[error("Store error: {0}")]
    Store(#[from] store::StoreError),

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl PipelineError {
    pub fn session_id(&self) -> Option<Uuid> {
        match self {
            Self::SessionNotFound(id) => Some(*id),
            Self::StageExecution { session_id, .. } | Self::Stopped { session_id, .. } => {
                Some(*session_id)
            }
            Self::Store(_) | Self::InvalidState(_) => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_error_display_names_analyzer() {
        let err = StageError::analyzer(
            "campaign generator",
            AnalyzerError::Failed("template missing".to_string()),
        );
        assert_eq!(
            err.to_string(),
            "campaign generator failed: Analyzer failed: template missing"
        );
    }

    #[test]
    fn test_stage_execution_display() {
        let id = Uuid::new_v4();
        let err = PipelineError::StageExecution {
            session_id: id,
            stage: Stage::CampaignGeneration,
            last_successful_stage: Some(Stage::SalesPrediction),
            message: "boom".to_string(),
            partial: Box::default(),
        };
        let text = err.to_string();
        assert!(text.contains("campaign_generation"));
        assert!(text.contains("boom"));
        assert_eq!(err.session_id(), Some(id));
    }
}
