use thiserror::Error;
use uuid::Uuid;

use crate::domain::Stage;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Session not found: {0}")]
    SessionNotFound(Uuid),

    #[error("Unknown stage: {0}")]
    UnknownStage(String),

    #[error("Checkpoint for {attempted} would precede last checkpoint {last}")]
    CheckpointOrder { last: Stage, attempted: Stage },

    #[error("Validation error: {0}")]
    Validation(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
