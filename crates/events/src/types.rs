//! Event types for session progress and the global feed

use chrono::{DateTime, Utc};
use insights_core::{Checkpoint, Stage, StageSkip};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What happened, with the data specific to that transition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressKind {
    StageStarted,
    StageCompleted {
        #[serde(default)]
        duration_ms: Option<u64>,
    },
    StageSkipped {
        #[serde(default)]
        detail: Option<String>,
    },
    StageFailed {
        error: String,
    },
    /// One line of a handler's reasoning, observations or decisions.
    Thought {
        step: String,
    },
    PipelineCompleted,
    PipelineFailed {
        error: String,
        #[serde(default)]
        last_successful_stage: Option<Stage>,
    },
}

impl ProgressKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StageStarted => "stage_started",
            Self::StageCompleted { .. } => "stage_completed",
            Self::StageSkipped { .. } => "stage_skipped",
            Self::StageFailed { .. } => "stage_failed",
            Self::Thought { .. } => "thought",
            Self::PipelineCompleted => "pipeline_completed",
            Self::PipelineFailed { .. } => "pipeline_failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::PipelineCompleted | Self::PipelineFailed { .. })
    }
}

/// A single progress update. Built only through the constructors below so
/// that live publishing and status polling describe a transition identically.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProgressEvent {
    pub stage: Stage,
    /// Fraction of the pipeline done, in `[0, 1]`.
    pub progress: f32,
    pub message: String,
    #[serde(flatten)]
    pub kind: ProgressKind,
}

impl ProgressEvent {
    pub fn stage_started(stage: Stage) -> Self {
        let done = stage.ordinal().saturating_sub(1) as f32 / Stage::PIPELINE.len() as f32;
        Self {
            stage,
            progress: done,
            message: format!("Starting {}", stage.label()),
            kind: ProgressKind::StageStarted,
        }
    }

    pub fn from_checkpoint(checkpoint: &Checkpoint) -> Self {
        let stage = checkpoint.stage;
        if checkpoint.success {
            Self {
                stage,
                progress: stage.progress(),
                message: format!("{} completed", stage.label()),
                kind: ProgressKind::StageCompleted {
                    duration_ms: checkpoint.duration_ms,
                },
            }
        } else {
            let error = checkpoint.error.clone().unwrap_or_default();
            Self {
                stage,
                progress: stage.progress(),
                message: format!("{} failed: {}", stage.label(), error),
                kind: ProgressKind::StageFailed { error },
            }
        }
    }

    pub fn from_skip(skip: &StageSkip) -> Self {
        Self {
            stage: skip.stage,
            progress: skip.stage.progress(),
            message: format!("{} skipped: input not provided", skip.stage.label()),
            kind: ProgressKind::StageSkipped {
                detail: skip.detail.clone(),
            },
        }
    }

    pub fn thought(stage: Stage, step: impl Into<String>, line: impl Into<String>) -> Self {
        Self {
            stage,
            progress: stage.ordinal().saturating_sub(1) as f32 / Stage::PIPELINE.len() as f32,
            message: line.into(),
            kind: ProgressKind::Thought { step: step.into() },
        }
    }

    pub fn pipeline_completed() -> Self {
        Self {
            stage: Stage::Completed,
            progress: 1.0,
            message: "Analysis completed".to_string(),
            kind: ProgressKind::PipelineCompleted,
        }
    }

    pub fn pipeline_failed(
        stage: Stage,
        error: impl Into<String>,
        last_successful_stage: Option<Stage>,
    ) -> Self {
        let error = error.into();
        Self {
            stage,
            progress: last_successful_stage.map(|s| s.progress()).unwrap_or(0.0),
            message: format!("Analysis failed at {}: {}", stage.label(), error),
            kind: ProgressKind::PipelineFailed {
                error,
                last_successful_stage,
            },
        }
    }
}

/// A progress event addressed to one session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProgressEnvelope {
    pub id: Uuid,
    pub session_id: Uuid,
    /// Monotonic per broadcaster.
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    pub event: ProgressEvent,
}

impl ProgressEnvelope {
    pub fn new(session_id: Uuid, sequence: u64, event: ProgressEvent) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            sequence,
            timestamp: Utc::now(),
            event,
        }
    }
}

/// Envelope for the all-sessions feed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub event: Event,
}

impl EventEnvelope {
    pub fn new(event: Event) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            event,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    #[serde(rename = "session.created")]
    SessionCreated { session_id: Uuid, name: String },

    #[serde(rename = "session.progress")]
    Progress(ProgressEnvelope),

    /// A session was stopped out of band.
    #[serde(rename = "session.marked_failed")]
    SessionMarkedFailed { session_id: Uuid, reason: String },
}

impl Event {
    pub fn session_id(&self) -> Uuid {
        match self {
            Event::SessionCreated { session_id, .. } => *session_id,
            Event::Progress(envelope) => envelope.session_id,
            Event::SessionMarkedFailed { session_id, .. } => *session_id,
        }
    }
}
