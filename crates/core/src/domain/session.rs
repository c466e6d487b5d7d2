use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::{AnalysisData, Stage};
use crate::error::{CoreError, Result};

/// Non-binary inputs persisted with the session.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, ToSchema)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct RestaurantProfile {
    pub name: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub cuisine: Option<String>,
}

impl RestaurantProfile {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_cuisine(mut self, cuisine: impl Into<String>) -> Self {
        self.cuisine = Some(cuisine.into());
        self
    }
}

/// Record that a stage ran, successfully or not.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct Checkpoint {
    pub stage: Stage,
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl Checkpoint {
    pub fn succeeded(stage: Stage, duration_ms: u64) -> Self {
        Self {
            stage,
            timestamp: Utc::now(),
            success: true,
            error: None,
            duration_ms: Some(duration_ms),
        }
    }

    pub fn failed(stage: Stage, error: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            stage,
            timestamp: Utc::now(),
            success: false,
            error: Some(error.into()),
            duration_ms: Some(duration_ms),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    MissingInput,
}

/// A stage that was not executed because its input was absent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct StageSkip {
    pub stage: Stage,
    pub reason: SkipReason,
    #[serde(default)]
    pub detail: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Explanation recorded by a stage handler. Never consulted for control flow.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct ThoughtTrace {
    pub step: String,
    pub reasoning: String,
    #[serde(default)]
    pub observations: Vec<String>,
    #[serde(default)]
    pub decisions: Vec<String>,
    pub confidence: f64,
    pub timestamp: DateTime<Utc>,
}

impl ThoughtTrace {
    pub fn new(
        step: impl Into<String>,
        reasoning: impl Into<String>,
        observations: Vec<String>,
        decisions: Vec<String>,
        confidence: f64,
    ) -> Self {
        Self {
            step: step.into(),
            reasoning: reasoning.into(),
            observations,
            decisions,
            confidence: clamp_confidence(confidence),
            timestamp: Utc::now(),
        }
    }
}

fn clamp_confidence(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Per-stage outcome derived from the checkpoint and skip logs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum StageState {
    Pending,
    Completed,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct AnalysisSession {
    pub id: Uuid,
    pub current_stage: Stage,
    pub profile: RestaurantProfile,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub checkpoints: Vec<Checkpoint>,
    #[serde(default)]
    pub skipped: Vec<StageSkip>,
    #[serde(default)]
    pub thought_traces: Vec<ThoughtTrace>,
    #[serde(default)]
    pub last_error: Option<String>,
    #[serde(default)]
    pub data: AnalysisData,
}

impl AnalysisSession {
    pub fn new(profile: RestaurantProfile) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            current_stage: Stage::Initialized,
            profile,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
            checkpoints: Vec::new(),
            skipped: Vec::new(),
            thought_traces: Vec::new(),
            last_error: None,
            data: AnalysisData::default(),
        }
    }

    pub fn last_successful_stage(&self) -> Option<Stage> {
        self.checkpoints
            .iter()
            .rev()
            .find(|c| c.success)
            .map(|c| c.stage)
    }

    /// Stage after which a new run picks up.
    pub fn resume_point(&self) -> Stage {
        self.last_successful_stage().unwrap_or(Stage::Initialized)
    }

    pub fn is_completed(&self) -> bool {
        self.current_stage == Stage::Completed
    }

    pub fn is_failed(&self) -> bool {
        self.current_stage == Stage::Failed
    }

    /// Appends a checkpoint, rejecting one that would move backwards.
    ///
    /// A failed stage may be retried, so equal ordinals are accepted.
    pub fn record_checkpoint(&mut self, checkpoint: Checkpoint) -> Result<()> {
        if let Some(last) = self.checkpoints.last() {
            if checkpoint.stage < last.stage {
                return Err(CoreError::CheckpointOrder {
                    last: last.stage,
                    attempted: checkpoint.stage,
                });
            }
        }
        if checkpoint.success {
            self.current_stage = checkpoint.stage;
        }
        self.updated_at = checkpoint.timestamp;
        self.checkpoints.push(checkpoint);
        Ok(())
    }

    /// Records a missing-input skip. Returns false if already recorded.
    pub fn record_skip(&mut self, stage: Stage, detail: Option<String>) -> bool {
        if self.skipped.iter().any(|s| s.stage == stage) {
            return false;
        }
        let now = Utc::now();
        self.skipped.push(StageSkip {
            stage,
            reason: SkipReason::MissingInput,
            detail,
            timestamp: now,
        });
        self.updated_at = now;
        true
    }

    pub fn add_trace(&mut self, trace: ThoughtTrace) {
        self.updated_at = trace.timestamp;
        self.thought_traces.push(trace);
    }

    /// Latest outcome for `stage`. A later checkpoint overrides an earlier skip.
    pub fn stage_state(&self, stage: Stage) -> StageState {
        if let Some(checkpoint) = self.checkpoints.iter().rev().find(|c| c.stage == stage) {
            return if checkpoint.success {
                StageState::Completed
            } else {
                StageState::Failed
            };
        }
        if self.skipped.iter().any(|s| s.stage == stage) {
            StageState::Skipped
        } else {
            StageState::Pending
        }
    }

    pub fn begin(&mut self) {
        let now = Utc::now();
        if self.started_at.is_none() {
            self.started_at = Some(now);
        }
        if self.is_failed() {
            self.current_stage = self.resume_point();
        }
        self.last_error = None;
        self.updated_at = now;
    }

    pub fn complete(&mut self) {
        let now = Utc::now();
        self.current_stage = Stage::Completed;
        self.completed_at = Some(now);
        self.updated_at = now;
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        self.current_stage = Stage::Failed;
        self.last_error = Some(error.into());
        self.updated_at = Utc::now();
    }
}
