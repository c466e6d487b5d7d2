//! Read-only session projections and the polling alternative to push progress.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use events::ProgressEvent;
use futures::Stream;
use insights_core::{
    AnalysisSession, Checkpoint, RestaurantProfile, Stage, StageSkip, StageState,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::pipeline::PipelineOrchestrator;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct StageStatus {
    pub stage: Stage,
    pub state: StageState,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct StatusView {
    pub session_id: Uuid,
    pub current_stage: Stage,
    pub progress: f32,
    pub profile: RestaurantProfile,
    pub stages: Vec<StageStatus>,
    pub checkpoints: Vec<Checkpoint>,
    pub skipped: Vec<StageSkip>,
    pub last_error: Option<String>,
    pub resume_point: Stage,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl StatusView {
    pub fn from_session(session: &AnalysisSession) -> Self {
        let progress = if session.is_completed() {
            1.0
        } else {
            session
                .last_successful_stage()
                .map(|s| s.progress())
                .unwrap_or(0.0)
        };
        Self {
            session_id: session.id,
            current_stage: session.current_stage,
            progress,
            profile: session.profile.clone(),
            stages: Stage::PIPELINE
                .iter()
                .map(|&stage| StageStatus {
                    stage,
                    state: session.stage_state(stage),
                })
                .collect(),
            checkpoints: session.checkpoints.clone(),
            skipped: session.skipped.clone(),
            last_error: session.last_error.clone(),
            resume_point: session.resume_point(),
            created_at: session.created_at,
            updated_at: session.updated_at,
            started_at: session.started_at,
            completed_at: session.completed_at,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.current_stage == Stage::Completed
    }

    pub fn is_failed(&self) -> bool {
        self.current_stage == Stage::Failed
    }
}

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Turns repeated `get_status` calls into the same stage events the
/// broadcaster pushes: skips, completed and failed checkpoints, and the
/// terminal pipeline event.
pub struct StatusPoller {
    orchestrator: Arc<PipelineOrchestrator>,
    session_id: Uuid,
    interval: Duration,
    seen_checkpoints: usize,
    seen_skips: usize,
    terminal_sent: bool,
}

impl StatusPoller {
    pub fn new(orchestrator: Arc<PipelineOrchestrator>, session_id: Uuid) -> Self {
        Self {
            orchestrator,
            session_id,
            interval: DEFAULT_POLL_INTERVAL,
            seen_checkpoints: 0,
            seen_skips: 0,
            terminal_sent: false,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Events for everything that changed since the previous poll, oldest
    /// first. `None` when the session is unknown.
    pub async fn poll_once(&mut self) -> Option<Vec<ProgressEvent>> {
        let view = self.orchestrator.get_status(self.session_id).await?;
        Some(self.diff(&view))
    }

    fn diff(&mut self, view: &StatusView) -> Vec<ProgressEvent> {
        let mut changes: Vec<(DateTime<Utc>, Stage, ProgressEvent)> = Vec::new();
        if let Some(new) = view.checkpoints.get(self.seen_checkpoints..) {
            changes.extend(
                new.iter()
                    .map(|c| (c.timestamp, c.stage, ProgressEvent::from_checkpoint(c))),
            );
        }
        if let Some(new) = view.skipped.get(self.seen_skips..) {
            changes.extend(
                new.iter()
                    .map(|s| (s.timestamp, s.stage, ProgressEvent::from_skip(s))),
            );
        }
        self.seen_checkpoints = view.checkpoints.len();
        self.seen_skips = view.skipped.len();
        changes.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));

        let mut events: Vec<ProgressEvent> = changes.into_iter().map(|(_, _, e)| e).collect();

        if view.is_completed() && !self.terminal_sent {
            self.terminal_sent = true;
            events.push(ProgressEvent::pipeline_completed());
        } else if view.is_failed() && !self.terminal_sent {
            self.terminal_sent = true;
            events.push(failure_event(view));
        } else if !view.is_completed() && !view.is_failed() {
            // A failed session can be run again.
            self.terminal_sent = false;
        }
        events
    }

    /// Polls until a terminal event has been produced or the session
    /// disappears.
    pub fn into_stream(self) -> impl Stream<Item = ProgressEvent> {
        let state = (self, Vec::<ProgressEvent>::new().into_iter(), false);
        futures::stream::unfold(state, |(mut poller, mut pending, mut done)| async move {
            loop {
                if let Some(event) = pending.next() {
                    if event.kind.is_terminal() {
                        done = true;
                    }
                    return Some((event, (poller, pending, done)));
                }
                if done {
                    return None;
                }
                let events = poller.poll_once().await?;
                if events.is_empty() {
                    tokio::time::sleep(poller.interval).await;
                }
                pending = events.into_iter();
            }
        })
    }
}

/// Matches the event the pipeline publishes when it halts: a stage failure
/// when the latest checkpoint failed with the recorded error, otherwise an
/// out-of-band stop.
fn failure_event(view: &StatusView) -> ProgressEvent {
    let error = view.last_error.clone().unwrap_or_default();
    let last_successful = view
        .checkpoints
        .iter()
        .rev()
        .find(|c| c.success)
        .map(|c| c.stage);
    match view.checkpoints.last() {
        Some(last) if !last.success && last.error.as_deref() == Some(error.as_str()) => {
            ProgressEvent::pipeline_failed(last.stage, error, last_successful)
        }
        _ => ProgressEvent::pipeline_failed(Stage::Failed, error, last_successful),
    }
}
