//! Drives an analysis session through the fixed stage order.
//!
//! A run works on a private copy of the session and snapshots it into the
//! registry and the store after every stage, so nothing is locked while a
//! handler awaits its analyzers.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use events::{Event, EventEnvelope, ProgressBroadcaster, ProgressEvent, ProgressSubscriber};
use insights_core::{
    AnalysisData, AnalysisSession, Checkpoint, RestaurantProfile, Stage, StageInputs, StageSkip,
    ThoughtTrace,
};
use serde::{Deserialize, Serialize};
use store::SessionStore;
use tracing::{debug, error, info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::analyzers::Analyzers;
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::registry::{InMemoryRegistry, SessionRegistry};
use crate::stage::{Requirement, StageContext, StageHandler};
use crate::stages::default_handlers;
use crate::status::StatusView;
use crate::trace::ThoughtTraceRecorder;

/// Outcome of a run that reached the end of the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct PipelineReport {
    pub session_id: Uuid,
    pub status: Stage,
    pub data: AnalysisData,
    pub checkpoints: Vec<Checkpoint>,
    pub skipped: Vec<StageSkip>,
    pub thought_traces: Vec<ThoughtTrace>,
}

impl PipelineReport {
    pub fn from_session(session: &AnalysisSession) -> Self {
        Self {
            session_id: session.id,
            status: session.current_stage,
            data: session.data.clone(),
            checkpoints: session.checkpoints.clone(),
            skipped: session.skipped.clone(),
            thought_traces: session.thought_traces.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct SessionListEntry {
    pub session_id: Uuid,
    pub current_stage: Stage,
}

type InFlight = Arc<Mutex<HashSet<Uuid>>>;

/// Holds a session's slot in the in-flight set until the run returns or is dropped.
struct RunGuard {
    in_flight: InFlight,
    session_id: Uuid,
}

impl RunGuard {
    fn acquire(in_flight: &InFlight, session_id: Uuid) -> Option<Self> {
        let inserted = in_flight
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(session_id);
        inserted.then(|| Self {
            in_flight: in_flight.clone(),
            session_id,
        })
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .remove(&self.session_id);
    }
}

pub struct PipelineOrchestrator {
    store: Arc<dyn SessionStore>,
    registry: Arc<dyn SessionRegistry>,
    broadcaster: ProgressBroadcaster,
    recorder: ThoughtTraceRecorder,
    analyzers: Analyzers,
    config: PipelineConfig,
    handlers: Vec<Arc<dyn StageHandler>>,
    in_flight: InFlight,
}

impl PipelineOrchestrator {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        let config = PipelineConfig::default();
        let broadcaster = ProgressBroadcaster::with_capacity(config.progress_channel_capacity);
        Self {
            store,
            registry: Arc::new(InMemoryRegistry::new()),
            recorder: ThoughtTraceRecorder::new(broadcaster.clone()),
            broadcaster,
            analyzers: Analyzers::default(),
            config,
            handlers: default_handlers(),
            in_flight: InFlight::default(),
        }
    }

    pub fn with_registry(mut self, registry: Arc<dyn SessionRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_broadcaster(mut self, broadcaster: ProgressBroadcaster) -> Self {
        self.recorder = ThoughtTraceRecorder::new(broadcaster.clone());
        self.broadcaster = broadcaster;
        self
    }

    pub fn with_analyzers(mut self, analyzers: Analyzers) -> Self {
        self.analyzers = analyzers;
        self
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Replaces the handler registered for `handler.stage()`.
    pub fn with_handler(mut self, handler: Arc<dyn StageHandler>) -> Self {
        let stage = handler.stage();
        match self.handlers.iter_mut().find(|h| h.stage() == stage) {
            Some(slot) => *slot = handler,
            None => {
                self.handlers.push(handler);
                self.handlers.sort_by_key(|h| h.stage());
            }
        }
        self
    }

    pub fn broadcaster(&self) -> &ProgressBroadcaster {
        &self.broadcaster
    }

    pub fn registry(&self) -> &Arc<dyn SessionRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub async fn create_session(&self, profile: RestaurantProfile) -> Result<Uuid> {
        let session = AnalysisSession::new(profile);
        let session_id = session.id;
        self.store.save(&session).await?;

        if let Some(bus) = self.broadcaster.bus() {
            bus.publish(EventEnvelope::new(Event::SessionCreated {
                session_id,
                name: session.profile.name.clone(),
            }));
        }
        self.registry.put(session);

        info!(session_id = %session_id, "Analysis session created");
        Ok(session_id)
    }

    /// Runs every stage after the last successful checkpoint.
    ///
    /// A completed session is not executed again; its stored report is
    /// returned as is.
    pub async fn run(&self, session_id: Uuid, inputs: StageInputs) -> Result<PipelineReport> {
        let mut session = self
            .load_session(session_id)
            .await
            .ok_or(PipelineError::SessionNotFound(session_id))?;

        if session.is_completed() {
            info!(session_id = %session_id, "Session already completed, returning stored report");
            return Ok(PipelineReport::from_session(&session));
        }

        let _guard = RunGuard::acquire(&self.in_flight, session_id).ok_or_else(|| {
            PipelineError::InvalidState(format!("session {session_id} is already running"))
        })?;

        if let Some(profile) = inputs.profile.clone() {
            session.profile = profile;
        }
        session.begin();
        self.store.save(&session).await?;
        self.registry.put(session.clone());

        let resume_point = session.resume_point();
        // Stages before a failed checkpoint were already decided by that run.
        let decided_before = session
            .checkpoints
            .last()
            .filter(|c| !c.success)
            .map(|c| c.stage);
        info!(
            session_id = %session_id,
            resume_point = %resume_point,
            "Running analysis pipeline"
        );

        for handler in &self.handlers {
            let stage = handler.stage();
            if stage.ordinal() <= resume_point.ordinal()
                || decided_before.is_some_and(|failed| stage < failed)
            {
                debug!(session_id = %session_id, stage = %stage, "Stage already settled, not re-running");
                continue;
            }

            if let Some(reason) = self.stop_requested(session_id) {
                warn!(session_id = %session_id, stage = %stage, reason = %reason, "Run stopped before stage");
                return Err(PipelineError::Stopped { session_id, reason });
            }

            let requirement = handler.requirement();
            if !requirement.is_satisfied(&session, &inputs) {
                self.skip_stage(&mut session, stage, requirement).await?;
                continue;
            }

            self.broadcaster
                .publish(session_id, ProgressEvent::stage_started(stage));
            debug!(session_id = %session_id, stage = %stage, "Executing stage");

            let before = session.clone();
            let started = Instant::now();
            let outcome = {
                let mut ctx = StageContext::new(
                    stage,
                    &mut session,
                    &inputs,
                    &self.analyzers,
                    &self.config,
                    &self.recorder,
                );
                handler.execute(&mut ctx).await
            };
            let duration_ms = started.elapsed().as_millis() as u64;

            if let Some(reason) = self.stop_requested(session_id) {
                warn!(session_id = %session_id, stage = %stage, reason = %reason, "Run stopped during stage, discarding its result");
                return Err(PipelineError::Stopped { session_id, reason });
            }

            match outcome {
                Ok(()) => {
                    let checkpoint = Checkpoint::succeeded(stage, duration_ms);
                    let event = ProgressEvent::from_checkpoint(&checkpoint);
                    session
                        .record_checkpoint(checkpoint)
                        .map_err(|e| PipelineError::InvalidState(e.to_string()))?;
                    if let Err(e) = self.store.save(&session).await {
                        // The stage result never reached the store; fail from the last saved state.
                        let message = format!("stage result could not be persisted: {e}");
                        return Err(self.fail_stage(before, stage, message, duration_ms).await);
                    }
                    if !self.registry.update_running(session.clone()) {
                        return Err(self.halt_for_stop(session_id).await);
                    }
                    self.broadcaster.publish(session_id, event);
                    info!(session_id = %session_id, stage = %stage, duration_ms, "Stage completed");
                }
                Err(e) => {
                    return Err(self
                        .fail_stage(session, stage, e.to_string(), duration_ms)
                        .await);
                }
            }
        }

        session.complete();
        self.store.save(&session).await?;
        if !self.registry.update_running(session.clone()) {
            return Err(self.halt_for_stop(session_id).await);
        }
        self.broadcaster
            .publish(session_id, ProgressEvent::pipeline_completed());

        info!(
            session_id = %session_id,
            checkpoints = session.checkpoints.len(),
            skipped = session.skipped.len(),
            "Analysis pipeline completed"
        );
        Ok(PipelineReport::from_session(&session))
    }

    /// Read-only view of a session. Unknown ids and unreadable records give `None`.
    pub async fn get_status(&self, session_id: Uuid) -> Option<StatusView> {
        self.load_session(session_id)
            .await
            .map(|session| StatusView::from_session(&session))
    }

    /// Loads a persisted session into the registry without running anything.
    pub async fn resume(&self, session_id: Uuid) -> Option<StatusView> {
        if let Some(session) = self.registry.get(session_id) {
            return Some(StatusView::from_session(&session));
        }

        let session = self.store.load(session_id).await?;
        let view = StatusView::from_session(&session);
        if session.is_completed() {
            self.registry.move_to_completed(session);
        } else {
            info!(
                session_id = %session_id,
                resume_point = %session.resume_point(),
                "Session rehydrated from store"
            );
            self.registry.put(session);
        }
        Some(view)
    }

    /// Stops a session out of band. A run in progress halts before its next
    /// checkpoint; a later `run` resumes after the last successful stage.
    ///
    /// The registry entry is failed in place, so a stage finishing at the same
    /// moment cannot overwrite the stop.
    pub async fn mark_failed(&self, session_id: Uuid, reason: impl Into<String>) -> Result<StatusView> {
        let reason = reason.into();
        if self.resume(session_id).await.is_none() {
            return Err(PipelineError::SessionNotFound(session_id));
        }
        let Some(session) = self.registry.fail_active(session_id, &reason) else {
            return Err(match self.registry.get_completed(session_id) {
                Some(_) => PipelineError::InvalidState(format!(
                    "session {session_id} is already completed"
                )),
                None => PipelineError::SessionNotFound(session_id),
            });
        };
        self.store.save(&session).await?;

        self.broadcaster.publish(
            session_id,
            ProgressEvent::pipeline_failed(Stage::Failed, reason.clone(), session.last_successful_stage()),
        );
        if let Some(bus) = self.broadcaster.bus() {
            bus.publish(EventEnvelope::new(Event::SessionMarkedFailed {
                session_id,
                reason: reason.clone(),
            }));
        }

        warn!(session_id = %session_id, reason = %reason, "Session marked failed");
        Ok(StatusView::from_session(&session))
    }

    /// Every known session, cached or only persisted. Records that no longer
    /// load are left out.
    pub async fn list_sessions(&self) -> Result<Vec<SessionListEntry>> {
        let mut stages: HashMap<Uuid, Stage> = self.registry.list().into_iter().collect();
        for id in self.store.list_ids().await? {
            if stages.contains_key(&id) {
                continue;
            }
            if let Some(session) = self.store.load(id).await {
                stages.insert(id, session.current_stage);
            }
        }

        let mut entries: Vec<SessionListEntry> = stages
            .into_iter()
            .map(|(session_id, current_stage)| SessionListEntry {
                session_id,
                current_stage,
            })
            .collect();
        entries.sort_by_key(|e| e.session_id);
        Ok(entries)
    }

    /// Removes a session from the caches and the store. Refused while a run
    /// of it is in flight.
    pub async fn delete_session(&self, session_id: Uuid) -> Result<()> {
        if self.is_running(session_id) {
            return Err(PipelineError::InvalidState(format!(
                "session {session_id} is running"
            )));
        }

        let cached = self.registry.remove(session_id).is_some();
        let stored = self.store.delete(session_id).await?;
        self.broadcaster.unregister(session_id);
        if !cached && !stored {
            return Err(PipelineError::SessionNotFound(session_id));
        }

        info!(session_id = %session_id, "Analysis session deleted");
        Ok(())
    }

    pub fn is_running(&self, session_id: Uuid) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .contains(&session_id)
    }

    pub fn subscribe_progress(&self, session_id: Uuid, subscriber: Arc<dyn ProgressSubscriber>) {
        self.broadcaster.register(session_id, subscriber);
    }

    pub fn unsubscribe_progress(&self, session_id: Uuid) -> bool {
        self.broadcaster.unregister(session_id)
    }

    async fn load_session(&self, session_id: Uuid) -> Option<AnalysisSession> {
        if let Some(session) = self.registry.get(session_id) {
            return Some(session);
        }
        self.store.load(session_id).await
    }

    /// Makes sure the store ends with the stopped copy, then reports the stop.
    async fn halt_for_stop(&self, session_id: Uuid) -> PipelineError {
        let Some(stopped) = self.registry.get(session_id).filter(AnalysisSession::is_failed) else {
            return PipelineError::InvalidState(format!(
                "session {session_id} left the registry during its run"
            ));
        };
        if let Err(e) = self.store.save(&stopped).await {
            error!(session_id = %session_id, error = %e, "Failed to persist stopped session");
        }
        let reason = stopped.last_error.unwrap_or_default();
        warn!(session_id = %session_id, reason = %reason, "Run stopped, discarding its last result");
        PipelineError::Stopped { session_id, reason }
    }

    fn stop_requested(&self, session_id: Uuid) -> Option<String> {
        self.registry
            .get(session_id)
            .filter(AnalysisSession::is_failed)
            .map(|s| s.last_error.unwrap_or_default())
    }

    async fn skip_stage(
        &self,
        session: &mut AnalysisSession,
        stage: Stage,
        requirement: Requirement,
    ) -> Result<()> {
        let detail = format!("requires {}", requirement.describe());
        if !session.record_skip(stage, Some(detail)) {
            debug!(session_id = %session.id, stage = %stage, "Stage skip already recorded");
            return Ok(());
        }
        info!(
            session_id = %session.id,
            stage = %stage,
            requirement = requirement.describe(),
            "Skipping stage, input not provided"
        );

        if self.config.persist_skips {
            self.store.save(session).await?;
        }
        if !self.registry.update_running(session.clone()) {
            return Err(self.halt_for_stop(session.id).await);
        }

        if let Some(skip) = session.skipped.last() {
            self.broadcaster
                .publish(session.id, ProgressEvent::from_skip(skip));
        }
        Ok(())
    }

    async fn fail_stage(
        &self,
        mut session: AnalysisSession,
        stage: Stage,
        message: String,
        duration_ms: u64,
    ) -> PipelineError {
        let session_id = session.id;
        error!(session_id = %session_id, stage = %stage, error = %message, "Stage failed");

        let checkpoint = Checkpoint::failed(stage, message.clone(), duration_ms);
        let event = ProgressEvent::from_checkpoint(&checkpoint);
        if let Err(e) = session.record_checkpoint(checkpoint) {
            return PipelineError::InvalidState(e.to_string());
        }
        let last_successful_stage = session.last_successful_stage();
        session.fail(message.clone());

        self.registry.put(session.clone());
        if let Err(e) = self.store.save(&session).await {
            error!(session_id = %session_id, error = %e, "Failed to persist failed session");
        }

        self.broadcaster.publish(session_id, event);
        self.broadcaster.publish(
            session_id,
            ProgressEvent::pipeline_failed(stage, message.clone(), last_successful_stage),
        );

        PipelineError::StageExecution {
            session_id,
            stage,
            last_successful_stage,
            message,
            partial: Box::new(session.data),
        }
    }
}

impl std::fmt::Debug for PipelineOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineOrchestrator")
            .field("config", &self.config)
            .field("handlers", &self.handlers.len())
            .finish_non_exhaustive()
    }
}
