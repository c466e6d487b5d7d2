use std::sync::{Arc, RwLock};

use events::{EventBus, ProgressBroadcaster};
use orchestrator::{Analyzers, PipelineConfig, PipelineOrchestrator};
use store::SessionStore;

use crate::routes::sse::{EventBuffer, SharedEventBuffer, DEFAULT_EVENT_BUFFER_SIZE};

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<PipelineOrchestrator>,
    pub event_bus: EventBus,
    pub event_buffer: SharedEventBuffer,
}

impl AppState {
    pub fn new(store: Arc<dyn SessionStore>, config: PipelineConfig) -> Self {
        Self::with_analyzers(store, config, Analyzers::default())
    }

    pub fn with_analyzers(
        store: Arc<dyn SessionStore>,
        config: PipelineConfig,
        analyzers: Analyzers,
    ) -> Self {
        let event_bus = EventBus::new();
        let event_buffer = Arc::new(RwLock::new(EventBuffer::new(DEFAULT_EVENT_BUFFER_SIZE)));
        let broadcaster =
            ProgressBroadcaster::with_bus(config.progress_channel_capacity, event_bus.clone());
        let orchestrator = PipelineOrchestrator::new(store)
            .with_broadcaster(broadcaster)
            .with_analyzers(analyzers)
            .with_config(config);

        Self {
            orchestrator: Arc::new(orchestrator),
            event_bus,
            event_buffer,
        }
    }

    /// Capacity of the per-client progress channel for SSE streams.
    pub fn progress_capacity(&self) -> usize {
        self.orchestrator.config().progress_channel_capacity
    }
}
