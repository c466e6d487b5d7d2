use std::collections::VecDeque;
use std::convert::Infallible;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use events::{ChannelSubscriber, EventEnvelope, ProgressEnvelope};
use futures::stream::{Stream, StreamExt};
use serde::Deserialize;
use tokio_stream::wrappers::{BroadcastStream, ReceiverStream};
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 1000;
pub const SSE_KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    pub session_ids: Option<String>,
}

/// Recent feed events kept for clients reconnecting with `Last-Event-ID`.
pub struct EventBuffer {
    events: VecDeque<EventEnvelope>,
    max_size: usize,
}

impl EventBuffer {
    pub fn new(max_size: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(max_size),
            max_size,
        }
    }

    pub fn push(&mut self, envelope: EventEnvelope) {
        if self.events.len() >= self.max_size {
            self.events.pop_front();
        }
        self.events.push_back(envelope);
    }

    pub fn events_after(&self, event_id: Uuid) -> Vec<EventEnvelope> {
        self.events
            .iter()
            .position(|envelope| envelope.id == event_id)
            .map(|index| self.events.iter().skip(index + 1).cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

pub type SharedEventBuffer = Arc<RwLock<EventBuffer>>;

fn parse_session_ids(session_ids: Option<&str>) -> Option<Vec<Uuid>> {
    session_ids.map(|s| {
        s.split(',')
            .filter_map(|id| id.trim().parse().ok())
            .collect()
    })
}

fn envelope_to_sse_event(envelope: &EventEnvelope) -> Result<Event, Infallible> {
    let event_type = match &envelope.event {
        events::Event::SessionCreated { .. } => "session.created",
        events::Event::Progress(_) => "session.progress",
        events::Event::SessionMarkedFailed { .. } => "session.marked_failed",
    };

    let data = serde_json::to_string(&envelope).unwrap_or_else(|_| "{}".to_string());

    Ok(Event::default()
        .id(envelope.id.to_string())
        .event(event_type)
        .data(data))
}

fn progress_to_sse_event(envelope: &ProgressEnvelope) -> Result<Event, Infallible> {
    let data = serde_json::to_string(envelope).unwrap_or_else(|_| "{}".to_string());

    Ok(Event::default()
        .id(envelope.sequence.to_string())
        .event(envelope.event.kind.as_str())
        .data(data))
}

#[utoipa::path(
    get,
    path = "/api/events",
    params(
        ("session_ids" = Option<String>, Query, description = "Comma-separated session IDs to filter events"),
    ),
    responses(
        (status = 200, description = "SSE event stream"),
    ),
    tag = "events"
)]
pub async fn events_stream(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
    headers: axum::http::HeaderMap,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let session_ids = parse_session_ids(query.session_ids.as_deref());
    let last_event_id = headers
        .get("Last-Event-ID")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<Uuid>().ok());

    let buffer = Arc::clone(&state.event_buffer);
    let buffer_for_live = Arc::clone(&buffer);

    let rx = state.event_bus.subscribe();

    let wanted = {
        let session_ids = session_ids.clone();
        move |envelope: &EventEnvelope| {
            session_ids
                .as_ref()
                .map(|ids| ids.contains(&envelope.event.session_id()))
                .unwrap_or(true)
        }
    };

    let missed_events: Vec<EventEnvelope> = match last_event_id {
        Some(event_id) => buffer
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .events_after(event_id)
            .into_iter()
            .filter(|e| wanted(e))
            .collect(),
        None => vec![],
    };

    let missed_stream =
        futures::stream::iter(missed_events.into_iter().map(|e| envelope_to_sse_event(&e)));

    let live_stream = BroadcastStream::new(rx).filter_map(move |result| {
        let buffer = Arc::clone(&buffer_for_live);
        let wanted = wanted.clone();

        async move {
            match result {
                Ok(envelope) => {
                    buffer
                        .write()
                        .unwrap_or_else(|poisoned| poisoned.into_inner())
                        .push(envelope.clone());

                    if wanted(&envelope) {
                        Some(envelope_to_sse_event(&envelope))
                    } else {
                        None
                    }
                }
                Err(e) => {
                    tracing::warn!(error = ?e, "SSE broadcast error");
                    None
                }
            }
        }
    });

    let stream = missed_stream.chain(live_stream);

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(SSE_KEEP_ALIVE_INTERVAL)
            .text("keep-alive"),
    )
}

/// Streams one session's progress through the broadcaster. A newer client
/// for the same session takes over and ends this stream.
#[utoipa::path(
    get,
    path = "/api/sessions/{id}/progress",
    params(
        ("id" = Uuid, Path, description = "Session ID"),
    ),
    responses(
        (status = 200, description = "SSE progress stream"),
        (status = 404, description = "Session not found"),
    ),
    tag = "sessions"
)]
pub async fn session_progress_stream(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    if state.orchestrator.get_status(id).await.is_none() {
        return Err(AppError::NotFound(format!("Session not found: {}", id)));
    }

    let (subscriber, rx) = ChannelSubscriber::new(state.progress_capacity());
    state
        .orchestrator
        .subscribe_progress(id, Arc::new(subscriber));
    tracing::debug!(session_id = %id, "Progress stream opened");

    let stream = ReceiverStream::new(rx).map(|envelope| progress_to_sse_event(&envelope));

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(SSE_KEEP_ALIVE_INTERVAL)
            .text("keep-alive"),
    ))
}
