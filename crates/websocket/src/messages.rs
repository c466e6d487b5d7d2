use serde::{Deserialize, Serialize};
use uuid::Uuid;

use events::{Event, EventEnvelope, ProgressEnvelope};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Subscribe {
        #[serde(default)]
        filter: Option<SubscriptionFilter>,
    },
    Unsubscribe,
    Ping,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// A stage, thought or pipeline event for one session.
    Progress { envelope: ProgressEnvelope },
    /// Any other session lifecycle event.
    Event { envelope: EventEnvelope },
    Subscribed { filter: Option<SubscriptionFilter> },
    Unsubscribed,
    Pong,
    Error { message: String },
}

impl ServerMessage {
    pub fn from_envelope(envelope: EventEnvelope) -> Self {
        match envelope.event {
            Event::Progress(progress) => Self::Progress { envelope: progress },
            _ => Self::Event { envelope },
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SubscriptionFilter {
    #[serde(default)]
    pub session_ids: Option<Vec<Uuid>>,
}

impl SubscriptionFilter {
    pub fn for_session(session_id: Uuid) -> Self {
        Self {
            session_ids: Some(vec![session_id]),
        }
    }

    pub fn for_sessions(session_ids: Vec<Uuid>) -> Self {
        Self {
            session_ids: Some(session_ids),
        }
    }

    pub fn matches(&self, envelope: &EventEnvelope) -> bool {
        match &self.session_ids {
            Some(ids) => ids.contains(&envelope.event.session_id()),
            None => true,
        }
    }
}
