use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast;
use tokio::time::interval;

use events::EventBus;

use crate::messages::{ClientMessage, ServerMessage, SubscriptionFilter};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const CLIENT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct WsState {
    pub event_bus: EventBus,
}

impl WsState {
    pub fn new(event_bus: EventBus) -> Self {
        Self { event_bus }
    }
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<WsState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

fn encode(message: &ServerMessage) -> Option<Message> {
    match serde_json::to_string(message) {
        Ok(json) => Some(Message::Text(json.into())),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to encode WebSocket message");
            None
        }
    }
}

async fn handle_socket(socket: WebSocket, state: Arc<WsState>) {
    let (mut sender, mut receiver) = socket.split();

    let mut event_rx = state.event_bus.subscribe();
    let mut filter: Option<SubscriptionFilter> = None;
    let mut subscribed = false;

    let mut heartbeat = interval(HEARTBEAT_INTERVAL);
    heartbeat.reset();

    loop {
        let outgoing = tokio::select! {
            _ = heartbeat.tick() => encode(&ServerMessage::Pong),

            event_result = event_rx.recv() => {
                match event_result {
                    Ok(envelope) => {
                        let wanted = subscribed
                            && filter.as_ref().map(|f| f.matches(&envelope)).unwrap_or(true);
                        if wanted {
                            encode(&ServerMessage::from_envelope(envelope))
                        } else {
                            None
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(missed = n, "WebSocket client lagged behind the event feed");
                        None
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }

            msg = tokio::time::timeout(CLIENT_TIMEOUT + HEARTBEAT_INTERVAL, receiver.next()) => {
                match msg {
                    Ok(Some(Ok(Message::Text(text)))) => {
                        let response = match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(ClientMessage::Subscribe { filter: new_filter }) => {
                                tracing::debug!(filter = ?new_filter, "WebSocket client subscribed");
                                filter = new_filter.clone();
                                subscribed = true;
                                ServerMessage::Subscribed { filter: new_filter }
                            }
                            Ok(ClientMessage::Unsubscribe) => {
                                subscribed = false;
                                filter = None;
                                ServerMessage::Unsubscribed
                            }
                            Ok(ClientMessage::Ping) => ServerMessage::Pong,
                            Err(e) => ServerMessage::Error {
                                message: format!("Invalid message: {}", e),
                            },
                        };
                        encode(&response)
                    }
                    Ok(Some(Ok(Message::Close(_)))) => break,
                    Ok(Some(Ok(Message::Ping(data)))) => Some(Message::Pong(data)),
                    Ok(Some(Ok(_))) => None,
                    Ok(Some(Err(_))) | Ok(None) => break,
                    Err(_) => {
                        tracing::debug!("WebSocket client idle past timeout");
                        None
                    }
                }
            }
        };

        if let Some(message) = outgoing {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    }

    tracing::debug!("WebSocket connection closed");
}
