use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::types::ProgressEnvelope;

#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("Subscriber closed")]
    Closed,

    #[error("Delivery failed: {0}")]
    Failed(String),
}

/// Receives progress for one session. Called from that session's drain task only,
/// so deliveries are sequential.
#[async_trait]
pub trait ProgressSubscriber: Send + Sync {
    async fn deliver(&self, envelope: ProgressEnvelope) -> Result<(), DeliveryError>;
}

/// Forwards envelopes into a bounded channel read by a transport (SSE, WebSocket).
///
/// Dropping the receiver makes the next delivery fail, which unregisters the
/// subscriber.
#[derive(Debug, Clone)]
pub struct ChannelSubscriber {
    tx: mpsc::Sender<ProgressEnvelope>,
}

impl ChannelSubscriber {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<ProgressEnvelope>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

#[async_trait]
impl ProgressSubscriber for ChannelSubscriber {
    async fn deliver(&self, envelope: ProgressEnvelope) -> Result<(), DeliveryError> {
        self.tx
            .send(envelope)
            .await
            .map_err(|_| DeliveryError::Closed)
    }
}
