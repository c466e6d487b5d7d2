//! Per-session progress fan-out.
//!
//! Each registered subscriber gets its own bounded channel and a drain task.
//! Publishing is a non-blocking `try_send`, so a slow subscriber loses events
//! instead of stalling the pipeline that produces them.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use serde::Serialize;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::bus::EventBus;
use crate::subscriber::ProgressSubscriber;
use crate::types::{Event, EventEnvelope, ProgressEnvelope, ProgressEvent};

pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    Queued,
    NoSubscriber,
    /// The subscriber's channel was full.
    Dropped,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BroadcasterStats {
    pub published: usize,
    pub queued: usize,
    pub dropped: usize,
    pub no_subscriber: usize,
    pub delivered: usize,
    pub delivery_failures: usize,
    pub active_subscribers: usize,
}

struct Registration {
    generation: u64,
    sender: mpsc::Sender<ProgressEnvelope>,
}

#[derive(Default)]
struct Counters {
    published: AtomicUsize,
    queued: AtomicUsize,
    dropped: AtomicUsize,
    no_subscriber: AtomicUsize,
    delivered: AtomicUsize,
    delivery_failures: AtomicUsize,
}

struct Inner {
    capacity: usize,
    channels: RwLock<HashMap<Uuid, Registration>>,
    sequence: AtomicU64,
    generation: AtomicU64,
    bus: Option<EventBus>,
    counters: Counters,
}

impl Inner {
    /// Removes the registration only if it is still the one identified by `generation`.
    fn remove_generation(&self, session_id: Uuid, generation: u64) -> bool {
        let mut channels = self.channels.write().unwrap_or_else(|p| p.into_inner());
        match channels.get(&session_id) {
            Some(reg) if reg.generation == generation => {
                channels.remove(&session_id);
                true
            }
            _ => false,
        }
    }
}

#[derive(Clone)]
pub struct ProgressBroadcaster {
    inner: Arc<Inner>,
}

impl ProgressBroadcaster {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self::build(capacity, None)
    }

    /// Also forwards every envelope to `bus`.
    pub fn with_bus(capacity: usize, bus: EventBus) -> Self {
        Self::build(capacity, Some(bus))
    }

    fn build(capacity: usize, bus: Option<EventBus>) -> Self {
        Self {
            inner: Arc::new(Inner {
                capacity: capacity.max(1),
                channels: RwLock::new(HashMap::new()),
                sequence: AtomicU64::new(0),
                generation: AtomicU64::new(0),
                bus,
                counters: Counters::default(),
            }),
        }
    }

    pub fn bus(&self) -> Option<&EventBus> {
        self.inner.bus.as_ref()
    }

    /// Registers `subscriber` for `session_id`, replacing any previous one.
    ///
    /// Must be called within a tokio runtime.
    pub fn register(&self, session_id: Uuid, subscriber: Arc<dyn ProgressSubscriber>) {
        let (tx, mut rx) = mpsc::channel::<ProgressEnvelope>(self.inner.capacity);
        let generation = self.inner.generation.fetch_add(1, Ordering::Relaxed) + 1;

        let replaced = self
            .inner
            .channels
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .insert(
                session_id,
                Registration {
                    generation,
                    sender: tx,
                },
            )
            .is_some();

        debug!(session_id = %session_id, generation, replaced, "Registered progress subscriber");

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            while let Some(envelope) = rx.recv().await {
                match subscriber.deliver(envelope).await {
                    Ok(()) => {
                        inner.counters.delivered.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => {
                        inner
                            .counters
                            .delivery_failures
                            .fetch_add(1, Ordering::Relaxed);
                        let removed = inner.remove_generation(session_id, generation);
                        warn!(
                            session_id = %session_id,
                            error = %e,
                            removed,
                            "Progress delivery failed, dropping subscriber"
                        );
                        break;
                    }
                }
            }
            debug!(session_id = %session_id, generation, "Progress drain task finished");
        });
    }

    /// Drops the session's channel. Already queued events are still delivered.
    pub fn unregister(&self, session_id: Uuid) -> bool {
        let removed = self
            .inner
            .channels
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .remove(&session_id)
            .is_some();
        if removed {
            debug!(session_id = %session_id, "Unregistered progress subscriber");
        }
        removed
    }

    pub fn is_registered(&self, session_id: Uuid) -> bool {
        self.inner
            .channels
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .contains_key(&session_id)
    }

    /// Never blocks and never fails.
    pub fn publish(&self, session_id: Uuid, event: ProgressEvent) -> PublishOutcome {
        let counters = &self.inner.counters;
        counters.published.fetch_add(1, Ordering::Relaxed);

        let sequence = self.inner.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let envelope = ProgressEnvelope::new(session_id, sequence, event);

        if let Some(bus) = &self.inner.bus {
            bus.publish(EventEnvelope::new(Event::Progress(envelope.clone())));
        }

        let sender = self
            .inner
            .channels
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(&session_id)
            .map(|reg| reg.sender.clone());

        let Some(sender) = sender else {
            counters.no_subscriber.fetch_add(1, Ordering::Relaxed);
            return PublishOutcome::NoSubscriber;
        };

        match sender.try_send(envelope) {
            Ok(()) => {
                counters.queued.fetch_add(1, Ordering::Relaxed);
                PublishOutcome::Queued
            }
            Err(TrySendError::Full(_)) => {
                counters.dropped.fetch_add(1, Ordering::Relaxed);
                debug!(session_id = %session_id, sequence, "Progress channel full, event dropped");
                PublishOutcome::Dropped
            }
            Err(TrySendError::Closed(_)) => {
                counters.no_subscriber.fetch_add(1, Ordering::Relaxed);
                PublishOutcome::NoSubscriber
            }
        }
    }

    /// Drops every channel. Drain tasks flush what is queued, then exit.
    pub fn shutdown(&self) {
        let mut channels = self
            .inner
            .channels
            .write()
            .unwrap_or_else(|p| p.into_inner());
        let count = channels.len();
        channels.clear();
        debug!(count, "Progress broadcaster shut down");
    }

    pub fn stats(&self) -> BroadcasterStats {
        let c = &self.inner.counters;
        BroadcasterStats {
            published: c.published.load(Ordering::Relaxed),
            queued: c.queued.load(Ordering::Relaxed),
            dropped: c.dropped.load(Ordering::Relaxed),
            no_subscriber: c.no_subscriber.load(Ordering::Relaxed),
            delivered: c.delivered.load(Ordering::Relaxed),
            delivery_failures: c.delivery_failures.load(Ordering::Relaxed),
            active_subscribers: self
                .inner
                .channels
                .read()
                .unwrap_or_else(|p| p.into_inner())
                .len(),
        }
    }
}

impl Default for ProgressBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ProgressBroadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressBroadcaster")
            .field("capacity", &self.inner.capacity)
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscriber::{ChannelSubscriber, DeliveryError};
    use crate::types::ProgressKind;
    use async_trait::async_trait;
    use insights_core::Stage;
    use std::time::Duration;
    use tokio::sync::{Mutex, Notify};

    struct Failing;

    #[async_trait]
    impl ProgressSubscriber for Failing {
        async fn deliver(&self, _envelope: ProgressEnvelope) -> Result<(), DeliveryError> {
            Err(DeliveryError::Failed("socket gone".to_string()))
        }
    }

    /// Blocks every delivery until released.
    struct Gated {
        gate: Arc<Notify>,
        seen: Arc<Mutex<Vec<u64>>>,
    }

    #[async_trait]
    impl ProgressSubscriber for Gated {
        async fn deliver(&self, envelope: ProgressEnvelope) -> Result<(), DeliveryError> {
            self.gate.notified().await;
            self.seen.lock().await.push(envelope.sequence);
            Ok(())
        }
    }

    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_publish_without_subscriber() {
        let broadcaster = ProgressBroadcaster::new();
        let outcome = broadcaster.publish(Uuid::new_v4(), ProgressEvent::pipeline_completed());
        assert_eq!(outcome, PublishOutcome::NoSubscriber);
        assert_eq!(broadcaster.stats().no_subscriber, 1);
    }

    #[tokio::test]
    async fn test_events_arrive_in_order() {
        let broadcaster = ProgressBroadcaster::new();
        let session_id = Uuid::new_v4();
        let (subscriber, mut rx) = ChannelSubscriber::new(16);
        broadcaster.register(session_id, Arc::new(subscriber));

        for stage in [Stage::DataIngestion, Stage::MenuExtraction, Stage::SalesProcessing] {
            assert_eq!(
                broadcaster.publish(session_id, ProgressEvent::stage_started(stage)),
                PublishOutcome::Queued
            );
        }

        let mut stages = Vec::new();
        let mut last_sequence = 0;
        for _ in 0..3 {
            let envelope = rx.recv().await.unwrap();
            assert!(envelope.sequence > last_sequence);
            last_sequence = envelope.sequence;
            assert_eq!(envelope.session_id, session_id);
            stages.push(envelope.event.stage);
        }
        assert_eq!(
            stages,
            vec![Stage::DataIngestion, Stage::MenuExtraction, Stage::SalesProcessing]
        );
    }

    #[tokio::test]
    async fn test_failing_subscriber_is_unregistered() {
        let broadcaster = ProgressBroadcaster::new();
        let session_id = Uuid::new_v4();
        broadcaster.register(session_id, Arc::new(Failing));

        broadcaster.publish(session_id, ProgressEvent::pipeline_completed());
        settle().await;

        assert!(!broadcaster.is_registered(session_id));
        let stats = broadcaster.stats();
        assert_eq!(stats.delivery_failures, 1);
        assert_eq!(stats.active_subscribers, 0);
        assert_eq!(
            broadcaster.publish(session_id, ProgressEvent::pipeline_completed()),
            PublishOutcome::NoSubscriber
        );
    }

    #[tokio::test]
    async fn test_replacement_survives_old_failure() {
        let broadcaster = ProgressBroadcaster::new();
        let session_id = Uuid::new_v4();
        let gate = Arc::new(Notify::new());
        let seen = Arc::new(Mutex::new(Vec::new()));

        // The failing subscriber is replaced before its drain task sees the event.
        broadcaster.register(session_id, Arc::new(Failing));
        broadcaster.publish(session_id, ProgressEvent::stage_started(Stage::DataIngestion));
        broadcaster.register(
            session_id,
            Arc::new(Gated {
                gate: Arc::clone(&gate),
                seen: Arc::clone(&seen),
            }),
        );
        settle().await;

        assert!(broadcaster.is_registered(session_id));
        broadcaster.publish(session_id, ProgressEvent::pipeline_completed());
        gate.notify_one();
        settle().await;

        assert_eq!(seen.lock().await.len(), 1);
        assert!(broadcaster.is_registered(session_id));
    }

    #[tokio::test]
    async fn test_full_channel_counts_drops() {
        let broadcaster = ProgressBroadcaster::with_capacity(2);
        let session_id = Uuid::new_v4();
        let gate = Arc::new(Notify::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        broadcaster.register(
            session_id,
            Arc::new(Gated {
                gate: Arc::clone(&gate),
                seen: Arc::clone(&seen),
            }),
        );

        // First event is taken by the drain task and parks on the gate.
        broadcaster.publish(session_id, ProgressEvent::stage_started(Stage::DataIngestion));
        settle().await;

        let outcomes: Vec<_> = (0..4)
            .map(|_| broadcaster.publish(session_id, ProgressEvent::stage_started(Stage::MenuExtraction)))
            .collect();
        assert_eq!(
            outcomes,
            vec![
                PublishOutcome::Queued,
                PublishOutcome::Queued,
                PublishOutcome::Dropped,
                PublishOutcome::Dropped,
            ]
        );
        assert_eq!(broadcaster.stats().dropped, 2);

        for _ in 0..3 {
            gate.notify_one();
            settle().await;
        }
        assert_eq!(seen.lock().await.len(), 3);
    }

    #[tokio::test]
    async fn test_unregister_flushes_queue() {
        let broadcaster = ProgressBroadcaster::new();
        let session_id = Uuid::new_v4();
        let (subscriber, mut rx) = ChannelSubscriber::new(16);
        broadcaster.register(session_id, Arc::new(subscriber));

        broadcaster.publish(session_id, ProgressEvent::pipeline_completed());
        assert!(broadcaster.unregister(session_id));
        assert!(!broadcaster.unregister(session_id));

        let envelope = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(envelope.event.kind, ProgressKind::PipelineCompleted);
        // Drain task exited and dropped the subscriber, closing the channel.
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_shutdown_drops_all_channels() {
        let broadcaster = ProgressBroadcaster::new();
        let (a, _rx_a) = ChannelSubscriber::new(4);
        let (b, _rx_b) = ChannelSubscriber::new(4);
        broadcaster.register(Uuid::new_v4(), Arc::new(a));
        broadcaster.register(Uuid::new_v4(), Arc::new(b));
        assert_eq!(broadcaster.stats().active_subscribers, 2);

        broadcaster.shutdown();
        assert_eq!(broadcaster.stats().active_subscribers, 0);
    }

    #[tokio::test]
    async fn test_forwards_to_bus() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let broadcaster = ProgressBroadcaster::with_bus(8, bus);
        let session_id = Uuid::new_v4();

        broadcaster.publish(session_id, ProgressEvent::pipeline_completed());

        let envelope = rx.recv().await.unwrap();
        assert_eq!(envelope.event.session_id(), session_id);
    }
}
