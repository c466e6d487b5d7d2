//! Progress events for analysis sessions.
//!
//! `ProgressBroadcaster` fans stage transitions and thought lines out to
//! one subscriber per session through bounded channels; `EventBus` carries
//! every envelope to all-sessions observers.

mod broadcaster;
mod bus;
mod subscriber;
mod types;

pub use broadcaster::{BroadcasterStats, ProgressBroadcaster, PublishOutcome, DEFAULT_CHANNEL_CAPACITY};
pub use bus::EventBus;
pub use subscriber::{ChannelSubscriber, DeliveryError, ProgressSubscriber};
pub use types::*;
