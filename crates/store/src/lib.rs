//! Durable persistence for analysis sessions.
//!
//! Every backend stores the whole session as one serialized record and
//! overwrites it on save. A record that no longer parses loads as `None`.

mod error;
mod file_store;
mod memory;
mod pool;
mod sqlite_store;

use async_trait::async_trait;
use insights_core::AnalysisSession;
use uuid::Uuid;

pub use error::{Result, StoreError};
pub use file_store::JsonFileStore;
pub use memory::MemoryStore;
pub use pool::{create_pool, run_migrations};
pub use sqlite_store::SqliteStore;

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Fully replaces the stored record for `session.id`.
    async fn save(&self, session: &AnalysisSession) -> Result<()>;

    /// `None` when no record exists or the record cannot be parsed.
    async fn load(&self, id: Uuid) -> Option<AnalysisSession>;

    /// Returns true if a record was removed.
    async fn delete(&self, id: Uuid) -> Result<bool>;

    async fn list_ids(&self) -> Result<Vec<Uuid>>;
}

/// Serializes `session`, refusing a record that would not load again.
///
/// serde_json writes non-finite floats as `null`, which no longer parses
/// back into an `f64`.
pub(crate) fn encode(session: &AnalysisSession, pretty: bool) -> Result<String> {
    let raw = if pretty {
        serde_json::to_string_pretty(session)?
    } else {
        serde_json::to_string(session)?
    };
    if let Err(e) = serde_json::from_str::<AnalysisSession>(&raw) {
        return Err(StoreError::Unreadable {
            session_id: session.id,
            reason: e.to_string(),
        });
    }
    Ok(raw)
}

pub(crate) fn decode(id: Uuid, raw: &str) -> Option<AnalysisSession> {
    match serde_json::from_str(raw) {
        Ok(session) => Some(session),
        Err(e) => {
            tracing::warn!(session_id = %id, error = %e, "Discarding unreadable session record");
            None
        }
    }
}
