use async_trait::async_trait;
use insights_core::AnalysisSession;
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

use crate::{decode, encode, Result, SessionStore};

/// Keeps serialized records in memory so parsing behaves like the durable stores.
#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<Uuid, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a raw record as-is. Used to simulate corrupted data.
    pub fn insert_raw(&self, id: Uuid, raw: impl Into<String>) {
        self.records
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .insert(id, raw.into());
    }

    pub fn len(&self) -> usize {
        self.records.read().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn save(&self, session: &AnalysisSession) -> Result<()> {
        let raw = encode(session, false)?;
        self.records
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .insert(session.id, raw);
        Ok(())
    }

    async fn load(&self, id: Uuid) -> Option<AnalysisSession> {
        let raw = self
            .records
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(&id)
            .cloned()?;
        decode(id, &raw)
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        Ok(self
            .records
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .remove(&id)
            .is_some())
    }

    async fn list_ids(&self) -> Result<Vec<Uuid>> {
        Ok(self
            .records
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .keys()
            .copied()
            .collect())
    }
}
