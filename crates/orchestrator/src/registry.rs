//! In-process caches of active and completed sessions.

use insights_core::{AnalysisSession, Stage};
use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;
use uuid::Uuid;

/// Completed sessions kept in memory before the oldest fall back to the store.
pub const DEFAULT_COMPLETED_CAPACITY: usize = 256;

/// Shared session caches. Implementations must not block for long; callers
/// never hold a returned session across an await point while it is borrowed.
pub trait SessionRegistry: Send + Sync {
    /// Looks in the active cache first, then the completed cache.
    fn get(&self, id: Uuid) -> Option<AnalysisSession>;

    fn get_completed(&self, id: Uuid) -> Option<AnalysisSession>;

    /// Inserts or replaces the active entry.
    fn put(&self, session: AnalysisSession);

    /// Stores a running session's snapshot unless the cached entry was
    /// marked failed in the meantime. A completed `session` moves to the
    /// completed cache. Returns false, leaving the cache untouched, when
    /// the entry had been failed.
    fn update_running(&self, session: AnalysisSession) -> bool;

    /// Marks the active entry failed in place and returns the result.
    /// `None` when the session is not active.
    fn fail_active(&self, id: Uuid, reason: &str) -> Option<AnalysisSession>;

    fn remove(&self, id: Uuid) -> Option<AnalysisSession>;

    /// Removes the active entry and stores `session` as completed.
    fn move_to_completed(&self, session: AnalysisSession);

    fn list(&self) -> Vec<(Uuid, Stage)>;
}

#[derive(Default)]
struct CompletedCache {
    sessions: HashMap<Uuid, AnalysisSession>,
    order: VecDeque<Uuid>,
}

impl CompletedCache {
    fn insert(&mut self, session: AnalysisSession, capacity: usize) {
        let id = session.id;
        if self.sessions.insert(id, session).is_none() {
            self.order.push_back(id);
        }
        while self.sessions.len() > capacity {
            match self.order.pop_front() {
                Some(oldest) => {
                    self.sessions.remove(&oldest);
                }
                None => break,
            }
        }
    }

    fn remove(&mut self, id: Uuid) -> Option<AnalysisSession> {
        let removed = self.sessions.remove(&id)?;
        self.order.retain(|other| *other != id);
        Some(removed)
    }
}

/// Active sessions stay until they complete or are removed; completed ones
/// are capped and evicted oldest first, since the store still holds them.
pub struct InMemoryRegistry {
    active: RwLock<HashMap<Uuid, AnalysisSession>>,
    completed: RwLock<CompletedCache>,
    completed_capacity: usize,
}

impl Default for InMemoryRegistry {
    fn default() -> Self {
        Self::with_completed_capacity(DEFAULT_COMPLETED_CAPACITY)
    }
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_completed_capacity(capacity: usize) -> Self {
        Self {
            active: RwLock::new(HashMap::new()),
            completed: RwLock::new(CompletedCache::default()),
            completed_capacity: capacity.max(1),
        }
    }

    pub fn active_count(&self) -> usize {
        self.active.read().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn completed_count(&self) -> usize {
        self.completed
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .sessions
            .len()
    }

    fn insert_completed(&self, session: AnalysisSession) {
        self.completed
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .insert(session, self.completed_capacity);
    }
}

impl SessionRegistry for InMemoryRegistry {
    fn get(&self, id: Uuid) -> Option<AnalysisSession> {
        let active = self
            .active
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(&id)
            .cloned();
        active.or_else(|| self.get_completed(id))
    }

    fn get_completed(&self, id: Uuid) -> Option<AnalysisSession> {
        self.completed
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .sessions
            .get(&id)
            .cloned()
    }

    fn put(&self, session: AnalysisSession) {
        self.active
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .insert(session.id, session);
    }

    fn update_running(&self, session: AnalysisSession) -> bool {
        // The active lock stays held until the entry is replaced or moved.
        let mut active = self.active.write().unwrap_or_else(|p| p.into_inner());
        if active.get(&session.id).is_some_and(AnalysisSession::is_failed) {
            return false;
        }
        if session.is_completed() {
            active.remove(&session.id);
            self.insert_completed(session);
        } else {
            active.insert(session.id, session);
        }
        true
    }

    fn fail_active(&self, id: Uuid, reason: &str) -> Option<AnalysisSession> {
        let mut active = self.active.write().unwrap_or_else(|p| p.into_inner());
        let session = active.get_mut(&id)?;
        session.fail(reason);
        Some(session.clone())
    }

    fn remove(&self, id: Uuid) -> Option<AnalysisSession> {
        let active = self
            .active
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .remove(&id);
        let completed = self
            .completed
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .remove(id);
        active.or(completed)
    }

    fn move_to_completed(&self, session: AnalysisSession) {
        self.active
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .remove(&session.id);
        self.insert_completed(session);
    }

    fn list(&self) -> Vec<(Uuid, Stage)> {
        let mut entries: Vec<(Uuid, Stage)> = self
            .active
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .values()
            .map(|s| (s.id, s.current_stage))
            .collect();
        entries.extend(
            self.completed
                .read()
                .unwrap_or_else(|p| p.into_inner())
                .sessions
                .values()
                .map(|s| (s.id, s.current_stage)),
        );
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use insights_core::{Checkpoint, RestaurantProfile};

    fn session(name: &str) -> AnalysisSession {
        AnalysisSession::new(RestaurantProfile::new(name))
    }

    #[test]
    fn test_put_get_move() {
        let registry = InMemoryRegistry::new();
        let mut session = session("Cafe");
        let id = session.id;

        registry.put(session.clone());
        assert_eq!(registry.get(id).map(|s| s.id), Some(id));
        assert!(registry.get_completed(id).is_none());

        session.complete();
        registry.move_to_completed(session);
        assert_eq!(registry.active_count(), 0);
        assert_eq!(registry.completed_count(), 1);
        assert_eq!(registry.get(id).map(|s| s.current_stage), Some(Stage::Completed));
        assert_eq!(registry.list(), vec![(id, Stage::Completed)]);
    }

    #[test]
    fn test_remove_from_either_cache() {
        let registry = InMemoryRegistry::new();
        let session = session("Cafe");
        let id = session.id;
        registry.move_to_completed(session);

        assert!(registry.remove(id).is_some());
        assert!(registry.get(id).is_none());
        assert!(registry.remove(id).is_none());
    }

    #[test]
    fn test_update_running_keeps_a_failed_entry() {
        let registry = InMemoryRegistry::new();
        let mut running = session("Bistro");
        let id = running.id;
        registry.put(running.clone());

        let stopped = registry.fail_active(id, "operator stop").unwrap();
        assert!(stopped.is_failed());

        running
            .record_checkpoint(Checkpoint::succeeded(Stage::MenuExtraction, 5))
            .unwrap();
        assert!(!registry.update_running(running.clone()));
        let cached = registry.get(id).unwrap();
        assert!(cached.is_failed());
        assert!(cached.checkpoints.is_empty());

        running.complete();
        assert!(!registry.update_running(running));
        assert_eq!(registry.completed_count(), 0);
    }

    #[test]
    fn test_update_running_moves_completed_sessions() {
        let registry = InMemoryRegistry::new();
        let mut running = session("Bistro");
        let id = running.id;
        registry.put(running.clone());

        running.complete();
        assert!(registry.update_running(running));
        assert_eq!(registry.active_count(), 0);
        assert_eq!(registry.get(id).map(|s| s.current_stage), Some(Stage::Completed));
        assert!(registry.fail_active(id, "too late").is_none());
    }

    #[test]
    fn test_completed_cache_evicts_oldest() {
        let registry = InMemoryRegistry::with_completed_capacity(2);
        let ids: Vec<Uuid> = ["A", "B", "C"]
            .iter()
            .map(|name| {
                let mut s = session(name);
                s.complete();
                let id = s.id;
                registry.move_to_completed(s);
                id
            })
            .collect();

        assert_eq!(registry.completed_count(), 2);
        assert!(registry.get(ids[0]).is_none());
        assert!(registry.get(ids[1]).is_some());
        assert!(registry.get(ids[2]).is_some());
    }
}
