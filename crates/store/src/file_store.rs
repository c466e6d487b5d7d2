use async_trait::async_trait;
use insights_core::AnalysisSession;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{decode, encode, Result, SessionStore};

/// One pretty-printed JSON file per session under `<root>/sessions/`.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub async fn open(root: impl AsRef<Path>) -> Result<Self> {
        let dir = root.as_ref().join("sessions");
        fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: Uuid) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }
}

#[async_trait]
impl SessionStore for JsonFileStore {
    async fn save(&self, session: &AnalysisSession) -> Result<()> {
        let content = encode(session, true)?;
        let path = self.path_for(session.id);
        let tmp = path.with_extension("json.tmp");

        // Rename is atomic on the same filesystem, so readers never see a partial file.
        fs::write(&tmp, content).await?;
        fs::rename(&tmp, &path).await?;

        debug!(session_id = %session.id, stage = %session.current_stage, "Saved session file");
        Ok(())
    }

    async fn load(&self, id: Uuid) -> Option<AnalysisSession> {
        match fs::read_to_string(self.path_for(id)).await {
            Ok(raw) => decode(id, &raw),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!(session_id = %id, error = %e, "Failed to read session file");
                None
            }
        }
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        match fs::remove_file(self.path_for(id)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_ids(&self) -> Result<Vec<Uuid>> {
        let mut ids = Vec::new();
        let mut entries = fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(id) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| Uuid::parse_str(s).ok())
            {
                ids.push(id);
            }
        }
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StoreError;
    use insights_core::{BusinessContext, Checkpoint, RestaurantProfile, Stage, ThoughtTrace};
    use tempfile::TempDir;

    async fn store() -> (TempDir, JsonFileStore) {
        let temp = TempDir::new().unwrap();
        let store = JsonFileStore::open(temp.path()).await.unwrap();
        (temp, store)
    }

    #[tokio::test]
    async fn test_round_trip_preserves_every_field() {
        let (_temp, store) = store().await;
        let mut session = AnalysisSession::new(
            RestaurantProfile::new("Sushi Bar")
                .with_location("Osaka")
                .with_cuisine("japanese"),
        );
        session.begin();
        session
            .record_checkpoint(Checkpoint::succeeded(Stage::MenuExtraction, 40))
            .unwrap();
        session
            .record_checkpoint(Checkpoint::failed(Stage::BcgClassification, "no sales", 3))
            .unwrap();
        session.record_skip(Stage::DataIngestion, None);
        session.add_trace(ThoughtTrace::new(
            "Menu Extraction",
            "read two images",
            vec!["blurry photo".into()],
            vec![],
            0.6,
        ));
        session.fail("no sales");

        store.save(&session).await.unwrap();
        let loaded = store.load(session.id).await.unwrap();
        assert_eq!(loaded, session);
    }

    #[tokio::test]
    async fn test_save_overwrites_and_leaves_no_tmp() {
        let (_temp, store) = store().await;
        let mut session = AnalysisSession::new(RestaurantProfile::new("Diner"));
        store.save(&session).await.unwrap();
        session.complete();
        store.save(&session).await.unwrap();

        let loaded = store.load(session.id).await.unwrap();
        assert_eq!(loaded.current_stage, Stage::Completed);

        let mut entries = std::fs::read_dir(store.dir()).unwrap();
        let names: Vec<_> = entries
            .by_ref()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec![format!("{}.json", session.id)]);
    }

    #[tokio::test]
    async fn test_non_finite_value_is_refused_and_last_record_kept() {
        let (_temp, store) = store().await;
        let mut session = AnalysisSession::new(RestaurantProfile::new("Steakhouse"));
        store.save(&session).await.unwrap();

        session.data.business_context = Some(BusinessContext {
            budget: Some(f64::INFINITY),
            ..Default::default()
        });
        let err = store.save(&session).await.unwrap_err();
        assert!(matches!(err, StoreError::Unreadable { session_id, .. } if session_id == session.id));

        let loaded = store.load(session.id).await.unwrap();
        assert!(loaded.data.business_context.is_none());
    }

    #[tokio::test]
    async fn test_missing_and_corrupted_load_as_none() {
        let (_temp, store) = store().await;
        let id = Uuid::new_v4();
        assert!(store.load(id).await.is_none());

        std::fs::write(store.dir().join(format!("{id}.json")), "{\"id\": 42").unwrap();
        assert!(store.load(id).await.is_none());
    }

    #[tokio::test]
    async fn test_list_and_delete() {
        let (_temp, store) = store().await;
        let a = AnalysisSession::new(RestaurantProfile::new("A"));
        let b = AnalysisSession::new(RestaurantProfile::new("B"));
        store.save(&a).await.unwrap();
        store.save(&b).await.unwrap();
        std::fs::write(store.dir().join("notes.txt"), "ignore me").unwrap();

        let mut ids = store.list_ids().await.unwrap();
        ids.sort();
        let mut expected = vec![a.id, b.id];
        expected.sort();
        assert_eq!(ids, expected);

        assert!(store.delete(a.id).await.unwrap());
        assert!(!store.delete(a.id).await.unwrap());
        assert_eq!(store.list_ids().await.unwrap(), vec![b.id]);
    }
}
