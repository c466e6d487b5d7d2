use async_trait::async_trait;
use insights_core::AnalysisSession;
use sqlx::SqlitePool;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::pool::{create_pool, run_migrations};
use crate::{decode, encode, Result, SessionStore};

/// Sessions as whole JSON records in the `analysis_sessions` table.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Opens the database and applies pending migrations.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = create_pool(database_url).await?;
        run_migrations(&pool).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl SessionStore for SqliteStore {
    async fn save(&self, session: &AnalysisSession) -> Result<()> {
        let record = encode(session, false)?;

        sqlx::query(
            r#"
            INSERT INTO analysis_sessions (session_id, current_stage, record, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(session_id) DO UPDATE SET
                current_stage = excluded.current_stage,
                record = excluded.record,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(session.id.to_string())
        .bind(session.current_stage.as_str())
        .bind(&record)
        .bind(session.updated_at.timestamp_millis())
        .execute(&self.pool)
        .await?;

        debug!(session_id = %session.id, stage = %session.current_stage, "Saved session row");
        Ok(())
    }

    async fn load(&self, id: Uuid) -> Option<AnalysisSession> {
        let row: std::result::Result<Option<(String,)>, sqlx::Error> =
            sqlx::query_as("SELECT record FROM analysis_sessions WHERE session_id = ?")
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await;

        match row {
            Ok(Some((record,))) => decode(id, &record),
            Ok(None) => None,
            Err(e) => {
                warn!(session_id = %id, error = %e, "Failed to query session row");
                None
            }
        }
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM analysis_sessions WHERE session_id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_ids(&self) -> Result<Vec<Uuid>> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT session_id FROM analysis_sessions ORDER BY updated_at DESC")
                .fetch_all(&self.pool)
                .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(id,)| Uuid::parse_str(&id).ok())
            .collect())
    }
}
