//! # Till Repository

use caja_core::Till;
use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::DbResult;

#[derive(Debug, Clone)]
pub struct TillRepository {
    pool: SqlitePool,
}

impl TillRepository {
    pub fn new(pool: SqlitePool) -> Self {
        TillRepository { pool }
    }

    /// Registers a till. Names are unique.
    pub async fn create(&self, name: &str, now: DateTime<Utc>) -> DbResult<Till> {
        let till = Till {
            id: Uuid::new_v4().to_string(),
            name: name.trim().to_string(),
            created_at: now,
        };

        debug!(id = %till.id, name = %till.name, "Creating till");

        sqlx::query("INSERT INTO tills (id, name, created_at) VALUES (?1, ?2, ?3)")
            .bind(&till.id)
            .bind(&till.name)
            .bind(till.created_at)
            .execute(&self.pool)
            .await?;

        Ok(till)
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Till>> {
        let mut conn = self.pool.acquire().await?;
        Self::get_in(&mut conn, id).await
    }

    pub async fn get_in(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Till>> {
        let till = sqlx::query_as::<_, Till>("SELECT id, name, created_at FROM tills WHERE id = ?1")
            .bind(id)
            .fetch_optional(conn)
            .await?;

        Ok(till)
    }

    pub async fn list(&self) -> DbResult<Vec<Till>> {
        let tills =
            sqlx::query_as::<_, Till>("SELECT id, name, created_at FROM tills ORDER BY name")
                .fetch_all(&self.pool)
                .await?;

        Ok(tills)
    }
}
