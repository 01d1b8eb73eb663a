use chrono::Utc;
use sqlx::Row;

use mercalytica_core::{Message, Role, SessionKey, StoreRecord};

use super::{RepositoryError, SessionRepository};
use crate::DbPool;

pub struct SqlSessionRepository {
    pool: DbPool,
}

impl SqlSessionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

fn decode_role(raw: &str) -> Result<Role, RepositoryError> {
    raw.parse::<Role>().map_err(|e| RepositoryError::Decode(e.to_string()))
}

fn row_to_message(row: &sqlx::sqlite::SqliteRow) -> Result<Message, RepositoryError> {
    let role: String = row.try_get("role").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let text: String = row.try_get("text").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    Ok(Message::new(decode_role(&role)?, text))
}

#[async_trait::async_trait]
impl SessionRepository for SqlSessionRepository {
    async fn append(&self, key: &SessionKey, messages: &[Message]) -> Result<(), RepositoryError> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;

        // Writing first takes the write lock up front, so concurrent appends queue on
        // busy_timeout instead of failing a read-to-write upgrade.
        let chat_session_id: i64 = sqlx::query_scalar(
            "INSERT INTO chat_sessions (owner_id, session_id, created_at, updated_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(owner_id, session_id) DO UPDATE SET updated_at = excluded.updated_at
             RETURNING id",
        )
        .bind(&key.owner_id)
        .bind(&key.session_id)
        .bind(&now)
        .bind(&now)
        .fetch_one(&mut *tx)
        .await?;

        for message in messages {
            sqlx::query(
                "INSERT INTO chat_messages (chat_session_id, role, text, created_at)
                 VALUES (?, ?, ?, ?)",
            )
            .bind(chat_session_id)
            .bind(message.role.as_str())
            .bind(&message.text)
            .bind(&now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn history(&self, session_id: &str) -> Result<Vec<Message>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT role, text
             FROM chat_messages
             WHERE chat_session_id = (
                 SELECT id FROM chat_sessions WHERE session_id = ? ORDER BY id LIMIT 1
             )
             ORDER BY id",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_message).collect::<Result<Vec<_>, _>>()
    }

    async fn sessions_by_owner(
        &self,
        owner_id: &str,
    ) -> Result<Vec<StoreRecord>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT s.id AS chat_session_id, s.owner_id, s.session_id, m.role, m.text
             FROM chat_sessions s
             LEFT JOIN chat_messages m ON m.chat_session_id = s.id
             WHERE s.owner_id = ?
             ORDER BY s.id, m.id",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        let mut records: Vec<StoreRecord> = Vec::new();
        let mut current_id: Option<i64> = None;

        for row in &rows {
            let chat_session_id: i64 = row
                .try_get("chat_session_id")
                .map_err(|e| RepositoryError::Decode(e.to_string()))?;

            if current_id != Some(chat_session_id) {
                let owner_id: String =
                    row.try_get("owner_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
                let session_id: String = row
                    .try_get("session_id")
                    .map_err(|e| RepositoryError::Decode(e.to_string()))?;
                records.push(StoreRecord { owner_id, session_id, messages: Vec::new() });
                current_id = Some(chat_session_id);
            }

            let role: Option<String> =
                row.try_get("role").map_err(|e| RepositoryError::Decode(e.to_string()))?;
            let text: Option<String> =
                row.try_get("text").map_err(|e| RepositoryError::Decode(e.to_string()))?;

            if let (Some(role), Some(text), Some(record)) = (role, text, records.last_mut()) {
                record.messages.push(Message::new(decode_role(&role)?, text));
            }
        }

        Ok(records)
    }
}
