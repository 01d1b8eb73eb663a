use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use mercalytica_core::{Message, SessionKey, StoreRecord};

use super::{RepositoryError, SessionRepository};

#[derive(Default)]
struct SessionTable {
    records: Vec<StoreRecord>,
    index: HashMap<String, usize>,
}

/// Process-local session storage. Contents are lost on restart.
#[derive(Clone, Default)]
pub struct InMemorySessionRepository {
    sessions: Arc<RwLock<SessionTable>>,
}

impl InMemorySessionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl SessionRepository for InMemorySessionRepository {
    async fn append(&self, key: &SessionKey, messages: &[Message]) -> Result<(), RepositoryError> {
        let mut table = self.sessions.write().await;
        let storage_key = key.storage_key();

        let position = match table.index.get(&storage_key) {
            Some(position) => *position,
            None => {
                let position = table.records.len();
                table.records.push(StoreRecord::empty(key));
                table.index.insert(storage_key, position);
                position
            }
        };

        table.records[position].messages.extend_from_slice(messages);
        Ok(())
    }

    async fn history(&self, session_id: &str) -> Result<Vec<Message>, RepositoryError> {
        let table = self.sessions.read().await;
        Ok(table
            .records
            .iter()
            .find(|record| record.session_id == session_id)
            .map(|record| record.messages.clone())
            .unwrap_or_default())
    }

    async fn sessions_by_owner(
        &self,
        owner_id: &str,
    ) -> Result<Vec<StoreRecord>, RepositoryError> {
        let table = self.sessions.read().await;
        Ok(table.records.iter().filter(|record| record.owner_id == owner_id).cloned().collect())
    }
}
