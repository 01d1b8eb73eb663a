use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;
use tokio::sync::{Mutex as TurnLock, OwnedMutexGuard};
use tracing::debug;

use mercalytica_core::{Message, SessionKey};
use mercalytica_db::{RepositoryError, SessionRepository};

use crate::conversation::{AgentResponse, ConversationOrchestrator};

#[derive(Debug, Error)]
pub enum TurnError {
    #[error("session store operation failed: {0}")]
    Store(#[from] RepositoryError),
}

/// Sequences one chat exchange: persist inbound, read history, respond, persist reply.
///
/// The steps are not transactional. If the reply cannot be stored, the inbound
/// messages stay recorded.
pub struct TurnCoordinator {
    store: Arc<dyn SessionRepository>,
    orchestrator: Arc<ConversationOrchestrator>,
    turn_locks: Option<Mutex<HashMap<SessionKey, Arc<TurnLock<()>>>>>,
}

impl TurnCoordinator {
    pub fn new(store: Arc<dyn SessionRepository>, orchestrator: Arc<ConversationOrchestrator>) -> Self {
        Self { store, orchestrator, turn_locks: None }
    }

    /// Runs turns of the same session one at a time when enabled.
    pub fn with_serialized_turns(mut self, enabled: bool) -> Self {
        self.turn_locks = enabled.then(|| Mutex::new(HashMap::new()));
        self
    }

    pub fn store(&self) -> &Arc<dyn SessionRepository> {
        &self.store
    }

    pub async fn handle_turn(
        &self,
        key: &SessionKey,
        incoming: Vec<Message>,
    ) -> Result<AgentResponse, TurnError> {
        let Some(lock) = self.turn_lock(key) else {
            return self.run_turn(key, &incoming).await;
        };

        let mut turn = HeldTurn { coordinator: self, key, guard: None };
        turn.guard = Some(lock.lock_owned().await);
        self.run_turn(key, &incoming).await
    }

    async fn run_turn(
        &self,
        key: &SessionKey,
        incoming: &[Message],
    ) -> Result<AgentResponse, TurnError> {
        self.store.append(key, incoming).await?;
        let history = self.store.history(&key.session_id).await?;
        debug!(
            event_name = "chat.turn.history_loaded",
            session_id = %key.session_id,
            history_len = history.len(),
            "session history loaded"
        );

        let response = self.orchestrator.respond(&history).await;
        self.store.append(key, &[Message::assistant(response.text.clone())]).await?;

        Ok(response)
    }

    fn turn_lock(&self, key: &SessionKey) -> Option<Arc<TurnLock<()>>> {
        let locks = self.turn_locks.as_ref()?;
        let mut locks = locks.lock().unwrap_or_else(PoisonError::into_inner);
        Some(Arc::clone(locks.entry(key.clone()).or_default()))
    }

    fn release_turn_lock(&self, key: &SessionKey) {
        let Some(locks) = self.turn_locks.as_ref() else {
            return;
        };
        let mut locks = locks.lock().unwrap_or_else(PoisonError::into_inner);
        if locks.get(key).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(key);
        }
    }

    #[cfg(test)]
    fn tracked_locks(&self) -> usize {
        self.turn_locks
            .as_ref()
            .map(|locks| locks.lock().unwrap_or_else(PoisonError::into_inner).len())
            .unwrap_or_default()
    }
}

/// Releases a session's turn lock when the turn ends, including when the
/// caller drops the future mid-turn.
struct HeldTurn<'a> {
    coordinator: &'a TurnCoordinator,
    key: &'a SessionKey,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for HeldTurn<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.coordinator.release_turn_lock(self.key);
    }
}
