use async_trait::async_trait;
use thiserror::Error;

use mercalytica_core::{Message, SessionKey, StoreRecord};

pub mod memory;
pub mod session;

pub use memory::InMemorySessionRepository;
pub use session::SqlSessionRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

/// Append-only storage for chat sessions.
///
/// Writes are keyed by `(owner_id, session_id)`; `history` is keyed by the
/// session id alone and resolves to the first-created session with that id.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Creates the session on first use, then appends `messages` in order.
    /// Either every message of the call becomes visible or none does.
    async fn append(&self, key: &SessionKey, messages: &[Message]) -> Result<(), RepositoryError>;

    /// Full ordered history, empty when the session is unknown.
    async fn history(&self, session_id: &str) -> Result<Vec<Message>, RepositoryError>;

    /// Every session owned by `owner_id`, in creation order.
    async fn sessions_by_owner(&self, owner_id: &str)
        -> Result<Vec<StoreRecord>, RepositoryError>;
}
