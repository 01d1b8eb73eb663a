//! Session store with a one-shot durable/fallback mode decision.
//!
//! [`SessionStore::open`] probes the configured database once. A reachable database
//! gives [`StoreMode::Durable`]; anything else (bad path, refused open, probe timeout)
//! gives [`StoreMode::Fallback`], an in-process map with the same contract. The mode
//! never changes afterwards; a recovered database is picked up by restarting.

use std::time::Duration;

use async_trait::async_trait;
use mercalytica_core::config::DatabaseConfig;
use mercalytica_core::{Message, SessionKey, StoreRecord};
use sqlx::migrate::MigrateError;
use thiserror::Error;
use tracing::{info, warn};

use crate::repositories::{
    InMemorySessionRepository, RepositoryError, SessionRepository, SqlSessionRepository,
};
use crate::{connect_with_settings, connection, migrations, DbPool};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreMode {
    Durable,
    Fallback,
}

impl StoreMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Durable => "durable",
            Self::Fallback => "fallback",
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database migration failed: {0}")]
    Migration(#[source] MigrateError),
}

pub enum SessionStore {
    Durable(SqlSessionRepository),
    Fallback(InMemorySessionRepository),
}

impl SessionStore {
    /// Never fails because the database is unreachable; only a reachable database
    /// that cannot be migrated is an error.
    pub async fn open(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let deadline = Duration::from_secs(config.timeout_secs.max(1));
        let pool = match tokio::time::timeout(deadline, connect_and_probe(config)).await {
            Ok(Ok(pool)) => pool,
            Ok(Err(error)) => {
                warn!(
                    event_name = "system.store.fallback_mode",
                    correlation_id = "bootstrap",
                    error = %error,
                    "durable store unreachable, using in-memory session store"
                );
                return Ok(Self::fallback());
            }
            Err(_) => {
                warn!(
                    event_name = "system.store.fallback_mode",
                    correlation_id = "bootstrap",
                    timeout_secs = deadline.as_secs(),
                    "durable store probe timed out, using in-memory session store"
                );
                return Ok(Self::fallback());
            }
        };

        migrations::run_pending(&pool).await.map_err(StoreError::Migration)?;
        info!(
            event_name = "system.store.durable_mode",
            correlation_id = "bootstrap",
            "durable session store ready"
        );

        Ok(Self::durable(pool))
    }

    pub fn durable(pool: DbPool) -> Self {
        Self::Durable(SqlSessionRepository::new(pool))
    }

    pub fn fallback() -> Self {
        Self::Fallback(InMemorySessionRepository::new())
    }

    pub fn mode(&self) -> StoreMode {
        match self {
            Self::Durable(_) => StoreMode::Durable,
            Self::Fallback(_) => StoreMode::Fallback,
        }
    }

    /// Re-checks the durable backend for health reporting. Fallback mode has nothing to probe.
    pub async fn probe(&self) -> Result<(), RepositoryError> {
        match self {
            Self::Durable(repo) => connection::ping(repo.pool()).await.map_err(Into::into),
            Self::Fallback(_) => Ok(()),
        }
    }
}

async fn connect_and_probe(config: &DatabaseConfig) -> Result<DbPool, sqlx::Error> {
    let pool = connect_with_settings(
        &config.url,
        config.max_connections,
        config.timeout_secs,
        config.create_if_missing,
    )
    .await?;
    connection::ping(&pool).await?;
    Ok(pool)
}

#[async_trait]
impl SessionRepository for SessionStore {
    async fn append(&self, key: &SessionKey, messages: &[Message]) -> Result<(), RepositoryError> {
        match self {
            Self::Durable(repo) => repo.append(key, messages).await,
            Self::Fallback(repo) => repo.append(key, messages).await,
        }
    }

    async fn history(&self, session_id: &str) -> Result<Vec<Message>, RepositoryError> {
        match self {
            Self::Durable(repo) => repo.history(session_id).await,
            Self::Fallback(repo) => repo.history(session_id).await,
        }
    }

    async fn sessions_by_owner(
        &self,
        owner_id: &str,
    ) -> Result<Vec<StoreRecord>, RepositoryError> {
        match self {
            Self::Durable(repo) => repo.sessions_by_owner(owner_id).await,
            Self::Fallback(repo) => repo.sessions_by_owner(owner_id).await,
        }
    }
}
