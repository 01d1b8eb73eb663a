pub mod connection;
pub mod migrations;
pub mod repositories;
pub mod store;

pub use connection::{connect_with_settings, ping, DbPool};
pub use repositories::{RepositoryError, SessionRepository};
pub use store::{SessionStore, StoreError, StoreMode};
