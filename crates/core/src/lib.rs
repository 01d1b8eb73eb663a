//! Shared domain types, configuration, and error taxonomy for the Mercalytica chat core.

pub mod config;
pub mod domain;
pub mod errors;

pub use domain::chat::{Message, ReportArtifact, Role, SessionKey, StoreRecord};
pub use errors::{ApplicationError, DomainError, InterfaceError};
