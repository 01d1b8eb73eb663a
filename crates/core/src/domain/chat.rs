use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    #[serde(alias = "ai")]
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "user" => Ok(Self::User),
            "assistant" | "ai" => Ok(Self::Assistant),
            other => Err(DomainError::InvariantViolation(format!("unknown message role `{other}`"))),
        }
    }
}

/// One chat message. Immutable once created; ordering is the append order of its session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    #[serde(alias = "types")]
    pub role: Role,
    #[serde(alias = "message")]
    pub text: String,
}

impl Message {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self { role, text: text.into() }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, text)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionKey {
    pub owner_id: String,
    pub session_id: String,
}

impl SessionKey {
    pub fn new(owner_id: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self { owner_id: owner_id.into(), session_id: session_id.into() }
    }

    /// Flat `owner:session` form used to key in-process maps.
    pub fn storage_key(&self) -> String {
        format!("{}:{}", self.owner_id, self.session_id)
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.owner_id, self.session_id)
    }
}

/// Stored form of a session. Only the session store constructs these.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreRecord {
    pub owner_id: String,
    pub session_id: String,
    pub messages: Vec<Message>,
}

impl StoreRecord {
    pub fn empty(key: &SessionKey) -> Self {
        Self {
            owner_id: key.owner_id.clone(),
            session_id: key.session_id.clone(),
            messages: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportArtifact {
    pub filename: String,
    pub content: String,
}

#[cfg(test)]
mod tests {
    use super::{Message, Role, SessionKey};

    #[test]
    fn role_parses_legacy_ai_tag() {
        assert_eq!("ai".parse::<Role>().expect("ai role"), Role::Assistant);
        assert_eq!(" User ".parse::<Role>().expect("user role"), Role::User);
        assert!("system".parse::<Role>().is_err());
    }

    #[test]
    fn message_accepts_legacy_wire_fields() {
        let message: Message =
            serde_json::from_str(r#"{"types":"ai","message":"hola"}"#).expect("legacy message");
        assert_eq!(message, Message::assistant("hola"));

        let encoded = serde_json::to_value(Message::user("hi")).expect("encode");
        assert_eq!(encoded, serde_json::json!({ "role": "user", "text": "hi" }));
    }

    #[test]
    fn storage_key_joins_owner_and_session() {
        let key = SessionKey::new("owner-1", "session-9");
        assert_eq!(key.storage_key(), "owner-1:session-9");
        assert_eq!(key.to_string(), key.storage_key());
    }
}
