use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use mercalytica_core::{Message, Role};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    System,
    User,
    Assistant,
}

impl AgentRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl From<Role> for AgentRole {
    fn from(role: Role) -> Self {
        match role {
            Role::User => Self::User,
            Role::Assistant => Self::Assistant,
        }
    }
}

/// Wire-level chat message sent to the agent.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentMessage {
    pub role: AgentRole,
    pub content: String,
}

impl AgentMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: AgentRole::System, content: content.into() }
    }
}

impl From<&Message> for AgentMessage {
    fn from(message: &Message) -> Self {
        Self { role: message.role.into(), content: message.text.clone() }
    }
}

/// Reply shape decoded at the provider boundary.
///
/// Providers disagree on where the reply text lives, so the decode keeps whatever
/// shape arrived and leaves flattening to the normalizer.
#[derive(Clone, Debug, PartialEq)]
pub enum AgentReply {
    Text(String),
    /// A reply object exposing a `content` field of any JSON shape.
    Message { content: Value },
    Raw(Value),
}

impl AgentReply {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Message { .. } => "message",
            Self::Raw(_) => "raw",
        }
    }
}

impl From<Value> for AgentReply {
    fn from(value: Value) -> Self {
        match value {
            Value::String(text) => Self::Text(text),
            Value::Object(mut object) if object.contains_key("content") => {
                let content = object.remove("content").unwrap_or(Value::Null);
                Self::Message { content }
            }
            other => Self::Raw(other),
        }
    }
}

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("agent could not be loaded: {0}")]
    Load(String),
    #[error("agent provider returned no handle")]
    NoHandle,
    #[error("agent invocation failed: {0}")]
    Invoke(String),
    #[error("agent did not answer within {0:?}")]
    Timeout(Duration),
    #[error("agent reply could not be decoded: {0}")]
    Decode(String),
}

/// A loaded agent. One call is one request and one complete reply.
#[async_trait]
pub trait AgentHandle: Send + Sync {
    async fn invoke(&self, messages: &[AgentMessage]) -> Result<AgentReply, AgentError>;
}

/// Produces the agent handle. `Ok(None)` means the provider ran but had nothing to hand out.
#[async_trait]
pub trait AgentProvider: Send + Sync {
    async fn load(&self) -> Result<Option<Arc<dyn AgentHandle>>, AgentError>;
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use mercalytica_core::Message;

    use super::{AgentMessage, AgentReply, AgentRole};

    #[test]
    fn json_values_decode_into_tagged_reply_variants() {
        assert_eq!(AgentReply::from(json!("hola")), AgentReply::text("hola"));
        assert_eq!(
            AgentReply::from(json!({"role": "assistant", "content": [{"text": "hola"}]})),
            AgentReply::Message { content: json!([{"text": "hola"}]) }
        );
        assert_eq!(AgentReply::from(json!({"text": "hola"})), AgentReply::Raw(json!({"text": "hola"})));
        assert_eq!(AgentReply::from(json!(42)).kind(), "raw");
    }

    #[test]
    fn chat_messages_map_to_agent_roles() {
        let user = AgentMessage::from(&Message::user("hola"));
        let assistant = AgentMessage::from(&Message::assistant("buenas"));

        assert_eq!(user.role, AgentRole::User);
        assert_eq!(assistant.role, AgentRole::Assistant);
        assert_eq!(assistant.content, "buenas");
        assert_eq!(AgentMessage::system("reglas").role.as_str(), "system");
    }
}
