//! Agent side of the chat core.
//!
//! A turn flows through the [`runtime::TurnCoordinator`], which records the exchange
//! in the session store and delegates to the [`conversation::ConversationOrchestrator`].
//! The orchestrator screens the latest user message ([`guardrails`]), calls the agent
//! under a fixed system contract ([`llm`], [`provider`]), flattens the reply
//! ([`normalizer`]) and hands report bodies to a [`report::DocumentRenderer`].
//!
//! The agent only writes prose. Whether a message is blocked and whether a report is
//! produced are decided here, not by the model.

pub mod conversation;
pub mod guardrails;
pub mod llm;
pub mod normalizer;
pub mod provider;
pub mod report;
pub mod runtime;

pub use conversation::{AgentResponse, ConversationOrchestrator, REPORT_MARKER};
pub use guardrails::{is_injection_attempt, PromptGuard};
pub use llm::{AgentError, AgentHandle, AgentMessage, AgentProvider, AgentReply};
pub use provider::HttpAgentProvider;
pub use report::{DocumentRenderer, RenderError};
pub use runtime::{TurnCoordinator, TurnError};
