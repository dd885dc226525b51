//! Conversation runtime for the painting quote intake.
//!
//! Turns arrive one message at a time. The runtime rate-limits them, loads the
//! session, lets a [`provider::ConversationProvider`] advance the deterministic
//! intake machine and, when a conversation finishes, assembles and persists
//! the result.
//!
//! A language model may reword assistant prompts, but it never decides
//! prices or state transitions. Rewrites pass through
//! [`guardrails::GuardrailPolicy`] and fall back to the catalog wording when
//! rejected.

pub mod audit;
pub mod guardrails;
pub mod llm;
pub mod provider;
pub mod runtime;

pub use audit::TracingAuditSink;
pub use provider::{select_provider, ConversationProvider, DeterministicProvider, LlmPhrasedProvider};
pub use runtime::{ChatReply, ChatRequest, IntakeRuntime, SetupReply};
