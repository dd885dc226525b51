//! Multi-turn conversational intake: step catalogs, free-text parsing and the
//! machine that advances a conversation one message at a time.

pub mod catalog;
pub mod machine;
pub mod parse;
pub mod quote_chat;
pub mod setup;
pub mod slots;
pub mod state;

pub use catalog::{CatalogError, StepCatalog, StepDefinition, StepGraph, COMPLETE};
pub use machine::{IntakeMachine, TurnOutcome};
pub use quote_chat::QuoteChatCatalog;
pub use setup::{SetupCatalog, SetupOutcome};
pub use state::{FieldDelta, FieldValue, PartialState};
