//! Pricing engine and conversational intake for painting-contractor quotes.
//!
//! Everything in this crate is synchronous and free of I/O; persistence,
//! HTTP and model calls live in the sibling crates.

pub mod assembler;
pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod intake;
pub mod pricing;
pub mod session;

pub use assembler::{AssemblyContext, AssemblyError, AssemblyOutcome, DirectQuoteRequest, QuoteAssembler};
pub use audit::{AuditContext, AuditEvent, AuditSink, InMemoryAuditSink, NoopAuditSink};
pub use domain::company::{CompanyDefaults, CompanyId, PaintProduct};
pub use domain::measurement::{Measurements, RoomMeasurement, Surface};
pub use domain::product::{Exposure, PaintTier, ProductSelection};
pub use domain::quote::{Quote, QuoteId, QuoteStatus};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use intake::{IntakeMachine, QuoteChatCatalog, SetupCatalog, SetupOutcome, TurnOutcome};
pub use pricing::{calculate_quote, DeterministicPricingEngine, PricingBreakdown, PricingEngine};
pub use session::{ConversationSession, FlowKind, InMemorySessionStore, SessionStore, TurnRateLimiter};
