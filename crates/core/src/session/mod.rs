pub mod clock;
pub mod rate_limit;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use rate_limit::{RateLimitExceeded, RateQuota, TurnRateLimiter, DEFAULT_TURNS_PER_MINUTE};
pub use store::{
    ConversationSession, FlowKind, InMemorySessionStore, SessionError, SessionLookup,
    SessionOrigin, SessionStore, SessionUpdate, DEFAULT_IDLE_MINUTES,
};
