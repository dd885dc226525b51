use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::company::{CompanyDefaults, CompanyId};
use crate::intake::state::{FieldDelta, PartialState};
use crate::session::clock::{Clock, SystemClock};

pub const DEFAULT_IDLE_MINUTES: i64 = 30;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowKind {
    QuoteChat,
    Setup,
}

impl FlowKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::QuoteChat => "quote_chat",
            Self::Setup => "setup",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSession {
    pub session_id: String,
    pub company_id: CompanyId,
    pub flow: FlowKind,
    /// `None` until the first turn has been answered.
    pub step_pointer: Option<String>,
    pub partial_state: PartialState,
    /// Rates captured when the session first needed them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_defaults: Option<CompanyDefaults>,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub turn_count: u32,
}

impl ConversationSession {
    pub fn new(
        session_id: impl Into<String>,
        company_id: CompanyId,
        flow: FlowKind,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            company_id,
            flow,
            step_pointer: None,
            partial_state: PartialState::default(),
            company_defaults: None,
            created_at: now,
            last_activity_at: now,
            turn_count: 0,
        }
    }

    pub fn is_idle(&self, now: DateTime<Utc>, idle_timeout: Duration) -> bool {
        now - self.last_activity_at > idle_timeout
    }

    /// Merges the delta, moves the pointer and counts the turn.
    pub fn apply(&mut self, update: SessionUpdate, now: DateTime<Utc>) {
        self.partial_state.merge(&update.delta);
        for path in &update.retracted {
            self.partial_state.remove(path);
        }
        if let Some(pointer) = update.step_pointer {
            self.step_pointer = Some(pointer);
        }
        if let Some(defaults) = update.company_defaults {
            self.company_defaults = Some(defaults);
        }
        self.last_activity_at = now;
        self.turn_count = self.turn_count.saturating_add(1);
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionOrigin {
    Created,
    Resumed,
    /// The previous session idled out or belonged to another flow.
    Restarted,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionLookup {
    pub session: ConversationSession,
    pub origin: SessionOrigin,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionUpdate {
    pub delta: FieldDelta,
    pub step_pointer: Option<String>,
    pub company_defaults: Option<CompanyDefaults>,
    /// Paths dropped after the delta is merged, for answers that failed
    /// validation and must be asked again.
    pub retracted: Vec<String>,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("session `{session_id}` belongs to company {owner}, not {requested}")]
    CompanyMismatch { session_id: String, owner: CompanyId, requested: CompanyId },
    #[error("session `{0}` not found")]
    NotFound(String),
}

pub trait SessionStore: Send + Sync {
    /// Loads the session, creating it when absent and restarting it when
    /// idle or opened for another flow.
    fn get(
        &self,
        session_id: &str,
        company_id: CompanyId,
        flow: FlowKind,
    ) -> Result<SessionLookup, SessionError>;

    fn put(&self, session_id: &str, update: SessionUpdate) -> Result<ConversationSession, SessionError>;

    /// Returns whether a session was removed.
    fn clear(&self, session_id: &str) -> bool;
}

pub struct InMemorySessionStore {
    sessions: Mutex<HashMap<String, ConversationSession>>,
    clock: Arc<dyn Clock>,
    idle_timeout: Duration,
}

impl InMemorySessionStore {
    pub fn new(clock: Arc<dyn Clock>, idle_timeout: Duration) -> Self {
        Self { sessions: Mutex::new(HashMap::new()), clock, idle_timeout }
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, ConversationSession>> {
        match self.sessions.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock), Duration::minutes(DEFAULT_IDLE_MINUTES))
    }
}

impl SessionStore for InMemorySessionStore {
    fn get(
        &self,
        session_id: &str,
        company_id: CompanyId,
        flow: FlowKind,
    ) -> Result<SessionLookup, SessionError> {
        let now = self.clock.now();
        let idle_timeout = self.idle_timeout;
        let mut sessions = self.lock();
        // The requested id is kept so its expiry is reported as a restart.
        sessions.retain(|id, session| id == session_id || !session.is_idle(now, idle_timeout));

        let origin = match sessions.get(session_id) {
            None => SessionOrigin::Created,
            Some(existing) if existing.company_id != company_id => {
                return Err(SessionError::CompanyMismatch {
                    session_id: session_id.to_owned(),
                    owner: existing.company_id,
                    requested: company_id,
                });
            }
            Some(existing) if existing.flow != flow || existing.is_idle(now, self.idle_timeout) => {
                SessionOrigin::Restarted
            }
            Some(existing) => {
                return Ok(SessionLookup { session: existing.clone(), origin: SessionOrigin::Resumed });
            }
        };

        let session = ConversationSession::new(session_id, company_id, flow, now);
        sessions.insert(session_id.to_owned(), session.clone());
        Ok(SessionLookup { session, origin })
    }

    fn put(&self, session_id: &str, update: SessionUpdate) -> Result<ConversationSession, SessionError> {
        let now = self.clock.now();
        let mut sessions = self.lock();
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| SessionError::NotFound(session_id.to_owned()))?;
        session.apply(update, now);
        Ok(session.clone())
    }

    fn clear(&self, session_id: &str) -> bool {
        self.lock().remove(session_id).is_some()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, TimeZone, Utc};
    use rust_decimal::Decimal;

    use super::{
        FlowKind, InMemorySessionStore, SessionError, SessionOrigin, SessionStore, SessionUpdate,
        DEFAULT_IDLE_MINUTES,
    };
    use crate::domain::company::CompanyId;
    use crate::intake::state::FieldDelta;
    use crate::session::clock::ManualClock;

    fn store() -> (Arc<ManualClock>, InMemorySessionStore) {
        let start = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).single().expect("valid start");
        let clock = Arc::new(ManualClock::new(start));
        let store =
            InMemorySessionStore::new(clock.clone(), Duration::minutes(DEFAULT_IDLE_MINUTES));
        (clock, store)
    }

    fn walls(sqft: i64) -> SessionUpdate {
        let mut delta = FieldDelta::default();
        delta.set_number("measurements.walls_sqft", Decimal::new(sqft, 0));
        SessionUpdate {
            delta,
            step_pointer: Some("ceilings_sqft".to_owned()),
            ..SessionUpdate::default()
        }
    }

    #[test]
    fn session_resumes_within_idle_window() {
        let (clock, store) = store();
        let created = store.get("s-1", CompanyId(1), FlowKind::QuoteChat).expect("created");
        assert_eq!(created.origin, SessionOrigin::Created);

        store.put("s-1", walls(400)).expect("put");
        clock.advance(Duration::minutes(29));

        let resumed = store.get("s-1", CompanyId(1), FlowKind::QuoteChat).expect("resumed");
        assert_eq!(resumed.origin, SessionOrigin::Resumed);
        assert_eq!(resumed.session.step_pointer.as_deref(), Some("ceilings_sqft"));
        assert_eq!(
            resumed.session.partial_state.number("measurements.walls_sqft"),
            Some(Decimal::new(400, 0))
        );
        assert_eq!(resumed.session.turn_count, 1);
    }

    #[test]
    fn session_idle_for_thirty_one_minutes_restarts_empty() {
        let (clock, store) = store();
        store.get("s-1", CompanyId(1), FlowKind::QuoteChat).expect("created");
        store.put("s-1", walls(400)).expect("put");

        clock.advance(Duration::minutes(31));

        let lookup = store.get("s-1", CompanyId(1), FlowKind::QuoteChat).expect("restarted");
        assert_eq!(lookup.origin, SessionOrigin::Restarted);
        assert!(lookup.session.partial_state.is_empty());
        assert_eq!(lookup.session.step_pointer, None);
        assert_eq!(lookup.session.turn_count, 0);
    }

    #[test]
    fn retracted_paths_are_dropped_after_the_merge() {
        let (_, store) = store();
        store.get("s-1", CompanyId(1), FlowKind::QuoteChat).expect("created");
        store.put("s-1", walls(2_000_000)).expect("put");

        let session = store
            .put(
                "s-1",
                SessionUpdate {
                    step_pointer: Some("walls_sqft".to_owned()),
                    retracted: vec!["measurements.walls_sqft".to_owned()],
                    ..SessionUpdate::default()
                },
            )
            .expect("retract");
        assert_eq!(session.partial_state.number("measurements.walls_sqft"), None);
        assert_eq!(session.step_pointer.as_deref(), Some("walls_sqft"));
    }

    #[test]
    fn abandoned_sessions_are_dropped_once_idle() {
        let (clock, store) = store();
        store.get("abandoned", CompanyId(1), FlowKind::QuoteChat).expect("created");
        store.get("also-abandoned", CompanyId(2), FlowKind::Setup).expect("created");
        clock.advance(Duration::minutes(31));

        store.get("s-new", CompanyId(1), FlowKind::QuoteChat).expect("created");
        assert_eq!(store.len(), 1);
        assert_eq!(
            store.get("abandoned", CompanyId(1), FlowKind::QuoteChat).expect("fresh").origin,
            SessionOrigin::Created
        );
    }

    #[test]
    fn company_mismatch_is_a_hard_error() {
        let (_, store) = store();
        store.get("s-1", CompanyId(1), FlowKind::Setup).expect("created");

        let error = store.get("s-1", CompanyId(2), FlowKind::Setup).expect_err("mismatch");
        assert!(matches!(error, SessionError::CompanyMismatch { .. }));
    }

    #[test]
    fn switching_flow_restarts_the_session() {
        let (_, store) = store();
        store.get("s-1", CompanyId(1), FlowKind::Setup).expect("created");
        store.put("s-1", walls(10)).expect("put");

        let lookup = store.get("s-1", CompanyId(1), FlowKind::QuoteChat).expect("restarted");
        assert_eq!(lookup.origin, SessionOrigin::Restarted);
        assert_eq!(lookup.session.flow, FlowKind::QuoteChat);
    }

    #[test]
    fn put_requires_a_loaded_session_and_clear_removes_it() {
        let (_, store) = store();
        assert!(matches!(store.put("missing", walls(1)), Err(SessionError::NotFound(_))));

        store.get("s-1", CompanyId(1), FlowKind::QuoteChat).expect("created");
        assert_eq!(store.len(), 1);
        assert!(store.clear("s-1"));
        assert!(!store.clear("s-1"));
        assert!(store.is_empty());
    }
}
