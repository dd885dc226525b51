use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use crate::domain::company::CompanyId;
use crate::session::clock::{Clock, SystemClock};

pub const DEFAULT_TURNS_PER_MINUTE: u32 = 20;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateQuota {
    pub limit: u32,
    pub remaining: u32,
}

#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[error("turn limit of {limit} per minute reached; retry in {retry_after_secs}s")]
pub struct RateLimitExceeded {
    pub limit: u32,
    pub retry_after_secs: u64,
}

type TurnKey = (CompanyId, String);

/// Sliding one-minute window of accepted turns per company and session.
pub struct TurnRateLimiter {
    limit: u32,
    window: Duration,
    clock: Arc<dyn Clock>,
    turns: Mutex<HashMap<TurnKey, VecDeque<DateTime<Utc>>>>,
}

impl TurnRateLimiter {
    pub fn new(limit: u32, clock: Arc<dyn Clock>) -> Self {
        Self { limit, window: Duration::minutes(1), clock, turns: Mutex::new(HashMap::new()) }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Records a turn when the window has room; a rejected turn is not counted.
    /// Histories with no turn left in the window are dropped on the way.
    pub fn check(
        &self,
        company_id: CompanyId,
        session_id: &str,
    ) -> Result<RateQuota, RateLimitExceeded> {
        let now = self.clock.now();
        let window = self.window;
        let mut turns = self.lock();
        turns.retain(|_, history| {
            while history.front().is_some_and(|at| now - *at >= window) {
                history.pop_front();
            }
            !history.is_empty()
        });
        let history = turns.entry((company_id, session_id.to_owned())).or_default();

        let used = u32::try_from(history.len()).unwrap_or(u32::MAX);
        if used >= self.limit {
            let retry_after_secs = history
                .front()
                .map(|oldest| (*oldest + self.window - now).num_seconds().max(1))
                .and_then(|secs| u64::try_from(secs).ok())
                .unwrap_or(1);
            return Err(RateLimitExceeded { limit: self.limit, retry_after_secs });
        }

        history.push_back(now);
        Ok(RateQuota { limit: self.limit, remaining: self.limit - used - 1 })
    }

    pub fn remaining(&self, company_id: CompanyId, session_id: &str) -> u32 {
        let now = self.clock.now();
        let turns = self.lock();
        let used = turns
            .get(&(company_id, session_id.to_owned()))
            .map(|history| history.iter().filter(|at| now - **at < self.window).count())
            .unwrap_or(0);
        self.limit.saturating_sub(u32::try_from(used).unwrap_or(u32::MAX))
    }

    pub fn forget(&self, company_id: CompanyId, session_id: &str) {
        self.lock().remove(&(company_id, session_id.to_owned()));
    }

    /// Number of (company, session) pairs with a tracked history.
    pub fn tracked(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<TurnKey, VecDeque<DateTime<Utc>>>> {
        match self.turns.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Default for TurnRateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_TURNS_PER_MINUTE, Arc::new(SystemClock))
    }
}
