//! Reconciliation retry primitives.
//!
//! After a scheduler (re)start the framework's view of its tasks may
//! disagree with the master. Reconciliation asks the master to re-send the
//! state of every task, then keeps re-asking about tasks that are still
//! unconfirmed, and gives up after a bounded number of tries.
//!
//! This crate holds the bookkeeping for that protocol:
//!
//! - [`Period`]: duration literals such as `30s` or `5m`, parsed by humantime
//! - [`ReconcileSession`]: try counter and spacing between tries
//! - [`Step`]: what the caller should do on the current tick
//!
//! # Invariants
//!
//! - `tries == 0` exactly when no session is in progress
//! - `last_try` is set exactly when `tries > 0`
//! - Tries are spaced at least one period apart

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Period literal errors.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PeriodError {
    /// Empty input.
    #[error("empty period")]
    Empty,

    /// Not a duration literal.
    #[error("invalid period {input}: {source}")]
    Invalid {
        input: String,
        source: humantime::DurationError,
    },
}

/// A duration literal such as `500ms`, `30s`, `5m`, `1h` or `30d`.
///
/// A bare `0` is accepted as zero. Renders in humantime form, so `120s`
/// prints as `2m`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Period(#[serde(with = "humantime_serde")] Duration);

impl Period {
    pub const ZERO: Period = Period(Duration::ZERO);

    pub const fn from_duration(d: Duration) -> Self {
        Self(d)
    }

    pub const fn as_duration(&self) -> Duration {
        self.0
    }

    pub fn as_millis(&self) -> u128 {
        self.0.as_millis()
    }
}

impl FromStr for Period {
    type Err = PeriodError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(PeriodError::Empty);
        }

        humantime::parse_duration(s)
            .map(Self)
            .map_err(|source| PeriodError::Invalid {
                input: s.to_string(),
                source,
            })
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", humantime::format_duration(self.0))
    }
}

/// What a reconciliation tick should do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// No session in progress.
    Idle,

    /// Less than one period since the last try.
    Wait,

    /// Ask again; `attempt` is the new try count.
    Retry { attempt: u32 },

    /// Tries used up; the session has been reset.
    Exhausted { tries: u32 },
}

/// Retry bookkeeping for one reconciliation session.
#[derive(Debug, Clone)]
pub struct ReconcileSession {
    /// Minimum spacing between tries.
    period: Period,

    /// Tries allowed before giving up.
    max_tries: u32,

    tries: u32,
    last_try: Option<DateTime<Utc>>,
}

impl ReconcileSession {
    /// Create an idle session.
    pub fn new(period: Period, max_tries: u32) -> Self {
        Self {
            period,
            max_tries,
            tries: 0,
            last_try: None,
        }
    }

    pub fn period(&self) -> Period {
        self.period
    }

    pub fn max_tries(&self) -> u32 {
        self.max_tries
    }

    pub fn tries(&self) -> u32 {
        self.tries
    }

    pub fn last_try(&self) -> Option<DateTime<Utc>> {
        self.last_try
    }

    pub fn is_started(&self) -> bool {
        self.tries > 0
    }

    /// Start (or restart) a session; counts as the first try.
    pub fn begin(&mut self, now: DateTime<Utc>) {
        self.tries = 1;
        self.last_try = Some(now);
    }

    /// Decide the step for this tick and record it.
    pub fn advance(&mut self, now: DateTime<Utc>) -> Step {
        let Some(last_try) = self.last_try.filter(|_| self.tries > 0) else {
            return Step::Idle;
        };

        // A clock that went backwards counts as no time elapsed.
        let elapsed = (now - last_try).to_std().unwrap_or(Duration::ZERO);
        if elapsed < self.period.as_duration() {
            return Step::Wait;
        }

        if self.tries < self.max_tries {
            self.tries += 1;
            self.last_try = Some(now);
            return Step::Retry {
                attempt: self.tries,
            };
        }

        let tries = self.tries;
        self.reset();
        Step::Exhausted { tries }
    }

    /// End the session.
    pub fn reset(&mut self) {
        self.tries = 0;
        self.last_try = None;
    }
}

/// Default spacing between reconciliation tries.
pub const DEFAULT_RECONCILE_PERIOD: Period = Period::from_duration(Duration::from_secs(30));

/// Default number of reconciliation tries before giving up.
pub const DEFAULT_MAX_TRIES: u32 = 3;
