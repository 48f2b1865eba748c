//! Engine error taxonomy.

use std::any::Any;
use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::Reason;

/// Errors the engine itself produces as rejection reasons.
#[derive(Debug, Clone, Error)]
pub enum PromiseError {
    #[error("promise cannot be resolved with itself")]
    SelfResolution,
    #[error(transparent)]
    Aggregate(#[from] AggregateError),
    #[error("any() requires at least one input")]
    EmptyAny,
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("callback panicked: {0}")]
    Panicked(String),
    #[error("scheduler has shut down")]
    SchedulerShutdown,
}

/// Every input of an `any()` combinator rejected.
///
/// Keeps all underlying reasons, in input order.
#[derive(Debug, Clone, Error)]
pub struct AggregateError {
    reasons: Vec<Reason>,
}

impl AggregateError {
    #[must_use]
    pub fn new(reasons: Vec<Reason>) -> Self {
        Self { reasons }
    }

    #[must_use]
    pub fn reasons(&self) -> &[Reason] {
        &self.reasons
    }

    #[must_use]
    pub fn into_reasons(self) -> Vec<Reason> {
        self.reasons
    }
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "all {} inputs rejected", self.reasons.len())?;
        for (i, reason) in self.reasons.iter().enumerate() {
            let sep = if i == 0 { ": " } else { "; " };
            write!(f, "{sep}{reason}")?;
        }
        Ok(())
    }
}

/// Failure of a blocking wait on a promise.
#[derive(Debug, Clone, Error)]
pub enum WaitError {
    #[error("promise rejected: {0}")]
    Rejected(Reason),
    #[error("timed out after {0:?} waiting for settlement")]
    TimedOut(Duration),
    #[error("blocking wait was cancelled")]
    Cancelled,
}

impl WaitError {
    /// The rejection reason, if the wait failed because the promise rejected.
    #[must_use]
    pub fn rejection(&self) -> Option<&Reason> {
        match self {
            WaitError::Rejected(reason) => Some(reason),
            WaitError::TimedOut(_) | WaitError::Cancelled => None,
        }
    }
}

/// Render a caught panic payload as text.
#[must_use]
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
