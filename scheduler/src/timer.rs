//! Cancellable timer handles.

use std::collections::BTreeMap;
use std::fmt;
use std::mem;
use std::sync::Weak;
use std::time::Duration;

use crate::Job;

/// Identity of a scheduled timer: its deadline (as an offset from the owning
/// executor's epoch) and a sequence number that keeps equal deadlines FIFO.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct TimerKey {
    pub(crate) at: Duration,
    pub(crate) seq: u64,
}

/// Implemented by executor state that can withdraw a scheduled job.
pub(crate) trait CancelTimer: Send + Sync {
    /// Remove the timer. Returns `true` if it was still pending.
    fn cancel(&self, key: TimerKey) -> bool;

    fn is_pending(&self, key: TimerKey) -> bool;
}

/// Deadline-ordered timer queue shared by the executors.
#[derive(Default)]
pub(crate) struct TimerQueue {
    timers: BTreeMap<TimerKey, Job>,
    next_seq: u64,
}

impl TimerQueue {
    pub(crate) fn insert(&mut self, at: Duration, job: Job) -> TimerKey {
        let key = TimerKey {
            at,
            seq: self.next_seq,
        };
        self.next_seq += 1;
        self.timers.insert(key, job);
        key
    }

    /// Remove a timer, handing back its job so the caller can drop it
    /// outside any lock.
    pub(crate) fn remove(&mut self, key: TimerKey) -> Option<Job> {
        self.timers.remove(&key)
    }

    pub(crate) fn contains(&self, key: TimerKey) -> bool {
        self.timers.contains_key(&key)
    }

    pub(crate) fn next_deadline(&self) -> Option<Duration> {
        self.timers.keys().next().map(|key| key.at)
    }

    /// Pop the earliest timer if it is due at `now`.
    pub(crate) fn pop_due(&mut self, now: Duration) -> Option<(TimerKey, Job)> {
        let first = self.timers.first_entry()?;
        if first.key().at > now {
            return None;
        }
        Some(first.remove_entry())
    }

    pub(crate) fn len(&self) -> usize {
        self.timers.len()
    }

    /// Take every pending timer out of the queue. Sequence numbering
    /// continues.
    pub(crate) fn take_all(&mut self) -> Vec<Job> {
        mem::take(&mut self.timers).into_values().collect()
    }
}

/// Handle to a scheduled job.
///
/// Cancellation is best-effort (a job that has already started runs to
/// completion) and idempotent. Dropping the handle does not cancel the job.
#[derive(Clone)]
pub struct TimerHandle {
    key: TimerKey,
    owner: Option<Weak<dyn CancelTimer>>,
}

impl TimerHandle {
    pub(crate) fn new(key: TimerKey, owner: Weak<dyn CancelTimer>) -> Self {
        Self {
            key,
            owner: Some(owner),
        }
    }

    /// A handle that refers to no job. Cancelling it is a no-op.
    #[must_use]
    pub fn detached() -> Self {
        Self {
            key: TimerKey {
                at: Duration::ZERO,
                seq: 0,
            },
            owner: None,
        }
    }

    /// Withdraw the job. Returns `true` if this call stopped it from running.
    pub fn cancel(&self) -> bool {
        self.owner
            .as_ref()
            .and_then(Weak::upgrade)
            .is_some_and(|owner| owner.cancel(self.key))
    }

    /// True while the job is still waiting for its deadline.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.owner
            .as_ref()
            .and_then(Weak::upgrade)
            .is_some_and(|owner| owner.is_pending(self.key))
    }
}

impl fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerHandle")
            .field("deadline", &self.key.at)
            .field("seq", &self.key.seq)
            .field("pending", &self.is_pending())
            .finish()
    }
}
