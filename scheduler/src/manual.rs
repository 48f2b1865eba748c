//! Deterministic executor with a virtual clock.

use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;

use crate::timer::{CancelTimer, TimerKey, TimerQueue};
use crate::{Executor, Job, SchedulerError, TimerHandle, run_job};

#[derive(Default)]
struct ManualState {
    now: Duration,
    ready: VecDeque<Job>,
    timers: TimerQueue,
    shut_down: bool,
}

#[derive(Default)]
struct ManualShared {
    state: Mutex<ManualState>,
}

impl CancelTimer for ManualShared {
    fn cancel(&self, key: TimerKey) -> bool {
        let removed = self.state.lock().timers.remove(key);
        removed.is_some()
    }

    fn is_pending(&self, key: TimerKey) -> bool {
        self.state.lock().timers.contains(key)
    }
}

/// An executor that only makes progress when told to.
///
/// Nothing runs until the owner calls [`run_until_idle`](Self::run_until_idle)
/// or [`advance`](Self::advance), and jobs run on the caller's thread. Time is
/// virtual: a timer fires when the clock is advanced past its deadline, never
/// because wall-clock time passed. Clones share the same queue and clock.
#[derive(Clone, Default)]
pub struct ManualExecutor {
    shared: Arc<ManualShared>,
}

impl ManualExecutor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current virtual time, measured from creation.
    #[must_use]
    pub fn now(&self) -> Duration {
        self.shared.state.lock().now
    }

    #[must_use]
    pub fn pending_jobs(&self) -> usize {
        self.shared.state.lock().ready.len()
    }

    #[must_use]
    pub fn pending_timers(&self) -> usize {
        self.shared.state.lock().timers.len()
    }

    /// Run queued jobs, including any they enqueue, until none are left.
    ///
    /// Returns the number of jobs run.
    pub fn run_until_idle(&self) -> usize {
        let mut ran = 0;
        loop {
            let job = self.shared.state.lock().ready.pop_front();
            match job {
                Some(job) => {
                    run_job(job);
                    ran += 1;
                }
                None => return ran,
            }
        }
    }

    /// Move the clock forward by `by`, firing every timer that comes due in
    /// deadline order and draining the job queue after each one.
    ///
    /// Returns the number of jobs run, timers included.
    pub fn advance(&self, by: Duration) -> usize {
        let mut ran = self.run_until_idle();
        let target = self.now() + by;
        loop {
            let due = {
                let mut state = self.shared.state.lock();
                let due = state.timers.pop_due(target);
                if let Some((key, _)) = &due {
                    state.now = state.now.max(key.at);
                }
                due
            };
            match due {
                Some((_, job)) => {
                    run_job(job);
                    ran += 1 + self.run_until_idle();
                }
                None => break,
            }
        }
        self.shared.state.lock().now = target;
        ran
    }
}

impl Executor for ManualExecutor {
    fn execute(&self, job: Job) {
        let mut state = self.shared.state.lock();
        if state.shut_down {
            drop(state);
            run_job(job);
            return;
        }
        state.ready.push_back(job);
    }

    fn schedule(&self, delay: Duration, job: Job) -> Result<TimerHandle, SchedulerError> {
        let mut state = self.shared.state.lock();
        if state.shut_down {
            return Err(SchedulerError::ShutDown);
        }
        let at = state.now + delay;
        let key = state.timers.insert(at, job);
        drop(state);

        let owner: Weak<dyn CancelTimer> = Arc::downgrade(&self.shared) as Weak<_>;
        Ok(TimerHandle::new(key, owner))
    }

    fn shutdown(&self) {
        let cancelled = {
            let mut state = self.shared.state.lock();
            state.shut_down = true;
            state.timers.take_all()
        };
        drop(cancelled);
        // Queued jobs drain on the caller, as the worker of a real executor
        // would.
        self.run_until_idle();
    }

    fn is_shutdown(&self) -> bool {
        self.shared.state.lock().shut_down
    }
}
