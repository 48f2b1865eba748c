//! Blocking waits for synchronous callers.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use pledge_types::{Reason, WaitError};

use crate::Promise;

/// A synchronous view of a [`Promise`], from [`Promise::to_blocking`].
///
/// Waiters park on the promise itself and are woken by the settling thread,
/// not by a scheduler job, so `get` returns as soon as the outcome is
/// published even while the scheduler is busy or when called from inside one
/// of its jobs. Waiting inside a job for a promise that only that job's
/// worker can settle still deadlocks.
pub struct BlockingHandle<T> {
    promise: Promise<T>,
    cancelled: AtomicBool,
}

impl<T: Clone + Send + 'static> Promise<T> {
    /// Bridge to blocking code. Does not affect the promise.
    #[must_use]
    pub fn to_blocking(&self) -> BlockingHandle<T> {
        BlockingHandle {
            promise: self.clone(),
            cancelled: AtomicBool::new(false),
        }
    }
}

impl<T: Clone + Send + 'static> BlockingHandle<T> {
    /// Wait for settlement. Returns at once if the promise already settled.
    pub fn get(&self) -> Result<T, WaitError> {
        self.finish(self.promise.wait(None, || self.is_cancelled()), None)
    }

    /// Wait at most `timeout`.
    pub fn get_timeout(&self, timeout: Duration) -> Result<T, WaitError> {
        let deadline = Instant::now() + timeout;
        let outcome = self.promise.wait(Some(deadline), || self.is_cancelled());
        self.finish(outcome, Some(timeout))
    }

    /// Stop waiting. Wakes every blocked `get`, and later calls fail with
    /// [`WaitError::Cancelled`].
    ///
    /// Returns `false` if the promise already settled or the handle was
    /// already cancelled. The promise itself is untouched.
    pub fn cancel(&self) -> bool {
        if self.promise.is_settled()
            || self
                .cancelled
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
        {
            return false;
        }
        self.promise.wake_waiters();
        true
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Settled or cancelled.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.is_cancelled() || self.promise.is_settled()
    }

    #[must_use]
    pub fn promise(&self) -> &Promise<T> {
        &self.promise
    }

    fn finish(
        &self,
        outcome: Option<Result<T, Reason>>,
        timeout: Option<Duration>,
    ) -> Result<T, WaitError> {
        match outcome {
            _ if self.is_cancelled() => Err(WaitError::Cancelled),
            Some(outcome) => outcome.map_err(WaitError::Rejected),
            None => Err(timeout.map_or(WaitError::Cancelled, WaitError::TimedOut)),
        }
    }
}

impl<T> fmt::Debug for BlockingHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockingHandle")
            .field("promise", &self.promise)
            .field("cancelled", &self.cancelled.load(Ordering::Acquire))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pledge_config::PledgeConfig;
    use pledge_scheduler::{ManualExecutor, Scheduler};
    use std::sync::Arc;
    use std::sync::mpsc;
    use std::thread;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn settled_promises_return_without_waiting() {
        let scheduler = Scheduler::new(ManualExecutor::new());
        let ok = Promise::resolved_on(&scheduler, 3).to_blocking();
        let err = Promise::<u8>::rejected_on(&scheduler, Reason::msg("no")).to_blocking();
        assert_eq!(ok.get().unwrap(), 3);
        assert_eq!(err.get().unwrap_err().rejection().unwrap().to_string(), "no");
        assert!(ok.is_done());
        assert!(!ok.cancel());
    }

    #[test]
    fn get_timeout_expires_on_pending_promises() {
        let scheduler = Scheduler::new(ManualExecutor::new());
        let handle = Promise::<u8>::pending_on(&scheduler).to_blocking();
        assert!(matches!(
            handle.get_timeout(ms(20)),
            Err(WaitError::TimedOut(d)) if d == ms(20)
        ));
        assert!(!handle.is_done());
    }

    #[test]
    fn get_blocks_until_another_thread_settles() {
        let scheduler = Scheduler::from_config(&PledgeConfig::default()).unwrap();
        let p = Promise::pending_on(&scheduler);
        let handle = p.to_blocking();
        let settler = thread::spawn(move || {
            thread::sleep(ms(20));
            p.resolve("ready");
        });
        assert_eq!(handle.get().unwrap(), "ready");
        settler.join().unwrap();
        scheduler.shutdown();
    }

    #[test]
    fn settlement_wakes_waiters_without_running_jobs() {
        let exec = ManualExecutor::new();
        let scheduler = Scheduler::new(exec.clone());
        let p = Promise::pending_on(&scheduler);
        let _chained = p.then(|n: u8| Ok(n));
        let handle = p.to_blocking();
        let settler = {
            let p = p.clone();
            thread::spawn(move || {
                thread::sleep(ms(20));
                p.resolve(4);
            })
        };
        assert_eq!(handle.get_timeout(Duration::from_secs(5)).unwrap(), 4);
        settler.join().unwrap();
        assert_eq!(exec.pending_jobs(), 1, "the reaction job is still queued");
    }

    #[test]
    fn get_inside_a_job_sees_settlement_from_another_thread() {
        let scheduler = Scheduler::from_config(&PledgeConfig::default()).unwrap();
        let p: Promise<u8> = Promise::pending_on(&scheduler);
        let (tx, rx) = mpsc::channel();
        let handle = p.to_blocking();
        scheduler.execute(move || {
            let _ = tx.send(handle.get_timeout(Duration::from_secs(5)).ok());
        });
        thread::sleep(ms(20));
        let settled_at = Instant::now();
        p.resolve(7);
        assert_eq!(rx.recv().unwrap(), Some(7));
        assert!(settled_at.elapsed() < Duration::from_secs(1));
        scheduler.shutdown();
    }

    #[test]
    fn cancel_wakes_waiters_and_sticks() {
        let scheduler = Scheduler::new(ManualExecutor::new());
        let p = Promise::<u8>::pending_on(&scheduler);
        let handle = Arc::new(p.to_blocking());
        let waiter = {
            let handle = Arc::clone(&handle);
            thread::spawn(move || handle.get())
        };
        thread::sleep(ms(20));
        assert!(handle.cancel());
        assert!(!handle.cancel());
        assert!(matches!(waiter.join().unwrap(), Err(WaitError::Cancelled)));

        p.resolve(1);
        assert!(handle.is_cancelled());
        assert!(matches!(handle.get(), Err(WaitError::Cancelled)));
        assert_eq!(p.value(), Some(1));
    }
}
