//! Background worker thread running deferred and timed jobs.

use std::collections::VecDeque;
use std::mem;
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

use pledge_config::{SchedulerConfig, ShutdownPolicy};

use crate::timer::{CancelTimer, TimerKey, TimerQueue};
use crate::{Executor, Job, SchedulerError, TimerHandle, run_job};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    Running,
    Stopping(ShutdownPolicy),
    Stopped,
}

struct Queues {
    ready: VecDeque<Job>,
    timers: TimerQueue,
    state: RunState,
}

struct Shared {
    queues: Mutex<Queues>,
    /// Signals the worker: new job, new earlier deadline, or shutdown.
    wake: Condvar,
    /// Signals `shutdown` callers that the worker loop has exited.
    exited: Condvar,
    epoch: Instant,
}

impl Shared {
    fn elapsed(&self) -> Duration {
        self.epoch.elapsed()
    }
}

impl CancelTimer for Shared {
    fn cancel(&self, key: TimerKey) -> bool {
        // Bind first so the job is dropped after the lock is released.
        let removed = self.queues.lock().timers.remove(key);
        if removed.is_some() {
            debug!(seq = key.seq, "timer cancelled");
        }
        removed.is_some()
    }

    fn is_pending(&self, key: TimerKey) -> bool {
        self.queues.lock().timers.contains(key)
    }
}

/// A single background thread that runs deferred jobs FIFO and timer jobs by
/// deadline.
///
/// Shutdown is cooperative: [`Executor::shutdown`] cancels every pending
/// timer, drains or drops the already-queued jobs per the configured
/// [`ShutdownPolicy`], and waits up to `join_timeout` for the worker to exit.
/// Dropping the last handle requests the same shutdown without waiting.
pub struct TimerThread {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
    worker_id: ThreadId,
    config: SchedulerConfig,
}

impl TimerThread {
    pub fn spawn(config: SchedulerConfig) -> Result<Self, SchedulerError> {
        let shared = Arc::new(Shared {
            queues: Mutex::new(Queues {
                ready: VecDeque::new(),
                timers: TimerQueue::default(),
                state: RunState::Running,
            }),
            wake: Condvar::new(),
            exited: Condvar::new(),
            epoch: Instant::now(),
        });

        let worker_shared = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name(config.thread_name.clone())
            .spawn(move || worker_loop(&worker_shared))?;
        let worker_id = worker.thread().id();

        debug!(thread = %config.thread_name, "scheduler thread started");
        Ok(Self {
            shared,
            worker: Mutex::new(Some(worker)),
            worker_id,
            config,
        })
    }

    #[must_use]
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Number of timers still waiting for their deadline.
    #[must_use]
    pub fn pending_timers(&self) -> usize {
        self.shared.queues.lock().timers.len()
    }

    fn request_stop(&self) -> bool {
        let mut queues = self.shared.queues.lock();
        if queues.state != RunState::Running {
            return false;
        }
        let cancelled = queues.timers.take_all();
        queues.state = RunState::Stopping(self.config.shutdown);
        drop(queues);

        debug!(
            policy = self.config.shutdown.as_str(),
            cancelled_timers = cancelled.len(),
            "scheduler shutdown requested"
        );
        // Jobs may own the last handle to this executor; never drop them
        // under the queue lock.
        drop(cancelled);
        self.shared.wake.notify_all();
        true
    }

    fn join_worker(&self) {
        // A job on the worker may itself request shutdown; it cannot wait for
        // its own thread.
        if thread::current().id() == self.worker_id {
            return;
        }

        let deadline = Instant::now() + self.config.join_timeout();
        let mut queues = self.shared.queues.lock();
        while queues.state != RunState::Stopped {
            if self
                .shared
                .exited
                .wait_until(&mut queues, deadline)
                .timed_out()
            {
                warn!(
                    thread = %self.config.thread_name,
                    timeout = ?self.config.join_timeout(),
                    "scheduler thread did not exit in time; detaching"
                );
                return;
            }
        }
        drop(queues);

        if let Some(worker) = self.worker.lock().take()
            && worker.join().is_err()
        {
            warn!(thread = %self.config.thread_name, "scheduler thread panicked");
        }
    }
}

impl Executor for TimerThread {
    fn execute(&self, job: Job) {
        let mut queues = self.shared.queues.lock();
        if queues.state != RunState::Running {
            drop(queues);
            run_job(job);
            return;
        }
        queues.ready.push_back(job);
        drop(queues);
        self.shared.wake.notify_one();
    }

    fn schedule(&self, delay: Duration, job: Job) -> Result<TimerHandle, SchedulerError> {
        let mut queues = self.shared.queues.lock();
        if queues.state != RunState::Running {
            return Err(SchedulerError::ShutDown);
        }
        let at = self.shared.elapsed() + delay;
        let becomes_first = queues.timers.next_deadline().is_none_or(|next| at < next);
        let key = queues.timers.insert(at, job);
        drop(queues);

        if becomes_first {
            self.shared.wake.notify_one();
        }
        let owner: Weak<dyn CancelTimer> = Arc::downgrade(&self.shared) as Weak<_>;
        Ok(TimerHandle::new(key, owner))
    }

    fn shutdown(&self) {
        self.request_stop();
        self.join_worker();
    }

    fn is_shutdown(&self) -> bool {
        self.shared.queues.lock().state != RunState::Running
    }
}

impl Drop for TimerThread {
    fn drop(&mut self) {
        // Best-effort stop; do not block in Drop.
        self.request_stop();
    }
}

fn worker_loop(shared: &Shared) {
    loop {
        match next_job(shared) {
            Next::Run(job) => {
                run_job(job);
            }
            Next::Discard(jobs) => drop(jobs),
            Next::Exit => break,
        }
    }
    debug!("scheduler thread exiting");
}

enum Next {
    Run(Job),
    /// Jobs dropped by the cancel policy, released outside the lock.
    Discard(VecDeque<Job>),
    Exit,
}

/// Block until there is something for the worker to do.
fn next_job(shared: &Shared) -> Next {
    let mut queues = shared.queues.lock();
    loop {
        match queues.state {
            RunState::Running => {
                let now = shared.elapsed();
                while let Some((_, job)) = queues.timers.pop_due(now) {
                    queues.ready.push_back(job);
                }
                if let Some(job) = queues.ready.pop_front() {
                    return Next::Run(job);
                }
                match queues.timers.next_deadline() {
                    Some(at) => {
                        let wait = at.saturating_sub(now);
                        shared.wake.wait_for(&mut queues, wait);
                    }
                    None => shared.wake.wait(&mut queues),
                }
            }
            RunState::Stopping(policy) => {
                if policy == ShutdownPolicy::Cancel && !queues.ready.is_empty() {
                    debug!(dropped = queues.ready.len(), "dropping queued jobs");
                    return Next::Discard(mem::take(&mut queues.ready));
                }
                if let Some(job) = queues.ready.pop_front() {
                    return Next::Run(job);
                }
                queues.state = RunState::Stopped;
                shared.exited.notify_all();
                return Next::Exit;
            }
            RunState::Stopped => return Next::Exit,
        }
    }
}
