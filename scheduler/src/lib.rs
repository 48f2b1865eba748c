//! Deferred-execution and timer service for Pledge.
//!
//! Promises never run continuations inline. Every reaction, deferred
//! computation and timer callback is handed to an [`Executor`] as a [`Job`].
//!
//! - [`TimerThread`]: one named background worker that runs deferred jobs in
//!   FIFO order and timer jobs by deadline. Used by [`Scheduler::global`].
//! - [`ManualExecutor`]: deterministic executor driven by a virtual clock,
//!   for tests and simulations.
//! - [`Scheduler`]: the clonable handle promises carry. It pairs an executor
//!   with the sink that receives unhandled rejections.
//!
//! The global scheduler lives until the process exits. Programs that use it
//! should call [`shutdown_global`] before returning from `main` so pending
//! timers are cancelled and queued jobs follow the configured shutdown policy.

mod manual;
mod scheduler;
mod timer;
mod timer_thread;

use std::io;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::Duration;

use thiserror::Error;

use pledge_types::panic_message;

pub use manual::ManualExecutor;
pub use scheduler::{Scheduler, SchedulerBuilder, UnhandledHook, shutdown_global};
pub use timer::TimerHandle;
pub use timer_thread::TimerThread;

/// A unit of deferred work.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("scheduler has shut down")]
    ShutDown,
    #[error("failed to spawn scheduler thread: {0}")]
    Spawn(#[from] io::Error),
}

/// "Submit work, get a handle back."
///
/// Contract for implementations:
/// - `execute` never runs the job before returning, unless the executor has
///   shut down; after shutdown it runs the job on the calling thread so that
///   promise graphs can still drain.
/// - Jobs passed to `execute` run in submission order.
/// - `schedule` after shutdown fails with [`SchedulerError::ShutDown`].
pub trait Executor: Send + Sync + 'static {
    fn execute(&self, job: Job);

    fn schedule(&self, delay: Duration, job: Job) -> Result<TimerHandle, SchedulerError>;

    /// Stop accepting timers and wind down. Idempotent.
    fn shutdown(&self);

    fn is_shutdown(&self) -> bool;
}

/// Run a job, containing any panic it raises.
///
/// Returns `false` if the job panicked.
pub(crate) fn run_job(job: Job) -> bool {
    match catch_unwind(AssertUnwindSafe(job)) {
        Ok(()) => true,
        Err(payload) => {
            tracing::error!(
                panic = %panic_message(payload.as_ref()),
                "scheduler job panicked"
            );
            false
        }
    }
}
