//! The scheduler handle promises carry.

use std::fmt;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tracing::{debug, error};

use pledge_config::{PledgeConfig, RejectionConfig};
use pledge_types::Reason;

use crate::{Executor, Job, SchedulerError, TimerHandle, TimerThread};

/// Callback receiving rejections that reached a terminal handler unhandled.
pub type UnhandledHook = Arc<dyn Fn(&Reason) + Send + Sync>;

static GLOBAL: OnceLock<Scheduler> = OnceLock::new();

struct Inner {
    executor: Box<dyn Executor>,
    log_unhandled: bool,
    unhandled_hook: Option<UnhandledHook>,
}

/// Clonable handle to an [`Executor`] plus the unhandled-rejection sink.
///
/// Every promise holds one; promises derived from it (through `then`,
/// combinators, timers) dispatch on the same scheduler. Clones are cheap and
/// refer to the same executor.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Scheduler {
    /// Wrap an executor with default rejection reporting (log at error level).
    pub fn new(executor: impl Executor) -> Self {
        Self::builder(executor).build()
    }

    pub fn builder(executor: impl Executor) -> SchedulerBuilder {
        SchedulerBuilder {
            executor: Box::new(executor),
            log_unhandled: true,
            unhandled_hook: None,
        }
    }

    /// Start a dedicated [`TimerThread`] configured from `config`.
    pub fn from_config(config: &PledgeConfig) -> Result<Self, SchedulerError> {
        let timer = TimerThread::spawn(config.scheduler())?;
        let RejectionConfig { log_unhandled } = config.rejections();
        Ok(Self::builder(timer).log_unhandled(log_unhandled).build())
    }

    /// The process-wide default scheduler, created on first use from the
    /// config file (or defaults).
    ///
    /// # Panics
    ///
    /// Panics if the operating system refuses to spawn the worker thread.
    pub fn global() -> Scheduler {
        GLOBAL
            .get_or_init(|| {
                let config = PledgeConfig::load_or_default();
                Self::from_config(&config).unwrap_or_else(|err| {
                    panic!("failed to start the global pledge scheduler: {err}")
                })
            })
            .clone()
    }

    /// Queue a job. It never runs before this call returns unless the
    /// executor has shut down.
    pub fn execute(&self, job: impl FnOnce() + Send + 'static) {
        self.inner.executor.execute(Box::new(job));
    }

    pub fn execute_boxed(&self, job: Job) {
        self.inner.executor.execute(job);
    }

    pub fn schedule(
        &self,
        delay: Duration,
        job: impl FnOnce() + Send + 'static,
    ) -> Result<TimerHandle, SchedulerError> {
        self.inner.executor.schedule(delay, Box::new(job))
    }

    /// Escalate a rejection nobody handled. Reporting happens on the
    /// executor, never on the caller's stack.
    pub fn report_unhandled(&self, reason: Reason) {
        let inner = Arc::clone(&self.inner);
        self.inner.executor.execute(Box::new(move || {
            if inner.log_unhandled {
                error!(reason = %reason, "unhandled promise rejection");
            }
            if let Some(hook) = &inner.unhandled_hook {
                hook(&reason);
            }
        }));
    }

    pub fn shutdown(&self) {
        self.inner.executor.shutdown();
    }

    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.inner.executor.is_shutdown()
    }

    /// True when both handles refer to the same scheduler.
    #[must_use]
    pub fn ptr_eq(&self, other: &Scheduler) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("shutdown", &self.is_shutdown())
            .field("log_unhandled", &self.inner.log_unhandled)
            .field("unhandled_hook", &self.inner.unhandled_hook.is_some())
            .finish()
    }
}

pub struct SchedulerBuilder {
    executor: Box<dyn Executor>,
    log_unhandled: bool,
    unhandled_hook: Option<UnhandledHook>,
}

impl SchedulerBuilder {
    pub fn log_unhandled(mut self, enabled: bool) -> Self {
        self.log_unhandled = enabled;
        self
    }

    /// Install a hook that observes every unhandled rejection.
    pub fn on_unhandled(mut self, hook: impl Fn(&Reason) + Send + Sync + 'static) -> Self {
        self.unhandled_hook = Some(Arc::new(hook));
        self
    }

    pub fn build(self) -> Scheduler {
        Scheduler {
            inner: Arc::new(Inner {
                executor: self.executor,
                log_unhandled: self.log_unhandled,
                unhandled_hook: self.unhandled_hook,
            }),
        }
    }
}

/// Cooperatively stop the global scheduler if it was ever started.
///
/// Pending timers are cancelled and the worker is given the configured join
/// timeout to finish queued work. Meant for the end of `main`.
pub fn shutdown_global() {
    if let Some(scheduler) = GLOBAL.get() {
        debug!("shutting down global scheduler");
        scheduler.shutdown();
    }
}
