//! The promise state machine.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering, fence};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::debug;

use pledge_scheduler::{Scheduler, SchedulerError};
use pledge_types::{PromiseError, Reason, State, panic_message};

use crate::subscribers::{SubscriberQueue, Subscription};
use crate::thenable::{Awaitable, Resolution, Settler};

const PENDING: u8 = 0;
/// A resolve/reject call won; the outcome is being published or adopted.
/// Reported as pending.
const CLAIMED: u8 = 1;
const FULFILLED: u8 = 2;
const REJECTED: u8 = 3;

struct Core<T> {
    state: AtomicU8,
    outcome: Mutex<Option<Result<T, Reason>>>,
    /// Notified under `outcome` when the promise settles.
    settled: Condvar,
    subscribers: SubscriberQueue<T>,
    scheduler: Scheduler,
}

/// An eventual result of type `T`.
///
/// `Promise` is a shared handle: clones observe and settle the same cell.
/// A promise settles at most once. The first `resolve`, `resolve_with` or
/// `reject` wins and every later call returns `false`. Resolving with another
/// promise or an [`Awaitable`] adopts its eventual outcome.
///
/// Continuations registered with [`then`](Self::then) and friends always run
/// as jobs on the promise's [`Scheduler`], never on the caller's stack, and
/// fire in registration order. Derived promises use the same scheduler.
///
/// Callbacks return `Result<_, Reason>`. An `Err` or a panic inside a
/// callback rejects the derived promise; panics surface as
/// [`PromiseError::Panicked`].
pub struct Promise<T> {
    core: Arc<Core<T>>,
}

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

/// Run a user callback, turning a panic into a rejection reason.
pub(crate) fn capture<R>(f: impl FnOnce() -> Result<R, Reason>) -> Result<R, Reason> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => Err(PromiseError::Panicked(panic_message(payload.as_ref())).into()),
    }
}

fn decode(state: u8) -> State {
    match state {
        FULFILLED => State::Fulfilled,
        REJECTED => State::Rejected,
        _ => State::Pending,
    }
}

fn shutdown_reason(err: SchedulerError) -> Reason {
    debug!(error = %err, "timer could not be scheduled");
    PromiseError::SchedulerShutdown.into()
}

impl<T: Clone + Send + 'static> Promise<T> {
    fn with_state(scheduler: &Scheduler, state: u8, outcome: Option<Result<T, Reason>>) -> Self {
        Self {
            core: Arc::new(Core {
                state: AtomicU8::new(state),
                outcome: Mutex::new(outcome),
                settled: Condvar::new(),
                subscribers: SubscriberQueue::default(),
                scheduler: scheduler.clone(),
            }),
        }
    }

    // ---- constructors -------------------------------------------------

    /// A pending promise on the global scheduler.
    #[must_use]
    pub fn pending() -> Self {
        Self::pending_on(&Scheduler::global())
    }

    #[must_use]
    pub fn pending_on(scheduler: &Scheduler) -> Self {
        Self::with_state(scheduler, PENDING, None)
    }

    #[must_use]
    pub fn resolved(value: T) -> Self {
        Self::resolved_on(&Scheduler::global(), value)
    }

    #[must_use]
    pub fn resolved_on(scheduler: &Scheduler, value: T) -> Self {
        Self::with_state(scheduler, FULFILLED, Some(Ok(value)))
    }

    #[must_use]
    pub fn rejected(reason: impl Into<Reason>) -> Self {
        Self::rejected_on(&Scheduler::global(), reason)
    }

    #[must_use]
    pub fn rejected_on(scheduler: &Scheduler, reason: impl Into<Reason>) -> Self {
        Self::with_state(scheduler, REJECTED, Some(Err(reason.into())))
    }

    /// A promise for whatever `resolution` eventually produces.
    ///
    /// A `Resolution::Promise` is returned as is.
    #[must_use]
    pub fn from_resolution_on(scheduler: &Scheduler, resolution: Resolution<T>) -> Self {
        match resolution {
            Resolution::Value(value) => Self::resolved_on(scheduler, value),
            Resolution::Promise(promise) => promise,
            awaitable @ Resolution::Awaitable(_) => {
                let promise = Self::pending_on(scheduler);
                promise.resolve_with(awaitable);
                promise
            }
        }
    }

    #[must_use]
    pub fn from_awaitable(awaitable: impl Awaitable<T>) -> Self {
        Self::from_awaitable_on(&Scheduler::global(), awaitable)
    }

    #[must_use]
    pub fn from_awaitable_on(scheduler: &Scheduler, awaitable: impl Awaitable<T>) -> Self {
        Self::from_resolution_on(scheduler, Resolution::awaitable(awaitable))
    }

    /// Run `computation` as a job on the global scheduler.
    pub fn spawn<F>(computation: F) -> Self
    where
        F: FnOnce() -> Result<T, Reason> + Send + 'static,
    {
        Self::spawn_on(&Scheduler::global(), computation)
    }

    pub fn spawn_on<F>(scheduler: &Scheduler, computation: F) -> Self
    where
        F: FnOnce() -> Result<T, Reason> + Send + 'static,
    {
        let promise = Self::pending_on(scheduler);
        let target = promise.clone();
        scheduler.execute(move || {
            target.settle(capture(computation));
        });
        promise
    }

    /// Run `computation` now, on the calling thread, capturing its failure.
    pub fn sync<F>(computation: F) -> Self
    where
        F: FnOnce() -> Result<T, Reason>,
    {
        Self::sync_on(&Scheduler::global(), computation)
    }

    pub fn sync_on<F>(scheduler: &Scheduler, computation: F) -> Self
    where
        F: FnOnce() -> Result<T, Reason>,
    {
        match capture(computation) {
            Ok(value) => Self::resolved_on(scheduler, value),
            Err(reason) => Self::rejected_on(scheduler, reason),
        }
    }

    /// Run `computation` once `delay` has elapsed.
    ///
    /// Rejects with [`PromiseError::SchedulerShutdown`] if the scheduler no
    /// longer accepts timers.
    pub fn delayed<F>(delay: Duration, computation: F) -> Self
    where
        F: FnOnce() -> Result<T, Reason> + Send + 'static,
    {
        Self::delayed_on(&Scheduler::global(), delay, computation)
    }

    pub fn delayed_on<F>(scheduler: &Scheduler, delay: Duration, computation: F) -> Self
    where
        F: FnOnce() -> Result<T, Reason> + Send + 'static,
    {
        let promise = Self::pending_on(scheduler);
        let target = promise.clone();
        if let Err(err) = scheduler.schedule(delay, move || {
            target.settle(capture(computation));
        }) {
            promise.reject(shutdown_reason(err));
        }
        promise
    }

    /// Hand a [`Settler`] to `executor`, which runs immediately.
    ///
    /// An `Err` or panic from the executor rejects the promise unless it was
    /// already resolved.
    pub fn with_executor<F>(executor: F) -> Self
    where
        F: FnOnce(Settler<T>) -> Result<(), Reason>,
    {
        Self::with_executor_on(&Scheduler::global(), executor)
    }

    pub fn with_executor_on<F>(scheduler: &Scheduler, executor: F) -> Self
    where
        F: FnOnce(Settler<T>) -> Result<(), Reason>,
    {
        let promise = Self::pending_on(scheduler);
        let settler = Settler::new(promise.clone());
        if let Err(reason) = capture(|| executor(settler)) {
            promise.reject(reason);
        }
        promise
    }

    // ---- settlement ---------------------------------------------------

    /// Fulfill with `value`. Returns `false` if the promise was already
    /// claimed.
    pub fn resolve(&self, value: T) -> bool {
        self.resolve_with(Resolution::Value(value))
    }

    /// Fulfill, or adopt another promise or awaitable.
    ///
    /// Returns `true` if this call claimed the promise, even when the
    /// adopted outcome is still pending. Resolving a promise with itself
    /// rejects it with [`PromiseError::SelfResolution`].
    pub fn resolve_with(&self, resolution: Resolution<T>) -> bool {
        if !self.claim() {
            return false;
        }
        self.adopt(resolution);
        true
    }

    pub fn reject(&self, reason: impl Into<Reason>) -> bool {
        if !self.claim() {
            return false;
        }
        self.publish(Err(reason.into()));
        true
    }

    pub(crate) fn settle(&self, outcome: Result<T, Reason>) -> bool {
        match outcome {
            Ok(value) => self.resolve(value),
            Err(reason) => self.reject(reason),
        }
    }

    fn claim(&self) -> bool {
        self.core
            .state
            .compare_exchange(PENDING, CLAIMED, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub(crate) fn is_claimed(&self) -> bool {
        self.core.state.load(Ordering::SeqCst) != PENDING
    }

    /// Settle a claimed promise from `resolution`.
    fn adopt(&self, resolution: Resolution<T>) {
        match resolution {
            Resolution::Value(value) => self.publish(Ok(value)),
            Resolution::Promise(source) => {
                if source.ptr_eq(self) {
                    debug!("promise resolved with itself");
                    self.publish(Err(PromiseError::SelfResolution.into()));
                    return;
                }
                let target = self.clone();
                source.react(move |outcome| target.publish(outcome));
            }
            Resolution::Awaitable(awaitable) => {
                let bridge = Self::pending_on(&self.core.scheduler);
                let settler = Settler::new(bridge.clone());
                if let Err(reason) = capture(|| awaitable.subscribe(settler)) {
                    bridge.reject(reason);
                }
                let target = self.clone();
                bridge.react(move |outcome| target.publish(outcome));
            }
        }
    }

    /// Store the outcome of a claimed promise, wake blocked waiters and
    /// dispatch its reactions.
    fn publish(&self, outcome: Result<T, Reason>) {
        let state = if outcome.is_ok() { FULFILLED } else { REJECTED };
        {
            let mut slot = self.core.outcome.lock();
            *slot = Some(outcome.clone());
            self.core.state.store(state, Ordering::SeqCst);
            self.core.settled.notify_all();
        }
        fence(Ordering::SeqCst);
        self.core
            .subscribers
            .drain(&outcome, &self.core.scheduler);
    }

    /// Register a reaction receiving the outcome, run as a scheduler job.
    pub(crate) fn react(&self, reaction: impl FnOnce(Result<T, Reason>) + Send + 'static) {
        self.core.subscribers.push(Box::new(reaction));
        self.recheck();
    }

    /// Like [`react`](Self::react), retractable through
    /// [`unsubscribe`](Self::unsubscribe).
    pub(crate) fn react_cancellable(
        &self,
        subscription: Subscription,
        reaction: impl FnOnce(Result<T, Reason>) + Send + 'static,
    ) {
        self.core
            .subscribers
            .push_cancellable(Box::new(reaction), subscription);
        self.recheck();
    }

    /// Retract a reaction that has not been dispatched yet, releasing what
    /// it captured once enough reactions are retracted.
    pub(crate) fn unsubscribe(&self, subscription: &Subscription) {
        if self.core.subscribers.cancel(subscription) {
            self.core.subscribers.compact();
            self.recheck();
        }
    }

    /// Dispatch queued reactions if the promise has settled.
    fn recheck(&self) {
        if let Some(outcome) = self.result() {
            self.core
                .subscribers
                .drain(&outcome, &self.core.scheduler);
        }
    }

    /// Park the calling thread until the promise settles, `deadline`
    /// passes or `interrupted` holds. Returns `None` unless settled.
    ///
    /// `interrupted` is checked under the same lock settlement notifies
    /// under; see [`wake_waiters`](Self::wake_waiters).
    pub(crate) fn wait(
        &self,
        deadline: Option<Instant>,
        interrupted: impl Fn() -> bool,
    ) -> Option<Result<T, Reason>> {
        let mut slot = self.core.outcome.lock();
        loop {
            if interrupted() {
                return None;
            }
            if self.is_settled() {
                return slot.clone();
            }
            match deadline {
                Some(deadline) => {
                    if self.core.settled.wait_until(&mut slot, deadline).timed_out() {
                        return if !interrupted() && self.is_settled() {
                            slot.clone()
                        } else {
                            None
                        };
                    }
                }
                None => self.core.settled.wait(&mut slot),
            }
        }
    }

    /// Wake every thread in [`wait`](Self::wait) so it rechecks its
    /// interrupt condition.
    pub(crate) fn wake_waiters(&self) {
        let _slot = self.core.outcome.lock();
        self.core.settled.notify_all();
    }

    // ---- chaining -----------------------------------------------------

    /// Derive a promise from this one's outcome.
    ///
    /// Every `then`-family method is a shape of this: `reaction` receives the
    /// outcome and says what the derived promise resolves with.
    fn chain<R, F>(&self, reaction: F) -> Promise<R>
    where
        R: Clone + Send + 'static,
        F: FnOnce(Result<T, Reason>) -> Result<Resolution<R>, Reason> + Send + 'static,
    {
        let downstream = Promise::pending_on(&self.core.scheduler);
        let target = downstream.clone();
        self.react(move |outcome| match capture(|| reaction(outcome)) {
            Ok(resolution) => {
                target.resolve_with(resolution);
            }
            Err(reason) => {
                target.reject(reason);
            }
        });
        downstream
    }

    /// Map the fulfilled value. Rejections pass through.
    pub fn then<R, F>(&self, on_fulfilled: F) -> Promise<R>
    where
        R: Clone + Send + 'static,
        F: FnOnce(T) -> Result<R, Reason> + Send + 'static,
    {
        self.chain(move |outcome| on_fulfilled(outcome?).map(Resolution::Value))
    }

    /// Continue with another promise, adopting its outcome.
    pub fn and_then<R, F>(&self, on_fulfilled: F) -> Promise<R>
    where
        R: Clone + Send + 'static,
        F: FnOnce(T) -> Result<Promise<R>, Reason> + Send + 'static,
    {
        self.chain(move |outcome| on_fulfilled(outcome?).map(Resolution::Promise))
    }

    /// Continue with any [`Resolution`].
    pub fn then_resolve<R, F>(&self, on_fulfilled: F) -> Promise<R>
    where
        R: Clone + Send + 'static,
        F: FnOnce(T) -> Result<Resolution<R>, Reason> + Send + 'static,
    {
        self.chain(move |outcome| on_fulfilled(outcome?))
    }

    /// Handle both outcomes. Exactly one of the callbacks runs.
    pub fn then_or_else<R, F, E>(&self, on_fulfilled: F, on_rejected: E) -> Promise<R>
    where
        R: Clone + Send + 'static,
        F: FnOnce(T) -> Result<R, Reason> + Send + 'static,
        E: FnOnce(Reason) -> Result<R, Reason> + Send + 'static,
    {
        self.chain(move |outcome| {
            match outcome {
                Ok(value) => on_fulfilled(value),
                Err(reason) => on_rejected(reason),
            }
            .map(Resolution::Value)
        })
    }

    /// Recover from a rejection. Values pass through.
    pub fn catch<E>(&self, on_rejected: E) -> Promise<T>
    where
        E: FnOnce(Reason) -> Result<T, Reason> + Send + 'static,
    {
        self.chain(move |outcome| match outcome {
            Ok(value) => Ok(Resolution::Value(value)),
            Err(reason) => on_rejected(reason).map(Resolution::Value),
        })
    }

    /// Recover only from rejections matching `test`; others pass through.
    pub fn catch_if<E, P>(&self, on_rejected: E, test: P) -> Promise<T>
    where
        E: FnOnce(Reason) -> Result<T, Reason> + Send + 'static,
        P: FnOnce(&Reason) -> bool + Send + 'static,
    {
        self.chain(move |outcome| match outcome {
            Ok(value) => Ok(Resolution::Value(value)),
            Err(reason) if test(&reason) => on_rejected(reason).map(Resolution::Value),
            Err(reason) => Err(reason),
        })
    }

    /// Like [`catch_if`](Self::catch_if) with a test that answers later.
    ///
    /// The test's promise decides whether `on_rejected` runs; if it rejects,
    /// that rejection replaces the original one.
    pub fn catch_if_async<E, P>(&self, on_rejected: E, test: P) -> Promise<T>
    where
        E: FnOnce(Reason) -> Result<T, Reason> + Send + 'static,
        P: FnOnce(&Reason) -> Result<Promise<bool>, Reason> + Send + 'static,
    {
        self.chain(move |outcome| match outcome {
            Ok(value) => Ok(Resolution::Value(value)),
            Err(reason) => {
                let verdict = test(&reason)?;
                Ok(Resolution::Promise(verdict.then(move |matched| {
                    if matched {
                        on_rejected(reason)
                    } else {
                        Err(reason)
                    }
                })))
            }
        })
    }

    /// Run `action` on either outcome and pass the outcome through.
    ///
    /// An error from `action` replaces the outcome.
    pub fn finally<F>(&self, action: F) -> Promise<T>
    where
        F: FnOnce() -> Result<(), Reason> + Send + 'static,
    {
        self.chain(move |outcome| {
            action()?;
            outcome.map(Resolution::Value)
        })
    }

    /// Observe the fulfilled value without changing it.
    pub fn tap<F>(&self, observer: F) -> Promise<T>
    where
        F: FnOnce(&T) + Send + 'static,
    {
        self.chain(move |outcome| {
            let value = outcome?;
            observer(&value);
            Ok(Resolution::Value(value))
        })
    }

    /// One callback for both outcomes.
    pub fn complete<R, F>(&self, callback: F) -> Promise<R>
    where
        R: Clone + Send + 'static,
        F: FnOnce(Result<T, Reason>) -> Result<R, Reason> + Send + 'static,
    {
        self.chain(move |outcome| callback(outcome).map(Resolution::Value))
    }

    /// Forward this promise's eventual outcome into `target`.
    ///
    /// Returns `false` if `target` was already claimed.
    pub fn fill(&self, target: &Promise<T>) -> bool {
        target.resolve_with(Resolution::Promise(self.clone()))
    }

    // ---- terminal registrations ---------------------------------------

    /// End a chain. A rejection `callback` does not handle is reported to
    /// the scheduler's unhandled-rejection sink.
    fn terminal<F>(&self, callback: F)
    where
        F: FnOnce(Result<T, Reason>) -> Result<(), Reason> + Send + 'static,
    {
        let scheduler = self.core.scheduler.clone();
        self.react(move |outcome| {
            if let Err(reason) = capture(|| callback(outcome)) {
                scheduler.report_unhandled(reason);
            }
        });
    }

    /// Consume the value. A rejection, or an error from `on_fulfilled`, is
    /// reported as unhandled.
    pub fn done<F>(&self, on_fulfilled: F)
    where
        F: FnOnce(T) -> Result<(), Reason> + Send + 'static,
    {
        self.terminal(move |outcome| on_fulfilled(outcome?));
    }

    pub fn done_or_else<F, E>(&self, on_fulfilled: F, on_rejected: E)
    where
        F: FnOnce(T) -> Result<(), Reason> + Send + 'static,
        E: FnOnce(Reason) -> Result<(), Reason> + Send + 'static,
    {
        self.terminal(move |outcome| match outcome {
            Ok(value) => on_fulfilled(value),
            Err(reason) => on_rejected(reason),
        });
    }

    /// Handle a rejection at the end of a chain.
    pub fn fail<E>(&self, on_rejected: E)
    where
        E: FnOnce(Reason) -> Result<(), Reason> + Send + 'static,
    {
        self.terminal(move |outcome| match outcome {
            Ok(_) => Ok(()),
            Err(reason) => on_rejected(reason),
        });
    }

    pub fn always<F>(&self, callback: F)
    where
        F: FnOnce(Result<T, Reason>) -> Result<(), Reason> + Send + 'static,
    {
        self.terminal(callback);
    }

    // ---- timers -------------------------------------------------------

    /// Fulfill `duration` after this promise fulfills. Rejections pass
    /// through without waiting.
    pub fn delay(&self, duration: Duration) -> Promise<T> {
        let scheduler = self.core.scheduler.clone();
        self.then_resolve(move |value| {
            let delayed = Promise::pending_on(&scheduler);
            let target = delayed.clone();
            scheduler
                .schedule(duration, move || {
                    target.resolve(value);
                })
                .map_err(shutdown_reason)?;
            Ok(Resolution::Promise(delayed))
        })
    }

    /// Reject with [`PromiseError::Timeout`] unless this promise settles
    /// within `duration`.
    pub fn timeout(&self, duration: Duration) -> Promise<T> {
        self.timeout_with(duration, PromiseError::Timeout(duration))
    }

    /// Like [`timeout`](Self::timeout) with a custom rejection reason.
    ///
    /// The timer is cancelled as soon as this promise settles. When the timer
    /// fires first, the reaction left on this promise is retracted.
    pub fn timeout_with(&self, duration: Duration, reason: impl Into<Reason>) -> Promise<T> {
        let reason = reason.into();
        let downstream = Promise::pending_on(&self.core.scheduler);
        let subscription = Subscription::new();
        let expired = downstream.clone();
        let source = self.clone();
        let retract = subscription.clone();
        let timer = match self.core.scheduler.schedule(duration, move || {
            if expired.reject(reason) {
                debug!(?duration, "promise timed out");
            }
            source.unsubscribe(&retract);
        }) {
            Ok(timer) => timer,
            Err(err) => {
                downstream.reject(shutdown_reason(err));
                return downstream;
            }
        };
        let target = downstream.clone();
        self.react_cancellable(subscription, move |outcome| {
            timer.cancel();
            target.settle(outcome);
        });
        downstream
    }

    // ---- introspection ------------------------------------------------

    #[must_use]
    pub fn state(&self) -> State {
        decode(self.core.state.load(Ordering::SeqCst))
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        !self.is_settled()
    }

    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.state().is_settled()
    }

    /// The outcome, once settled.
    #[must_use]
    pub fn result(&self) -> Option<Result<T, Reason>> {
        if self.is_settled() {
            self.core.outcome.lock().clone()
        } else {
            None
        }
    }

    #[must_use]
    pub fn value(&self) -> Option<T> {
        self.result().and_then(Result::ok)
    }

    #[must_use]
    pub fn reason(&self) -> Option<Reason> {
        self.result().and_then(Result::err)
    }

    #[must_use]
    pub fn scheduler(&self) -> &Scheduler {
        &self.core.scheduler
    }

    /// True when both handles refer to the same promise.
    #[must_use]
    pub fn ptr_eq(&self, other: &Promise<T>) -> bool {
        Arc::ptr_eq(&self.core, &other.core)
    }
}

impl<T> fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("state", &decode(self.core.state.load(Ordering::Acquire)))
            .finish_non_exhaustive()
    }
}
