//! Pending reactions of one promise.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering, fence};

use crossbeam::queue::SegQueue;
use parking_lot::RwLock;

use pledge_scheduler::Scheduler;
use pledge_types::Reason;

/// One registered continuation. Receives the settled outcome exactly once.
pub(crate) type Reaction<T> = Box<dyn FnOnce(Result<T, Reason>) + Send + 'static>;

/// Cancellation token for a reaction registered with
/// [`SubscriberQueue::push_cancellable`].
#[derive(Clone)]
pub(crate) struct Subscription {
    live: Arc<AtomicBool>,
}

impl Subscription {
    pub(crate) fn new() -> Self {
        Self {
            live: Arc::new(AtomicBool::new(true)),
        }
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }
}

struct Entry<T> {
    reaction: Reaction<T>,
    subscription: Option<Subscription>,
}

impl<T> Entry<T> {
    fn is_live(&self) -> bool {
        self.subscription.as_ref().is_none_or(Subscription::is_live)
    }
}

/// Lock-free FIFO of reactions waiting for a promise to settle.
///
/// Producers push without coordination. Dispatch is serialized by the
/// `draining` flag: whoever wins it hands every queued reaction to the
/// scheduler in push order, so reactions fire in registration order even when
/// `push` races with settlement. The owner calls [`drain`](Self::drain) after
/// publishing the outcome and after every push that observes a settled
/// promise (enqueue, then recheck).
///
/// Both sides of that handshake are a store followed by a load of the other
/// side's location: the settler stores the outcome then pops, the subscriber
/// pushes then loads the state, and the drainer clears its flag then checks
/// for stragglers. Each gap carries a `SeqCst` fence so at least one side
/// observes the other.
///
/// Cancelled reactions are skipped by `drain` and removed by
/// [`compact`](Self::compact) once they make up half the queue. Compaction
/// holds the `draining` flag and the write side of `gate`, which every push
/// takes shared, so it can pop and re-push the survivors without reordering.
pub(crate) struct SubscriberQueue<T> {
    queue: SegQueue<Entry<T>>,
    draining: AtomicBool,
    gate: RwLock<()>,
    cancelled: AtomicUsize,
}

impl<T> Default for SubscriberQueue<T> {
    fn default() -> Self {
        Self {
            queue: SegQueue::new(),
            draining: AtomicBool::new(false),
            gate: RwLock::new(()),
            cancelled: AtomicUsize::new(0),
        }
    }
}

impl<T: Clone + Send + 'static> SubscriberQueue<T> {
    pub(crate) fn push(&self, reaction: Reaction<T>) {
        self.enqueue(Entry {
            reaction,
            subscription: None,
        });
    }

    /// Push a reaction that [`cancel`](Self::cancel) can retract before it
    /// is dispatched.
    pub(crate) fn push_cancellable(&self, reaction: Reaction<T>, subscription: Subscription) {
        self.enqueue(Entry {
            reaction,
            subscription: Some(subscription),
        });
    }

    fn enqueue(&self, entry: Entry<T>) {
        {
            let _gate = self.gate.read();
            self.queue.push(entry);
        }
        fence(Ordering::SeqCst);
    }

    /// Retract a reaction. Returns `false` if it was already cancelled.
    ///
    /// A cancelled reaction never runs. Its captured state is released when
    /// the queue is next compacted or drained.
    pub(crate) fn cancel(&self, subscription: &Subscription) -> bool {
        if !subscription.live.swap(false, Ordering::AcqRel) {
            return false;
        }
        self.cancelled.fetch_add(1, Ordering::AcqRel);
        true
    }

    /// Drop cancelled reactions once they are at least half the queue.
    ///
    /// Only valid while the promise is pending. The caller must recheck for
    /// settlement afterwards, since a `drain` attempted meanwhile backs off.
    /// Returns the number of reactions removed.
    pub(crate) fn compact(&self) -> usize {
        let cancelled = self.cancelled.load(Ordering::Acquire);
        if cancelled == 0 || cancelled * 2 < self.queue.len() {
            return 0;
        }
        let mut removed = Vec::new();
        {
            let _gate = self.gate.write();
            if self
                .draining
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_err()
            {
                return 0;
            }
            let mut kept = Vec::with_capacity(self.queue.len());
            while let Some(entry) = self.queue.pop() {
                if entry.is_live() {
                    kept.push(entry);
                } else {
                    removed.push(entry);
                }
            }
            for entry in kept {
                self.queue.push(entry);
            }
            self.draining.store(false, Ordering::SeqCst);
        }
        fence(Ordering::SeqCst);
        let count = removed.len();
        // Counts only what this call removed; cancellations racing with the
        // pass stay counted for the next one.
        let _ = self
            .cancelled
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                Some(n.saturating_sub(count))
            });
        // Captured state may own other promises; release it outside the gate.
        drop(removed);
        count
    }

    /// Dispatch every queued reaction with a clone of `outcome`.
    ///
    /// Must only be called once the outcome is published. Returns the number
    /// of reactions this call dispatched.
    pub(crate) fn drain(&self, outcome: &Result<T, Reason>, scheduler: &Scheduler) -> usize {
        let mut dispatched = 0;
        loop {
            if self
                .draining
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_err()
            {
                // The active drainer rechecks the queue before giving up the
                // flag, so our push is not lost.
                return dispatched;
            }
            while let Some(entry) = self.queue.pop() {
                if !entry.is_live() {
                    continue;
                }
                let reaction = entry.reaction;
                let outcome = outcome.clone();
                scheduler.execute(move || reaction(outcome));
                dispatched += 1;
            }
            self.draining.store(false, Ordering::SeqCst);
            fence(Ordering::SeqCst);
            if self.queue.is_empty() {
                return dispatched;
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.queue.len()
    }
}
