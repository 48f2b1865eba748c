//! Collection combinators.
//!
//! Every combinator takes any iterator of inputs convertible into a
//! [`Resolution`] (plain values, promises, awaitables) and returns one derived
//! promise. Plain values go through [`Resolution::values`] or
//! `Resolution::Value`, since a bare `T` would be ambiguous with `Promise<T>`. The scheduler-explicit forms live on the [`Combinators`] trait,
//! implemented for [`Scheduler`]; the free functions here use
//! [`Scheduler::global`].
//!
//! Inputs are always evaluated to completion. A combinator that settles
//! early (first rejection in `all`, first fulfillment in `any`) leaves the
//! remaining inputs running unobserved.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use pledge_scheduler::Scheduler;
use pledge_types::{AggregateError, PromiseError, Reason};

use crate::{Promise, Resolution};

/// Shared bookkeeping for `all` and `any`.
///
/// Each slot is written at most once; the caller that moves `remaining` from
/// one to zero owns the final settlement.
struct Gather<V> {
    slots: Mutex<Vec<Option<V>>>,
    remaining: AtomicUsize,
}

impl<V> Gather<V> {
    fn new(len: usize) -> Arc<Self> {
        Arc::new(Self {
            slots: Mutex::new((0..len).map(|_| None).collect()),
            remaining: AtomicUsize::new(len),
        })
    }

    /// Fill slot `index`. Returns every slot, in order, once all are filled.
    fn fill(&self, index: usize, value: V) -> Option<Vec<V>> {
        let mut slots = self.slots.lock();
        debug_assert!(slots[index].is_none(), "slot {index} filled twice");
        slots[index] = Some(value);
        if self.remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
            return Some(slots.drain(..).flatten().collect());
        }
        None
    }
}

fn collect_inputs<T, I>(scheduler: &Scheduler, inputs: I) -> Vec<Promise<T>>
where
    T: Clone + Send + 'static,
    I: IntoIterator,
    I::Item: Into<Resolution<T>>,
{
    inputs
        .into_iter()
        .map(|input| Promise::from_resolution_on(scheduler, input.into()))
        .collect()
}

/// Collection combinators bound to an explicit scheduler.
pub trait Combinators {
    /// Fulfill with every value, in input order, once all inputs fulfill.
    /// The first rejection wins. Empty input fulfills with `[]`.
    fn all<T, I>(&self, inputs: I) -> Promise<Vec<T>>
    where
        T: Clone + Send + 'static,
        I: IntoIterator,
        I::Item: Into<Resolution<T>>;

    /// Settle like the first input to settle. Empty input never settles.
    fn race<T, I>(&self, inputs: I) -> Promise<T>
    where
        T: Clone + Send + 'static,
        I: IntoIterator,
        I::Item: Into<Resolution<T>>;

    /// Fulfill with the first fulfillment. If every input rejects, reject
    /// with [`PromiseError::Aggregate`] holding every reason in input order.
    /// Empty input rejects with [`PromiseError::EmptyAny`].
    fn any<T, I>(&self, inputs: I) -> Promise<T>
    where
        T: Clone + Send + 'static,
        I: IntoIterator,
        I::Item: Into<Resolution<T>>;

    /// Same as [`all`](Self::all).
    fn join<T, I>(&self, inputs: I) -> Promise<Vec<T>>
    where
        T: Clone + Send + 'static,
        I: IntoIterator,
        I::Item: Into<Resolution<T>>,
    {
        self.all(inputs)
    }

    /// Apply `f` to the whole collected vector.
    fn run<T, R, I, F>(&self, inputs: I, f: F) -> Promise<R>
    where
        T: Clone + Send + 'static,
        R: Clone + Send + 'static,
        I: IntoIterator,
        I::Item: Into<Resolution<T>>,
        F: FnOnce(Vec<T>) -> Result<R, Reason> + Send + 'static,
    {
        self.all(inputs).then(f)
    }

    /// `f(value, index)` for every element, input order preserved.
    fn map<T, R, I, F>(&self, inputs: I, mut f: F) -> Promise<Vec<R>>
    where
        T: Clone + Send + 'static,
        R: Clone + Send + 'static,
        I: IntoIterator,
        I::Item: Into<Resolution<T>>,
        F: FnMut(T, usize) -> Result<R, Reason> + Send + 'static,
    {
        self.run(inputs, move |values| {
            values
                .into_iter()
                .enumerate()
                .map(|(index, value)| f(value, index))
                .collect()
        })
    }

    /// Keep the elements for which `predicate(&value, index)` holds.
    fn filter<T, I, P>(&self, inputs: I, mut predicate: P) -> Promise<Vec<T>>
    where
        T: Clone + Send + 'static,
        I: IntoIterator,
        I::Item: Into<Resolution<T>>,
        P: FnMut(&T, usize) -> Result<bool, Reason> + Send + 'static,
    {
        self.run(inputs, move |values| {
            let mut kept = Vec::with_capacity(values.len());
            for (index, value) in values.into_iter().enumerate() {
                if predicate(&value, index)? {
                    kept.push(value);
                }
            }
            Ok(kept)
        })
    }

    /// Left fold seeded with the first element. Empty input gives `None`.
    fn reduce<T, I, F>(&self, inputs: I, mut f: F) -> Promise<Option<T>>
    where
        T: Clone + Send + 'static,
        I: IntoIterator,
        I::Item: Into<Resolution<T>>,
        F: FnMut(T, T, usize) -> Result<T, Reason> + Send + 'static,
    {
        self.run(inputs, move |values| {
            let mut iter = values.into_iter().enumerate();
            let Some((_, first)) = iter.next() else {
                return Ok(None);
            };
            iter.try_fold(first, |acc, (index, value)| f(acc, value, index))
                .map(Some)
        })
    }

    /// Right fold seeded with the last element. Empty input gives `None`.
    fn reduce_right<T, I, F>(&self, inputs: I, mut f: F) -> Promise<Option<T>>
    where
        T: Clone + Send + 'static,
        I: IntoIterator,
        I::Item: Into<Resolution<T>>,
        F: FnMut(T, T, usize) -> Result<T, Reason> + Send + 'static,
    {
        self.run(inputs, move |values| {
            let mut iter = values.into_iter().enumerate().rev();
            let Some((_, last)) = iter.next() else {
                return Ok(None);
            };
            iter.try_fold(last, |acc, (index, value)| f(acc, value, index))
                .map(Some)
        })
    }

    /// Left fold from `init`.
    fn fold<T, R, I, F>(&self, inputs: I, init: R, mut f: F) -> Promise<R>
    where
        T: Clone + Send + 'static,
        R: Clone + Send + 'static,
        I: IntoIterator,
        I::Item: Into<Resolution<T>>,
        F: FnMut(R, T, usize) -> Result<R, Reason> + Send + 'static,
    {
        self.run(inputs, move |values| {
            values
                .into_iter()
                .enumerate()
                .try_fold(init, |acc, (index, value)| f(acc, value, index))
        })
    }

    /// Right fold from `init`.
    fn fold_right<T, R, I, F>(&self, inputs: I, init: R, mut f: F) -> Promise<R>
    where
        T: Clone + Send + 'static,
        R: Clone + Send + 'static,
        I: IntoIterator,
        I::Item: Into<Resolution<T>>,
        F: FnMut(R, T, usize) -> Result<R, Reason> + Send + 'static,
    {
        self.run(inputs, move |values| {
            values
                .into_iter()
                .enumerate()
                .rev()
                .try_fold(init, |acc, (index, value)| f(acc, value, index))
        })
    }

    fn for_each<T, I, F>(&self, inputs: I, mut f: F) -> Promise<()>
    where
        T: Clone + Send + 'static,
        I: IntoIterator,
        I::Item: Into<Resolution<T>>,
        F: FnMut(T, usize) -> Result<(), Reason> + Send + 'static,
    {
        self.run(inputs, move |values| {
            for (index, value) in values.into_iter().enumerate() {
                f(value, index)?;
            }
            Ok(())
        })
    }

    /// True if `predicate` holds for every value. Stops at the first
    /// `false`; the inputs themselves are still all awaited.
    fn every<T, I, P>(&self, inputs: I, mut predicate: P) -> Promise<bool>
    where
        T: Clone + Send + 'static,
        I: IntoIterator,
        I::Item: Into<Resolution<T>>,
        P: FnMut(&T, usize) -> Result<bool, Reason> + Send + 'static,
    {
        self.run(inputs, move |values| {
            for (index, value) in values.iter().enumerate() {
                if !predicate(value, index)? {
                    return Ok(false);
                }
            }
            Ok(true)
        })
    }

    /// True if `predicate` holds for some value. Stops at the first `true`.
    fn some<T, I, P>(&self, inputs: I, mut predicate: P) -> Promise<bool>
    where
        T: Clone + Send + 'static,
        I: IntoIterator,
        I::Item: Into<Resolution<T>>,
        P: FnMut(&T, usize) -> Result<bool, Reason> + Send + 'static,
    {
        self.run(inputs, move |values| {
            for (index, value) in values.iter().enumerate() {
                if predicate(value, index)? {
                    return Ok(true);
                }
            }
            Ok(false)
        })
    }
}

impl Combinators for Scheduler {
    fn all<T, I>(&self, inputs: I) -> Promise<Vec<T>>
    where
        T: Clone + Send + 'static,
        I: IntoIterator,
        I::Item: Into<Resolution<T>>,
    {
        let inputs = collect_inputs(self, inputs);
        let output = Promise::pending_on(self);
        if inputs.is_empty() {
            output.resolve(Vec::new());
            return output;
        }

        let gather = Gather::new(inputs.len());
        for (index, input) in inputs.into_iter().enumerate() {
            let gather = Arc::clone(&gather);
            let output = output.clone();
            input.react(move |outcome| match outcome {
                Ok(value) => {
                    if let Some(values) = gather.fill(index, value) {
                        output.resolve(values);
                    }
                }
                Err(reason) => {
                    output.reject(reason);
                }
            });
        }
        output
    }

    fn race<T, I>(&self, inputs: I) -> Promise<T>
    where
        T: Clone + Send + 'static,
        I: IntoIterator,
        I::Item: Into<Resolution<T>>,
    {
        let output = Promise::pending_on(self);
        for input in collect_inputs(self, inputs) {
            let output = output.clone();
            input.react(move |outcome| {
                output.settle(outcome);
            });
        }
        output
    }

    fn any<T, I>(&self, inputs: I) -> Promise<T>
    where
        T: Clone + Send + 'static,
        I: IntoIterator,
        I::Item: Into<Resolution<T>>,
    {
        let inputs = collect_inputs(self, inputs);
        if inputs.is_empty() {
            return Promise::rejected_on(self, PromiseError::EmptyAny);
        }

        let output = Promise::pending_on(self);
        let gather = Gather::new(inputs.len());
        for (index, input) in inputs.into_iter().enumerate() {
            let gather = Arc::clone(&gather);
            let output = output.clone();
            input.react(move |outcome| match outcome {
                Ok(value) => {
                    output.resolve(value);
                }
                Err(reason) => {
                    if let Some(reasons) = gather.fill(index, reason) {
                        output.reject(PromiseError::from(AggregateError::new(reasons)));
                    }
                }
            });
        }
        output
    }
}

pub fn all<T, I>(inputs: I) -> Promise<Vec<T>>
where
    T: Clone + Send + 'static,
    I: IntoIterator,
    I::Item: Into<Resolution<T>>,
{
    Scheduler::global().all(inputs)
}

pub fn join<T, I>(inputs: I) -> Promise<Vec<T>>
where
    T: Clone + Send + 'static,
    I: IntoIterator,
    I::Item: Into<Resolution<T>>,
{
    Scheduler::global().join(inputs)
}

pub fn race<T, I>(inputs: I) -> Promise<T>
where
    T: Clone + Send + 'static,
    I: IntoIterator,
    I::Item: Into<Resolution<T>>,
{
    Scheduler::global().race(inputs)
}

pub fn any<T, I>(inputs: I) -> Promise<T>
where
    T: Clone + Send + 'static,
    I: IntoIterator,
    I::Item: Into<Resolution<T>>,
{
    Scheduler::global().any(inputs)
}

pub fn run<T, R, I, F>(inputs: I, f: F) -> Promise<R>
where
    T: Clone + Send + 'static,
    R: Clone + Send + 'static,
    I: IntoIterator,
    I::Item: Into<Resolution<T>>,
    F: FnOnce(Vec<T>) -> Result<R, Reason> + Send + 'static,
{
    Scheduler::global().run(inputs, f)
}

pub fn map<T, R, I, F>(inputs: I, f: F) -> Promise<Vec<R>>
where
    T: Clone + Send + 'static,
    R: Clone + Send + 'static,
    I: IntoIterator,
    I::Item: Into<Resolution<T>>,
    F: FnMut(T, usize) -> Result<R, Reason> + Send + 'static,
{
    Scheduler::global().map(inputs, f)
}

pub fn filter<T, I, P>(inputs: I, predicate: P) -> Promise<Vec<T>>
where
    T: Clone + Send + 'static,
    I: IntoIterator,
    I::Item: Into<Resolution<T>>,
    P: FnMut(&T, usize) -> Result<bool, Reason> + Send + 'static,
{
    Scheduler::global().filter(inputs, predicate)
}

pub fn reduce<T, I, F>(inputs: I, f: F) -> Promise<Option<T>>
where
    T: Clone + Send + 'static,
    I: IntoIterator,
    I::Item: Into<Resolution<T>>,
    F: FnMut(T, T, usize) -> Result<T, Reason> + Send + 'static,
{
    Scheduler::global().reduce(inputs, f)
}

pub fn reduce_right<T, I, F>(inputs: I, f: F) -> Promise<Option<T>>
where
    T: Clone + Send + 'static,
    I: IntoIterator,
    I::Item: Into<Resolution<T>>,
    F: FnMut(T, T, usize) -> Result<T, Reason> + Send + 'static,
{
    Scheduler::global().reduce_right(inputs, f)
}

pub fn fold<T, R, I, F>(inputs: I, init: R, f: F) -> Promise<R>
where
    T: Clone + Send + 'static,
    R: Clone + Send + 'static,
    I: IntoIterator,
    I::Item: Into<Resolution<T>>,
    F: FnMut(R, T, usize) -> Result<R, Reason> + Send + 'static,
{
    Scheduler::global().fold(inputs, init, f)
}

pub fn fold_right<T, R, I, F>(inputs: I, init: R, f: F) -> Promise<R>
where
    T: Clone + Send + 'static,
    R: Clone + Send + 'static,
    I: IntoIterator,
    I::Item: Into<Resolution<T>>,
    F: FnMut(R, T, usize) -> Result<R, Reason> + Send + 'static,
{
    Scheduler::global().fold_right(inputs, init, f)
}

pub fn for_each<T, I, F>(inputs: I, f: F) -> Promise<()>
where
    T: Clone + Send + 'static,
    I: IntoIterator,
    I::Item: Into<Resolution<T>>,
    F: FnMut(T, usize) -> Result<(), Reason> + Send + 'static,
{
    Scheduler::global().for_each(inputs, f)
}

pub fn every<T, I, P>(inputs: I, predicate: P) -> Promise<bool>
where
    T: Clone + Send + 'static,
    I: IntoIterator,
    I::Item: Into<Resolution<T>>,
    P: FnMut(&T, usize) -> Result<bool, Reason> + Send + 'static,
{
    Scheduler::global().every(inputs, predicate)
}

pub fn some<T, I, P>(inputs: I, predicate: P) -> Promise<bool>
where
    T: Clone + Send + 'static,
    I: IntoIterator,
    I::Item: Into<Resolution<T>>,
    P: FnMut(&T, usize) -> Result<bool, Reason> + Send + 'static,
{
    Scheduler::global().some(inputs, predicate)
}
