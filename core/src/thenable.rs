//! Adoption of foreign awaitables.

use std::fmt;

use pledge_types::Reason;

use crate::Promise;

/// Anything a promise can adopt besides another [`Promise`].
///
/// `subscribe` is called at most once, from the thread that resolved the
/// adopting promise. The implementation settles through the [`Settler`] now
/// or later; only its first settlement has any effect. Returning `Err` (or
/// panicking) rejects the adopting promise unless it was already settled.
pub trait Awaitable<T>: Send + 'static {
    fn subscribe(self: Box<Self>, settler: Settler<T>) -> Result<(), Reason>;
}

impl<T, F> Awaitable<T> for F
where
    F: FnOnce(Settler<T>) -> Result<(), Reason> + Send + 'static,
{
    fn subscribe(self: Box<Self>, settler: Settler<T>) -> Result<(), Reason> {
        (*self)(settler)
    }
}

/// What a promise can be resolved with.
pub enum Resolution<T> {
    /// Fulfill with this value.
    Value(T),
    /// Adopt the outcome of another promise.
    Promise(Promise<T>),
    /// Adopt the outcome of a foreign awaitable.
    Awaitable(Box<dyn Awaitable<T>>),
}

impl<T> Resolution<T> {
    pub fn awaitable(awaitable: impl Awaitable<T>) -> Self {
        Resolution::Awaitable(Box::new(awaitable))
    }

    /// Wrap plain values, for combinator inputs that are all ready.
    pub fn values<I>(values: I) -> impl Iterator<Item = Resolution<T>>
    where
        I: IntoIterator<Item = T>,
    {
        values.into_iter().map(Resolution::Value)
    }

    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Resolution::Value(_) => "value",
            Resolution::Promise(_) => "promise",
            Resolution::Awaitable(_) => "awaitable",
        }
    }
}

impl<T> From<Promise<T>> for Resolution<T> {
    fn from(promise: Promise<T>) -> Self {
        Resolution::Promise(promise)
    }
}

impl<T> From<Box<dyn Awaitable<T>>> for Resolution<T> {
    fn from(awaitable: Box<dyn Awaitable<T>>) -> Self {
        Resolution::Awaitable(awaitable)
    }
}

impl<T> fmt::Debug for Resolution<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Resolution").field(&self.kind()).finish()
    }
}

/// The resolve/reject capability for one promise.
///
/// Handed to executor callbacks ([`Promise::with_executor`]) and to
/// [`Awaitable`]s. Clones settle the same promise and the first settlement
/// across all of them wins; later calls return `false`.
pub struct Settler<T> {
    target: Promise<T>,
}

impl<T> Clone for Settler<T> {
    fn clone(&self) -> Self {
        Self {
            target: self.target.clone(),
        }
    }
}

impl<T: Clone + Send + 'static> Settler<T> {
    pub(crate) fn new(target: Promise<T>) -> Self {
        Self { target }
    }

    pub fn resolve(&self, value: T) -> bool {
        self.target.resolve(value)
    }

    pub fn resolve_with(&self, resolution: Resolution<T>) -> bool {
        self.target.resolve_with(resolution)
    }

    pub fn reject(&self, reason: impl Into<Reason>) -> bool {
        self.target.reject(reason)
    }

    /// Settle from a `Result`, as a callback-style API would report it.
    pub fn settle(&self, outcome: Result<T, Reason>) -> bool {
        match outcome {
            Ok(value) => self.resolve(value),
            Err(reason) => self.reject(reason),
        }
    }

    /// True once the target has been resolved, rejected or has started
    /// adopting another outcome.
    #[must_use]
    pub fn is_claimed(&self) -> bool {
        self.target.is_claimed()
    }
}

impl<T> fmt::Debug for Settler<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settler").finish_non_exhaustive()
    }
}
