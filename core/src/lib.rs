//! Promise engine for Pledge.
//!
//! - [`Promise`]: a thread-safe eventual result with at-most-once settlement,
//!   adoption of other promises and [`Awaitable`]s, and `then`-style chaining.
//!   Continuations always run on the promise's [`Scheduler`].
//! - [`combinators`]: `all`, `race`, `any` and the collection helpers built
//!   on them, both on the [`Combinators`] trait and as free functions.
//! - [`BlockingHandle`]: lets synchronous code wait for a promise.
//!
//! ```no_run
//! use pledge_core::{Combinators, Promise, Scheduler};
//! use std::time::Duration;
//!
//! let scheduler = Scheduler::global();
//! let slow = Promise::delayed_on(&scheduler, Duration::from_millis(50), || Ok(1));
//! let sum = scheduler.fold([slow, Promise::resolved(2)], 0, |acc, v, _| Ok(acc + v));
//! assert_eq!(sum.to_blocking().get().unwrap(), 3);
//! pledge_core::shutdown_global();
//! ```
//!
//! The constructors without an `_on` suffix use [`Scheduler::global`]; stop
//! it with [`shutdown_global`] at the end of `main`.

mod blocking;
pub mod combinators;
mod promise;
mod subscribers;
mod thenable;

pub use blocking::BlockingHandle;
pub use combinators::Combinators;
pub use promise::Promise;
pub use thenable::{Awaitable, Resolution, Settler};

pub use pledge_scheduler::{ManualExecutor, Scheduler, TimerHandle, shutdown_global};
pub use pledge_types::{AggregateError, PromiseError, Reason, State, WaitError};
