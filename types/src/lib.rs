//! Core value types for Pledge.
//!
//! This crate contains the pure types shared by every layer of the engine:
//! settlement states, the type-erased rejection [`Reason`], and the engine's
//! error taxonomy. No IO, no threads, no clocks.

// Pedantic lint configuration - these are intentional design choices
#![allow(clippy::missing_errors_doc)] // Result-returning functions are self-explanatory

mod error;
mod reason;
mod state;

pub use error::{AggregateError, PromiseError, WaitError, panic_message};
pub use reason::Reason;
pub use state::State;
