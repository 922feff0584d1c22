//! Time primitives: millisecond delays and the timeout error.
//!
//! - [`delay`]: suspends the calling task until a deadline passes
//! - [`Elapsed`]: returned by [`timeout`](crate::combinator::timeout)
//!
//! Deadlines use the monotonic clock. Precision is one millisecond: the
//! multiplexer never wakes a sleeper early, but may wake it late by up to the
//! time other tasks spend before yielding.
//!
//! # Example
//!
//! ```ignore
//! use coopio::time::delay;
//!
//! let slept_ms = delay(100).await;
//! assert!(slept_ms >= 100);
//! ```

mod elapsed;
mod sleep;

pub use elapsed::Elapsed;
pub use sleep::{delay, Delay};
