//! Combinators over suspension points.
//!
//! - [`select`]: wait for the first of two futures
//! - [`timeout`]: bound any future by a millisecond deadline
//!
//! Neither cancels the losing side beyond dropping it. What a dropped
//! suspension point leaves behind:
//!
//! | Dropped | Left behind |
//! |---------|-------------|
//! | [`wait`](crate::wait) | its registration, until the descriptor fires |
//! | [`delay`](crate::delay) | its sleeper, until the deadline |
//! | bridged read/write | its job, until a worker completes it |

pub mod select;
pub mod timeout;

pub use select::{select, Either, Select};
pub use timeout::{timeout, Timeout};
