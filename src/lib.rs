//! Coopio: readiness multiplexing and blocking-call offload for single-threaded
//! cooperative tasks.
//!
//! # Overview
//!
//! Many logical tasks share one thread. A task that needs a descriptor to
//! become readable or writable, or that wants to sleep until a deadline,
//! suspends instead of blocking the thread. A task that must perform a call
//! the OS cannot report readiness for (a regular file read, a write to a
//! blocking descriptor) hands it to a worker thread and suspends until the
//! result comes back.
//!
//! ```text
//!  application tasks ──► io helpers ──► wait(fd, interest) ─┐
//!         │                                                 ▼
//!         │ delay(ms)                          ┌───────────────────────┐
//!         └──────────────► SleepQueue ◄────────│      Multiplexer      │
//!                                              │  (housekeeping task)  │
//!                                              │  poll(2) or epoll(7)  │
//!                                              └───────────▲───────────┘
//!  read_async / write_async                                │ notification fd
//!         │        ┌──────────────┐     ┌──────────────┐   │
//!         └──────► │ pending jobs │ ──► │ worker thread│ ──┴─► completed jobs
//!                  └──────────────┘     └──────────────┘
//! ```
//!
//! # Module Structure
//!
//! - [`runtime`]: scheduler, multiplexer, reactor backends, blocking bridge
//! - [`io`]: read/write helpers that retry through the multiplexer
//! - [`time`]: `delay` and the [`Elapsed`](time::Elapsed) error
//! - [`combinator`]: `select` and `timeout` over suspension points
//! - [`error`]: registration, configuration and fatal error types
//!
//! # Example
//!
//! ```ignore
//! use coopio::runtime::Runtime;
//!
//! let rt = Runtime::new();
//! rt.block_on(async {
//!     let elapsed = coopio::delay(50).await;
//!     assert!(elapsed >= 50);
//! });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_sign_loss)]

pub mod combinator;
pub mod error;
pub mod io;
pub mod runtime;
pub mod time;
pub mod tracing_compat;

#[cfg(test)]
pub(crate) mod test_utils;

pub use error::{ConfigError, FatalError, RegisterError};
pub use runtime::multiplexer::wait;
pub use runtime::reactor::Interest;
pub use runtime::{Runtime, RuntimeBuilder, RuntimeConfig};
pub use time::delay;
