//! Readiness backends for the multiplexer.
//!
//! Both backends implement one contract, [`Reactor`]:
//!
//! - `register(fd, interest, waiter)`: remember that `waiter` wants `interest` on `fd`
//! - `poll(timeout, ready)`: one OS readiness wait; owners of ready
//!   descriptors are moved into `ready` and their registrations dropped
//! - `deregister(fd)`: forget every registration on `fd`
//! - `cancel(fd, signal)`: forget the one registration behind `signal`, used
//!   when a suspended `wait` is dropped before it fires
//!
//! # Platform Backends
//!
//! | Backend | Module | Table | Removal |
//! |---------|--------|-------|---------|
//! | Scan | `poll.rs` | `pollfd` array, one entry per waiter | swap-with-last |
//! | Indexed | `epoll.rs` | slot per descriptor number | `EPOLL_CTL_DEL`, slot kept on failure |
//!
//! Registrations are one-shot: a waiter is woken at most once and the
//! registration is gone afterwards. Waiting again means registering again.
//!
//! # Thread Safety
//!
//! Backends are owned by the multiplexer and only touched from the
//! cooperative thread, so they take `&mut self` and hold no locks.

pub mod interest;
pub mod poll;

#[cfg(target_os = "linux")]
pub mod epoll;

pub use interest::Interest;
pub use poll::PollReactor;

#[cfg(target_os = "linux")]
pub use epoll::EpollReactor;

use std::cell::Cell;
use std::fmt;
use std::io;
use std::os::unix::io::RawFd;
use std::rc::Rc;
use std::task::Waker;
use std::time::Duration;

use crate::error::RegisterError;
use crate::runtime::config::{Backend, RuntimeConfig};

/// One-shot wake handle a registration holds on behalf of its owner task.
#[derive(Clone)]
pub struct Waiter {
    waker: Waker,
    fired: Rc<Cell<bool>>,
}

impl Waiter {
    /// Creates a waiter for `waker` plus the signal its owner checks on resume.
    #[must_use]
    pub fn new(waker: Waker) -> (Self, WaitSignal) {
        let fired = Rc::new(Cell::new(false));
        (
            Self {
                waker,
                fired: Rc::clone(&fired),
            },
            WaitSignal { fired },
        )
    }

    /// True if `signal` is the owner side of this waiter.
    #[must_use]
    pub fn belongs_to(&self, signal: &WaitSignal) -> bool {
        Rc::ptr_eq(&self.fired, &signal.fired)
    }

    /// Marks the wait as satisfied and readies the owner.
    pub fn wake(self) {
        self.fired.set(true);
        self.waker.wake();
    }
}

impl fmt::Debug for Waiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Waiter")
            .field("fired", &self.fired.get())
            .finish_non_exhaustive()
    }
}

/// Owner side of a [`Waiter`]: tells a resumed task whether its wait fired.
#[derive(Debug, Clone)]
pub struct WaitSignal {
    fired: Rc<Cell<bool>>,
}

impl WaitSignal {
    /// True once the matching waiter has been woken.
    #[must_use]
    pub fn is_fired(&self) -> bool {
        self.fired.get()
    }
}

/// Readiness backend contract shared by the scan and indexed backends.
pub trait Reactor: fmt::Debug {
    /// Records that `waiter` wants `interest` on `fd`.
    ///
    /// # Errors
    ///
    /// - [`RegisterError::TableFull`]: the bound was exceeded; the caller
    ///   treats this as fatal
    /// - [`RegisterError::BadDescriptor`]: negative descriptor (scan backend)
    /// - [`RegisterError::Kernel`]: the kernel refused the registration
    fn register(&mut self, fd: RawFd, interest: Interest, waiter: Waiter)
        -> Result<(), RegisterError>;

    /// Issues one readiness wait, blocking up to `timeout` (`None` = forever).
    ///
    /// Owners of descriptors reporting an event are appended to `ready` and
    /// their registrations are dropped. Returns the number of owners appended.
    ///
    /// # Errors
    ///
    /// Returns the OS error of the wait call, including
    /// `io::ErrorKind::Interrupted`, which callers retry.
    fn poll(&mut self, timeout: Option<Duration>, ready: &mut Vec<Waiter>) -> io::Result<usize>;

    /// Forgets every registration on `fd` without waking its owners.
    ///
    /// # Errors
    ///
    /// `io::ErrorKind::NotFound` when nothing is registered on `fd`; the
    /// indexed backend also returns kernel errors, keeping the slot registered.
    fn deregister(&mut self, fd: RawFd) -> io::Result<()>;

    /// Drops the registration on `fd` whose waiter matches `signal`, leaving
    /// other registrations on `fd` alone. Returns false if there is none,
    /// e.g. because it already fired or a later owner replaced it.
    fn cancel(&mut self, fd: RawFd, signal: &WaitSignal) -> bool;

    /// Returns the number of active registrations.
    fn registration_count(&self) -> usize;

    /// Returns `true` if no registrations are active.
    fn is_empty(&self) -> bool {
        self.registration_count() == 0
    }

    /// Which backend this is.
    fn backend(&self) -> Backend;
}

/// Creates the backend selected by `config`.
pub fn create(config: &RuntimeConfig) -> io::Result<Box<dyn Reactor>> {
    match config.backend {
        Backend::Scan => Ok(Box::new(PollReactor::new(config.max_descriptors))),
        #[cfg(target_os = "linux")]
        Backend::Indexed => Ok(Box::new(EpollReactor::new(
            config.max_descriptors,
            config.events_capacity,
        )?)),
        #[cfg(not(target_os = "linux"))]
        Backend::Indexed => Ok(Box::new(PollReactor::new(config.max_descriptors))),
    }
}

/// Converts a wait budget to the millisecond argument of `poll`/`epoll_wait`.
///
/// Rounds up so a wait never ends before the budget, and saturates at `c_int::MAX`.
pub(crate) fn timeout_ms(timeout: Option<Duration>) -> libc::c_int {
    match timeout {
        None => -1,
        Some(d) => {
            let mut ms = d.as_millis();
            if Duration::from_millis(ms as u64) < d {
                ms += 1;
            }
            ms.min(libc::c_int::MAX as u128) as libc::c_int
        }
    }
}
