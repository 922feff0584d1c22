//! Error types and the fatal-error path.
//!
//! Failures fall into three categories that are never mixed:
//!
//! | Category | Type | Handling |
//! |----------|------|----------|
//! | Fatal | [`FatalError`] | logged, then the process ends via [`fatal`] |
//! | Retried | `EINTR`, `EWOULDBLOCK` | absorbed by the multiplexer and io helpers |
//! | Returned | [`std::io::Error`], [`RegisterError::Kernel`] | handed back to the caller |
//!
//! Descriptor table overflow and backend failures are deliberate hard stops:
//! a process that cannot track its descriptors cannot make progress.

use std::io;
use std::os::unix::io::RawFd;

use crate::tracing_compat::error;

/// Exit code used when a fatal error terminates the process.
///
/// Matches `EX_SOFTWARE` from `sysexits.h`.
pub const FATAL_EXIT_CODE: i32 = 70;

/// Errors returned when a descriptor cannot be registered with a reactor backend.
#[derive(Debug, thiserror::Error)]
pub enum RegisterError {
    /// The registration table has reached its configured bound.
    #[error("too many poll file descriptors (limit {limit})")]
    TableFull {
        /// Configured maximum number of tracked registrations.
        limit: usize,
    },

    /// The descriptor number is negative.
    ///
    /// The caller did not suspend.
    #[error("descriptor {0} cannot be registered")]
    BadDescriptor(RawFd),

    /// The kernel rejected the registration (`epoll_ctl` failed).
    ///
    /// The caller did not suspend.
    #[error("kernel registration failed: {0}")]
    Kernel(#[source] io::Error),
}

impl RegisterError {
    /// Returns true if this error must end the process rather than reach the caller.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::TableFull { .. })
    }
}

impl From<RegisterError> for io::Error {
    fn from(err: RegisterError) -> Self {
        match err {
            RegisterError::Kernel(inner) => inner,
            other => Self::new(io::ErrorKind::Other, other),
        }
    }
}

/// Errors that end the process.
#[derive(Debug, thiserror::Error)]
pub enum FatalError {
    /// The readiness wait failed with something other than `EINTR`.
    #[error("readiness wait failed: {0}")]
    Poll(#[source] io::Error),

    /// More registrations than the descriptor table can hold.
    #[error("descriptor table overflow: {0}")]
    DescriptorTableFull(#[source] RegisterError),

    /// The reactor backend could not be created.
    #[error("cannot create readiness backend: {0}")]
    Backend(#[source] io::Error),

    /// The blocking bridge could not start (channel or worker thread creation).
    #[error("cannot start blocking bridge: {0}")]
    Bridge(#[source] io::Error),

    /// The bridge notification channel stopped delivering units.
    #[error("bridge notification channel broken: {0}")]
    Notification(#[source] io::Error),
}

impl FatalError {
    /// Returns true if the process should abort instead of exiting.
    #[must_use]
    pub const fn aborts(&self) -> bool {
        matches!(self, Self::DescriptorTableFull(_))
    }

    /// Exit code passed to the scheduler's terminate primitive.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        FATAL_EXIT_CODE
    }
}

/// Logs `err` and ends the process.
///
/// Table overflow aborts; every other fatal error terminates through the
/// scheduler with [`FATAL_EXIT_CODE`].
#[cold]
pub fn fatal(err: FatalError) -> ! {
    error!(error = %err, "fatal coopio error");
    if err.aborts() {
        std::process::abort();
    }
    crate::runtime::scheduler::terminate(err.exit_code())
}

/// Errors produced while reading configuration overrides.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An environment variable held a value that could not be parsed.
    #[error("invalid value for {var}: expected {expected}, got {value:?}")]
    InvalidValue {
        /// Variable name.
        var: &'static str,
        /// Description of the accepted values.
        expected: &'static str,
        /// The offending raw value.
        value: String,
    },
}
