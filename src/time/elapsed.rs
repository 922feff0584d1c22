//! Elapsed error type for timeout operations.

use core::fmt;

/// Error returned when a timeout elapses.
///
/// The wrapped future was dropped without producing a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Elapsed {
    /// Timeout that was exceeded, in milliseconds.
    millis: u64,
}

impl Elapsed {
    /// Creates a new `Elapsed` error for a timeout of `millis`.
    #[must_use]
    pub const fn new(millis: u64) -> Self {
        Self { millis }
    }

    /// Returns the timeout that was exceeded, in milliseconds.
    #[must_use]
    pub const fn millis(&self) -> u64 {
        self.millis
    }
}

impl fmt::Display for Elapsed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "deadline has elapsed after {}ms", self.millis)
    }
}

impl std::error::Error for Elapsed {}

impl From<Elapsed> for std::io::Error {
    fn from(err: Elapsed) -> Self {
        Self::new(std::io::ErrorKind::TimedOut, err)
    }
}
