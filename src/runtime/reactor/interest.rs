//! Interest flags for I/O readiness.

use std::fmt;
use std::ops::BitOr;

/// Interest flags indicating what I/O events to wait for.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Interest(u8);

impl Interest {
    /// No interest.
    pub const NONE: Self = Self(0);
    /// Interest in readable events.
    pub const READABLE: Self = Self(0b01);
    /// Interest in writable events.
    pub const WRITABLE: Self = Self(0b10);

    /// Returns interest in both readable and writable events.
    #[must_use]
    pub const fn both() -> Self {
        Self(Self::READABLE.0 | Self::WRITABLE.0)
    }

    /// Returns true if readable interest is set.
    #[must_use]
    pub const fn is_readable(&self) -> bool {
        self.0 & Self::READABLE.0 != 0
    }

    /// Returns true if writable interest is set.
    #[must_use]
    pub const fn is_writable(&self) -> bool {
        self.0 & Self::WRITABLE.0 != 0
    }

    /// Returns true if no interest is set.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Combines interests.
    #[must_use]
    pub const fn add(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Removes interest.
    #[must_use]
    pub const fn remove(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    /// `poll(2)` event mask for this interest.
    #[must_use]
    pub fn poll_events(self) -> libc::c_short {
        let mut events = 0;
        if self.is_readable() {
            events |= libc::POLLIN;
        }
        if self.is_writable() {
            events |= libc::POLLOUT;
        }
        events
    }

    /// `epoll(7)` event mask for this interest. Readable includes urgent data.
    #[cfg(target_os = "linux")]
    #[must_use]
    pub fn epoll_events(self) -> u32 {
        let mut events = 0;
        if self.is_readable() {
            events |= (libc::EPOLLIN | libc::EPOLLPRI) as u32;
        }
        if self.is_writable() {
            events |= libc::EPOLLOUT as u32;
        }
        events
    }
}

impl BitOr for Interest {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.add(rhs)
    }
}

impl fmt::Debug for Interest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.is_readable(), self.is_writable()) {
            (true, true) => f.write_str("READABLE | WRITABLE"),
            (true, false) => f.write_str("READABLE"),
            (false, true) => f.write_str("WRITABLE"),
            (false, false) => f.write_str("NONE"),
        }
    }
}
