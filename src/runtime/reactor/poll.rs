//! Scan backend built on `poll(2)`.
//!
//! Keeps two parallel arrays: the `pollfd` entries handed to the kernel and
//! the waiter owning each entry. One entry exists per waiting task, so a
//! descriptor with a reader and a writer appears twice.
//!
//! After a wait, every entry with nonzero `revents` is removed by swapping
//! the last entry into its place; the swapped-in entry is examined at the
//! same index before moving on. Any event, including `POLLERR`/`POLLHUP`/
//! `POLLNVAL`, counts as readiness: the owner retries its syscall and sees
//! the real error there.

#![allow(unsafe_code)]

use std::fmt;
use std::io;
use std::os::unix::io::RawFd;
use std::time::Duration;

use super::{timeout_ms, Interest, Reactor, WaitSignal, Waiter};
use crate::error::RegisterError;
use crate::runtime::config::Backend;
use crate::tracing_compat::trace;

/// Portable readiness backend scanning a `pollfd` array.
pub struct PollReactor {
    fds: Vec<libc::pollfd>,
    owners: Vec<Waiter>,
    limit: usize,
}

impl PollReactor {
    /// Creates an empty backend tracking at most `limit` registrations.
    #[must_use]
    pub fn new(limit: usize) -> Self {
        Self {
            fds: Vec::new(),
            owners: Vec::new(),
            limit,
        }
    }

    fn remove_at(&mut self, index: usize) -> Waiter {
        self.fds.swap_remove(index);
        self.owners.swap_remove(index)
    }
}

impl fmt::Debug for PollReactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PollReactor")
            .field("registrations", &self.fds.len())
            .field("limit", &self.limit)
            .finish()
    }
}

impl Reactor for PollReactor {
    fn register(
        &mut self,
        fd: RawFd,
        interest: Interest,
        waiter: Waiter,
    ) -> Result<(), RegisterError> {
        if fd < 0 {
            return Err(RegisterError::BadDescriptor(fd));
        }
        if self.fds.len() >= self.limit {
            return Err(RegisterError::TableFull { limit: self.limit });
        }
        self.fds.push(libc::pollfd {
            fd,
            events: interest.poll_events(),
            revents: 0,
        });
        self.owners.push(waiter);
        trace!(fd, ?interest, entries = self.fds.len(), "scan backend registered");
        Ok(())
    }

    fn poll(&mut self, timeout: Option<Duration>, ready: &mut Vec<Waiter>) -> io::Result<usize> {
        let timeout = timeout_ms(timeout);
        // SAFETY: `fds` is a live, exclusively borrowed array of `len` pollfd
        // structs; the kernel only writes their `revents` fields.
        let n = unsafe {
            libc::poll(
                self.fds.as_mut_ptr(),
                self.fds.len() as libc::nfds_t,
                timeout,
            )
        };
        if n < 0 {
            return Err(io::Error::last_os_error());
        }

        let mut woken = 0;
        let mut i = 0;
        while i < self.fds.len() {
            if self.fds[i].revents == 0 {
                i += 1;
                continue;
            }
            trace!(fd = self.fds[i].fd, revents = self.fds[i].revents, "scan backend ready");
            ready.push(self.remove_at(i));
            woken += 1;
        }
        Ok(woken)
    }

    fn deregister(&mut self, fd: RawFd) -> io::Result<()> {
        let before = self.fds.len();
        let mut i = 0;
        while i < self.fds.len() {
            if self.fds[i].fd == fd {
                drop(self.remove_at(i));
            } else {
                i += 1;
            }
        }
        if self.fds.len() == before {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("descriptor {fd} is not registered"),
            ));
        }
        Ok(())
    }

    fn cancel(&mut self, fd: RawFd, signal: &WaitSignal) -> bool {
        let found = self
            .fds
            .iter()
            .zip(&self.owners)
            .position(|(entry, owner)| entry.fd == fd && owner.belongs_to(signal));
        let Some(index) = found else {
            return false;
        };
        drop(self.remove_at(index));
        trace!(fd, entries = self.fds.len(), "scan backend cancelled");
        true
    }

    fn registration_count(&self) -> usize {
        self.fds.len()
    }

    fn backend(&self) -> Backend {
        Backend::Scan
    }
}
