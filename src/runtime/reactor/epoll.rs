//! Indexed backend built on `epoll(7)`.
//!
//! Registrations live in a table indexed directly by descriptor number, so
//! an event is mapped back to its owner without scanning. Each slot holds:
//!
//! - the owner waiting on the descriptor (at most one; a later registration
//!   replaces it without waking the earlier owner)
//! - the accumulated interest mask handed to the kernel
//! - whether the descriptor is currently known to the kernel
//!
//! Interest accumulates across registrations (`EPOLL_CTL_ADD` first, then
//! `EPOLL_CTL_MOD`) until an event fires. The descriptor is then removed with
//! `EPOLL_CTL_DEL`; the slot is only reset if that succeeds, so a failed
//! delete leaves it registered and the next registration modifies it.
//!
//! A cancelled owner deletes the descriptor the same way. If the kernel no
//! longer knows the descriptor (closed, or a new file behind the number, which
//! may not even be pollable) the slot is reset anyway, since no event can
//! ever arrive for it.
//!
//! The table grows on demand up to `limit` descriptors.

#![allow(unsafe_code)]

use std::fmt;
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::time::Duration;

use super::{timeout_ms, Interest, Reactor, WaitSignal, Waiter};
use crate::error::RegisterError;
use crate::runtime::config::Backend;
use crate::tracing_compat::{debug, trace};

#[derive(Debug, Default)]
struct Slot {
    owner: Option<Waiter>,
    bits: u32,
    registered: bool,
}

/// Linux readiness backend indexed by descriptor number.
pub struct EpollReactor {
    epfd: OwnedFd,
    slots: Vec<Slot>,
    events: Vec<libc::epoll_event>,
    limit: usize,
    registered: usize,
}

impl EpollReactor {
    /// Creates a backend accepting descriptors below `limit`, collecting up to
    /// `events_capacity` events per wait.
    pub fn new(limit: usize, events_capacity: usize) -> io::Result<Self> {
        // SAFETY: plain syscall with no pointer arguments.
        let fd = unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: fd is newly created and owned by this function.
        let epfd = unsafe { OwnedFd::from_raw_fd(fd) };
        debug!(epfd = fd, limit, events_capacity, "indexed backend created");
        Ok(Self {
            epfd,
            slots: Vec::new(),
            events: Vec::with_capacity(events_capacity.max(1)),
            limit,
            registered: 0,
        })
    }

    fn ctl(&self, op: libc::c_int, fd: RawFd, bits: u32) -> io::Result<()> {
        let mut event = libc::epoll_event {
            events: bits,
            u64: fd as u64,
        };
        // SAFETY: `event` outlives the call; the kernel copies it.
        let rc = unsafe { libc::epoll_ctl(self.epfd.as_raw_fd(), op, fd, &mut event) };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    #[cfg(test)]
    fn slot_state(&self, fd: RawFd) -> Option<(u32, bool, bool)> {
        self.slots
            .get(fd as usize)
            .map(|s| (s.bits, s.registered, s.owner.is_some()))
    }
}

impl fmt::Debug for EpollReactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EpollReactor")
            .field("epfd", &self.epfd)
            .field("slots", &self.slots.len())
            .field("registered", &self.registered)
            .field("limit", &self.limit)
            .finish_non_exhaustive()
    }
}

impl Reactor for EpollReactor {
    fn register(
        &mut self,
        fd: RawFd,
        interest: Interest,
        waiter: Waiter,
    ) -> Result<(), RegisterError> {
        if fd < 0 {
            return Err(RegisterError::Kernel(io::Error::from_raw_os_error(
                libc::EBADF,
            )));
        }
        let index = fd as usize;
        if index >= self.limit {
            return Err(RegisterError::TableFull { limit: self.limit });
        }
        if index >= self.slots.len() {
            self.slots.resize_with(index + 1, Slot::default);
        }

        let wanted = interest.epoll_events();
        let (was_registered, prior) = {
            let slot = &self.slots[index];
            (slot.registered, slot.bits)
        };
        let mut bits = prior | wanted;
        if was_registered {
            match self.ctl(libc::EPOLL_CTL_MOD, fd, bits) {
                Ok(()) => {}
                // The descriptor was closed while registered and the kernel
                // dropped it; this is a new file behind a reused number.
                Err(e) if e.raw_os_error() == Some(libc::ENOENT) => {
                    bits = wanted;
                    self.ctl(libc::EPOLL_CTL_ADD, fd, bits)
                        .map_err(RegisterError::Kernel)?;
                }
                Err(e) => return Err(RegisterError::Kernel(e)),
            }
        } else {
            self.ctl(libc::EPOLL_CTL_ADD, fd, bits)
                .map_err(RegisterError::Kernel)?;
            self.registered += 1;
        }

        let slot = &mut self.slots[index];
        if slot.owner.is_some() {
            trace!(fd, "indexed backend replacing owner");
        }
        slot.owner = Some(waiter);
        slot.bits = bits;
        slot.registered = true;
        trace!(fd, bits, "indexed backend registered");
        Ok(())
    }

    fn poll(&mut self, timeout: Option<Duration>, ready: &mut Vec<Waiter>) -> io::Result<usize> {
        let timeout = timeout_ms(timeout);
        let capacity = self.events.capacity();
        self.events.clear();
        // SAFETY: the buffer has room for `capacity` events and the kernel
        // writes at most that many.
        let n = unsafe {
            libc::epoll_wait(
                self.epfd.as_raw_fd(),
                self.events.as_mut_ptr(),
                capacity as libc::c_int,
                timeout,
            )
        };
        if n < 0 {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: epoll_wait initialized the first `n` entries.
        unsafe { self.events.set_len(n as usize) };

        let mut woken = 0;
        for i in 0..self.events.len() {
            let fd = self.events[i].u64 as RawFd;
            let Some(slot) = self.slots.get_mut(fd as usize) else {
                continue;
            };
            if let Some(owner) = slot.owner.take() {
                ready.push(owner);
                woken += 1;
            }
            if let Err(e) = self.deregister(fd) {
                trace!(fd, error = %e, "indexed backend delete failed, slot kept");
            }
        }
        Ok(woken)
    }

    fn deregister(&mut self, fd: RawFd) -> io::Result<()> {
        let registered = self
            .slots
            .get(fd as usize)
            .is_some_and(|slot| fd >= 0 && slot.registered);
        if !registered {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("descriptor {fd} is not registered"),
            ));
        }
        self.ctl(libc::EPOLL_CTL_DEL, fd, 0)?;
        self.slots[fd as usize] = Slot::default();
        self.registered -= 1;
        Ok(())
    }

    fn cancel(&mut self, fd: RawFd, signal: &WaitSignal) -> bool {
        let Some(slot) = usize::try_from(fd).ok().and_then(|i| self.slots.get_mut(i)) else {
            return false;
        };
        if !slot.owner.as_ref().is_some_and(|owner| owner.belongs_to(signal)) {
            return false;
        }
        slot.owner = None;
        match self.deregister(fd) {
            Ok(()) => {
                trace!(fd, "indexed backend cancelled");
            }
            Err(e)
                if matches!(
                    e.raw_os_error(),
                    Some(libc::EBADF | libc::ENOENT | libc::EPERM)
                ) =>
            {
                self.slots[fd as usize] = Slot::default();
                self.registered -= 1;
                trace!(fd, error = %e, "indexed backend cancelled stale slot");
            }
            Err(e) => {
                trace!(fd, error = %e, "indexed backend delete failed, slot kept");
            }
        }
        true
    }

    fn registration_count(&self) -> usize {
        self.registered
    }

    fn backend(&self) -> Backend {
        Backend::Indexed
    }
}
