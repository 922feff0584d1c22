//! Readiness and timer multiplexer.
//!
//! The multiplexer is a housekeeping task (`coopio-multiplexer`) started the
//! first time any task calls [`wait`] or [`delay`](crate::time::delay). Each
//! iteration it:
//!
//! 1. yields until no other task ran during its yield
//! 2. derives the wait budget from the [`SleepQueue`]
//! 3. performs one readiness wait on the [`Reactor`] backend, retrying on
//!    `EINTR` and ending the process on any other failure
//! 4. wakes the owners of every ready descriptor
//! 5. wakes every sleeper whose deadline has passed, earliest first
//!
//! When there is neither a registration nor a sleeper it parks instead of
//! blocking the thread, and the next registration resumes it.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::future::Future;
use std::os::unix::io::RawFd;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};
use std::time::{Duration, Instant};

use super::reactor::{self, Interest, Reactor, WaitSignal, Waiter};
use super::scheduler::{try_with_scheduler, with_scheduler, yield_now, Scheduler};
use super::timer::SleepQueue;
use crate::error::{fatal, FatalError, RegisterError};
use crate::tracing_compat::{debug, trace};

/// Counters describing multiplexer activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MultiplexerStats {
    /// Readiness waits that returned.
    pub iterations: u64,
    /// Readiness waits interrupted by a signal and retried.
    pub interrupted: u64,
    /// Tasks woken because a descriptor became ready.
    pub readiness_wakeups: u64,
    /// Tasks woken because their deadline passed.
    pub timer_wakeups: u64,
}

/// Shared state of the multiplexer task.
pub struct Multiplexer {
    reactor: RefCell<Box<dyn Reactor>>,
    sleepers: RefCell<SleepQueue>,
    max_wait_slice: Duration,
    parked: RefCell<Option<Waker>>,
    stats: Cell<MultiplexerStats>,
}

impl Multiplexer {
    /// Returns the runtime's multiplexer, creating the backend and spawning
    /// the housekeeping task on first use.
    ///
    /// Backend creation failure is fatal.
    pub(crate) fn get_or_start(scheduler: &Rc<Scheduler>) -> Rc<Self> {
        if let Some(mux) = scheduler.multiplexer_cell().get() {
            return Rc::clone(mux);
        }
        let config = scheduler.config();
        let reactor = match reactor::create(config) {
            Ok(reactor) => reactor,
            Err(e) => fatal(FatalError::Backend(e)),
        };
        debug!(
            backend = ?reactor.backend(),
            max_descriptors = config.max_descriptors,
            max_wait_slice_ms = config.max_wait_slice.as_millis() as u64,
            "starting multiplexer"
        );
        let mux = Rc::new(Self {
            reactor: RefCell::new(reactor),
            sleepers: RefCell::new(SleepQueue::new()),
            max_wait_slice: config.max_wait_slice,
            parked: RefCell::new(None),
            stats: Cell::new(MultiplexerStats::default()),
        });
        let mux = Rc::clone(scheduler.multiplexer_cell().get_or_init(|| mux));
        scheduler.spawn_task("coopio-multiplexer", true, run(Rc::clone(&mux)));
        mux
    }

    /// Registers `waiter` for `interest` on `fd`.
    pub(crate) fn register(
        &self,
        fd: RawFd,
        interest: Interest,
        waiter: Waiter,
    ) -> Result<(), RegisterError> {
        self.reactor.borrow_mut().register(fd, interest, waiter)?;
        self.unpark();
        Ok(())
    }

    /// Queues `waiter` until `deadline`. Non-system sleepers count as
    /// outstanding work until the multiplexer wakes them.
    pub(crate) fn sleep(&self, scheduler: &Scheduler, deadline: Instant, system: bool, waiter: Waiter) {
        let seq = self.sleepers.borrow_mut().insert(deadline, system, waiter);
        if !system {
            scheduler.sleeper_added();
        }
        trace!(seq, system, "sleeper queued");
        self.unpark();
    }

    /// Drops the registration behind `signal` if it is still pending.
    ///
    /// Skipped when the backend is busy, which only happens if a wait is
    /// dropped from inside a readiness wait; the entry then lingers until
    /// its descriptor fires.
    pub(crate) fn cancel(&self, fd: RawFd, signal: &WaitSignal) {
        let Ok(mut reactor) = self.reactor.try_borrow_mut() else {
            return;
        };
        if reactor.cancel(fd, signal) {
            trace!(fd, "wait cancelled");
        }
    }

    /// Activity counters.
    #[must_use]
    pub fn stats(&self) -> MultiplexerStats {
        self.stats.get()
    }

    /// Active descriptor registrations.
    #[must_use]
    pub fn registration_count(&self) -> usize {
        self.reactor.borrow().registration_count()
    }

    /// Queued sleepers, system ones included.
    #[must_use]
    pub fn sleeping(&self) -> usize {
        self.sleepers.borrow().len()
    }

    fn has_work(&self) -> bool {
        !self.reactor.borrow().is_empty() || !self.sleepers.borrow().is_empty()
    }

    fn unpark(&self) {
        if let Some(waker) = self.parked.borrow_mut().take() {
            waker.wake();
        }
    }

    fn update(&self, f: impl FnOnce(&mut MultiplexerStats)) {
        let mut stats = self.stats.get();
        f(&mut stats);
        self.stats.set(stats);
    }
}

impl fmt::Debug for Multiplexer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Multiplexer")
            .field("reactor", &self.reactor.borrow())
            .field("sleepers", &self.sleepers.borrow().len())
            .field("max_wait_slice", &self.max_wait_slice)
            .field("stats", &self.stats.get())
            .finish_non_exhaustive()
    }
}

async fn run(mux: Rc<Multiplexer>) {
    let mut ready = Vec::new();
    loop {
        while yield_now().await > 0 {}

        if !mux.has_work() {
            Park { mux: &mux }.await;
            continue;
        }

        let budget = mux
            .sleepers
            .borrow()
            .budget(Instant::now(), mux.max_wait_slice);
        let polled = mux.reactor.borrow_mut().poll(budget, &mut ready);
        match polled {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {
                mux.update(|s| s.interrupted += 1);
                trace!("readiness wait interrupted");
                continue;
            }
            Err(e) => fatal(FatalError::Poll(e)),
        }

        let io_ready = ready.len();
        for waiter in ready.drain(..) {
            waiter.wake();
        }

        let due = mux.sleepers.borrow_mut().pop_due(Instant::now());
        let timer_ready = due.len();
        if !due.is_empty() {
            with_scheduler(|s| {
                for node in &due {
                    if !node.is_system() {
                        s.sleeper_removed();
                    }
                }
            });
        }
        for node in due {
            node.wake();
        }

        mux.update(|s| {
            s.iterations += 1;
            s.readiness_wakeups += io_ready as u64;
            s.timer_wakeups += timer_ready as u64;
        });
        trace!(
            budget_ms = budget.map(|b| b.as_millis() as u64),
            io_ready,
            timer_ready,
            "multiplexer iteration"
        );
    }
}

/// Suspends the multiplexer until something is registered.
struct Park<'a> {
    mux: &'a Multiplexer,
}

impl Future for Park<'_> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.mux.has_work() {
            return Poll::Ready(());
        }
        *self.mux.parked.borrow_mut() = Some(cx.waker().clone());
        trace!("multiplexer parked");
        Poll::Pending
    }
}

/// Suspends the calling task until `fd` is ready for `interest`.
///
/// Starts the multiplexer if needed. Overflowing the registration bound ends
/// the process; a kernel refusal (indexed backend) is returned without
/// suspending.
///
/// Readiness is one-shot: the registration is gone once the task resumes.
/// Dropping a pending `Wait` (e.g. when [`timeout`](crate::combinator::timeout)
/// gives up) removes its registration.
#[must_use = "futures do nothing unless awaited"]
pub fn wait(fd: RawFd, interest: Interest) -> Wait {
    Wait {
        fd,
        interest,
        signal: None,
    }
}

/// Future returned by [`wait`].
#[derive(Debug)]
pub struct Wait {
    fd: RawFd,
    interest: Interest,
    signal: Option<WaitSignal>,
}

impl Future for Wait {
    type Output = Result<(), RegisterError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if let Some(signal) = &self.signal {
            return if signal.is_fired() {
                Poll::Ready(Ok(()))
            } else {
                Poll::Pending
            };
        }

        let mux = with_scheduler(Multiplexer::get_or_start);
        let (waiter, signal) = Waiter::new(cx.waker().clone());
        match mux.register(self.fd, self.interest, waiter) {
            Ok(()) => {
                self.signal = Some(signal);
                Poll::Pending
            }
            Err(e) if e.is_fatal() => fatal(FatalError::DescriptorTableFull(e)),
            Err(e) => Poll::Ready(Err(e)),
        }
    }
}

impl Drop for Wait {
    fn drop(&mut self) {
        let Some(signal) = self.signal.take() else {
            return;
        };
        if signal.is_fired() {
            return;
        }
        let fd = self.fd;
        try_with_scheduler(|s| {
            if let Some(mux) = s.multiplexer_cell().get() {
                mux.cancel(fd, &signal);
            }
        });
    }
}

/// Counters of the current runtime's multiplexer, zero if it never started.
///
/// Returns `None` outside a running runtime.
#[must_use]
pub fn stats() -> Option<MultiplexerStats> {
    try_with_scheduler(|s| {
        s.multiplexer_cell()
            .get()
            .map(|m| m.stats())
            .unwrap_or_default()
    })
}

/// Active descriptor registrations of the current runtime's multiplexer.
#[must_use]
pub fn registrations() -> usize {
    with_scheduler(|s| {
        s.multiplexer_cell()
            .get()
            .map_or(0, |m| m.registration_count())
    })
}
