//! The [`delay`] future.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use crate::runtime::multiplexer::Multiplexer;
use crate::runtime::reactor::{WaitSignal, Waiter};
use crate::runtime::scheduler::{current, with_scheduler};

/// Suspends the calling task for at least `ms` milliseconds.
///
/// Resolves to the milliseconds actually elapsed, which is never less than
/// `ms`. While an application task sleeps it counts as outstanding work, so
/// [`Runtime::run`](crate::runtime::Runtime::run) keeps going.
///
/// Starts the multiplexer if needed.
#[must_use = "futures do nothing unless awaited"]
pub fn delay(ms: u64) -> Delay {
    Delay {
        ms,
        start: None,
        signal: None,
    }
}

/// Future returned by [`delay`].
///
/// Dropping it before it completes leaves the sleeper queued until its
/// deadline; the wake-up then goes nowhere.
#[derive(Debug)]
pub struct Delay {
    ms: u64,
    start: Option<Instant>,
    signal: Option<WaitSignal>,
}

impl Delay {
    /// Requested duration in milliseconds.
    #[must_use]
    pub fn millis(&self) -> u64 {
        self.ms
    }
}

impl Future for Delay {
    type Output = u64;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<u64> {
        if let (Some(start), Some(signal)) = (self.start, &self.signal) {
            if !signal.is_fired() {
                return Poll::Pending;
            }
            return Poll::Ready(start.elapsed().as_millis() as u64);
        }

        let start = Instant::now();
        let deadline = start + Duration::from_millis(self.ms);
        let system = current().is_some_and(|task| task.is_system());
        let (waiter, signal) = Waiter::new(cx.waker().clone());
        with_scheduler(|s| Multiplexer::get_or_start(s).sleep(s, deadline, system, waiter));
        self.start = Some(start);
        self.signal = Some(signal);
        Poll::Pending
    }
}
