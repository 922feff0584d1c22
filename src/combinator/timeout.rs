//! Timeout combinator: add a deadline to an operation.
//!
//! Semantically `select(operation, delay(ms))`, with the operation winning
//! ties. When the deadline wins the operation is dropped.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use crate::time::{delay, Delay, Elapsed};

/// Future returned by [`timeout`].
#[derive(Debug)]
pub struct Timeout<F> {
    inner: Pin<Box<F>>,
    deadline: Delay,
}

impl<F: Future> Future for Timeout<F> {
    type Output = Result<F::Output, Elapsed>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = &mut *self;
        if let Poll::Ready(out) = this.inner.as_mut().poll(cx) {
            return Poll::Ready(Ok(out));
        }
        match Pin::new(&mut this.deadline).poll(cx) {
            Poll::Ready(_) => Poll::Ready(Err(Elapsed::new(this.deadline.millis()))),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Runs `future`, giving up after `ms` milliseconds.
///
/// # Errors
///
/// Returns [`Elapsed`] if the deadline passes first.
pub fn timeout<F: Future>(ms: u64, future: F) -> Timeout<F> {
    Timeout {
        inner: Box::pin(future),
        deadline: delay(ms),
    }
}
