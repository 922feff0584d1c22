//! Select combinator: wait for the first of two futures to complete.
//!
//! The loser is dropped when the select resolves. It is not polled again.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Result of a select operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Either<A, B> {
    /// The first future completed first.
    Left(A),
    /// The second future completed first.
    Right(B),
}

impl<A, B> Either<A, B> {
    /// Returns true if this is the Left variant.
    pub fn is_left(&self) -> bool {
        matches!(self, Self::Left(_))
    }

    /// Returns true if this is the Right variant.
    pub fn is_right(&self) -> bool {
        matches!(self, Self::Right(_))
    }
}

/// Future for the `select` combinator.
///
/// Polls `a` before `b`, so `a` wins when both are ready.
#[derive(Debug)]
pub struct Select<A, B> {
    a: A,
    b: B,
}

impl<A, B> Select<A, B> {
    /// Creates a new select combinator.
    pub fn new(a: A, b: B) -> Self {
        Self { a, b }
    }
}

impl<A: Future + Unpin, B: Future + Unpin> Future for Select<A, B> {
    type Output = Either<A::Output, B::Output>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = &mut *self;

        if let Poll::Ready(val) = Pin::new(&mut this.a).poll(cx) {
            return Poll::Ready(Either::Left(val));
        }

        if let Poll::Ready(val) = Pin::new(&mut this.b).poll(cx) {
            return Poll::Ready(Either::Right(val));
        }

        Poll::Pending
    }
}

/// Waits for whichever of `a` and `b` finishes first.
///
/// Both futures are pinned on the heap, so neither needs to be `Unpin`.
pub fn select<A, B>(a: A, b: B) -> Select<Pin<Box<A>>, Pin<Box<B>>>
where
    A: Future,
    B: Future,
{
    Select::new(Box::pin(a), Box::pin(b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::reactor::Interest;
    use crate::runtime::Runtime;
    use crate::test_utils::{fd, nonblocking_pair};
    use crate::{delay, wait};

    #[test]
    fn either_predicates() {
        let left: Either<i32, ()> = Either::Left(1);
        let right: Either<(), i32> = Either::Right(2);
        assert!(left.is_left() && !left.is_right());
        assert!(right.is_right());
    }

    #[test]
    fn earlier_delay_wins() {
        let rt = Runtime::new();
        let out = rt.block_on(select(delay(50), delay(5)));
        assert!(out.is_right());
    }

    #[test]
    fn ready_descriptor_beats_long_delay() {
        let rt = Runtime::new();
        let (a, _b) = nonblocking_pair();
        let out = rt.block_on(select(wait(fd(&a), Interest::WRITABLE), delay(5_000)));
        match out {
            Either::Left(res) => res.unwrap(),
            Either::Right(_) => panic!("delay should lose"),
        }
    }

    #[test]
    fn first_future_wins_ties() {
        let rt = Runtime::new();
        let out = rt.block_on(select(async { 1 }, async { 2 }));
        assert_eq!(out, Either::Left(1));
    }
}
