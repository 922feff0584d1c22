//! Deadline-ordered queue of sleeping tasks.
//!
//! Unlike a heap, the queue is a plain ordered list: insertion scans for the
//! first entry with a strictly later deadline, so sleepers sharing a deadline
//! wake in the order they went to sleep.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use super::reactor::Waiter;

/// A task sleeping until an absolute deadline.
#[derive(Debug)]
pub struct SleepNode {
    deadline: Instant,
    system: bool,
    /// Insertion sequence number, used for diagnostics and tie ordering.
    seq: u64,
    waiter: Waiter,
}

impl SleepNode {
    /// Deadline at which the sleeper becomes runnable.
    #[must_use]
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// True when the sleeper is a system task (not counted as a sleeper).
    #[must_use]
    pub fn is_system(&self) -> bool {
        self.system
    }

    /// Position in insertion order.
    #[must_use]
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Readies the sleeping task.
    pub fn wake(self) {
        self.waiter.wake();
    }
}

/// Sleepers ordered by non-decreasing deadline.
#[derive(Debug, Default)]
pub struct SleepQueue {
    nodes: VecDeque<SleepNode>,
    next_seq: u64,
}

impl SleepQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of queued sleepers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if nobody is sleeping.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Queues `waiter` until `deadline`, after every sleeper with an equal or
    /// earlier deadline. Returns the node's sequence number.
    pub fn insert(&mut self, deadline: Instant, system: bool, waiter: Waiter) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        let at = self
            .nodes
            .iter()
            .position(|n| n.deadline > deadline)
            .unwrap_or(self.nodes.len());
        self.nodes.insert(
            at,
            SleepNode {
                deadline,
                system,
                seq,
                waiter,
            },
        );
        seq
    }

    /// Earliest deadline, if any.
    #[must_use]
    pub fn peek_deadline(&self) -> Option<Instant> {
        self.nodes.front().map(|n| n.deadline)
    }

    /// Removes every sleeper due at `now`, earliest first.
    pub fn pop_due(&mut self, now: Instant) -> Vec<SleepNode> {
        let mut due = Vec::new();
        while self.nodes.front().is_some_and(|n| n.deadline <= now) {
            if let Some(node) = self.nodes.pop_front() {
                due.push(node);
            }
        }
        due
    }

    /// How long the next readiness wait may block.
    ///
    /// - `None`: no sleepers, wait indefinitely
    /// - `Some(ZERO)`: the head is already due
    /// - otherwise the time until the head's deadline, rounded up to a whole
    ///   millisecond and capped at `max_slice`
    #[must_use]
    pub fn budget(&self, now: Instant, max_slice: Duration) -> Option<Duration> {
        let deadline = self.peek_deadline()?;
        if deadline <= now {
            return Some(Duration::ZERO);
        }
        let remaining = deadline - now;
        let ms = remaining.as_nanos().div_ceil(1_000_000);
        let rounded = Duration::from_millis(u64::try_from(ms).unwrap_or(u64::MAX));
        Some(rounded.min(max_slice))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::reactor::WaitSignal;
    use crate::test_utils::{counting_waker, init_test_logging};
    use proptest::prelude::*;

    fn waiter() -> (Waiter, WaitSignal) {
        Waiter::new(counting_waker().0)
    }

    const SLICE: Duration = Duration::from_millis(5000);

    #[test]
    fn empty_queue_waits_indefinitely() {
        init_test_logging();
        let q = SleepQueue::new();
        assert!(q.is_empty());
        assert_eq!(q.budget(Instant::now(), SLICE), None);
    }

    #[test]
    fn due_head_gives_zero_budget() {
        let now = Instant::now();
        let mut q = SleepQueue::new();
        q.insert(now, false, waiter().0);
        assert_eq!(q.budget(now, SLICE), Some(Duration::ZERO));
        assert_eq!(
            q.budget(now + Duration::from_millis(3), SLICE),
            Some(Duration::ZERO)
        );
    }

    #[test]
    fn budget_rounds_up_and_clamps() {
        init_test_logging();
        crate::test_phase!("budget_rounds_up_and_clamps");
        let now = Instant::now();
        let mut q = SleepQueue::new();
        q.insert(now + Duration::from_micros(1500), false, waiter().0);
        let budget = q.budget(now, SLICE);
        crate::assert_with_log!(
            budget == Some(Duration::from_millis(2)),
            "rounded budget",
            Some(Duration::from_millis(2)),
            budget
        );

        let mut far = SleepQueue::new();
        far.insert(now + Duration::from_secs(60), false, waiter().0);
        assert_eq!(far.budget(now, SLICE), Some(SLICE));
        crate::test_complete!("budget_rounds_up_and_clamps");
    }

    #[test]
    fn pop_due_stops_at_first_future_deadline() {
        let now = Instant::now();
        let mut q = SleepQueue::new();
        let (late, late_signal) = waiter();
        let (early, early_signal) = waiter();
        q.insert(now + Duration::from_millis(50), false, late);
        q.insert(now + Duration::from_millis(10), true, early);

        let due = q.pop_due(now + Duration::from_millis(20));
        assert_eq!(due.len(), 1);
        assert!(due[0].is_system());
        for node in due {
            node.wake();
        }
        assert!(early_signal.is_fired());
        assert!(!late_signal.is_fired());
        assert_eq!(q.len(), 1);
        assert_eq!(q.peek_deadline(), Some(now + Duration::from_millis(50)));
    }

    #[test]
    fn equal_deadlines_keep_registration_order() {
        let now = Instant::now();
        let deadline = now + Duration::from_millis(5);
        let mut q = SleepQueue::new();
        let first = q.insert(deadline, false, waiter().0);
        let second = q.insert(deadline, false, waiter().0);
        let third = q.insert(now, false, waiter().0);
        let order: Vec<u64> = q.pop_due(deadline).iter().map(SleepNode::seq).collect();
        assert_eq!(order, vec![third, first, second]);
    }

    proptest! {
        #[test]
        fn pop_order_is_sorted_and_stable(offsets in proptest::collection::vec(0u64..50, 1..64)) {
            let base = Instant::now();
            let mut q = SleepQueue::new();
            for off in &offsets {
                q.insert(base + Duration::from_millis(*off), false, waiter().0);
            }
            let popped = q.pop_due(base + Duration::from_millis(50));
            prop_assert_eq!(popped.len(), offsets.len());
            for pair in popped.windows(2) {
                prop_assert!(pair[0].deadline() <= pair[1].deadline());
                if pair[0].deadline() == pair[1].deadline() {
                    prop_assert!(pair[0].seq() < pair[1].seq());
                }
            }
            prop_assert!(q.is_empty());
        }
    }
}
