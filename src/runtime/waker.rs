//! Waker implementation with deduplication.
//!
//! Every task owns one [`TaskWaker`]. Waking pushes the task id onto the
//! shared [`ReadyQueue`] unless it is already queued, so a task appears at
//! most once in the queue no matter how many wake events arrive before it
//! runs. Wakers are `Send + Sync`; the queue is the only state they touch.

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Wake, Waker};

use super::scheduler::TaskId;

/// FIFO of runnable task ids, in wake order.
#[derive(Debug, Default)]
pub(crate) struct ReadyQueue {
    queue: Mutex<VecDeque<TaskId>>,
    available: Condvar,
}

impl ReadyQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&self, task: TaskId) {
        self.queue.lock().push_back(task);
        self.available.notify_one();
    }

    /// Pops the next runnable task, parking the thread while none is queued.
    pub(crate) fn pop_blocking(&self) -> TaskId {
        let mut queue = self.queue.lock();
        loop {
            if let Some(task) = queue.pop_front() {
                return task;
            }
            self.available.wait(&mut queue);
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.queue.lock().len()
    }
}

/// A waker for a specific task.
#[derive(Debug)]
pub(crate) struct TaskWaker {
    queue: Arc<ReadyQueue>,
    task: TaskId,
    queued: AtomicBool,
}

impl TaskWaker {
    pub(crate) fn new(queue: Arc<ReadyQueue>, task: TaskId) -> Arc<Self> {
        Arc::new(Self {
            queue,
            task,
            queued: AtomicBool::new(false),
        })
    }

    /// Builds a `std` waker backed by this task waker.
    pub(crate) fn waker(self: &Arc<Self>) -> Waker {
        Waker::from(Arc::clone(self))
    }

    /// Called by the scheduler right before polling, so wakes during the
    /// poll queue the task again.
    pub(crate) fn clear_queued(&self) {
        self.queued.store(false, Ordering::Release);
    }

    fn schedule(&self) {
        if !self.queued.swap(true, Ordering::AcqRel) {
            self.queue.push(self.task);
        }
    }
}

impl Wake for TaskWaker {
    fn wake(self: Arc<Self>) {
        self.schedule();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.schedule();
    }
}
