//! Single-threaded cooperative scheduler.
//!
//! This is the collaborator the multiplexer and the blocking bridge build on.
//! It offers exactly the primitives they consume:
//!
//! | Primitive | Function |
//! |-----------|----------|
//! | spawn | [`spawn`], [`spawn_system`] |
//! | suspend until resumed | returning `Poll::Pending` from a task future |
//! | ready(task) | [`Waker::wake`](std::task::Waker::wake) |
//! | yield once | [`yield_now`] (resolves to how many other polls ran) |
//! | mark current as system task | [`mark_current_system`] |
//! | terminate process | [`terminate`] |
//! | current task | [`current`] |
//! | outstanding application work | [`outstanding`], [`sleepers`] |
//!
//! # Borrow discipline
//!
//! A task is removed from the task table before it is polled and put back
//! afterwards, so task code may spawn or inspect the scheduler freely.

use std::cell::{Cell, OnceCell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::Arc;
use std::task::{Context, Poll};

use super::blocking_pool::Bridge;
use super::config::RuntimeConfig;
use super::multiplexer::Multiplexer;
use super::waker::{ReadyQueue, TaskWaker};
use crate::tracing_compat::trace;

thread_local! {
    static SCHEDULER: RefCell<Option<Rc<Scheduler>>> = const { RefCell::new(None) };
    static CURRENT: Cell<Option<TaskRef>> = const { Cell::new(None) };
}

/// Identifier of a cooperative task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl TaskId {
    /// Id reserved for the future passed to [`Runtime::block_on`](super::Runtime::block_on).
    pub const MAIN: Self = Self(0);

    pub(crate) const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw id.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// Handle to the task currently being polled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskRef {
    id: TaskId,
    system: bool,
}

impl TaskRef {
    pub(crate) const fn new(id: TaskId, system: bool) -> Self {
        Self { id, system }
    }

    /// Task id.
    #[must_use]
    pub const fn id(&self) -> TaskId {
        self.id
    }

    /// True for housekeeping tasks excluded from outstanding-work accounting.
    #[must_use]
    pub const fn is_system(&self) -> bool {
        self.system
    }
}

struct Task {
    name: &'static str,
    system: bool,
    future: Pin<Box<dyn Future<Output = ()>>>,
    waker: Arc<TaskWaker>,
}

/// Per-runtime scheduler state, installed thread-locally while the runtime runs.
pub(crate) struct Scheduler {
    config: RuntimeConfig,
    ready: Arc<ReadyQueue>,
    tasks: RefCell<HashMap<TaskId, Task>>,
    next_id: Cell<u64>,
    polls: Cell<u64>,
    outstanding: Cell<usize>,
    sleepers: Cell<usize>,
    mark_system: Cell<bool>,
    multiplexer: OnceCell<Rc<Multiplexer>>,
    bridge: OnceCell<Bridge>,
}

impl Scheduler {
    pub(crate) fn new(config: RuntimeConfig) -> Self {
        Self {
            config,
            ready: Arc::new(ReadyQueue::new()),
            tasks: RefCell::new(HashMap::new()),
            next_id: Cell::new(1),
            polls: Cell::new(0),
            outstanding: Cell::new(0),
            sleepers: Cell::new(0),
            mark_system: Cell::new(false),
            multiplexer: OnceCell::new(),
            bridge: OnceCell::new(),
        }
    }

    pub(crate) fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub(crate) fn ready_queue(&self) -> &Arc<ReadyQueue> {
        &self.ready
    }

    pub(crate) fn multiplexer_cell(&self) -> &OnceCell<Rc<Multiplexer>> {
        &self.multiplexer
    }

    pub(crate) fn bridge_cell(&self) -> &OnceCell<Bridge> {
        &self.bridge
    }

    pub(crate) fn spawn_task<F>(&self, name: &'static str, system: bool, future: F) -> TaskId
    where
        F: Future<Output = ()> + 'static,
    {
        let id = TaskId::new(self.next_id.get());
        self.next_id.set(id.0 + 1);
        let waker = TaskWaker::new(Arc::clone(&self.ready), id);
        if !system {
            self.outstanding.set(self.outstanding.get() + 1);
        }
        self.tasks.borrow_mut().insert(
            id,
            Task {
                name,
                system,
                future: Box::pin(future),
                waker: Arc::clone(&waker),
            },
        );
        trace!(task = %id, name, system, "spawned task");
        waker.waker().wake();
        id
    }

    /// Polls one task once. Stale ids (finished tasks) are ignored.
    pub(crate) fn run_task(&self, id: TaskId) {
        let Some(mut task) = self.tasks.borrow_mut().remove(&id) else {
            return;
        };
        task.waker.clear_queued();
        let waker = task.waker.waker();
        let mut cx = Context::from_waker(&waker);

        let poll = self.enter_task(TaskRef::new(id, task.system), || {
            task.future.as_mut().poll(&mut cx)
        });
        self.settle_mark_system(&mut task.system);

        match poll {
            Poll::Ready(()) => {
                if !task.system {
                    self.remove_outstanding();
                }
                trace!(task = %id, name = task.name, "task finished");
            }
            Poll::Pending => {
                self.tasks.borrow_mut().insert(id, task);
            }
        }
    }

    /// Runs `poll` with `task` installed as the current task.
    pub(crate) fn enter_task<R>(&self, task: TaskRef, poll: impl FnOnce() -> R) -> R {
        self.polls.set(self.polls.get() + 1);
        let prev = CURRENT.with(|c| c.replace(Some(task)));
        let out = poll();
        CURRENT.with(|c| c.set(prev));
        out
    }

    pub(crate) fn polls(&self) -> u64 {
        self.polls.get()
    }

    pub(crate) fn outstanding(&self) -> usize {
        self.outstanding.get()
    }

    pub(crate) fn add_outstanding(&self) {
        self.outstanding.set(self.outstanding.get() + 1);
    }

    pub(crate) fn sleepers(&self) -> usize {
        self.sleepers.get()
    }

    pub(crate) fn sleeper_added(&self) {
        self.sleepers.set(self.sleepers.get() + 1);
    }

    pub(crate) fn sleeper_removed(&self) {
        self.sleepers.set(self.sleepers.get().saturating_sub(1));
    }

    /// True when no application task is alive and no application sleeper is queued.
    pub(crate) fn is_idle(&self) -> bool {
        self.outstanding.get() == 0 && self.sleepers.get() == 0
    }

    pub(crate) fn remove_outstanding(&self) {
        self.outstanding.set(self.outstanding.get().saturating_sub(1));
    }

    fn request_mark_system(&self) {
        self.mark_system.set(true);
    }

    /// Applies a pending [`mark_current_system`] to the task just polled.
    pub(crate) fn settle_mark_system(&self, system: &mut bool) {
        if self.mark_system.replace(false) && !*system {
            *system = true;
            self.remove_outstanding();
        }
    }

    /// Drops every task future. Called when the owning runtime goes away.
    pub(crate) fn clear_tasks(&self) {
        let tasks = std::mem::take(&mut *self.tasks.borrow_mut());
        drop(tasks);
    }

    pub(crate) fn task_count(&self) -> usize {
        self.tasks.borrow().len()
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("tasks", &self.tasks.borrow().len())
            .field("ready", &self.ready.len())
            .field("outstanding", &self.outstanding.get())
            .field("sleepers", &self.sleepers.get())
            .finish_non_exhaustive()
    }
}

/// Restores the previously installed scheduler on drop.
pub(crate) struct EnterGuard {
    prev: Option<Rc<Scheduler>>,
}

impl EnterGuard {
    pub(crate) fn enter(scheduler: Rc<Scheduler>) -> Self {
        let prev = SCHEDULER.with(|s| s.replace(Some(scheduler)));
        assert!(
            prev.is_none(),
            "cannot start a runtime from within a runtime"
        );
        Self { prev }
    }
}

impl Drop for EnterGuard {
    fn drop(&mut self) {
        SCHEDULER.with(|s| *s.borrow_mut() = self.prev.take());
    }
}

/// Runs `f` against the scheduler installed on this thread, if any.
pub(crate) fn try_with_scheduler<R>(f: impl FnOnce(&Rc<Scheduler>) -> R) -> Option<R> {
    let scheduler = SCHEDULER.try_with(|s| s.borrow().clone()).ok().flatten()?;
    Some(f(&scheduler))
}

/// Runs `f` against the scheduler installed on this thread.
///
/// # Panics
///
/// Panics when called outside [`Runtime::block_on`](super::Runtime::block_on)
/// or [`Runtime::run`](super::Runtime::run).
pub(crate) fn with_scheduler<R>(f: impl FnOnce(&Rc<Scheduler>) -> R) -> R {
    try_with_scheduler(f).expect("coopio primitives must be used inside a running Runtime")
}

/// Spawns an application task on the current runtime.
pub fn spawn<F>(future: F) -> TaskId
where
    F: Future<Output = ()> + 'static,
{
    with_scheduler(|s| s.spawn_task("task", false, future))
}

/// Spawns a housekeeping task excluded from outstanding-work accounting.
pub fn spawn_system<F>(name: &'static str, future: F) -> TaskId
where
    F: Future<Output = ()> + 'static,
{
    with_scheduler(|s| s.spawn_task(name, true, future))
}

/// Marks the calling task as a system task from now on.
pub fn mark_current_system() {
    CURRENT.with(|c| {
        if let Some(task) = c.get() {
            c.set(Some(TaskRef::new(task.id, true)));
        }
    });
    with_scheduler(|s| s.request_mark_system());
}

/// Returns the task currently being polled.
#[must_use]
pub fn current() -> Option<TaskRef> {
    CURRENT.with(Cell::get)
}

/// Number of live application (non-system) tasks.
#[must_use]
pub fn outstanding() -> usize {
    with_scheduler(|s| s.outstanding())
}

/// Number of application tasks currently sleeping in `delay`.
#[must_use]
pub fn sleepers() -> usize {
    with_scheduler(|s| s.sleepers())
}

/// Ends the process with `code`.
pub fn terminate(code: i32) -> ! {
    std::process::exit(code)
}

/// Yields once to every other runnable task.
///
/// Resolves to the number of task polls that happened while this task was
/// waiting its turn, so `0` means nothing else was runnable.
#[must_use = "futures do nothing unless awaited"]
pub fn yield_now() -> YieldNow {
    YieldNow { start: None }
}

/// Future returned by [`yield_now`].
#[derive(Debug)]
pub struct YieldNow {
    start: Option<u64>,
}

impl Future for YieldNow {
    type Output = usize;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let polls = with_scheduler(|s| s.polls());
        match self.start {
            None => {
                self.start = Some(polls);
                cx.waker().wake_by_ref();
                Poll::Pending
            }
            Some(start) => Poll::Ready(polls.saturating_sub(start + 1) as usize),
        }
    }
}
