//! Runtime builder and the [`Runtime`] entry point.

use std::future::Future;
use std::pin::pin;
use std::rc::Rc;
use std::sync::Arc;
use std::task::{Context, Poll};

use crate::error::ConfigError;
use crate::runtime::config::{Backend, QueueOrder, RuntimeConfig};
use crate::runtime::env_config::apply_env_overrides;
use crate::runtime::scheduler::{EnterGuard, Scheduler, TaskId, TaskRef};
use crate::runtime::waker::TaskWaker;
use std::time::Duration;

/// Builder for constructing a runtime with custom configuration.
#[derive(Debug, Clone, Default)]
pub struct RuntimeBuilder {
    config: RuntimeConfig,
}

impl RuntimeBuilder {
    /// Create a new builder with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a builder seeded from `COOPIO_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = RuntimeConfig::default();
        apply_env_overrides(&mut config)?;
        Ok(Self { config })
    }

    /// Select the readiness backend.
    #[must_use]
    pub fn backend(mut self, backend: Backend) -> Self {
        self.config.backend = backend;
        self
    }

    /// Set the bound on tracked descriptor registrations.
    #[must_use]
    pub fn max_descriptors(mut self, n: usize) -> Self {
        self.config.max_descriptors = n;
        self
    }

    /// Set the longest single readiness wait while sleepers are queued.
    #[must_use]
    pub fn max_wait_slice(mut self, slice: Duration) -> Self {
        self.config.max_wait_slice = slice;
        self
    }

    /// Set the number of events collected per indexed-backend wait.
    #[must_use]
    pub fn events_capacity(mut self, n: usize) -> Self {
        self.config.events_capacity = n;
        self
    }

    /// Set the worker count used when the bridge starts implicitly.
    #[must_use]
    pub fn bridge_threads(mut self, n: usize) -> Self {
        self.config.bridge.threads = n;
        self
    }

    /// Set the bridge queue pop order.
    #[must_use]
    pub fn bridge_queue_order(mut self, order: QueueOrder) -> Self {
        self.config.bridge.queue_order = order;
        self
    }

    /// Set the bridge worker thread name prefix.
    #[must_use]
    pub fn bridge_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.bridge.thread_name_prefix = prefix.into();
        self
    }

    /// Build a runtime from this configuration.
    #[must_use]
    pub fn build(self) -> Runtime {
        Runtime::with_config(self.config)
    }
}

/// A single-threaded cooperative runtime.
///
/// The runtime is `!Send`: every task it runs lives on the thread that calls
/// [`block_on`](Self::block_on) or [`run`](Self::run).
pub struct Runtime {
    scheduler: Rc<Scheduler>,
}

impl Runtime {
    /// Runtime with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    /// Construct a runtime from the given configuration.
    #[must_use]
    pub fn with_config(mut config: RuntimeConfig) -> Self {
        config.normalize();
        Self {
            scheduler: Rc::new(Scheduler::new(config)),
        }
    }

    /// Shorthand for [`RuntimeBuilder::new`].
    #[must_use]
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Returns a reference to the runtime configuration.
    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        self.scheduler.config()
    }

    /// Spawn an application task from outside the runtime.
    ///
    /// It starts running on the next [`block_on`](Self::block_on) or [`run`](Self::run).
    pub fn spawn<F>(&self, future: F) -> TaskId
    where
        F: Future<Output = ()> + 'static,
    {
        self.scheduler.spawn_task("task", false, future)
    }

    /// Run a future to completion on the current thread, driving every other
    /// task while it is suspended.
    ///
    /// # Panics
    ///
    /// Panics if called from inside a running runtime.
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        let _enter = EnterGuard::enter(Rc::clone(&self.scheduler));
        let main_waker = TaskWaker::new(Arc::clone(self.scheduler.ready_queue()), TaskId::MAIN);
        let waker = main_waker.waker();
        let mut cx = Context::from_waker(&waker);
        let mut future = pin!(future);
        let mut system = false;

        self.scheduler.add_outstanding();
        waker.wake_by_ref();
        loop {
            let id = self.scheduler.ready_queue().pop_blocking();
            if id != TaskId::MAIN {
                self.scheduler.run_task(id);
                continue;
            }
            main_waker.clear_queued();
            let poll = self
                .scheduler
                .enter_task(TaskRef::new(TaskId::MAIN, system), || {
                    future.as_mut().poll(&mut cx)
                });
            self.scheduler.settle_mark_system(&mut system);
            if let Poll::Ready(output) = poll {
                if !system {
                    self.scheduler.remove_outstanding();
                }
                return output;
            }
        }
    }

    /// Run spawned tasks until no application work remains: no live
    /// application task and no application task sleeping in `delay`.
    ///
    /// # Panics
    ///
    /// Panics if called from inside a running runtime.
    pub fn run(&self) {
        let _enter = EnterGuard::enter(Rc::clone(&self.scheduler));
        while !self.scheduler.is_idle() {
            let id = self.scheduler.ready_queue().pop_blocking();
            self.scheduler.run_task(id);
        }
    }

    /// Number of live application tasks.
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.scheduler.outstanding()
    }

    /// Number of tasks (application and system) still held by the runtime.
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.scheduler.task_count()
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.scheduler.clear_tasks();
        if let Some(bridge) = self.scheduler.bridge_cell().get() {
            bridge.shutdown();
        }
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("scheduler", &self.scheduler)
            .finish()
    }
}
