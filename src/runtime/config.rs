//! Runtime configuration types.
//!
//! In most cases use [`RuntimeBuilder`](super::builder::RuntimeBuilder) rather
//! than creating a [`RuntimeConfig`] directly.
//!
//! # Defaults
//!
//! | Field | Default |
//! |-------|---------|
//! | `backend` | `Indexed` on Linux, `Scan` elsewhere |
//! | `max_descriptors` | 10240 |
//! | `max_wait_slice` | 5 s |
//! | `events_capacity` | 1024 |
//! | `bridge.threads` | 5 |
//! | `bridge.queue_order` | `Lifo` |
//! | `bridge.thread_name_prefix` | `"coopio-bridge"` |

use std::time::Duration;

/// Default bound on concurrently tracked descriptor registrations.
pub const DEFAULT_MAX_DESCRIPTORS: usize = 10_240;

/// Default upper bound on a single readiness wait.
pub const DEFAULT_MAX_WAIT_SLICE: Duration = Duration::from_secs(5);

/// Default number of bridge worker threads.
pub const DEFAULT_BRIDGE_THREADS: usize = 5;

/// Readiness backend used by the multiplexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// Array of `pollfd` entries scanned linearly (portable).
    Scan,
    /// Descriptor-indexed table driving `epoll` (Linux only).
    Indexed,
}

impl Backend {
    /// Best backend the platform supports.
    #[must_use]
    pub const fn platform_default() -> Self {
        if cfg!(target_os = "linux") {
            Self::Indexed
        } else {
            Self::Scan
        }
    }
}

impl Default for Backend {
    fn default() -> Self {
        Self::platform_default()
    }
}

/// Order in which the bridge pops jobs from its pending and completed queues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueueOrder {
    /// Most recently pushed job first.
    #[default]
    Lifo,
    /// Oldest job first.
    Fifo,
}

/// Configuration for the blocking bridge.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Worker threads started by an implicit `init`.
    pub threads: usize,
    /// Pop order for pending and completed jobs.
    pub queue_order: QueueOrder,
    /// Name prefix for worker threads.
    pub thread_name_prefix: String,
}

impl BridgeConfig {
    /// Normalize configuration values to safe defaults.
    pub fn normalize(&mut self) {
        if self.threads == 0 {
            self.threads = DEFAULT_BRIDGE_THREADS;
        }
        if self.thread_name_prefix.is_empty() {
            self.thread_name_prefix = "coopio-bridge".to_string();
        }
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            threads: DEFAULT_BRIDGE_THREADS,
            queue_order: QueueOrder::default(),
            thread_name_prefix: "coopio-bridge".to_string(),
        }
    }
}

/// Runtime configuration.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Readiness backend.
    pub backend: Backend,
    /// Bound on tracked registrations (scan) or descriptor numbers (indexed).
    pub max_descriptors: usize,
    /// Longest single readiness wait while sleepers are queued.
    pub max_wait_slice: Duration,
    /// Events collected per indexed-backend wait.
    pub events_capacity: usize,
    /// Blocking bridge configuration.
    pub bridge: BridgeConfig,
}

impl RuntimeConfig {
    /// Normalize configuration values to safe defaults.
    pub fn normalize(&mut self) {
        if self.max_descriptors == 0 {
            self.max_descriptors = 1;
        }
        if self.max_wait_slice.is_zero() {
            self.max_wait_slice = DEFAULT_MAX_WAIT_SLICE;
        }
        if self.events_capacity == 0 {
            self.events_capacity = 1;
        }
        if !cfg!(target_os = "linux") {
            self.backend = Backend::Scan;
        }
        self.bridge.normalize();
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            max_descriptors: DEFAULT_MAX_DESCRIPTORS,
            max_wait_slice: DEFAULT_MAX_WAIT_SLICE,
            events_capacity: 1024,
            bridge: BridgeConfig::default(),
        }
    }
}
