//! Runtime: scheduler, readiness multiplexer and blocking bridge.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                            Runtime                               │
//! │  ┌─────────────┐   ┌─────────────────┐   ┌────────────────────┐  │
//! │  │  Scheduler  │◄──│   Multiplexer   │──►│ Reactor backend    │  │
//! │  │ (ready FIFO)│   │ (system task)   │   │ scan: poll(2)      │  │
//! │  └──────▲──────┘   │  SleepQueue     │   │ indexed: epoll(7)  │  │
//! │         │          └─────────────────┘   └────────────────────┘  │
//! │         │          ┌─────────────────┐   ┌────────────────────┐  │
//! │         └──────────│ Bridge (system  │◄──│  worker threads    │  │
//! │                    │ completion task)│   │  pending/completed │  │
//! │                    └─────────────────┘   └────────────────────┘  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Types
//!
//! | Type | Purpose |
//! |------|---------|
//! | [`Runtime`] | Owns the scheduler; `block_on` / `run` entry points |
//! | [`RuntimeBuilder`] | Programmatic and environment configuration |
//! | [`RuntimeConfig`] | Backend, descriptor bound, wait slice, bridge settings |
//! | [`reactor::Reactor`] | Readiness backend contract |
//! | [`multiplexer::Multiplexer`] | Housekeeping task driving readiness and timers |
//! | [`timer::SleepQueue`] | Deadline-ordered sleepers |

pub mod blocking_pool;
pub mod builder;
pub mod config;
pub mod env_config;
pub mod multiplexer;
pub mod reactor;
pub mod scheduler;
pub mod timer;
mod waker;

pub use blocking_pool::{read_async, write_async};
pub use builder::{Runtime, RuntimeBuilder};
pub use config::{Backend, BridgeConfig, QueueOrder, RuntimeConfig};
pub use scheduler::{
    current, mark_current_system, outstanding, sleepers, spawn, spawn_system, terminate,
    yield_now, TaskId, TaskRef, YieldNow,
};
