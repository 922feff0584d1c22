//! Environment variable support for [`RuntimeBuilder`](super::builder::RuntimeBuilder).
//!
//! # Configuration Precedence
//!
//! 1. **Programmatic**: values set via builder methods
//! 2. **Environment variables**: values from `COOPIO_*` env vars
//! 3. **Defaults**: [`RuntimeConfig::default()`]
//!
//! # Supported Environment Variables
//!
//! | Variable | Type | Maps to |
//! |----------|------|---------|
//! | `COOPIO_BACKEND` | `scan` \| `indexed` | `backend` |
//! | `COOPIO_MAX_DESCRIPTORS` | `usize` | `max_descriptors` |
//! | `COOPIO_MAX_WAIT_SLICE_MS` | `u64` | `max_wait_slice` |
//! | `COOPIO_EVENTS_CAPACITY` | `usize` | `events_capacity` |
//! | `COOPIO_BRIDGE_THREADS` | `usize` | `bridge.threads` |
//! | `COOPIO_BRIDGE_QUEUE_ORDER` | `lifo` \| `fifo` | `bridge.queue_order` |

use std::time::Duration;

use crate::error::ConfigError;
use crate::runtime::config::{Backend, QueueOrder, RuntimeConfig};

/// Environment variable name for the readiness backend.
pub const ENV_BACKEND: &str = "COOPIO_BACKEND";
/// Environment variable name for the registration bound.
pub const ENV_MAX_DESCRIPTORS: &str = "COOPIO_MAX_DESCRIPTORS";
/// Environment variable name for the maximum wait slice in milliseconds.
pub const ENV_MAX_WAIT_SLICE_MS: &str = "COOPIO_MAX_WAIT_SLICE_MS";
/// Environment variable name for the indexed-backend events buffer size.
pub const ENV_EVENTS_CAPACITY: &str = "COOPIO_EVENTS_CAPACITY";
/// Environment variable name for the bridge worker count.
pub const ENV_BRIDGE_THREADS: &str = "COOPIO_BRIDGE_THREADS";
/// Environment variable name for the bridge queue order.
pub const ENV_BRIDGE_QUEUE_ORDER: &str = "COOPIO_BRIDGE_QUEUE_ORDER";

/// Apply environment variable overrides to a [`RuntimeConfig`].
///
/// Only variables that are set are applied. Returns an error if a variable
/// is set but cannot be parsed.
pub fn apply_env_overrides(config: &mut RuntimeConfig) -> Result<(), ConfigError> {
    apply_overrides_from(config, |name| std::env::var(name).ok())
}

/// Same as [`apply_env_overrides`] with an injectable variable lookup.
pub(crate) fn apply_overrides_from<F>(config: &mut RuntimeConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(val) = lookup(ENV_BACKEND) {
        config.backend = parse_backend(&val)?;
    }
    if let Some(val) = lookup(ENV_MAX_DESCRIPTORS) {
        config.max_descriptors = parse_usize(ENV_MAX_DESCRIPTORS, &val)?;
    }
    if let Some(val) = lookup(ENV_MAX_WAIT_SLICE_MS) {
        let ms = parse_u64(ENV_MAX_WAIT_SLICE_MS, &val)?;
        config.max_wait_slice = Duration::from_millis(ms);
    }
    if let Some(val) = lookup(ENV_EVENTS_CAPACITY) {
        config.events_capacity = parse_usize(ENV_EVENTS_CAPACITY, &val)?;
    }
    if let Some(val) = lookup(ENV_BRIDGE_THREADS) {
        config.bridge.threads = parse_usize(ENV_BRIDGE_THREADS, &val)?;
    }
    if let Some(val) = lookup(ENV_BRIDGE_QUEUE_ORDER) {
        config.bridge.queue_order = parse_queue_order(&val)?;
    }
    Ok(())
}

fn parse_backend(val: &str) -> Result<Backend, ConfigError> {
    match val.trim().to_ascii_lowercase().as_str() {
        "scan" | "poll" => Ok(Backend::Scan),
        "indexed" | "epoll" => Ok(Backend::Indexed),
        _ => Err(invalid(ENV_BACKEND, "scan or indexed", val)),
    }
}

fn parse_queue_order(val: &str) -> Result<QueueOrder, ConfigError> {
    match val.trim().to_ascii_lowercase().as_str() {
        "lifo" => Ok(QueueOrder::Lifo),
        "fifo" => Ok(QueueOrder::Fifo),
        _ => Err(invalid(ENV_BRIDGE_QUEUE_ORDER, "lifo or fifo", val)),
    }
}

fn parse_usize(var: &'static str, val: &str) -> Result<usize, ConfigError> {
    val.trim()
        .parse::<usize>()
        .map_err(|_| invalid(var, "unsigned integer", val))
}

fn parse_u64(var: &'static str, val: &str) -> Result<u64, ConfigError> {
    val.trim()
        .parse::<u64>()
        .map_err(|_| invalid(var, "unsigned integer", val))
}

fn invalid(var: &'static str, expected: &'static str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        var,
        expected,
        value: value.to_string(),
    }
}
