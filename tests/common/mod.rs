#![allow(dead_code)]
#![allow(unused_imports)]
//! Shared integration test utilities.
//!
//! Import with:
//! ```
//! mod common;
//! use common::*;
//! ```

use coopio::runtime::{Backend, Runtime, RuntimeBuilder};
use std::future::Future;
use std::os::unix::io::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;
use std::sync::Once;
use tracing_subscriber::fmt::format::FmtSpan;

static INIT_LOGGING: Once = Once::new();

/// Initialize test logging with trace-level output.
pub fn init_test_logging() {
    init_test_logging_with_level(tracing::Level::TRACE);
}

/// Initialize test logging with a custom level.
pub fn init_test_logging_with_level(level: tracing::Level) {
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(level)
            .with_test_writer()
            .with_file(true)
            .with_line_number(true)
            .with_target(true)
            .with_thread_ids(true)
            .with_span_events(FmtSpan::CLOSE)
            .with_ansi(false)
            .try_init();
    });
}

/// Backends available on this platform.
pub fn backends() -> Vec<Backend> {
    let mut out = vec![Backend::Scan];
    if cfg!(target_os = "linux") {
        out.push(Backend::Indexed);
    }
    out
}

/// Run `f` once per backend on a fresh runtime.
pub fn run_on_each_backend<F, Fut>(name: &str, mut f: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    init_test_logging();
    for backend in backends() {
        tracing::debug!(test = name, ?backend, "--- backend ---");
        let runtime = RuntimeBuilder::new().backend(backend).build();
        runtime.block_on(f());
    }
}

/// A connected, non-blocking Unix stream pair.
pub fn nonblocking_pair() -> (UnixStream, UnixStream) {
    let (a, b) = UnixStream::pair().expect("socketpair");
    a.set_nonblocking(true).expect("nonblocking a");
    b.set_nonblocking(true).expect("nonblocking b");
    (a, b)
}

/// Writes into `stream` until the kernel buffer is full.
pub fn fill_send_buffer(stream: &UnixStream) -> usize {
    use std::io::Write;
    let chunk = [0x5Au8; 4096];
    let mut total = 0;
    let mut writer = stream;
    loop {
        match writer.write(&chunk) {
            Ok(n) => total += n,
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => return total,
            Err(e) => panic!("unexpected write error: {e}"),
        }
    }
}

/// Raw descriptor shorthand.
pub fn fd(stream: &UnixStream) -> RawFd {
    stream.as_raw_fd()
}

/// Log a test phase transition with a visual separator.
#[macro_export]
macro_rules! test_phase {
    ($name:expr) => {
        tracing::info!(phase = %$name, "========================================");
        tracing::info!(phase = %$name, "TEST PHASE: {}", $name);
        tracing::info!(phase = %$name, "========================================");
    };
}

/// Log a section within a test phase.
#[macro_export]
macro_rules! test_section {
    ($name:expr) => {
        tracing::debug!(section = %$name, "--- {} ---", $name);
    };
}

/// Log test completion with summary.
#[macro_export]
macro_rules! test_complete {
    ($name:expr) => {
        tracing::info!(test = %$name, "test completed successfully: {}", $name);
    };
    ($name:expr, $($key:ident = $value:expr),* $(,)?) => {
        tracing::info!(
            test = %$name,
            $($key = %$value,)*
            "test completed successfully: {}",
            $name
        );
    };
}

/// Log before assertions for context.
#[macro_export]
macro_rules! assert_with_log {
    ($cond:expr, $msg:expr, $expected:expr, $actual:expr) => {
        tracing::debug!(
            expected = ?$expected,
            actual = ?$actual,
            "Asserting: {}",
            $msg
        );
        assert!($cond, "{}: expected {:?}, got {:?}", $msg, $expected, $actual);
    };
}
