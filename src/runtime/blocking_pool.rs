//! Blocking I/O bridge.
//!
//! Offloads reads and writes the OS cannot report readiness for (regular
//! files, descriptors left in blocking mode) to a fixed set of worker
//! threads, and delivers each result back to the task that asked for it.
//!
//! # Design
//!
//! ```text
//!  task ── Job ──► pending ──► worker thread ──► completed ──┐
//!   ▲                (condvar)   read(2)/write(2)            │ one unit on the
//!   │                                                        ▼ notification fd
//!   └──────── result + buffer ◄── completion task (`coopio-bridge`)
//! ```
//!
//! A [`Job`] owns its buffer and is moved by value through every stage, so
//! no two threads ever touch it at once and the caller cannot use the buffer
//! while the call is in flight.
//!
//! The notification channel is the only way workers reach the cooperative
//! thread. On Linux it is an `eventfd` in semaphore mode, so every completion
//! is one unit and units never coalesce. Elsewhere it is a pipe carrying one
//! 8-byte record per completion. The completion task reads it with
//! [`read_now`](crate::io::read_now), suspending through the multiplexer.
//!
//! ## Queue order
//!
//! Both queues pop newest-first by default ([`QueueOrder::Lifo`]).
//! [`QueueOrder::Fifo`] serves jobs in submission order.
//!
//! ## Shutdown
//!
//! Dropping the runtime shuts the bridge down: idle workers exit, busy
//! workers finish their current job and any still queued, then exit.
//! Workers are detached, since one may be stuck in a read that never returns.

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::io;
use std::os::unix::io::RawFd;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll, Waker};
use std::thread;

use super::config::{BridgeConfig, QueueOrder};
use super::scheduler::{with_scheduler, Scheduler};
use crate::error::{fatal, FatalError};
use crate::io::sys;
use crate::tracing_compat::{debug, error, trace, warn};

use notify::NotifyChannel;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Read,
    Write,
}

/// One outstanding bridged call.
struct Job {
    op: Op,
    fd: RawFd,
    buf: Vec<u8>,
    result: Option<io::Result<usize>>,
    completion: Arc<Completion>,
}

impl Job {
    /// Performs the syscall on the calling worker thread.
    fn run(&mut self) {
        let result = loop {
            let res = match self.op {
                Op::Read => sys::read(self.fd, &mut self.buf),
                Op::Write => sys::write(self.fd, &self.buf),
            };
            match res {
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                other => break other,
            }
        };
        self.result = Some(result);
    }

    /// Hands result and buffer to the owner and wakes it.
    fn deliver(self) {
        let result = self.result.unwrap_or_else(|| {
            Err(io::Error::new(
                io::ErrorKind::Other,
                "bridged call completed without a result",
            ))
        });
        self.completion.complete(result, self.buf);
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("op", &self.op)
            .field("fd", &self.fd)
            .field("len", &self.buf.len())
            .field("done", &self.result.is_some())
            .finish()
    }
}

/// Rendezvous between a suspended caller and the completion task.
#[derive(Debug, Default)]
struct Completion {
    state: Mutex<CompletionState>,
}

#[derive(Debug, Default)]
struct CompletionState {
    done: Option<(io::Result<usize>, Vec<u8>)>,
    waker: Option<Waker>,
}

impl Completion {
    fn complete(&self, result: io::Result<usize>, buf: Vec<u8>) {
        let waker = {
            let mut state = self.state.lock();
            state.done = Some((result, buf));
            state.waker.take()
        };
        if let Some(waker) = waker {
            waker.wake();
        }
    }
}

/// Pops from the end selected by `order`.
fn pop_ordered<T>(queue: &mut VecDeque<T>, order: QueueOrder) -> Option<T> {
    match order {
        QueueOrder::Lifo => queue.pop_back(),
        QueueOrder::Fifo => queue.pop_front(),
    }
}

/// State shared by the cooperative thread and the workers.
struct Shared {
    pending: Mutex<VecDeque<Job>>,
    available: Condvar,
    completed: Mutex<VecDeque<Job>>,
    order: QueueOrder,
    shutdown: AtomicBool,
    live_workers: AtomicUsize,
    notify: NotifyChannel,
}

impl Shared {
    fn submit(&self, job: Job) {
        trace!(op = ?job.op, fd = job.fd, len = job.buf.len(), "bridge job queued");
        self.pending.lock().push_back(job);
        self.available.notify_one();
    }

    /// Blocks until a job is pending. `None` once shut down and drained.
    fn next_job(&self) -> Option<Job> {
        let mut pending = self.pending.lock();
        loop {
            if let Some(job) = pop_ordered(&mut pending, self.order) {
                return Some(job);
            }
            if self.shutdown.load(Ordering::Acquire) {
                return None;
            }
            self.available.wait(&mut pending);
        }
    }

    fn finish(&self, job: Job) {
        self.completed.lock().push_back(job);
        if let Err(e) = self.notify.signal() {
            error!(error = %e, "bridge worker cannot signal completion");
            fatal(FatalError::Notification(e));
        }
    }

    fn pop_completed(&self) -> Option<Job> {
        pop_ordered(&mut self.completed.lock(), self.order)
    }
}

fn worker_loop(shared: &Shared) {
    while let Some(mut job) = shared.next_job() {
        job.run();
        trace!(op = ?job.op, fd = job.fd, ok = job.result.as_ref().is_some_and(Result::is_ok), "bridge job done");
        shared.finish(job);
    }
    shared.live_workers.fetch_sub(1, Ordering::AcqRel);
}

async fn completion_loop(shared: Arc<Shared>) {
    let fd = shared.notify.read_fd();
    let mut unit = [0u8; 8];
    loop {
        match crate::io::read_now(fd, &mut unit).await {
            Ok(8) => {}
            Ok(0) => fatal(FatalError::Notification(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "notification channel closed",
            ))),
            Ok(n) => fatal(FatalError::Notification(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("short notification read ({n} bytes)"),
            ))),
            Err(e) => fatal(FatalError::Notification(e)),
        }
        match shared.pop_completed() {
            Some(job) => job.deliver(),
            None => {
                warn!("bridge notification without a completed job");
            }
        }
    }
}

/// Handle to a runtime's bridge.
#[derive(Clone)]
pub(crate) struct Bridge {
    shared: Arc<Shared>,
    threads: usize,
}

impl Bridge {
    /// Returns the runtime's bridge, starting it with `threads` workers on
    /// first use (`0` means the configured count). Start failure is fatal.
    pub(crate) fn get_or_init(scheduler: &Rc<Scheduler>, threads: usize) -> Self {
        if let Some(bridge) = scheduler.bridge_cell().get() {
            return bridge.clone();
        }
        let mut config = scheduler.config().bridge.clone();
        if threads > 0 {
            config.threads = threads;
        }
        config.normalize();
        let bridge = match Self::start(&config) {
            Ok(bridge) => bridge,
            Err(e) => fatal(FatalError::Bridge(e)),
        };
        let bridge = scheduler.bridge_cell().get_or_init(|| bridge).clone();
        scheduler.spawn_task(
            "coopio-bridge",
            true,
            completion_loop(Arc::clone(&bridge.shared)),
        );
        bridge
    }

    fn start(config: &BridgeConfig) -> io::Result<Self> {
        let notify = NotifyChannel::new()?;
        let shared = Arc::new(Shared {
            pending: Mutex::new(VecDeque::new()),
            available: Condvar::new(),
            completed: Mutex::new(VecDeque::new()),
            order: config.queue_order,
            shutdown: AtomicBool::new(false),
            live_workers: AtomicUsize::new(0),
            notify,
        });
        for i in 0..config.threads {
            let worker = Arc::clone(&shared);
            shared.live_workers.fetch_add(1, Ordering::AcqRel);
            let spawned = thread::Builder::new()
                .name(format!("{}-{i}", config.thread_name_prefix))
                .spawn(move || worker_loop(&worker));
            if let Err(e) = spawned {
                shared.live_workers.fetch_sub(1, Ordering::AcqRel);
                shared.shutdown.store(true, Ordering::Release);
                shared.available.notify_all();
                return Err(e);
            }
        }
        debug!(
            threads = config.threads,
            order = ?config.queue_order,
            notify_fd = shared.notify.read_fd(),
            "blocking bridge started"
        );
        Ok(Self {
            shared,
            threads: config.threads,
        })
    }

    fn submit(&self, op: Op, fd: RawFd, buf: Vec<u8>) -> Arc<Completion> {
        let completion = Arc::new(Completion::default());
        self.shared.submit(Job {
            op,
            fd,
            buf,
            result: None,
            completion: Arc::clone(&completion),
        });
        completion
    }

    /// Stops the workers once the pending queue is empty.
    pub(crate) fn shutdown(&self) {
        self.shared.shutdown.store(true, Ordering::Release);
        self.shared.available.notify_all();
        debug!(threads = self.threads, "blocking bridge shutting down");
    }

    pub(crate) fn threads(&self) -> usize {
        self.threads
    }

    #[cfg(test)]
    fn live_workers(&self) -> usize {
        self.shared.live_workers.load(Ordering::Acquire)
    }
}

impl fmt::Debug for Bridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bridge")
            .field("threads", &self.threads)
            .field("order", &self.shared.order)
            .field("pending", &self.shared.pending.lock().len())
            .field("completed", &self.shared.completed.lock().len())
            .finish_non_exhaustive()
    }
}

/// Future resolving once the completion task delivers a job's result.
struct Completed {
    completion: Arc<Completion>,
}

impl Future for Completed {
    type Output = (io::Result<usize>, Vec<u8>);

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut state = self.completion.state.lock();
        if let Some(done) = state.done.take() {
            return Poll::Ready(done);
        }
        state.waker = Some(cx.waker().clone());
        Poll::Pending
    }
}

/// Starts the bridge for the current runtime with `threads` workers.
///
/// `0` selects the configured count (default 5). Idempotent: once the bridge
/// runs, later calls change nothing. Failure to create the notification
/// channel or a worker thread ends the process.
pub fn init(threads: usize) {
    with_scheduler(|s| {
        Bridge::get_or_init(s, threads);
    });
}

/// Worker threads of the current runtime's bridge, `None` if not started.
#[must_use]
pub fn thread_count() -> Option<usize> {
    with_scheduler(|s| s.bridge_cell().get().map(Bridge::threads))
}

/// Reads from `fd` into `buf` on a worker thread.
///
/// Reads at most `buf.len()` bytes. Resolves to the syscall result and the
/// buffer; on success the first `n` bytes hold the data. Starts the bridge
/// if needed.
pub async fn read_async(fd: RawFd, buf: Vec<u8>) -> (io::Result<usize>, Vec<u8>) {
    bridged(Op::Read, fd, buf).await
}

/// Writes `buf` to `fd` on a worker thread.
///
/// A single `write(2)`: the count may be short. Resolves to the syscall
/// result and the buffer. Starts the bridge if needed.
pub async fn write_async(fd: RawFd, buf: Vec<u8>) -> (io::Result<usize>, Vec<u8>) {
    bridged(Op::Write, fd, buf).await
}

async fn bridged(op: Op, fd: RawFd, buf: Vec<u8>) -> (io::Result<usize>, Vec<u8>) {
    let bridge = with_scheduler(|s| Bridge::get_or_init(s, 0));
    let completion = bridge.submit(op, fd, buf);
    Completed { completion }.await
}

mod notify {
    //! Worker-to-scheduler notification channel.
    #![allow(unsafe_code)]

    use std::io;
    use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};

    use crate::io::sys;

    /// One readable unit per completed job.
    #[derive(Debug)]
    pub(super) struct NotifyChannel {
        read: OwnedFd,
        /// Separate write end (pipe); `None` when `read` is an eventfd.
        write: Option<OwnedFd>,
    }

    impl NotifyChannel {
        #[cfg(target_os = "linux")]
        pub(super) fn new() -> io::Result<Self> {
            // SAFETY: plain syscall with no pointer arguments.
            let fd = unsafe {
                libc::eventfd(
                    0,
                    libc::EFD_SEMAPHORE | libc::EFD_NONBLOCK | libc::EFD_CLOEXEC,
                )
            };
            if fd < 0 {
                return Err(io::Error::last_os_error());
            }
            // SAFETY: fd is newly created and owned by this function.
            let read = unsafe { OwnedFd::from_raw_fd(fd) };
            Ok(Self { read, write: None })
        }

        #[cfg(not(target_os = "linux"))]
        pub(super) fn new() -> io::Result<Self> {
            let mut fds = [0 as libc::c_int; 2];
            // SAFETY: `fds` has room for the two descriptors pipe(2) writes.
            if unsafe { libc::pipe(fds.as_mut_ptr()) } < 0 {
                return Err(io::Error::last_os_error());
            }
            // SAFETY: both descriptors are newly created and owned here.
            let (read, write) = unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) };
            for fd in [read.as_raw_fd(), write.as_raw_fd()] {
                // SAFETY: fcntl with F_SETFD takes no pointers.
                if unsafe { libc::fcntl(fd, libc::F_SETFD, libc::FD_CLOEXEC) } < 0 {
                    return Err(io::Error::last_os_error());
                }
            }
            sys::set_nonblocking(read.as_raw_fd())?;
            Ok(Self {
                read,
                write: Some(write),
            })
        }

        pub(super) fn read_fd(&self) -> RawFd {
            self.read.as_raw_fd()
        }

        fn write_fd(&self) -> RawFd {
            self.write.as_ref().unwrap_or(&self.read).as_raw_fd()
        }

        /// Adds one unit with a plain blocking write.
        pub(super) fn signal(&self) -> io::Result<()> {
            let unit = 1u64.to_ne_bytes();
            loop {
                match sys::write(self.write_fd(), &unit) {
                    Ok(8) => return Ok(()),
                    Ok(n) => {
                        return Err(io::Error::new(
                            io::ErrorKind::WriteZero,
                            format!("short notification write ({n} bytes)"),
                        ))
                    }
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                    Err(e) => return Err(e),
                }
            }
        }
    }

}
