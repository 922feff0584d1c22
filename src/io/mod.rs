//! Descriptor read/write helpers for cooperative tasks.
//!
//! Each helper issues the syscall directly. When the descriptor is not
//! ready (`EWOULDBLOCK`) it suspends in [`wait`] and retries; when a signal
//! interrupts the call (`EINTR`) it retries at once. Any other error is
//! returned unchanged.
//!
//! Descriptors must be non-blocking (see [`set_nonblocking`]); a blocking
//! descriptor stalls every task on the thread. Regular files and other
//! descriptors without readiness belong on the blocking bridge
//! ([`read_async`](crate::runtime::read_async)).
//!
//! A registration failure inside [`wait`] surfaces as an [`io::Error`] of
//! kind `Other` wrapping [`RegisterError`](crate::RegisterError), or as the
//! kernel's own error for a refused `epoll_ctl`.

pub(crate) mod sys;

use std::io;
use std::os::unix::io::RawFd;

use crate::runtime::multiplexer::wait;
use crate::runtime::reactor::Interest;

/// Reads into `buf`, suspending until `fd` is readable if necessary.
///
/// Returns the number of bytes read; `Ok(0)` means end of input.
pub async fn read_now(fd: RawFd, buf: &mut [u8]) -> io::Result<usize> {
    loop {
        match sys::read(fd, buf) {
            Ok(n) => return Ok(n),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                wait(fd, Interest::READABLE).await?;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Like [`read_now`] but waits for readability before the first attempt.
///
/// Saves a syscall when the caller expects no data to be buffered yet.
pub async fn read_wait_first(fd: RawFd, buf: &mut [u8]) -> io::Result<usize> {
    wait(fd, Interest::READABLE).await?;
    read_now(fd, buf).await
}

/// Writes all of `buf`, suspending whenever `fd` is not writable.
///
/// Returns the number of bytes written. That is less than `buf.len()` only
/// if a write accepted zero bytes. A hard error is returned as soon as it
/// occurs, even after a partial write.
pub async fn write_all(fd: RawFd, buf: &[u8]) -> io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        match sys::write(fd, &buf[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                wait(fd, Interest::WRITABLE).await?;
            }
            Err(e) => return Err(e),
        }
    }
    Ok(total)
}

/// Puts `fd` in non-blocking mode.
pub fn set_nonblocking(fd: RawFd) -> io::Result<()> {
    sys::set_nonblocking(fd)
}
