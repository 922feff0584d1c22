//! Blocking I/O bridge, end to end.

#[macro_use]
mod common;

use common::*;
use coopio::runtime::blocking_pool::{init, thread_count};
use coopio::runtime::{read_async, write_async, Runtime, RuntimeBuilder};
use coopio::delay;
use std::cell::RefCell;
use std::io::{Read, Write};
use std::os::unix::io::AsRawFd;
use std::os::unix::net::UnixStream;
use std::rc::Rc;

#[test]
fn hello_round_trip_over_blocking_pair() {
    init_test_logging();
    test_phase!("hello_round_trip_over_blocking_pair");
    let rt = Runtime::new();
    let (a, b) = UnixStream::pair().unwrap();
    let (written, read, buf) = rt.block_on(async {
        let (written, _) = write_async(a.as_raw_fd(), b"hello".to_vec()).await;
        let (read, buf) = read_async(b.as_raw_fd(), vec![0u8; 5]).await;
        (written.unwrap(), read.unwrap(), buf)
    });
    assert_with_log!(written == 5, "written", 5usize, written);
    assert_eq!(read, 5);
    assert_eq!(buf, b"hello");
    test_complete!("hello_round_trip_over_blocking_pair");
}

#[test]
fn default_init_starts_five_workers() {
    init_test_logging();
    let rt = Runtime::new();
    rt.block_on(async {
        init(0);
        assert_eq!(thread_count(), Some(5));
    });
}

#[test]
fn first_bridged_call_starts_the_bridge() {
    let rt = RuntimeBuilder::new().bridge_threads(2).build();
    let file = tempfile::tempfile().unwrap();
    rt.block_on(async {
        assert_eq!(thread_count(), None);
        let (res, _) = write_async(file.as_raw_fd(), vec![0u8; 3]).await;
        assert_eq!(res.unwrap(), 3);
        assert_eq!(thread_count(), Some(2));
    });
}

#[test]
fn concurrent_calls_get_their_own_results() {
    init_test_logging();
    test_phase!("concurrent_calls_get_their_own_results");
    const CALLS: usize = 24;
    let rt = Runtime::new();
    let mut pairs: Vec<(UnixStream, UnixStream)> =
        (0..CALLS).map(|_| UnixStream::pair().unwrap()).collect();
    // Each pair carries a payload of a distinct length and fill byte.
    for (i, (a, _)) in pairs.iter_mut().enumerate() {
        a.write_all(&vec![i as u8; i + 1]).unwrap();
    }
    let results = Rc::new(RefCell::new(Vec::new()));
    let readers: Vec<_> = pairs.iter().map(|(_, b)| b.as_raw_fd()).collect();

    for (i, reader) in readers.into_iter().enumerate() {
        let results = Rc::clone(&results);
        rt.spawn(async move {
            let (res, buf) = read_async(reader, vec![0u8; 64]).await;
            let n = res.unwrap();
            results.borrow_mut().push((i, n, buf[..n].to_vec()));
        });
    }
    rt.run();

    let results = results.borrow();
    assert_eq!(results.len(), CALLS);
    for (i, n, data) in results.iter() {
        assert_eq!(*n, i + 1, "call {i} got the wrong count");
        assert!(data.iter().all(|&byte| byte == *i as u8), "call {i} saw another call's bytes");
    }
    drop(pairs);
    test_complete!("concurrent_calls_get_their_own_results", calls = CALLS);
}

#[test]
fn cooperative_tasks_progress_while_workers_block() {
    init_test_logging();
    let rt = Runtime::new();
    let (a, mut b) = UnixStream::pair().unwrap();
    let ticks = Rc::new(RefCell::new(0));
    let seen = Rc::clone(&ticks);
    rt.spawn(async move {
        for _ in 0..5 {
            delay(4).await;
            *seen.borrow_mut() += 1;
        }
        b.write_all(b"done").unwrap();
    });
    let (res, buf) = rt.block_on(async {
        let reader = a.as_raw_fd();
        read_async(reader, vec![0u8; 4]).await
    });
    assert_eq!(res.unwrap(), 4);
    assert_eq!(&buf, b"done");
    assert_eq!(*ticks.borrow(), 5);

    let mut rest = [0u8; 1];
    a.set_nonblocking(true).unwrap();
    assert!(matches!((&a).read(&mut rest), Err(e) if e.kind() == std::io::ErrorKind::WouldBlock));
}

#[test]
fn bridged_write_errors_are_forwarded() {
    let rt = Runtime::new();
    let (res, buf) = rt.block_on(async { write_async(-1, b"x".to_vec()).await });
    assert_eq!(res.unwrap_err().raw_os_error(), Some(libc::EBADF));
    assert_eq!(buf, b"x");
}
