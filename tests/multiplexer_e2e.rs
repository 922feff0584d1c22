//! Readiness multiplexer and sleep queue, end to end.
//!
//! Every scenario runs once per available backend.

#[macro_use]
mod common;

use common::*;
use coopio::combinator::{select, timeout, Either};
use coopio::io::{read_now, write_all};
use coopio::runtime::{multiplexer, spawn, yield_now, Backend, Runtime, RuntimeBuilder};
use coopio::{delay, wait, Interest};
use std::cell::RefCell;
use std::io::{Read, Write};
use std::rc::Rc;
use std::time::{Duration, Instant};

#[test]
fn delays_resume_in_deadline_order_and_never_early() {
    test_phase!("delays_resume_in_deadline_order_and_never_early");
    run_on_each_backend("delay ordering", || async {
        let order = Rc::new(RefCell::new(Vec::new()));
        for ms in [40u64, 10, 30, 20, 50] {
            let order = Rc::clone(&order);
            spawn(async move {
                let start = Instant::now();
                let slept = delay(ms).await;
                assert!(slept >= ms, "slept {slept} < {ms}");
                assert!(start.elapsed() >= Duration::from_millis(ms));
                order.borrow_mut().push(ms);
            });
        }
        delay(80).await;
        assert_eq!(*order.borrow(), vec![10, 20, 30, 40, 50]);
    });
    test_complete!("delays_resume_in_deadline_order_and_never_early");
}

#[test]
fn delay_latency_is_within_one_slice() {
    init_test_logging();
    let rt = Runtime::new();
    let slept = rt.block_on(delay(50));
    assert_with_log!((50..5050).contains(&slept), "elapsed ms", "[50, 5050)", slept);
}

#[test]
fn write_on_peer_readies_reader() {
    test_phase!("write_on_peer_readies_reader");
    run_on_each_backend("peer write", || async {
        let (a, b) = nonblocking_pair();
        let reader = fd(&b);
        spawn(async move {
            delay(5).await;
            let mut a = a;
            a.write_all(b"ping").unwrap();
            // Keep the peer open until the reader is done.
            delay(50).await;
        });
        let before = multiplexer::stats().unwrap_or_default();
        wait(reader, Interest::READABLE).await.unwrap();
        let after = multiplexer::stats().unwrap_or_default();
        assert!(after.readiness_wakeups > before.readiness_wakeups);
        let mut buf = [0u8; 4];
        assert_eq!(read_now(reader, &mut buf).await.unwrap(), 4);
        assert_eq!(&buf, b"ping");
        drop(b);
    });
    test_complete!("write_on_peer_readies_reader");
}

#[test]
fn write_interest_ignores_readability() {
    test_phase!("write_interest_ignores_readability");
    run_on_each_backend("write-only", || async {
        let (a, b) = nonblocking_pair();
        fill_send_buffer(&a);
        // b writes to a: a becomes readable but stays unwritable.
        (&b).write_all(b"data").unwrap();
        let res = timeout(30, wait(fd(&a), Interest::WRITABLE)).await;
        assert!(res.is_err(), "write waiter woke on readability");
        drop(b);
    });
    test_complete!("write_interest_ignores_readability");
}

#[test]
fn read_now_suspends_instead_of_spinning() {
    init_test_logging();
    let rt = Runtime::new();
    let (a, b) = nonblocking_pair();
    let reader = fd(&b);
    rt.block_on(async move {
        spawn(async move {
            delay(30).await;
            let mut a = a;
            a.write_all(b"x").unwrap();
        });
        let mut buf = [0u8; 1];
        assert_eq!(read_now(reader, &mut buf).await.unwrap(), 1);
        // A busy loop would have run hundreds of multiplexer iterations.
        let stats = multiplexer::stats().unwrap();
        assert_with_log!(stats.iterations < 20, "iterations", "< 20", stats.iterations);
    });
    drop(b);
}

#[test]
fn write_all_completes_after_drain() {
    test_phase!("write_all_completes_after_drain");
    run_on_each_backend("write_all", || async {
        let (a, b) = nonblocking_pair();
        let queued = fill_send_buffer(&a);
        let payload = vec![1u8; 200 * 1024];
        let expected = queued + payload.len();
        spawn(async move {
            let mut b = b;
            let mut buf = vec![0u8; 16 * 1024];
            let mut total = 0;
            while total < expected {
                match b.read(&mut buf) {
                    Ok(n) => total += n,
                    Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                        wait(fd(&b), Interest::READABLE).await.unwrap();
                    }
                    Err(e) => panic!("{e}"),
                }
            }
        });
        let n = write_all(fd(&a), &payload).await.unwrap();
        assert_eq!(n, payload.len());
        while coopio::runtime::outstanding() > 1 {
            yield_now().await;
            delay(1).await;
        }
    });
    test_complete!("write_all_completes_after_drain");
}

#[test]
fn many_waiters_each_wake_once() {
    test_phase!("many_waiters_each_wake_once");
    run_on_each_backend("many waiters", || async {
        let pairs: Vec<_> = (0..64).map(|_| nonblocking_pair()).collect();
        let woken = Rc::new(RefCell::new(Vec::new()));
        for (i, (_, b)) in pairs.iter().enumerate() {
            let reader = fd(b);
            let woken = Rc::clone(&woken);
            spawn(async move {
                wait(reader, Interest::READABLE).await.unwrap();
                woken.borrow_mut().push(i);
            });
        }
        yield_now().await;
        assert_eq!(multiplexer::registrations(), 64);
        for (a, _) in pairs.iter().rev() {
            (&*a).write_all(b"!").unwrap();
        }
        while woken.borrow().len() < 64 {
            delay(1).await;
        }
        let mut seen = woken.borrow().clone();
        seen.sort_unstable();
        assert_eq!(seen, (0..64).collect::<Vec<_>>());
        assert_eq!(multiplexer::registrations(), 0);
    });
    test_complete!("many_waiters_each_wake_once");
}

#[test]
fn run_keeps_going_while_application_tasks_sleep() {
    init_test_logging();
    let rt = Runtime::new();
    let done = Rc::new(RefCell::new(false));
    let flag = Rc::clone(&done);
    rt.spawn(async move {
        delay(20).await;
        *flag.borrow_mut() = true;
    });
    rt.run();
    assert!(*done.borrow());
    assert_eq!(rt.outstanding(), 0);
}

#[test]
fn timed_out_waits_release_their_registrations() {
    init_test_logging();
    test_phase!("timed_out_waits_release_their_registrations");
    for backend in backends() {
        test_section!(format!("{backend:?}"));
        let (a, _b) = nonblocking_pair();
        let raw = fd(&a);
        // Scan bounds the entry count, indexed bounds the descriptor number.
        let limit = match backend {
            Backend::Scan => 4,
            Backend::Indexed => raw as usize + 1,
        };
        let rt = RuntimeBuilder::new()
            .backend(backend)
            .max_descriptors(limit)
            .build();
        rt.block_on(async move {
            for i in 0..12 {
                let res = timeout(1, wait(raw, Interest::READABLE)).await;
                assert!(res.is_err(), "iteration {i} saw readiness on a quiet socket");
                let live = multiplexer::registrations();
                assert_with_log!(live == 0, "registrations after timeout", 0usize, live);
            }
            for _ in 0..12 {
                match select(wait(raw, Interest::READABLE), delay(1)).await {
                    Either::Left(_) => panic!("quiet socket became readable"),
                    Either::Right(_) => {}
                }
            }
            assert_eq!(multiplexer::registrations(), 0);
        });
        drop(a);
    }
    test_complete!("timed_out_waits_release_their_registrations");
}
