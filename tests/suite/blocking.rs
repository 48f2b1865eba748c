//! The blocking adapter.

use std::sync::mpsc;
use std::thread;
use std::time::Instant;

use pledge_core::{Promise, WaitError};

use crate::common::{WAIT, ms, timer_scheduler};

#[test]
fn settled_promise_returns_immediately() {
    let scheduler = timer_scheduler("pledge-test-block-settled");
    let handle = Promise::resolved_on(&scheduler, "now").to_blocking();
    let start = Instant::now();
    assert_eq!(handle.get().unwrap(), "now");
    assert!(start.elapsed() < ms(100));
    scheduler.shutdown();
}

#[test]
fn get_blocks_until_settlement() {
    let scheduler = timer_scheduler("pledge-test-block-wait");
    let p = Promise::delayed_on(&scheduler, ms(30), || Ok(11));
    let start = Instant::now();
    assert_eq!(p.to_blocking().get().unwrap(), 11);
    assert!(start.elapsed() >= ms(30));
    scheduler.shutdown();
}

#[test]
fn get_timeout_gives_up() {
    let scheduler = timer_scheduler("pledge-test-block-timeout");
    let p: Promise<u8> = Promise::pending_on(&scheduler);
    let handle = p.to_blocking();
    assert!(matches!(
        handle.get_timeout(ms(20)),
        Err(WaitError::TimedOut(_))
    ));
    assert!(!handle.is_done());

    p.resolve(1);
    assert_eq!(handle.get_timeout(WAIT).unwrap(), 1);
    assert!(handle.is_done());
    scheduler.shutdown();
}

#[test]
fn cancel_releases_a_blocked_thread() {
    let scheduler = timer_scheduler("pledge-test-block-cancel");
    let p: Promise<u8> = Promise::pending_on(&scheduler);
    let handle = p.to_blocking();
    thread::scope(|s| {
        let waiter = s.spawn(|| handle.get());
        thread::sleep(ms(20));
        assert!(handle.cancel());
        assert!(matches!(waiter.join().unwrap(), Err(WaitError::Cancelled)));
    });
    assert!(handle.is_cancelled());
    assert!(p.is_pending());
    scheduler.shutdown();
}

#[test]
fn busy_worker_does_not_delay_waiters() {
    let scheduler = timer_scheduler("pledge-test-block-busy");
    let p: Promise<u8> = Promise::pending_on(&scheduler);
    scheduler.execute(|| thread::sleep(ms(400)));
    let handle = p.to_blocking();
    thread::scope(|s| {
        let waiter = s.spawn(|| {
            let value = handle.get_timeout(WAIT);
            (value, Instant::now())
        });
        thread::sleep(ms(20));
        let settled_at = Instant::now();
        p.resolve(1);
        let (value, woke_at) = waiter.join().unwrap();
        assert_eq!(value.unwrap(), 1);
        assert!(woke_at.duration_since(settled_at) < ms(200));
    });
    scheduler.shutdown();
}

#[test]
fn get_inside_a_job_wakes_on_foreign_settlement() {
    let scheduler = timer_scheduler("pledge-test-block-in-job");
    let p: Promise<u8> = Promise::pending_on(&scheduler);
    let handle = p.to_blocking();
    let (tx, rx) = mpsc::channel();
    scheduler.execute(move || {
        let _ = tx.send(handle.get().ok());
    });
    thread::sleep(ms(20));
    p.resolve(7);
    assert_eq!(rx.recv_timeout(WAIT).unwrap(), Some(7));
    scheduler.shutdown();
}
