//! delay, delayed and timeout on the timer thread.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Instant;

use pledge_core::{Promise, PromiseError, Reason};

use crate::common::{WAIT, ms, timer_scheduler};

#[test]
fn timeout_rejects_a_pending_promise() {
    let scheduler = timer_scheduler("pledge-test-timeout");
    let p: Promise<u8> = Promise::pending_on(&scheduler);
    let err = p.timeout(ms(10)).to_blocking().get_timeout(WAIT).unwrap_err();
    assert!(matches!(
        err.rejection().unwrap().downcast_ref::<PromiseError>(),
        Some(PromiseError::Timeout(d)) if *d == ms(10)
    ));
    scheduler.shutdown();
}

#[test]
fn timeout_timer_is_cancelled_when_the_source_wins() {
    let scheduler = timer_scheduler("pledge-test-timeout-cancel");
    let fired = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&fired);
    let p = Promise::pending_on(&scheduler);
    let guarded = p
        .timeout_with(ms(40), Reason::msg("too slow"))
        .catch(move |reason| {
            flag.store(true, Ordering::SeqCst);
            Err(reason)
        });
    p.resolve(7);
    assert_eq!(guarded.to_blocking().get_timeout(WAIT).unwrap(), 7);

    thread::sleep(ms(80));
    assert!(!fired.load(Ordering::SeqCst));
    assert_eq!(guarded.value(), Some(7));
    scheduler.shutdown();
}

#[test]
fn repeated_timeouts_leave_the_source_usable() {
    let scheduler = timer_scheduler("pledge-test-timeout-repeat");
    let p: Promise<u8> = Promise::pending_on(&scheduler);
    for _ in 0..200 {
        let err = p.timeout(ms(1)).to_blocking().get_timeout(WAIT).unwrap_err();
        assert!(err.rejection().unwrap().is::<PromiseError>());
    }

    let later = p.then(|n| Ok(n * 2));
    p.resolve(21);
    assert_eq!(later.to_blocking().get_timeout(WAIT).unwrap(), 42);
    scheduler.shutdown();
}

#[test]
fn delayed_waits_at_least_the_delay() {
    let scheduler = timer_scheduler("pledge-test-delayed");
    let start = Instant::now();
    let p = Promise::delayed_on(&scheduler, ms(30), move || Ok(start.elapsed()));
    let elapsed = p.to_blocking().get_timeout(WAIT).unwrap();
    assert!(elapsed >= ms(30), "fired after {elapsed:?}");
    scheduler.shutdown();
}

#[test]
fn delay_holds_values_and_not_rejections() {
    let scheduler = timer_scheduler("pledge-test-delay");
    let start = Instant::now();
    let held = Promise::resolved_on(&scheduler, 1).delay(ms(30));
    let failed = Promise::<u8>::rejected_on(&scheduler, Reason::msg("fast")).delay(ms(500));

    assert!(failed.to_blocking().get_timeout(WAIT).is_err());
    assert!(start.elapsed() < ms(500));
    assert_eq!(held.to_blocking().get_timeout(WAIT).unwrap(), 1);
    assert!(start.elapsed() >= ms(30));
    scheduler.shutdown();
}

#[test]
fn timers_after_shutdown_reject() {
    let scheduler = timer_scheduler("pledge-test-shutdown");
    scheduler.shutdown();
    let p = Promise::delayed_on(&scheduler, ms(1), || Ok(1));
    let err = p.to_blocking().get_timeout(WAIT).unwrap_err();
    assert!(matches!(
        err.rejection().unwrap().downcast_ref::<PromiseError>(),
        Some(PromiseError::SchedulerShutdown)
    ));

    // Deferred work still drains on the caller after shutdown.
    let chained = Promise::resolved_on(&scheduler, 2).then(|v| Ok(v * 3));
    assert_eq!(chained.value(), Some(6));
}
