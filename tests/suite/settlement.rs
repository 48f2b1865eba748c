//! Settlement, adoption and reaction ordering on a real worker thread.

use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;

use pledge_core::{Promise, PromiseError, Reason, Resolution, Settler, State};

use crate::common::{WAIT, timer_scheduler};

#[test]
fn resolve_is_idempotent() {
    let scheduler = timer_scheduler("pledge-test-idempotent");
    let p = Promise::pending_on(&scheduler);
    assert!(p.resolve("v"));
    assert!(!p.resolve("v2"));
    assert_eq!(p.to_blocking().get_timeout(WAIT).unwrap(), "v");
    scheduler.shutdown();
}

#[test]
fn adopted_rejection_propagates() {
    let scheduler = timer_scheduler("pledge-test-adopt");
    let q: Promise<u32> = Promise::pending_on(&scheduler);
    let p = Promise::pending_on(&scheduler);
    p.resolve_with(Resolution::Promise(q.clone()));

    let reason = Reason::msg("E");
    q.reject(reason.clone());
    let err = p.to_blocking().get_timeout(WAIT).unwrap_err();
    assert!(err.rejection().unwrap().ptr_eq(&reason));
    scheduler.shutdown();
}

#[test]
fn self_resolution_never_hangs() {
    let scheduler = timer_scheduler("pledge-test-self");
    let p: Promise<u8> = Promise::pending_on(&scheduler);
    p.resolve_with(p.clone().into());
    let err = p.to_blocking().get_timeout(WAIT).unwrap_err();
    assert!(matches!(
        err.rejection().unwrap().downcast_ref::<PromiseError>(),
        Some(PromiseError::SelfResolution)
    ));
    scheduler.shutdown();
}

#[test]
fn two_thens_fire_once_each_in_registration_order() {
    let scheduler = timer_scheduler("pledge-test-order");
    let log = Arc::new(Mutex::new(Vec::new()));
    let p: Promise<u8> = Promise::pending_on(&scheduler);
    let derived: Vec<_> = ["first", "second"]
        .into_iter()
        .map(|label| {
            let log = Arc::clone(&log);
            p.then(move |_| {
                log.lock().push(label);
                Ok(())
            })
        })
        .collect();
    p.resolve(1);
    for d in derived {
        d.to_blocking().get_timeout(WAIT).unwrap();
    }
    assert_eq!(*log.lock(), vec!["first", "second"]);
    scheduler.shutdown();
}

#[test]
fn racing_resolvers_and_subscribers_see_one_outcome() {
    let scheduler = timer_scheduler("pledge-test-race-settle");
    for _ in 0..20 {
        let p = Promise::pending_on(&scheduler);
        let observed = Arc::new(Mutex::new(Vec::new()));
        let threads: Vec<_> = (0..4)
            .map(|i| {
                let p = p.clone();
                let observed = Arc::clone(&observed);
                thread::spawn(move || {
                    let derived = p.then(move |v: usize| {
                        observed.lock().push(v);
                        Ok(v)
                    });
                    p.resolve(i);
                    derived
                })
            })
            .collect();
        let derived: Vec<_> = threads.into_iter().map(|t| t.join().unwrap()).collect();
        let winner = p.to_blocking().get_timeout(WAIT).unwrap();
        for d in derived {
            assert_eq!(d.to_blocking().get_timeout(WAIT).unwrap(), winner);
        }
        assert_eq!(*observed.lock(), vec![winner; 4]);
    }
    scheduler.shutdown();
}

#[test]
fn panicking_callback_rejects_and_the_worker_survives() {
    let scheduler = timer_scheduler("pledge-test-panic");
    let p = Promise::resolved_on(&scheduler, 1);
    let broken: Promise<u8> = p.then(|_| panic!("callback exploded"));
    let err = broken.to_blocking().get_timeout(WAIT).unwrap_err();
    assert!(matches!(
        err.rejection().unwrap().downcast_ref::<PromiseError>(),
        Some(PromiseError::Panicked(msg)) if msg == "callback exploded"
    ));

    let after = p.then(|v| Ok(v + 1));
    assert_eq!(after.to_blocking().get_timeout(WAIT).unwrap(), 2);
    scheduler.shutdown();
}

#[test]
fn awaitable_settled_from_another_thread_is_adopted() {
    let scheduler = timer_scheduler("pledge-test-awaitable");
    let p = Promise::from_awaitable_on(&scheduler, |settler: Settler<String>| -> Result<(), Reason> {
        thread::spawn(move || settler.resolve("from thread".to_string()));
        Ok(())
    });
    assert_eq!(p.to_blocking().get_timeout(WAIT).unwrap(), "from thread");
    assert_eq!(p.state(), State::Fulfilled);
    scheduler.shutdown();
}
