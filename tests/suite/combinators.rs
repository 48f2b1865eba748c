//! Combinators against real timers.

use pledge_core::{Combinators, Promise, PromiseError, Reason, Resolution, State};

use crate::common::{WAIT, ms, timer_scheduler};

#[test]
fn all_of_nothing_fulfills_immediately() {
    let scheduler = timer_scheduler("pledge-test-all-empty");
    let p = scheduler.all(Vec::<Promise<u8>>::new());
    assert_eq!(p.state(), State::Fulfilled);
    assert_eq!(p.value(), Some(Vec::new()));
    scheduler.shutdown();
}

#[test]
fn all_rejects_when_any_input_rejects() {
    let scheduler = timer_scheduler("pledge-test-all-reject");
    let reason = Reason::msg("E");
    let p = scheduler.all(vec![
        Resolution::Value(1),
        Promise::rejected_on(&scheduler, reason.clone()).into(),
    ]);
    let err = p.to_blocking().get_timeout(WAIT).unwrap_err();
    assert!(err.rejection().unwrap().ptr_eq(&reason));
    scheduler.shutdown();
}

#[test]
fn race_prefers_the_shorter_delay() {
    let scheduler = timer_scheduler("pledge-test-race");
    let p = scheduler.race([
        Promise::delayed_on(&scheduler, ms(50), || Ok("a")),
        Promise::delayed_on(&scheduler, ms(10), || Ok("b")),
    ]);
    assert_eq!(p.to_blocking().get_timeout(WAIT).unwrap(), "b");
    scheduler.shutdown();
}

#[test]
fn any_keeps_both_reasons() {
    let scheduler = timer_scheduler("pledge-test-any");
    let p: Promise<u8> = scheduler.any([
        Promise::rejected_on(&scheduler, Reason::msg("E1")),
        Promise::rejected_on(&scheduler, Reason::msg("E2")),
    ]);
    let err = p.to_blocking().get_timeout(WAIT).unwrap_err();
    let reason = err.rejection().unwrap();
    let Some(PromiseError::Aggregate(aggregate)) = reason.downcast_ref::<PromiseError>() else {
        panic!("expected aggregate, got {reason}");
    };
    let messages: Vec<_> = aggregate.reasons().iter().map(ToString::to_string).collect();
    assert_eq!(messages, vec!["E1", "E2"]);
    scheduler.shutdown();
}

#[test]
fn any_skips_rejections_for_a_value() {
    let scheduler = timer_scheduler("pledge-test-any-value");
    let p = scheduler.any(vec![
        Promise::rejected_on(&scheduler, Reason::msg("E1")).into(),
        Resolution::Value(5),
    ]);
    assert_eq!(p.to_blocking().get_timeout(WAIT).unwrap(), 5);
    scheduler.shutdown();
}

#[test]
fn map_keeps_input_order_when_inputs_finish_out_of_order() {
    let scheduler = timer_scheduler("pledge-test-map");
    let p = scheduler.map(
        [
            Promise::delayed_on(&scheduler, ms(30), || Ok(1)),
            Promise::delayed_on(&scheduler, ms(20), || Ok(2)),
            Promise::delayed_on(&scheduler, ms(10), || Ok(3)),
        ],
        |x, _| Ok(x * 2),
    );
    assert_eq!(p.to_blocking().get_timeout(WAIT).unwrap(), vec![2, 4, 6]);
    scheduler.shutdown();
}

#[test]
fn collection_helpers_compose() {
    let scheduler = timer_scheduler("pledge-test-helpers");
    let inputs = || (1..=5).map(|n| Promise::delayed_on(&scheduler, ms(n), move || Ok(n)));

    let evens = scheduler.filter(inputs(), |n, _| Ok(n % 2 == 0));
    let product = scheduler.reduce(inputs(), |acc, n, _| Ok(acc * n));
    let digits = scheduler.fold_right(inputs(), String::new(), |mut acc, n, _| {
        acc.push_str(&n.to_string());
        Ok(acc)
    });
    let all_small = scheduler.every(inputs(), |n, _| Ok(*n < 10));
    let has_three = scheduler.some(inputs(), |n, _| Ok(*n == 3));

    assert_eq!(evens.to_blocking().get_timeout(WAIT).unwrap(), vec![2, 4]);
    assert_eq!(product.to_blocking().get_timeout(WAIT).unwrap(), Some(120));
    assert_eq!(digits.to_blocking().get_timeout(WAIT).unwrap(), "54321");
    assert!(all_small.to_blocking().get_timeout(WAIT).unwrap());
    assert!(has_three.to_blocking().get_timeout(WAIT).unwrap());
    scheduler.shutdown();
}
