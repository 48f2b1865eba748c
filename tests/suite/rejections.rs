//! Unhandled rejection reporting.

use pledge_core::{Promise, Reason};

use crate::common::{eventually, ms, recording_scheduler};

#[test]
fn done_and_fail_report_unhandled_rejections() {
    let (scheduler, seen) = recording_scheduler();

    Promise::<u8>::rejected_on(&scheduler, Reason::msg("dropped")).done(|_| Ok(()));
    Promise::<u8>::rejected_on(&scheduler, Reason::msg("swallowed")).fail(|_| Ok(()));
    Promise::<u8>::rejected_on(&scheduler, Reason::msg("orig")).fail(|reason| {
        Err(Reason::msg(format!("handler failed on {reason}")))
    });

    assert!(eventually(|| seen.lock().len() == 2));
    let mut reported = seen.lock().clone();
    reported.sort();
    assert_eq!(reported, vec!["dropped", "handler failed on orig"]);
    scheduler.shutdown();
}

#[test]
fn handled_chains_report_nothing() {
    let (scheduler, seen) = recording_scheduler();
    Promise::<u8>::rejected_on(&scheduler, Reason::msg("recovered"))
        .catch(|_| Ok(0))
        .done(|_| Ok(()));
    Promise::resolved_on(&scheduler, 1).always(|_| Ok(()));

    let probe = Promise::resolved_on(&scheduler, ()).delay(ms(30));
    probe.to_blocking().get().unwrap();
    assert!(seen.lock().is_empty());
    scheduler.shutdown();
}
