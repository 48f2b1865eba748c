//! Shared test utilities and fixtures
//!
//! Every helper builds a fresh `TimerThread`-backed scheduler so tests never
//! share the global one.

#![allow(dead_code)]

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use pledge_config::{PledgeConfig, SchedulerConfig};
use pledge_core::{Reason, Scheduler};
use pledge_scheduler::TimerThread;

/// Upper bound for any blocking wait in the suite.
pub const WAIT: Duration = Duration::from_secs(5);

pub fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

/// A scheduler on its own named worker thread.
pub fn timer_scheduler(thread_name: &str) -> Scheduler {
    let config = PledgeConfig {
        scheduler: Some(SchedulerConfig {
            thread_name: thread_name.to_string(),
            ..SchedulerConfig::default()
        }),
        rejections: None,
    };
    Scheduler::from_config(&config).expect("spawn timer thread")
}

/// A scheduler whose unhandled rejections are collected instead of logged.
pub fn recording_scheduler() -> (Scheduler, Arc<Mutex<Vec<String>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let timer = TimerThread::spawn(SchedulerConfig {
        thread_name: "pledge-test-sink".to_string(),
        ..SchedulerConfig::default()
    })
    .expect("spawn timer thread");
    let scheduler = Scheduler::builder(timer)
        .log_unhandled(false)
        .on_unhandled(move |reason: &Reason| sink.lock().push(reason.to_string()))
        .build();
    (scheduler, seen)
}

/// Poll `condition` until it holds or `WAIT` elapses.
pub fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(ms(2));
    }
    condition()
}
