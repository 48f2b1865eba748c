//! Scheduler construction from config files.

use std::fs;
use std::thread;

use pledge_config::{PledgeConfig, ShutdownPolicy};
use pledge_core::{Promise, Scheduler};

use crate::common::WAIT;

#[test]
fn scheduler_runs_from_a_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(
        &path,
        r#"
[scheduler]
thread_name = "pledge-from-file"
shutdown = "cancel"
join_timeout_ms = 500

[rejections]
log_unhandled = false
"#,
    )
    .unwrap();

    let config = PledgeConfig::load_from(&path).unwrap();
    assert_eq!(config.scheduler().shutdown, ShutdownPolicy::Cancel);
    assert!(!config.rejections().log_unhandled);

    let scheduler = Scheduler::from_config(&config).unwrap();
    let name = Promise::spawn_on(&scheduler, || {
        Ok(thread::current().name().map(str::to_string))
    });
    assert_eq!(
        name.to_blocking().get_timeout(WAIT).unwrap().as_deref(),
        Some("pledge-from-file")
    );
    scheduler.shutdown();
}

#[test]
fn invalid_config_is_reported_with_its_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, "[scheduler]\nshutdown = \"sometimes\"\n").unwrap();
    let err = PledgeConfig::load_from(&path).unwrap_err();
    assert_eq!(err.path(), &path);
}
