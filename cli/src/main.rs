//! Pledge CLI - demo and diagnostics for the promise engine.
//!
//! ```text
//! pledge [demo]     run the scenario tour on a scheduler built from config
//! pledge config     print the effective configuration
//! pledge help       usage
//! ```
//!
//! Logs go to stderr, filtered by `RUST_LOG` (default `info`).

use std::env;
use std::io;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use pledge_config::{PledgeConfig, config_path};
use pledge_core::{Combinators, Promise, PromiseError, Reason, Scheduler, shutdown_global};

const USAGE: &str = "usage: pledge [demo|config|help]";

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(env_filter)
        .init();
}

fn load_config() -> Result<PledgeConfig> {
    let config = PledgeConfig::load().context("failed to load pledge config")?;
    Ok(config.unwrap_or_default())
}

fn main() -> Result<()> {
    init_tracing();

    let command = env::args().nth(1);
    let result = match command.as_deref() {
        None | Some("demo") => run_demo(&load_config()?),
        Some("config") => print_config(&load_config()?),
        Some("help" | "-h" | "--help") => {
            println!("{USAGE}");
            Ok(())
        }
        Some(other) => bail!("unknown command `{other}`\n{USAGE}"),
    };
    shutdown_global();
    result
}

fn print_config(config: &PledgeConfig) -> Result<()> {
    match config_path() {
        Some(path) => println!("config file: {}", path.display()),
        None => println!("config file: <none>"),
    }
    let scheduler = config.scheduler();
    println!("scheduler.thread_name = {}", scheduler.thread_name);
    println!("scheduler.shutdown = {}", scheduler.shutdown.as_str());
    println!("scheduler.join_timeout_ms = {}", scheduler.join_timeout_ms);
    println!(
        "rejections.log_unhandled = {}",
        config.rejections().log_unhandled
    );
    Ok(())
}

fn run_demo(config: &PledgeConfig) -> Result<()> {
    let scheduler = Scheduler::from_config(config).context("failed to start scheduler")?;
    tracing::info!("running demo scenarios");

    let result = demo_scenarios(&scheduler);
    scheduler.shutdown();
    result
}

fn demo_scenarios(scheduler: &Scheduler) -> Result<()> {
    let ms = Duration::from_millis;

    let chained = Promise::resolved_on(scheduler, 20)
        .then(|n| Ok(n + 1))
        .then(|n| Ok(n * 2));
    println!("chain      -> {}", chained.to_blocking().get()?);

    let doubled = scheduler.map(
        [
            Promise::delayed_on(scheduler, ms(30), || Ok(1)),
            Promise::delayed_on(scheduler, ms(10), || Ok(2)),
            Promise::resolved_on(scheduler, 3),
        ],
        |n, _| Ok(n * 2),
    );
    println!("map        -> {:?}", doubled.to_blocking().get()?);

    let winner = scheduler.race([
        Promise::delayed_on(scheduler, ms(50), || Ok("slow")),
        Promise::delayed_on(scheduler, ms(10), || Ok("fast")),
    ]);
    println!("race       -> {}", winner.to_blocking().get()?);

    let first_ok = scheduler.any([
        Promise::rejected_on(scheduler, Reason::msg("E1")),
        Promise::delayed_on(scheduler, ms(5), || Ok(5)),
    ]);
    println!("any        -> {}", first_ok.to_blocking().get()?);

    let all_failed: Promise<u8> = scheduler.any([
        Promise::rejected_on(scheduler, Reason::msg("E1")),
        Promise::rejected_on(scheduler, Reason::msg("E2")),
    ]);
    match all_failed.to_blocking().get() {
        Ok(value) => bail!("any() of rejections fulfilled with {value}"),
        Err(err) => println!("any (fail) -> {err}"),
    }

    let never: Promise<u8> = Promise::pending_on(scheduler);
    match never.timeout(ms(20)).to_blocking().get() {
        Err(err)
            if err
                .rejection()
                .and_then(Reason::downcast_ref::<PromiseError>)
                .is_some_and(|e| matches!(e, PromiseError::Timeout(_))) =>
        {
            println!("timeout    -> {err}");
        }
        other => bail!("expected a timeout, got {other:?}"),
    }

    let sum = scheduler.fold(
        (1..=4).map(|n| Promise::delayed_on(scheduler, ms(5 * n), move || Ok(n))),
        0,
        |acc, n, _| Ok(acc + n),
    );
    println!("fold       -> {}", sum.to_blocking().get()?);

    Ok(())
}
