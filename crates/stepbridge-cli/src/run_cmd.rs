//! `stepbridge run` command: drive fresh script instances against a
//! real-time tick host.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use futures::future::join_all;
use tokio_util::sync::CancellationToken;

use stepbridge_core::{Driver, Error, TickScheduler};

use crate::config::StepbridgeConfig;
use crate::script::{Script, parse_duration};

/// A custom signal raised on the host once `delay` of real time has passed.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalSpec {
    pub key: String,
    pub delay: Duration,
}

/// Parse `--signal KEY=DELAY`.
pub fn parse_signal(raw: &str) -> Result<SignalSpec, String> {
    let (key, delay) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=DELAY, got {raw:?}"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err("signal key must not be empty".to_string());
    }
    let delay = parse_duration(delay)
        .ok_or_else(|| format!("invalid delay {delay:?} (expected e.g. 250ms, 1.5s)"))?;
    Ok(SignalSpec {
        key: key.to_string(),
        delay,
    })
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub instances: usize,
    pub signals: Vec<SignalSpec>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Failed { failed: usize },
    Interrupted,
}

impl RunOutcome {
    pub fn exit_code(self) -> i32 {
        match self {
            RunOutcome::Completed => 0,
            RunOutcome::Failed { .. } => 1,
            RunOutcome::Interrupted => 130,
        }
    }
}

/// Run the run command.
pub async fn run(
    script_path: &Path,
    config: &StepbridgeConfig,
    options: &RunOptions,
) -> Result<RunOutcome> {
    let script = Script::load(script_path)?;

    println!("Running {} ({} step(s))", script_path.display(), script.steps().len());
    println!("  Instances: {}", options.instances);
    println!("  Tick: {:?}", config.tick.tick_interval());
    println!("  Unrecognized values: {}", config.driver.unrecognized);

    // First signal cancels, second force-exits.
    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();
    let got_first_signal = Arc::new(AtomicBool::new(false));
    let got_first_clone = Arc::clone(&got_first_signal);

    tokio::spawn(async move {
        loop {
            tokio::signal::ctrl_c().await.ok();
            if got_first_clone.swap(true, Ordering::SeqCst) {
                eprintln!("\nForce exit.");
                std::process::exit(130);
            }
            eprintln!("\nCancelling drives (Ctrl+C again to force)...");
            cancel_clone.cancel();
        }
    });

    run_script(&script, config, options, cancel).await
}

/// Drive `options.instances` fresh coroutines built from `script` until they
/// all finish or `cancel` fires.
pub async fn run_script(
    script: &Script,
    config: &StepbridgeConfig,
    options: &RunOptions,
    cancel: CancellationToken,
) -> Result<RunOutcome> {
    for key in script.custom_keys() {
        if !options.signals.iter().any(|s| s.key == key) {
            tracing::warn!(key, "script waits on a custom condition no --signal raises");
        }
    }

    let host = Arc::new(TickScheduler::new(config.tick.clone()));
    let driver = Driver::with_config(host.clone(), config.driver.clone()).on_unrecognized(|u| {
        let text = u
            .value
            .downcast_ref::<String>()
            .map(String::as_str)
            .unwrap_or("<opaque>");
        println!("  [{}] step {}: value {text}", u.drive_id, u.step);
    });

    let host_cancel = CancellationToken::new();
    let ticker = tokio::spawn({
        let host = Arc::clone(&host);
        let host_cancel = host_cancel.clone();
        async move { host.run(host_cancel).await }
    });

    for spec in &options.signals {
        let host = Arc::clone(&host);
        let stop = host_cancel.clone();
        let spec = spec.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = stop.cancelled() => {}
                _ = tokio::time::sleep(spec.delay) => {
                    tracing::info!(key = %spec.key, "raising custom signal");
                    host.signal(&spec.key);
                }
            }
        });
    }

    tracing::info!(
        instances = options.instances,
        steps = script.steps().len(),
        "starting drives"
    );
    let started = Instant::now();
    let drives = (1..=options.instances).map(|instance| {
        let driver = driver.clone();
        let coroutine = script.coroutine();
        let cancel = cancel.clone();
        async move {
            let began = Instant::now();
            let result = driver.drive_with_cancel(coroutine, cancel).await;
            (instance, began.elapsed(), result)
        }
    });
    let results = join_all(drives).await;

    host_cancel.cancel();
    ticker.await.context("tick loop task failed")?;
    host.shutdown();

    let mut completed = 0usize;
    let mut failed = 0usize;
    let mut interrupted = false;
    for (instance, elapsed, result) in &results {
        match result {
            Ok(()) => {
                completed += 1;
                println!("instance {instance}: completed in {elapsed:.2?}");
            }
            Err(Error::Cancelled) => {
                interrupted = true;
                println!("instance {instance}: cancelled after {elapsed:.2?}");
            }
            Err(e) => {
                failed += 1;
                println!("instance {instance}: failed: {e}");
            }
        }
    }
    println!(
        "\n{completed}/{} instance(s) completed in {:.2?} ({} ticks)",
        results.len(),
        started.elapsed(),
        host.ticks()
    );

    Ok(if interrupted {
        RunOutcome::Interrupted
    } else if failed > 0 {
        RunOutcome::Failed { failed }
    } else {
        RunOutcome::Completed
    })
}
