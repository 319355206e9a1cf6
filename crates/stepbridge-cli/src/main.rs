mod check_cmd;
mod config;
mod run_cmd;
mod script;

#[cfg(test)]
mod test_util;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use config::StepbridgeConfig;
use run_cmd::{RunOptions, RunOutcome, SignalSpec};

#[derive(Parser)]
#[command(
    name = "stepbridge",
    about = "Drive step scripts as coroutines against a tick host"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a stepbridge config file with default settings
    Init {
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
    /// Parse a step script and print its steps
    Check {
        /// Path to the script
        script: PathBuf,
    },
    /// Drive a step script to completion against a real-time tick host
    Run {
        /// Path to the script
        script: PathBuf,
        /// Number of fresh coroutine instances to drive concurrently
        #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
        instances: u32,
        /// Milliseconds per host tick (overrides STEPBRIDGE_TICK_MS and config file)
        #[arg(long)]
        tick_ms: Option<u64>,
        /// Raise custom signal KEY after DELAY (e.g. door=1.5s); repeatable
        #[arg(long = "signal", value_name = "KEY=DELAY", value_parser = run_cmd::parse_signal)]
        signals: Vec<SignalSpec>,
        /// Fail on values that are not wait conditions instead of skipping them
        #[arg(long)]
        strict: bool,
    },
}

/// Execute the `stepbridge init` command: write config file.
fn cmd_init(force: bool) -> anyhow::Result<()> {
    let path = config::config_path();

    if path.exists() && !force {
        anyhow::bail!(
            "config file already exists at {}\nUse --force to overwrite.",
            path.display()
        );
    }

    let cfg = config::ConfigFile::default();
    config::save_config(&cfg)?;

    println!("Config written to {}", path.display());
    println!("  host.tick_ms = {}", cfg.host.tick_ms);
    println!("  driver.unrecognized = {}", cfg.driver.unrecognized);

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { force } => {
            cmd_init(force)?;
        }
        Commands::Check { script } => {
            check_cmd::run_check(&script)?;
        }
        Commands::Run {
            script,
            instances,
            tick_ms,
            signals,
            strict,
        } => {
            let resolved = StepbridgeConfig::resolve(tick_ms, strict)?;
            let options = RunOptions {
                instances: instances as usize,
                signals,
            };
            let outcome = run_cmd::run(&script, &resolved, &options).await?;
            match outcome {
                RunOutcome::Completed => {}
                RunOutcome::Failed { failed } => {
                    eprintln!("{failed} instance(s) failed.");
                    std::process::exit(outcome.exit_code());
                }
                RunOutcome::Interrupted => {
                    eprintln!("Run interrupted.");
                    std::process::exit(outcome.exit_code());
                }
            }
        }
    }

    Ok(())
}
