//! Driver and tick-host configuration.
//!
//! Both types have hard-coded defaults and a `from_env()` constructor that
//! overrides them from `STEPBRIDGE_*` environment variables.

use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// What the driver does when a coroutine yields something that is not a
/// wait condition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UnrecognizedYield {
    /// Skip the step without suspending and resume the coroutine right away.
    #[default]
    PassThrough,
    /// Fail the drive with [`crate::Error::UnrecognizedYield`].
    Reject,
}

impl UnrecognizedYield {
    pub fn as_str(self) -> &'static str {
        match self {
            UnrecognizedYield::PassThrough => "pass-through",
            UnrecognizedYield::Reject => "reject",
        }
    }
}

impl fmt::Display for UnrecognizedYield {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UnrecognizedYield {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pass-through" | "passthrough" | "pass_through" => Ok(UnrecognizedYield::PassThrough),
            "reject" | "strict" => Ok(UnrecognizedYield::Reject),
            other => Err(format!(
                "unknown unrecognized-yield policy {other:?} (expected \"pass-through\" or \"reject\")"
            )),
        }
    }
}

/// Configuration for [`crate::Driver`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DriverConfig {
    pub unrecognized: UnrecognizedYield,
}

impl DriverConfig {
    pub const ENV_UNRECOGNIZED: &str = "STEPBRIDGE_UNRECOGNIZED";

    /// Build a config from the environment.
    ///
    /// An unparsable `STEPBRIDGE_UNRECOGNIZED` is logged and ignored.
    pub fn from_env() -> Self {
        let unrecognized = match env::var(Self::ENV_UNRECOGNIZED) {
            Ok(raw) => raw.parse::<UnrecognizedYield>().unwrap_or_else(|e: String| {
                tracing::warn!(error = %e, "ignoring {}", Self::ENV_UNRECOGNIZED);
                UnrecognizedYield::default()
            }),
            Err(_) => UnrecognizedYield::default(),
        };
        Self { unrecognized }
    }
}

/// Configuration for [`crate::host::TickScheduler`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickConfig {
    tick_interval: Duration,
}

impl TickConfig {
    /// Roughly one frame at 60 Hz.
    pub const DEFAULT_TICK_MS: u64 = 16;
    pub const ENV_TICK_MS: &str = "STEPBRIDGE_TICK_MS";

    /// Build a config with an explicit interval. A zero interval is bumped
    /// to one millisecond so time delays always make progress.
    pub fn new(tick_interval: Duration) -> Self {
        Self {
            tick_interval: tick_interval.max(Duration::from_millis(1)),
        }
    }

    pub fn from_millis(ms: u64) -> Self {
        Self::new(Duration::from_millis(ms))
    }

    /// Virtual time added by each tick, and the real-time period of
    /// [`crate::host::TickScheduler::run`]. Never zero.
    pub fn tick_interval(&self) -> Duration {
        self.tick_interval
    }

    /// Build a config from `STEPBRIDGE_TICK_MS`, falling back to
    /// [`Self::DEFAULT_TICK_MS`] when unset or invalid.
    pub fn from_env() -> Self {
        let ms = env::var(Self::ENV_TICK_MS)
            .ok()
            .and_then(|raw| match raw.trim().parse::<u64>() {
                Ok(ms) => Some(ms),
                Err(e) => {
                    tracing::warn!(value = %raw, error = %e, "ignoring {}", Self::ENV_TICK_MS);
                    None
                }
            })
            .unwrap_or(Self::DEFAULT_TICK_MS);
        Self::from_millis(ms)
    }
}

impl Default for TickConfig {
    fn default() -> Self {
        Self::from_millis(Self::DEFAULT_TICK_MS)
    }
}
