//! Configuration file management for stepbridge.
//!
//! Provides a TOML-based config file at `~/.config/stepbridge/config.toml`
//! and a resolution chain: CLI flag > env var > config file > default.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use stepbridge_core::{DriverConfig, TickConfig, UnrecognizedYield};

// -----------------------------------------------------------------------
// Config file types
// -----------------------------------------------------------------------

#[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub host: HostSection,
    #[serde(default)]
    pub driver: DriverSection,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct HostSection {
    /// Milliseconds of host time per tick.
    pub tick_ms: u64,
}

impl Default for HostSection {
    fn default() -> Self {
        Self {
            tick_ms: TickConfig::DEFAULT_TICK_MS,
        }
    }
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct DriverSection {
    /// `pass-through` or `reject`.
    pub unrecognized: String,
}

impl Default for DriverSection {
    fn default() -> Self {
        Self {
            unrecognized: UnrecognizedYield::default().to_string(),
        }
    }
}

// -----------------------------------------------------------------------
// Config file
// -----------------------------------------------------------------------

/// `$XDG_CONFIG_HOME/stepbridge`, else `~/.config/stepbridge`.
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("stepbridge");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("stepbridge")
}

pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

/// The `[host]` and `[driver]` tables, or `None` before `stepbridge init`.
pub fn load_config() -> Result<Option<ConfigFile>> {
    let path = config_path();
    if !path.exists() {
        return Ok(None);
    }
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    let config: ConfigFile = toml::from_str(&contents)
        .with_context(|| format!("failed to parse config file at {}", path.display()))?;
    Ok(Some(config))
}

/// Write `config` as the file `stepbridge init` produces.
pub fn save_config(config: &ConfigFile) -> Result<()> {
    let path = config_path();
    let dir = config_dir();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create config directory {}", dir.display()))?;

    let contents = toml::to_string_pretty(config).context("failed to serialize config")?;
    std::fs::write(&path, &contents)
        .with_context(|| format!("failed to write config file at {}", path.display()))?;
    Ok(())
}

// -----------------------------------------------------------------------
// Resolved config
// -----------------------------------------------------------------------

/// Fully resolved configuration, ready for use.
#[derive(Debug, Clone, PartialEq)]
pub struct StepbridgeConfig {
    pub tick: TickConfig,
    pub driver: DriverConfig,
}

impl StepbridgeConfig {
    /// Resolve configuration using the chain: CLI flag > env var > config file > default.
    ///
    /// - Tick: `cli_tick_ms` > `STEPBRIDGE_TICK_MS` > `host.tick_ms` > `TickConfig::DEFAULT_TICK_MS`
    /// - Unrecognized values: `--strict` > `STEPBRIDGE_UNRECOGNIZED` > `driver.unrecognized` > pass-through
    pub fn resolve(cli_tick_ms: Option<u64>, cli_strict: bool) -> Result<Self> {
        let file_config = load_config()?;

        let tick_ms = if let Some(ms) = cli_tick_ms {
            ms
        } else if let Ok(raw) = std::env::var(TickConfig::ENV_TICK_MS) {
            raw.trim().parse::<u64>().with_context(|| {
                format!("{} is not a whole number: {raw:?}", TickConfig::ENV_TICK_MS)
            })?
        } else if let Some(ref cfg) = file_config {
            cfg.host.tick_ms
        } else {
            TickConfig::DEFAULT_TICK_MS
        };

        let unrecognized = if cli_strict {
            UnrecognizedYield::Reject
        } else if let Ok(raw) = std::env::var(DriverConfig::ENV_UNRECOGNIZED) {
            raw.parse::<UnrecognizedYield>()
                .map_err(anyhow::Error::msg)
                .with_context(|| format!("invalid {}", DriverConfig::ENV_UNRECOGNIZED))?
        } else if let Some(ref cfg) = file_config {
            cfg.driver
                .unrecognized
                .parse::<UnrecognizedYield>()
                .map_err(anyhow::Error::msg)
                .context("invalid driver.unrecognized in config file")?
        } else {
            UnrecognizedYield::default()
        };

        Ok(Self {
            tick: TickConfig::from_millis(tick_ms),
            driver: DriverConfig { unrecognized },
        })
    }
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn lock_env() -> std::sync::MutexGuard<'static, ()> {
        crate::test_util::lock_env()
    }

    /// Point the config directory at a fresh temp dir and clear stepbridge
    /// env vars. The returned guard restores `XDG_CONFIG_HOME` on drop.
    struct IsolatedEnv {
        _tmp: tempfile::TempDir,
        orig_xdg: Option<String>,
    }

    impl IsolatedEnv {
        fn new() -> Self {
            let tmp = tempfile::TempDir::new().unwrap();
            let orig_xdg = std::env::var("XDG_CONFIG_HOME").ok();
            unsafe { std::env::set_var("XDG_CONFIG_HOME", tmp.path()) };
            unsafe { std::env::remove_var(TickConfig::ENV_TICK_MS) };
            unsafe { std::env::remove_var(DriverConfig::ENV_UNRECOGNIZED) };
            Self {
                _tmp: tmp,
                orig_xdg,
            }
        }
    }

    impl Drop for IsolatedEnv {
        fn drop(&mut self) {
            unsafe { std::env::remove_var(TickConfig::ENV_TICK_MS) };
            unsafe { std::env::remove_var(DriverConfig::ENV_UNRECOGNIZED) };
            match self.orig_xdg.take() {
                Some(x) => unsafe { std::env::set_var("XDG_CONFIG_HOME", x) },
                None => unsafe { std::env::remove_var("XDG_CONFIG_HOME") },
            }
        }
    }

    fn write_file(contents: &str) {
        std::fs::create_dir_all(config_dir()).unwrap();
        std::fs::write(config_path(), contents).unwrap();
    }

    #[test]
    fn save_and_load_config_roundtrip() {
        let _lock = lock_env();
        let _env = IsolatedEnv::new();

        let original = ConfigFile {
            host: HostSection { tick_ms: 33 },
            driver: DriverSection {
                unrecognized: "reject".to_string(),
            },
        };
        save_config(&original).unwrap();

        assert_eq!(load_config().unwrap(), Some(original));
    }

    #[test]
    fn missing_config_file_is_not_an_error() {
        let _lock = lock_env();
        let _env = IsolatedEnv::new();

        assert_eq!(load_config().unwrap(), None);
    }

    #[test]
    fn partial_config_file_uses_section_defaults() {
        let _lock = lock_env();
        let _env = IsolatedEnv::new();
        write_file("[host]\ntick_ms = 5\n");

        let loaded = load_config().unwrap().unwrap();
        assert_eq!(loaded.host.tick_ms, 5);
        assert_eq!(loaded.driver, DriverSection::default());
    }

    #[test]
    fn resolve_defaults_when_nothing_set() {
        let _lock = lock_env();
        let _env = IsolatedEnv::new();

        let config = StepbridgeConfig::resolve(None, false).unwrap();
        assert_eq!(config.tick, TickConfig::default());
        assert_eq!(config.driver, DriverConfig::default());
    }

    #[test]
    fn resolve_reads_config_file() {
        let _lock = lock_env();
        let _env = IsolatedEnv::new();
        write_file("[host]\ntick_ms = 40\n\n[driver]\nunrecognized = \"reject\"\n");

        let config = StepbridgeConfig::resolve(None, false).unwrap();
        assert_eq!(config.tick, TickConfig::from_millis(40));
        assert_eq!(config.driver.unrecognized, UnrecognizedYield::Reject);
    }

    #[test]
    fn resolve_with_env_var_overrides_config_file() {
        let _lock = lock_env();
        let _env = IsolatedEnv::new();
        write_file("[host]\ntick_ms = 40\n\n[driver]\nunrecognized = \"reject\"\n");
        unsafe { std::env::set_var(TickConfig::ENV_TICK_MS, "8") };
        unsafe { std::env::set_var(DriverConfig::ENV_UNRECOGNIZED, "pass-through") };

        let config = StepbridgeConfig::resolve(None, false).unwrap();
        assert_eq!(config.tick, TickConfig::from_millis(8));
        assert_eq!(config.driver.unrecognized, UnrecognizedYield::PassThrough);
    }

    #[test]
    fn resolve_with_cli_flags_overrides_all() {
        let _lock = lock_env();
        let _env = IsolatedEnv::new();
        unsafe { std::env::set_var(TickConfig::ENV_TICK_MS, "8") };
        unsafe { std::env::set_var(DriverConfig::ENV_UNRECOGNIZED, "pass-through") };

        let config = StepbridgeConfig::resolve(Some(2), true).unwrap();
        assert_eq!(config.tick, TickConfig::from_millis(2));
        assert_eq!(config.driver.unrecognized, UnrecognizedYield::Reject);
    }

    #[test]
    fn resolve_rejects_invalid_values() {
        let _lock = lock_env();
        let _env = IsolatedEnv::new();

        unsafe { std::env::set_var(TickConfig::ENV_TICK_MS, "fast") };
        let msg = StepbridgeConfig::resolve(None, false).unwrap_err().to_string();
        assert!(msg.contains("STEPBRIDGE_TICK_MS"), "unexpected error: {msg}");
        unsafe { std::env::remove_var(TickConfig::ENV_TICK_MS) };

        write_file("[driver]\nunrecognized = \"loud\"\n");
        let msg = format!("{:#}", StepbridgeConfig::resolve(None, false).unwrap_err());
        assert!(msg.contains("driver.unrecognized"), "unexpected error: {msg}");
    }

    #[test]
    fn config_path_ends_with_expected_filename() {
        let path = config_path();
        assert!(
            path.ends_with("stepbridge/config.toml"),
            "unexpected config path: {}",
            path.display()
        );
    }
}
