//! # Configuration
//!
//! Corpsewarden is configured with a single TOML file. Every section has
//! defaults, so an empty file is a valid configuration.
//!
//! ## Configuration Structure
//!
//! - [`CorpseConfig`] - corpse duration, name policy, offset and rotation
//! - [`DeathMessageConfig`] - floating "last words" text
//! - [`AdvancedConfig`] - settle and recheck delays, reconciliation cadence
//! - [`DebugConfig`] - verbose lifecycle logging and its prefix
//! - [`LoggingConfig`] - log level and log file
//!
//! ## Usage
//!
//! ```rust,no_run
//! use corpsewarden::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("corpsewarden.toml").await?;
//!     println!("Corpse duration: {}s", config.corpse.duration);
//!
//!     Config::create_default("corpsewarden.example.toml").await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration File Format
//!
//! ```toml
//! language = "en_US"
//!
//! [corpse]
//! duration = -1          # keep until the arena leaves IN_GAME
//! name_format = "&7{player}'s corpse"
//!
//! [corpse.rotation]
//! mode = "RANDOM"
//!
//! [death_message]
//! enabled = true
//! duration = 5
//! ```
//!
//! Configuration is immutable once loaded. A reload builds a fresh [`Config`]
//! and hands it to the service, which swaps it in between sweep cycles.

use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::logutil::DebugLog;
use crate::proxy::{Offset, OrientationMode, Ttl};

/// Upper bound for every interval and delay setting (one day).
pub const MAX_INTERVAL_MS: u64 = 86_400_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Language tag for player-facing messages (`zh_CN`, `en_US`, ...).
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub corpse: CorpseConfig,
    #[serde(default)]
    pub death_message: DeathMessageConfig,
    #[serde(default)]
    pub advanced: AdvancedConfig,
    #[serde(default)]
    pub debug: DebugConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_language() -> String {
    "zh_CN".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorpseConfig {
    pub enabled: bool,
    /// Seconds a corpse stays. `-1` keeps it until its arena stops running.
    pub duration: i64,
    pub show_name: bool,
    /// Name template; `{player}` is replaced with the player's name.
    pub name_format: String,
    pub hide_from_tab_list: bool,
    pub cleanup_interval_ms: u64,
    pub position_offset: Offset,
    pub rotation: RotationConfig,
}

impl Default for CorpseConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            duration: 30,
            show_name: true,
            name_format: "&7{player}'s corpse".to_string(),
            hide_from_tab_list: true,
            cleanup_interval_ms: 10_000,
            position_offset: Offset::default(),
            rotation: RotationConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RotationConfig {
    /// `KEEP_DEATH`, `FIXED` or `RANDOM`. Anything else behaves like `KEEP_DEATH`.
    pub mode: String,
    pub fixed_yaw: f32,
    pub fixed_pitch: f32,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            mode: "KEEP_DEATH".to_string(),
            fixed_yaw: 0.0,
            fixed_pitch: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeathMessageConfig {
    pub enabled: bool,
    /// Seconds the text floats. `-1` keeps it until its arena stops running.
    pub duration: i64,
    pub height_offset: f64,
    pub cleanup_interval_ms: u64,
}

impl Default for DeathMessageConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            duration: 5,
            height_offset: 2.0,
            cleanup_interval_ms: 1_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvancedConfig {
    /// Settle delay between an elimination and the corpse spawn.
    pub corpse_creation_delay_ms: u64,
    /// First arena-state recheck after a participant disconnects.
    pub game_state_check_delay_ms: u64,
    /// Second, later recheck after a disconnect.
    pub safety_recheck_delay_ms: u64,
    /// Cadence of the arena-state reconciliation for unbounded proxies.
    pub reconcile_interval_ms: u64,
}

impl Default for AdvancedConfig {
    fn default() -> Self {
        Self {
            corpse_creation_delay_ms: 500,
            game_state_check_delay_ms: 2_000,
            safety_recheck_delay_ms: 6_000,
            reconcile_interval_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub enabled: bool,
    pub prefix: String,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            prefix: "&8[&6Corpsewarden-Debug&8]&7 ".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    #[serde(default)]
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: Some("corpsewarden.log".to_string()),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            language: default_language(),
            corpse: CorpseConfig::default(),
            death_message: DeathMessageConfig::default(),
            advanced: AdvancedConfig::default(),
            debug: DebugConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Load and validate configuration from a file
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path, e))?;

        let config = Self::from_toml_str(&content)
            .map_err(|e| anyhow!("Failed to load config file {}: {}", path, e))?;

        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Write the default configuration to `path`
    pub async fn create_default(path: &str) -> Result<()> {
        let content = toml::to_string_pretty(&Config::default())
            .map_err(|e| anyhow!("Failed to serialize default config: {}", e))?;

        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {}: {}", path, e))?;

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.corpse.cleanup_interval_ms == 0 {
            bail!("corpse.cleanup_interval_ms must be greater than 0");
        }
        if self.death_message.cleanup_interval_ms == 0 {
            bail!("death_message.cleanup_interval_ms must be greater than 0");
        }
        if self.advanced.reconcile_interval_ms == 0 {
            bail!("advanced.reconcile_interval_ms must be greater than 0");
        }
        for (name, ms) in [
            ("corpse.cleanup_interval_ms", self.corpse.cleanup_interval_ms),
            ("death_message.cleanup_interval_ms", self.death_message.cleanup_interval_ms),
            ("advanced.corpse_creation_delay_ms", self.advanced.corpse_creation_delay_ms),
            ("advanced.game_state_check_delay_ms", self.advanced.game_state_check_delay_ms),
            ("advanced.safety_recheck_delay_ms", self.advanced.safety_recheck_delay_ms),
            ("advanced.reconcile_interval_ms", self.advanced.reconcile_interval_ms),
        ] {
            if ms > MAX_INTERVAL_MS {
                bail!("{} ({}) must not exceed {} ms", name, ms, MAX_INTERVAL_MS);
            }
        }
        if self.advanced.safety_recheck_delay_ms < self.advanced.game_state_check_delay_ms {
            bail!(
                "advanced.safety_recheck_delay_ms ({}) must not be shorter than game_state_check_delay_ms ({})",
                self.advanced.safety_recheck_delay_ms,
                self.advanced.game_state_check_delay_ms
            );
        }
        if self.corpse.show_name && !self.corpse.name_format.contains("{player}") {
            log::warn!(
                "corpse.name_format '{}' has no {{player}} placeholder; every corpse will share one name",
                self.corpse.name_format
            );
        }
        Ok(())
    }

    pub fn corpse_ttl(&self) -> Ttl {
        Ttl::from_secs(self.corpse.duration)
    }

    pub fn death_message_ttl(&self) -> Ttl {
        Ttl::from_secs(self.death_message.duration)
    }

    pub fn orientation_mode(&self) -> OrientationMode {
        let rotation = &self.corpse.rotation;
        OrientationMode::from_config(&rotation.mode, rotation.fixed_yaw, rotation.fixed_pitch)
    }

    pub fn debug_log(&self) -> DebugLog {
        DebugLog::new(self.debug.enabled, &self.debug.prefix)
    }

    pub fn creation_delay(&self) -> Duration {
        Duration::from_millis(self.advanced.corpse_creation_delay_ms)
    }

    pub fn state_recheck_delays(&self) -> (Duration, Duration) {
        (
            Duration::from_millis(self.advanced.game_state_check_delay_ms),
            Duration::from_millis(self.advanced.safety_recheck_delay_ms),
        )
    }
}
