//! # Configuration Management Module
//!
//! Loads and persists the bridge configuration as TOML.
//!
//! ## Configuration Structure
//!
//! - [`ModemConfig`] - Serial device, poll cadence, redelivery policy, timing overrides
//! - [`StorageConfig`] - Where received and sent messages are kept
//! - [`LoggingConfig`] - Log level and optional log file
//! - [`KeepaliveConfig`] - The keepalive send used to keep a SIM active
//! - [`ForwardConfig`] - Telegram and PushPlus forwarding sinks
//!
//! ## Usage
//!
//! ```rust,no_run
//! use smsbridge::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml").await?;
//!     println!("Modem: {}@{}", config.modem.port, config.modem.baud_rate);
//!
//!     Config::create_default("config.toml").await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration File Format
//!
//! ```toml
//! [modem]
//! port = "/dev/ttyUSB2"
//! baud_rate = 115200
//! poll_interval_secs = 8
//! redelivery = "allow"
//!
//! [storage]
//! data_dir = "./data"
//!
//! [keepalive]
//! enabled = false
//! number = ""
//! ```
//!
//! Timing overrides under `[modem]` (`*_ms`) are optional; unset values keep
//! the protocol defaults from [`ModemTimings::default`].

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::fs;

use crate::modem::{ModemTimings, RedeliveryPolicy};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub modem: ModemConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub keepalive: KeepaliveConfig,
    #[serde(default)]
    pub forward: ForwardConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModemConfig {
    pub port: String,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Sleep between poll cycles.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Sleep after a failed cycle, before reconnecting.
    #[serde(default = "default_recovery_delay_secs")]
    pub recovery_delay_secs: u64,
    /// How long `stop` waits for the worker before forcing the port closed.
    #[serde(default = "default_stop_wait_ms")]
    pub stop_wait_ms: u64,
    #[serde(default)]
    pub redelivery: RedeliveryPolicy,
    #[serde(default = "default_seen_capacity")]
    pub seen_capacity: usize,
    /// Bound on the unsolicited line buffer; unbounded when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buffer_capacity: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settle_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command_wait_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fetch_wait_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list_wait_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drain_timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_wait_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_wait_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub send_deadline_ms: Option<u64>,
}

fn default_baud_rate() -> u32 {
    115200
}

fn default_poll_interval_secs() -> u64 {
    8
}

fn default_recovery_delay_secs() -> u64 {
    5
}

fn default_stop_wait_ms() -> u64 {
    2000
}

fn default_seen_capacity() -> usize {
    512
}

impl Default for ModemConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB2".to_string(),
            baud_rate: default_baud_rate(),
            poll_interval_secs: default_poll_interval_secs(),
            recovery_delay_secs: default_recovery_delay_secs(),
            stop_wait_ms: default_stop_wait_ms(),
            redelivery: RedeliveryPolicy::Allow,
            seen_capacity: default_seen_capacity(),
            buffer_capacity: None,
            read_timeout_ms: None,
            settle_ms: None,
            command_wait_ms: None,
            fetch_wait_ms: None,
            list_wait_ms: None,
            drain_timeout_ms: None,
            prompt_wait_ms: None,
            body_wait_ms: None,
            send_deadline_ms: None,
        }
    }
}

impl ModemConfig {
    /// Protocol timings with any configured overrides applied.
    pub fn timings(&self) -> ModemTimings {
        let d = ModemTimings::default();
        let ms = |v: Option<u64>, fallback: Duration| v.map(Duration::from_millis).unwrap_or(fallback);
        ModemTimings {
            settle: ms(self.settle_ms, d.settle),
            read_timeout: ms(self.read_timeout_ms, d.read_timeout),
            drain_timeout: ms(self.drain_timeout_ms, d.drain_timeout),
            command_wait: ms(self.command_wait_ms, d.command_wait),
            fetch_wait: ms(self.fetch_wait_ms, d.fetch_wait),
            list_wait: ms(self.list_wait_ms, d.list_wait),
            prompt_wait: ms(self.prompt_wait_ms, d.prompt_wait),
            body_wait: ms(self.body_wait_ms, d.body_wait),
            send_deadline: ms(self.send_deadline_ms, d.send_deadline),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn recovery_delay(&self) -> Duration {
        Duration::from_secs(self.recovery_delay_secs)
    }

    pub fn stop_wait(&self) -> Duration {
        Duration::from_millis(self.stop_wait_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: "./data".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: Some("smsbridge.log".to_string()),
        }
    }
}

/// Periodic "I'm alive" text some prepaid SIMs need to stay active.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeepaliveConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub number: String,
    #[serde(default = "default_keepalive_message")]
    pub message: String,
}

fn default_keepalive_message() -> String {
    "OK".to_string()
}

impl Default for KeepaliveConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            number: String::new(),
            message: default_keepalive_message(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForwardConfig {
    /// Request timeout in seconds
    #[serde(default = "default_forward_timeout")]
    pub timeout_seconds: u64,
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub pushplus: PushPlusConfig,
}

fn default_forward_timeout() -> u64 {
    10
}

impl Default for ForwardConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_forward_timeout(),
            telegram: TelegramConfig::default(),
            pushplus: PushPlusConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TelegramConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub bot_token: String,
    #[serde(default)]
    pub chat_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PushPlusConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub token: String,
}

impl Config {
    /// Load configuration from a file
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path, e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {}: {}", path, e))?;

        config
            .validate()
            .map_err(|e| anyhow!("Invalid config file {}: {}", path, e))?;
        Ok(config)
    }

    /// Create a default configuration file
    pub async fn create_default(path: &str) -> Result<()> {
        let config = Config::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| anyhow!("Failed to serialize default config: {}", e))?;

        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {}: {}", path, e))?;

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.modem.port.trim().is_empty() {
            return Err(anyhow!("modem.port must not be empty"));
        }
        if self.modem.baud_rate == 0 {
            return Err(anyhow!("modem.baud_rate must be greater than 0"));
        }
        if self.modem.poll_interval_secs == 0 {
            return Err(anyhow!("modem.poll_interval_secs must be greater than 0"));
        }
        if self.keepalive.enabled && self.keepalive.number.trim().is_empty() {
            return Err(anyhow!("keepalive.number is required when keepalive is enabled"));
        }
        let tg = &self.forward.telegram;
        if tg.enabled && (tg.bot_token.is_empty() || tg.chat_id.is_empty()) {
            return Err(anyhow!(
                "forward.telegram.bot_token and chat_id are required when telegram is enabled"
            ));
        }
        if self.forward.pushplus.enabled && self.forward.pushplus.token.is_empty() {
            return Err(anyhow!(
                "forward.pushplus.token is required when pushplus is enabled"
            ));
        }
        Ok(())
    }
}
