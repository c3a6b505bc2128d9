//! Project configuration for safewatch
//!
//! Configuration is stored in `.safewatch/config.toml` and controls watcher
//! intervals, agent dispatch, and emergency-detection thresholds.
//!
//! Sensitive credentials (the Telegram bot token) are stored separately in
//! `~/.config/safewatch/telegram.toml` to avoid accidentally committing
//! secrets.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Trip-reminder watcher configuration
    #[serde(default)]
    pub trips: TripsConfig,

    /// SOS watcher configuration
    #[serde(default)]
    pub sos: SosConfig,

    /// Agent executable configuration
    #[serde(default)]
    pub agent: AgentConfig,

    /// Snapshot provider configuration
    #[serde(default)]
    pub monitor: MonitorConfig,

    /// Emergency-detection thresholds
    #[serde(default)]
    pub emergency: EmergencyConfig,
}

/// Trip-reminder watcher configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TripsConfig {
    /// Reminder window length before departure, in hours
    #[serde(default = "default_lead_hours")]
    pub lead_hours: i64,

    /// Poll interval in minutes
    #[serde(default = "default_trip_interval")]
    pub interval_minutes: u64,

    /// Agent profile dispatched for trip reminders
    #[serde(default = "default_trip_agent")]
    pub agent: String,

    /// Wall-clock budget for one dispatch (report generation is slow)
    #[serde(default = "default_trip_timeout")]
    pub timeout_secs: u64,
}

/// SOS watcher configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SosConfig {
    /// Base URL of the SOS pending-queue server (required to watch sos)
    #[serde(default)]
    pub server_url: Option<String>,

    /// Poll interval in seconds
    #[serde(default = "default_sos_interval")]
    pub interval_secs: u64,

    /// Agent profile dispatched for emergency rides
    #[serde(default = "default_sos_agent")]
    pub agent: String,

    /// Wall-clock budget for one dispatch (time-critical, keep it short)
    #[serde(default = "default_sos_timeout")]
    pub timeout_secs: u64,
}

/// Agent executable configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Agent CLI program, resolved on PATH when no bridge is configured
    #[serde(default = "default_agent_command")]
    pub command: String,

    /// Working directory for the agent process
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,

    /// Cross-environment bridge: set when the agent binary lives in a
    /// different OS environment than the watcher (e.g. WSL from Windows)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bridge: Option<BridgeConfig>,
}

/// Bridge settings for running the agent through an intermediate shell
/// layer in another environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Bridge launcher program
    #[serde(default = "default_bridge_command")]
    pub command: String,

    /// Absolute path of the agent binary inside the bridged environment
    pub agent_path: String,
}

/// Snapshot provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Base URL of the device-snapshot API (required for `sw report`)
    #[serde(default)]
    pub api_url: Option<String>,

    /// Request timeout in seconds (hosted free tiers cold-start slowly)
    #[serde(default = "default_monitor_timeout")]
    pub timeout_secs: u64,
}

/// Emergency-detection thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmergencyConfig {
    /// Battery percentage at or below which the device may shut down
    #[serde(default = "default_battery_critical")]
    pub battery_critical: i32,

    /// Battery percentage at or below which to warn
    #[serde(default = "default_battery_low")]
    pub battery_low: i32,

    /// Minutes without a snapshot before the device is considered silent
    #[serde(default = "default_stale_minutes")]
    pub stale_minutes: i64,

    /// Battery drain rate (percent per hour) considered abnormal
    #[serde(default = "default_drain_rate")]
    pub drain_rate_per_hour: f64,
}

fn default_lead_hours() -> i64 {
    4
}

fn default_trip_interval() -> u64 {
    30
}

fn default_trip_agent() -> String {
    "trip-guardian".to_string()
}

fn default_trip_timeout() -> u64 {
    300
}

fn default_sos_interval() -> u64 {
    30
}

fn default_sos_agent() -> String {
    "emergency-ride-booker".to_string()
}

fn default_sos_timeout() -> u64 {
    180
}

fn default_agent_command() -> String {
    "agent-cli".to_string()
}

fn default_bridge_command() -> String {
    "wsl".to_string()
}

fn default_monitor_timeout() -> u64 {
    30
}

fn default_battery_critical() -> i32 {
    10
}

fn default_battery_low() -> i32 {
    20
}

fn default_stale_minutes() -> i64 {
    30
}

fn default_drain_rate() -> f64 {
    30.0
}

impl Default for TripsConfig {
    fn default() -> Self {
        Self {
            lead_hours: default_lead_hours(),
            interval_minutes: default_trip_interval(),
            agent: default_trip_agent(),
            timeout_secs: default_trip_timeout(),
        }
    }
}

impl Default for SosConfig {
    fn default() -> Self {
        Self {
            server_url: None,
            interval_secs: default_sos_interval(),
            agent: default_sos_agent(),
            timeout_secs: default_sos_timeout(),
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            command: default_agent_command(),
            working_dir: None,
            bridge: None,
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            api_url: None,
            timeout_secs: default_monitor_timeout(),
        }
    }
}

impl Default for EmergencyConfig {
    fn default() -> Self {
        Self {
            battery_critical: default_battery_critical(),
            battery_low: default_battery_low(),
            stale_minutes: default_stale_minutes(),
            drain_rate_per_hour: default_drain_rate(),
        }
    }
}

impl Config {
    /// Load configuration from `<dir>/config.toml`
    /// Returns default config if file doesn't exist
    pub fn load(dir: &Path) -> anyhow::Result<Self> {
        let config_path = dir.join("config.toml");

        if !config_path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|e| anyhow::anyhow!("Failed to read config: {}", e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config: {}", e))?;

        Ok(config)
    }

    /// Save configuration to `<dir>/config.toml`
    pub fn save(&self, dir: &Path) -> anyhow::Result<()> {
        let config_path = dir.join("config.toml");

        let content = toml::to_string_pretty(self)
            .map_err(|e| anyhow::anyhow!("Failed to serialize config: {}", e))?;

        fs::write(&config_path, content)
            .map_err(|e| anyhow::anyhow!("Failed to write config: {}", e))?;

        Ok(())
    }

    /// Initialize default config file if it doesn't exist
    pub fn init(dir: &Path) -> anyhow::Result<bool> {
        let config_path = dir.join("config.toml");

        if config_path.exists() {
            return Ok(false);
        }

        let config = Self::default();
        config.save(dir)?;
        Ok(true)
    }
}

/// Telegram configuration for fallback notifications
/// Stored in ~/.config/safewatch/telegram.toml (user's global config, not in repo)
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TelegramConfig {
    /// Bot token issued by BotFather
    #[serde(default)]
    pub bot_token: Option<String>,

    /// Destination chat ID
    #[serde(default)]
    pub chat_id: Option<String>,
}

impl TelegramConfig {
    /// Get the path to the global Telegram config file
    pub fn config_path() -> anyhow::Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        Ok(config_dir.join("safewatch").join("telegram.toml"))
    }

    /// Load Telegram configuration from ~/.config/safewatch/telegram.toml
    /// Returns default (empty) config if file doesn't exist
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|e| anyhow::anyhow!("Failed to read Telegram config: {}", e))?;

        let config: TelegramConfig = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse Telegram config: {}", e))?;

        Ok(config)
    }

    /// Save Telegram configuration to ~/.config/safewatch/telegram.toml
    pub fn save(&self) -> anyhow::Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| anyhow::anyhow!("Failed to create config directory: {}", e))?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| anyhow::anyhow!("Failed to serialize Telegram config: {}", e))?;

        fs::write(&config_path, content)
            .map_err(|e| anyhow::anyhow!("Failed to write Telegram config: {}", e))?;

        Ok(())
    }

    /// Check if the configuration has enough to send a message
    pub fn has_credentials(&self) -> bool {
        self.bot_token.is_some() && self.chat_id.is_some()
    }
}
