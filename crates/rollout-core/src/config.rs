use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ConfigError;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub responder: ResponderConfig,
    #[serde(default)]
    pub flags: FlagConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub traffic: TrafficConfig,
}

impl Config {
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.responder.validate()?;
        Ok(config)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponderConfig {
    /// Flag that selects the new API path
    #[serde(default = "default_flag_key")]
    pub flag_key: String,
    /// Variation served when the flag service cannot be reached
    #[serde(default)]
    pub default_variation: bool,
    /// Percentage of old-path requests that fail, in [0, 100]
    #[serde(default = "default_old_error_rate")]
    pub old_error_rate: f64,
    /// Percentage of new-path requests that fail, in [0, 100]
    #[serde(default = "default_new_error_rate")]
    pub new_error_rate: f64,
    /// Reply to failures with `{msg, error}` JSON instead of the bare marker
    #[serde(default = "default_true")]
    pub structured_errors: bool,
}

impl ResponderConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, rate) in [
            ("old_error_rate", self.old_error_rate),
            ("new_error_rate", self.new_error_rate),
        ] {
            if !(0.0..=100.0).contains(&rate) {
                return Err(ConfigError::ErrorRateOutOfRange { name, rate });
            }
        }
        if self.flag_key.trim().is_empty() {
            return Err(ConfigError::EmptyFlagKey);
        }
        Ok(())
    }
}

impl Default for ResponderConfig {
    fn default() -> Self {
        Self {
            flag_key: default_flag_key(),
            default_variation: false,
            old_error_rate: default_old_error_rate(),
            new_error_rate: default_new_error_rate(),
            structured_errors: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagMode {
    #[default]
    Static,
    Rollout,
    Remote,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlagConfig {
    #[serde(default)]
    pub mode: FlagMode,
    /// Value served in static mode
    #[serde(default)]
    pub static_value: bool,
    /// Share of keys bucketed onto the new path in rollout mode
    #[serde(default)]
    pub rollout_percent: u8,
    /// Base URL of the flag service in remote mode
    #[serde(default)]
    pub remote_url: Option<String>,
    /// Credential for the flag service (normally taken from FLAG_SDK_KEY)
    #[serde(default)]
    pub sdk_key: Option<String>,
    #[serde(default = "default_flag_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for FlagConfig {
    fn default() -> Self {
        Self {
            mode: FlagMode::Static,
            static_value: false,
            rollout_percent: 0,
            remote_url: None,
            sdk_key: None,
            timeout_ms: default_flag_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    /// `GET /<key>`
    #[default]
    Root,
    /// `GET /echo/<key>`
    Echo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrafficConfig {
    #[serde(default = "default_target_url")]
    pub target_url: String,
    #[serde(default)]
    pub route: Route,
    /// Delay between scheduled requests in milliseconds
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_print_every_ms")]
    pub print_every_ms: u64,
    /// Deterministic seed for request keys
    #[serde(default)]
    pub seed: Option<u64>,
    /// Per-request timeout; requests never time out when unset
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl Default for TrafficConfig {
    fn default() -> Self {
        Self {
            target_url: default_target_url(),
            route: Route::Root,
            interval_ms: default_interval_ms(),
            print_every_ms: default_print_every_ms(),
            seed: None,
            timeout_ms: None,
        }
    }
}

fn default_flag_key() -> String {
    "release-new-api".to_string()
}

fn default_old_error_rate() -> f64 {
    10.0
}

fn default_new_error_rate() -> f64 {
    30.0
}

fn default_true() -> bool {
    true
}

fn default_flag_timeout_ms() -> u64 {
    1000
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_target_url() -> String {
    "http://127.0.0.1:3000".to_string()
}

fn default_interval_ms() -> u64 {
    25
}

fn default_print_every_ms() -> u64 {
    1000
}
