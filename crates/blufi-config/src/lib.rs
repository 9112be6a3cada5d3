//! Shared configuration for blufi tools.
//!
//! TOML profiles, secret resolution (env + keyring + plaintext), and
//! translation to `blufi_core::ProvisionerConfig` and
//! `blufi_core::ProvisioningRequest`. The CLI layers its flags on top.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use blufi_core::{ProvisionerConfig, ProvisioningRequest, Timings};

const KEYRING_SERVICE: &str = "blufi";
const DEFAULT_BROKER_PORT: u16 = 1883;

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no network secret configured for profile '{profile}'")]
    NoSecret { profile: String },

    #[error("keyring error: {0}")]
    Keyring(String),

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Default profile name.
    pub default_profile: Option<String>,

    #[serde(default)]
    pub defaults: Defaults,

    /// Named provisioning profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}

/// A named provisioning profile: the network and broker a device should
/// end up on.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct Profile {
    /// Target Wi-Fi network.
    pub ssid: Option<String>,

    /// Network secret (plaintext; prefer keyring or env var).
    pub secret: Option<String>,

    /// Environment variable name containing the network secret.
    pub secret_env: Option<String>,

    /// MQTT broker host. Broker settings are skipped when unset.
    pub broker_host: Option<String>,

    /// MQTT broker port (default 1883).
    pub broker_port: Option<u16>,

    /// Whether to attempt security negotiation (default true).
    pub negotiate_security: Option<bool>,

    /// Per-profile deadline overrides, in milliseconds.
    #[serde(default, skip_serializing_if = "TimingOverrides::is_empty")]
    pub timings: TimingOverrides,
}

/// Optional overrides for `blufi_core::Timings`.
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct TimingOverrides {
    pub connect_timeout_ms: Option<u64>,
    pub negotiate_timeout_ms: Option<u64>,
    pub command_pacing_ms: Option<u64>,
    pub confirm_deadline_ms: Option<u64>,
    pub confirm_interval_ms: Option<u64>,
    pub release_timeout_ms: Option<u64>,
    pub scan_timeout_ms: Option<u64>,
}

impl TimingOverrides {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Apply the overrides on top of `timings`.
    pub fn apply(&self, timings: &mut Timings) {
        let slots = [
            (self.connect_timeout_ms, &mut timings.connect_timeout),
            (self.negotiate_timeout_ms, &mut timings.negotiate_timeout),
            (self.command_pacing_ms, &mut timings.command_pacing),
            (self.confirm_deadline_ms, &mut timings.confirm_deadline),
            (self.confirm_interval_ms, &mut timings.confirm_interval),
            (self.release_timeout_ms, &mut timings.release_timeout),
            (self.scan_timeout_ms, &mut timings.scan_timeout),
        ];
        for (ms, slot) in slots {
            if let Some(ms) = ms {
                *slot = Duration::from_millis(ms);
            }
        }
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "blufi", "blufi").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("blufi");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_at(&config_path())
}

/// Load from `path` + `BLUFI_*` environment. Nested keys use `__`
/// (`BLUFI_DEFAULTS__OUTPUT=json`).
pub fn load_config_at(path: &Path) -> Result<Config, ConfigError> {
    load_config_from(
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("BLUFI_").split("__")),
    )
}

/// Extract a Config from arbitrary providers layered over the defaults.
pub fn load_config_from(providers: Figment) -> Result<Config, ConfigError> {
    let config: Config = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(providers)
        .extract()?;
    Ok(config)
}

/// Load config, returning a default if the file doesn't exist.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Secret resolution ───────────────────────────────────────────────

fn keyring_entry(profile_name: &str) -> Result<keyring::Entry, ConfigError> {
    keyring::Entry::new(KEYRING_SERVICE, &format!("{profile_name}/wifi-secret"))
        .map_err(|e| ConfigError::Keyring(e.to_string()))
}

/// Resolve the network secret: profile's env var, then keyring, then
/// plaintext in the config.
pub fn resolve_secret(profile: &Profile, profile_name: &str) -> Result<SecretString, ConfigError> {
    // 1. Profile's secret_env → env var lookup
    if let Some(ref env_name) = profile.secret_env {
        if let Ok(val) = std::env::var(env_name) {
            return Ok(SecretString::from(val));
        }
    }

    // 2. System keyring
    if let Ok(entry) = keyring_entry(profile_name) {
        if let Ok(secret) = entry.get_password() {
            return Ok(SecretString::from(secret));
        }
    }

    // 3. Plaintext in config
    if let Some(ref secret) = profile.secret {
        return Ok(SecretString::from(secret.clone()));
    }

    Err(ConfigError::NoSecret {
        profile: profile_name.into(),
    })
}

/// Store the network secret for `profile_name` in the system keyring.
pub fn store_secret(profile_name: &str, secret: &SecretString) -> Result<(), ConfigError> {
    keyring_entry(profile_name)?
        .set_password(secret.expose_secret())
        .map_err(|e| ConfigError::Keyring(e.to_string()))
}

// ── Translation to core types ───────────────────────────────────────

/// Build a `ProvisioningRequest` from a profile.
pub fn profile_to_request(
    profile: &Profile,
    profile_name: &str,
) -> Result<ProvisioningRequest, ConfigError> {
    let ssid = profile.ssid.clone().ok_or_else(|| ConfigError::Validation {
        field: "ssid".into(),
        reason: format!("not set in profile '{profile_name}'"),
    })?;
    let secret = resolve_secret(profile, profile_name)?;

    let mut request = ProvisioningRequest {
        ssid,
        secret,
        broker: None,
    };
    if let Some(ref host) = profile.broker_host {
        request = request.with_broker(host.clone(), profile.broker_port.unwrap_or(DEFAULT_BROKER_PORT));
    } else if profile.broker_port.is_some() {
        return Err(ConfigError::Validation {
            field: "broker_port".into(),
            reason: "set without broker_host".into(),
        });
    }
    Ok(request)
}

/// Build a `ProvisionerConfig`, applying the profile's overrides if given.
pub fn provisioner_config(profile: Option<&Profile>) -> ProvisionerConfig {
    let mut config = ProvisionerConfig::default();
    if let Some(profile) = profile {
        if let Some(negotiate) = profile.negotiate_security {
            config.negotiate_security = negotiate;
        }
        profile.timings.apply(&mut config.timings);
    }
    config
}
