//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` variants into user-facing errors
//! with actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use blufi_config::ConfigError;
use blufi_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const NOT_FOUND: i32 = 4;
    pub const CONFLICT: i32 = 6;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
    pub const CANCELLED: i32 = 130;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Adapter ──────────────────────────────────────────────────────
    #[error("Bluetooth adapter unavailable: {reason}")]
    #[diagnostic(
        code(blufi::adapter_unavailable),
        help(
            "No radio bridge is available on this host.\n\
             Try a dry run against simulated devices: blufi --simulate discover"
        )
    )]
    AdapterUnavailable { reason: String },

    #[error("{command} failed: {reason}")]
    #[diagnostic(code(blufi::transport))]
    Transport { command: String, reason: String },

    // ── Devices ──────────────────────────────────────────────────────
    #[error("Device '{address}' not found")]
    #[diagnostic(
        code(blufi::not_found),
        help("Run: blufi discover to see devices in range")
    )]
    DeviceNotFound { address: String },

    #[error("Another provisioning operation is already running")]
    #[diagnostic(code(blufi::busy))]
    Busy,

    // ── Provisioning outcome ─────────────────────────────────────────
    #[error("Provisioning failed: {reason}")]
    #[diagnostic(
        code(blufi::provisioning_failed),
        help("Move closer to the device, check the Wi-Fi secret, and retry. Use -vv for a trace.")
    )]
    ProvisioningFailed { reason: String },

    #[error("{stage} timed out after {seconds}s")]
    #[diagnostic(code(blufi::timeout))]
    Timeout { stage: String, seconds: u64 },

    #[error("Cancelled")]
    #[diagnostic(code(blufi::cancelled))]
    Cancelled,

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(blufi::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(blufi::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: blufi config init"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error("No Wi-Fi secret configured for profile '{profile}'")]
    #[diagnostic(
        code(blufi::no_secret),
        help(
            "Store one with: blufi config set-secret --profile {profile}\n\
             Or pass --secret-env NAME_OF_ENV_VAR."
        )
    )]
    NoSecret { profile: String },

    #[error(transparent)]
    #[diagnostic(code(blufi::config))]
    Config(Box<ConfigError>),

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Failed to render output: {0}")]
    #[diagnostic(code(blufi::render))]
    Render(String),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::AdapterUnavailable { .. } | Self::Transport { .. } => exit_code::CONNECTION,
            Self::DeviceNotFound { .. } | Self::ProfileNotFound { .. } => exit_code::NOT_FOUND,
            Self::Busy => exit_code::CONFLICT,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::ProvisioningFailed { reason } if reason.ends_with("timeout") => {
                exit_code::TIMEOUT
            }
            Self::Cancelled => exit_code::CANCELLED,
            Self::Validation { .. } | Self::NoSecret { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::TransportCommand { command, reason } => CliError::Transport { command, reason },
            CoreError::AdapterUnavailable { reason } => CliError::AdapterUnavailable { reason },
            CoreError::Timeout {
                stage,
                timeout_secs,
            } => CliError::Timeout {
                stage,
                seconds: timeout_secs,
            },
            CoreError::Cancelled => CliError::Cancelled,
            CoreError::Busy => CliError::Busy,
            CoreError::NoDeviceSelected => CliError::Validation {
                field: "device".into(),
                reason: "no device selected".into(),
            },
            CoreError::DeviceNotFound { address } => CliError::DeviceNotFound { address },
            CoreError::ValidationFailed { message } => CliError::Validation {
                field: "input".into(),
                reason: message,
            },
            other @ (CoreError::LinkLost | CoreError::Config { .. } | CoreError::Internal(_)) => {
                CliError::ProvisioningFailed {
                    reason: other.to_string(),
                }
            }
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::NoSecret { profile } => CliError::NoSecret { profile },
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            other => CliError::Config(Box::new(other)),
        }
    }
}
