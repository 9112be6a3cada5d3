// ── Core error types ──
//
// User-facing errors from blufi-core. Transport details never leak
// through directly: the `From<blufi_api::Error>` impl translates them
// into domain variants.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Transport ────────────────────────────────────────────────────
    #[error("{command} failed: {reason}")]
    TransportCommand { command: String, reason: String },

    #[error("Bluetooth adapter unavailable: {reason}")]
    AdapterUnavailable { reason: String },

    // ── Deadlines ────────────────────────────────────────────────────
    #[error("{stage} timed out after {timeout_secs}s")]
    Timeout { stage: String, timeout_secs: u64 },

    // ── Session ──────────────────────────────────────────────────────
    #[error("Provisioning cancelled")]
    Cancelled,

    #[error("Peer disconnected before confirmation")]
    LinkLost,

    #[error("Another provisioning operation is already in progress")]
    Busy,

    #[error("No device selected")]
    NoDeviceSelected,

    #[error("Device not found: {address}")]
    DeviceNotFound { address: String },

    // ── Input ────────────────────────────────────────────────────────
    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal ─────────────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub(crate) fn timeout(stage: &str, deadline: std::time::Duration) -> Self {
        Self::Timeout {
            stage: stage.into(),
            timeout_secs: deadline.as_secs(),
        }
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<blufi_api::Error> for CoreError {
    fn from(err: blufi_api::Error) -> Self {
        match err {
            blufi_api::Error::DeviceNotFound { address } => CoreError::DeviceNotFound { address },
            blufi_api::Error::AdapterUnavailable(reason) => CoreError::AdapterUnavailable { reason },
            blufi_api::Error::Rejected { command, reason } => {
                CoreError::TransportCommand { command, reason }
            }
            blufi_api::Error::NotConnected => CoreError::TransportCommand {
                command: "command".into(),
                reason: "no open connection to a peer".into(),
            },
            blufi_api::Error::MalformedEvent { channel, message } => {
                CoreError::Internal(format!("malformed event on {channel}: {message}"))
            }
        }
    }
}
