use thiserror::Error;

/// Top-level error type for the `blufi-api` crate.
///
/// Every command is fire-and-forget, so these only describe failures the
/// transport can detect synchronously while accepting a command.
/// `blufi-core` maps them into user-facing diagnostics.
#[derive(Debug, Error)]
pub enum Error {
    // ── Link ────────────────────────────────────────────────────────
    /// A peer command was issued without an open client.
    #[error("No open connection to a peer")]
    NotConnected,

    /// The address given to `connect` is unknown to the adapter.
    #[error("Device not found: {address}")]
    DeviceNotFound { address: String },

    /// The radio adapter is missing, disabled, or lacks permission.
    #[error("Bluetooth adapter unavailable: {0}")]
    AdapterUnavailable(String),

    // ── Commands ────────────────────────────────────────────────────
    /// The transport refused the command outright.
    #[error("{command} rejected: {reason}")]
    Rejected { command: String, reason: String },

    // ── Bridge ──────────────────────────────────────────────────────
    /// A bridge payload could not be decoded into a raw event.
    #[error("Malformed bridge event on '{channel}': {message}")]
    MalformedEvent { channel: String, message: String },
}

impl Error {
    /// Whether the failure indicates the link itself is gone.
    pub fn is_link_loss(&self) -> bool {
        matches!(self, Self::NotConnected | Self::AdapterUnavailable(_))
    }
}
