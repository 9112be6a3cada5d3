use serde::Serialize;
use strum::Display;

use super::device::{DiscoveredDevice, WifiNetwork};

/// A normalized transport event. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    ConnectionChanged { connected: bool },
    LogLine { text: String },
    StatusReport { text: String },
    ScanResult { networks: Vec<WifiNetwork> },
    DeviceDiscovered { device: DiscoveredDevice },
}

impl DomainEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::ConnectionChanged { .. } => EventKind::Connection,
            Self::LogLine { .. } => EventKind::Log,
            Self::StatusReport { .. } => EventKind::Status,
            Self::ScanResult { .. } => EventKind::Scan,
            Self::DeviceDiscovered { .. } => EventKind::Discovery,
        }
    }

    /// Human-readable text, if the event carries any.
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::LogLine { text } | Self::StatusReport { text } => Some(text),
            _ => None,
        }
    }
}

/// Subscription filter granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "snake_case")]
pub enum EventKind {
    Connection,
    Log,
    Status,
    Scan,
    Discovery,
}

impl EventKind {
    pub const ALL: &'static [EventKind] = &[
        Self::Connection,
        Self::Log,
        Self::Status,
        Self::Scan,
        Self::Discovery,
    ];

    /// Kinds that can carry a status-matcher signal.
    pub const SIGNALS: &'static [EventKind] = &[Self::Connection, Self::Log, Self::Status];
}
