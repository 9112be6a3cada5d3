use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::Display;

// ── Phase ────────────────────────────────────────────────────────

/// Where a provisioning attempt currently stands.
///
/// `Succeeded`, `Failed` and `Cancelled` are absorbing: once entered, the
/// session never transitions again.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", content = "reason", rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Idle,
    Connecting,
    Negotiating,
    ConfiguringNetwork,
    ConfiguringBroker,
    AwaitingConfirmation,
    Succeeded,
    Failed(String),
    Cancelled,
}

impl Phase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed(_) | Self::Cancelled)
    }

    /// Whether an attempt is underway.
    pub fn is_active(&self) -> bool {
        !self.is_terminal() && *self != Self::Idle
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("Idle"),
            Self::Connecting => f.write_str("Connecting"),
            Self::Negotiating => f.write_str("Negotiating security"),
            Self::ConfiguringNetwork => f.write_str("Configuring network"),
            Self::ConfiguringBroker => f.write_str("Configuring broker"),
            Self::AwaitingConfirmation => f.write_str("Awaiting confirmation"),
            Self::Succeeded => f.write_str("Succeeded"),
            Self::Failed(reason) => write!(f, "Failed: {reason}"),
            Self::Cancelled => f.write_str("Cancelled"),
        }
    }
}

// ── Log entries ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// Who produced a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LogSource {
    Orchestrator,
    Peer,
}

/// One line of the presentation-facing progress log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Monotonic within a session.
    pub seq: u64,
    pub at: DateTime<Utc>,
    pub level: LogLevel,
    pub source: LogSource,
    pub message: String,
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.at.format("%H:%M:%S"), self.message)
    }
}
