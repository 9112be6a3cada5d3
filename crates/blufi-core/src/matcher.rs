// ── Status matcher ──
//
// Classifies peer log and status text into domain signals, and extracts
// the device identifier. Pure functions over a fixed rule table; the
// carrier field a string arrived in never matters.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::Serialize;

/// A progress signal inferred from peer text or link state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "signal", rename_all = "snake_case")]
pub enum Signal {
    Connected,
    Disconnected,
    SecurityOk,
    SecurityFailed { code: i32 },
    ParamsResult { code: i32 },
    WifiJoined,
    /// Station reports an idle/settled connection state.
    PeerIdle,
    DeviceStatus { code: i32 },
    VersionReported,
    PeerError { code: i32 },
}

impl Signal {
    /// Signals that confirm the peer applied its configuration.
    pub fn confirms_provisioning(self) -> bool {
        matches!(self, Self::WifiJoined | Self::PeerIdle | Self::Disconnected)
    }
}

/// Result of classifying one piece of text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classification {
    pub signal: Option<Signal>,
    pub uid: Option<String>,
}

// ── Rule table ───────────────────────────────────────────────────

struct Rule {
    name: &'static str,
    pattern: Regex,
    build: fn(&Captures<'_>) -> Signal,
}

impl Rule {
    fn new(name: &'static str, pattern: &str, build: fn(&Captures<'_>) -> Signal) -> Self {
        Self {
            name,
            // Patterns are literals below; a bad one is a programming error.
            pattern: Regex::new(pattern).unwrap_or_else(|e| panic!("rule {name}: {e}")),
            build,
        }
    }
}

fn code(caps: &Captures<'_>) -> i32 {
    caps.get(1)
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(i32::MIN)
}

// Ordered most-specific first: "Disconnected" and "Connected to Wi-Fi"
// both contain "Connected".
static RULES: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    vec![
        Rule::new("disconnected", r"\bDisconnected\b", |_| Signal::Disconnected),
        Rule::new("wifi-joined", r"(?i)\bconnected to wi-?fi\b", |_| {
            Signal::WifiJoined
        }),
        Rule::new("peer-idle", r"\bState: 0\b", |_| Signal::PeerIdle),
        Rule::new(
            "security",
            r"Security (?:Negotiation )?Result:\s*(-?\d+)",
            |caps| match code(caps) {
                0 => Signal::SecurityOk,
                code => Signal::SecurityFailed { code },
            },
        ),
        Rule::new("params", r"Configure Params(?: Result)?:\s*(-?\d+)", |caps| {
            Signal::ParamsResult { code: code(caps) }
        }),
        Rule::new("peer-error", r"^Error:\s*(-?\d+)", |caps| Signal::PeerError {
            code: code(caps),
        }),
        Rule::new("connected", r"\bConnected\b", |_| Signal::Connected),
        Rule::new("device-status", r"Device Status:\s*(-?\d+)", |caps| {
            Signal::DeviceStatus { code: code(caps) }
        }),
        Rule::new("version", r"(?:Version Response|Device Version):", |_| {
            Signal::VersionReported
        }),
    ]
});

/// UID markers in precedence order.
const UID_MARKERS: [&str; 3] = [
    "Received Custom Data: 12:",
    "Version Response:",
    "Device Version:",
];

const MIN_UID_DIGITS: usize = 10;

// ── Public API ───────────────────────────────────────────────────

/// Classify a piece of peer text.
pub fn classify(text: &str) -> Classification {
    Classification {
        signal: signal_of(text),
        uid: extract_uid(text),
    }
}

/// First matching rule wins.
pub fn signal_of(text: &str) -> Option<Signal> {
    let text = text.trim();
    RULES
        .iter()
        .find_map(|rule| rule.pattern.captures(text).map(|caps| (rule.build)(&caps)))
}

/// Extract a device identifier.
///
/// The first marker present decides; the remainder after it must be ten or
/// more decimal digits, otherwise nothing is extracted.
pub fn extract_uid(text: &str) -> Option<String> {
    let (marker, pos) = UID_MARKERS
        .iter()
        .find_map(|m| text.find(m).map(|pos| (*m, pos)))?;
    let token = text[pos + marker.len()..].trim();
    let valid = token.len() >= MIN_UID_DIGITS && token.bytes().all(|b| b.is_ascii_digit());
    valid.then(|| token.to_owned())
}

/// Rule names in evaluation order.
pub fn rule_names() -> Vec<&'static str> {
    RULES.iter().map(|r| r.name).collect()
}
