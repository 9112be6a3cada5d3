// ── Raw transport events ──
//
// Events exactly as the platform bridge reports them, before any
// classification. Text can arrive in a `log`, `status`, or `data`
// carrier field; consumers must not depend on which one.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Error;

/// Bridge channel names.
pub mod channel {
    pub const STATUS: &str = "BlufiStatus";
    pub const LOG: &str = "BlufiLog";
    pub const DATA: &str = "BlufiData";
    pub const NETWORK_SCAN: &str = "BlufiDeviceScanResult";
    pub const DEVICE_FOUND: &str = "DeviceFound";
}

/// GATT connection state codes used by the bridge's `state` field.
const STATE_CONNECTED: i64 = 2;
const STATE_DISCONNECTED: i64 = 0;

/// A text-bearing message. Any subset of the carrier fields may be set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

/// One Wi-Fi network seen by the peer's scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanEntry {
    pub ssid: String,
    pub rssi: i16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawEvent {
    ConnectionState {
        connected: bool,
    },
    Message(PeerMessage),
    Discovery {
        address: String,
        name: Option<String>,
        rssi: i16,
    },
    NetworkScan(Vec<ScanEntry>),
}

impl RawEvent {
    pub fn log(text: impl Into<String>) -> Self {
        Self::Message(PeerMessage {
            log: Some(text.into()),
            ..PeerMessage::default()
        })
    }

    pub fn status(text: impl Into<String>) -> Self {
        Self::Message(PeerMessage {
            status: Some(text.into()),
            ..PeerMessage::default()
        })
    }

    pub fn data(text: impl Into<String>) -> Self {
        Self::Message(PeerMessage {
            data: Some(text.into()),
            ..PeerMessage::default()
        })
    }

    /// Decode a bridge emission (`channel` + JSON map) into raw events.
    ///
    /// Unknown channels decode to nothing. A status map carrying a numeric
    /// `state` becomes a connection-state event; other numeric fields are
    /// tolerated and ignored.
    pub fn from_bridge(channel: &str, payload: &Value) -> Result<Vec<Self>, Error> {
        let malformed = |message: &str| Error::MalformedEvent {
            channel: channel.to_owned(),
            message: message.to_owned(),
        };

        match channel {
            channel::STATUS => {
                let mut events = Vec::new();
                if let Some(text) = payload.get("status").and_then(Value::as_str) {
                    events.push(Self::status(text));
                }
                match payload.get("state").and_then(Value::as_i64) {
                    Some(STATE_CONNECTED) => events.push(Self::ConnectionState { connected: true }),
                    Some(STATE_DISCONNECTED) => {
                        events.push(Self::ConnectionState { connected: false });
                    }
                    _ => {}
                }
                Ok(events)
            }
            channel::LOG | channel::DATA => {
                if let Some(items) = payload.get("data").and_then(Value::as_array) {
                    // The network-scan channel is sometimes multiplexed onto DATA.
                    return Ok(vec![Self::NetworkScan(scan_entries(items))]);
                }
                let message: PeerMessage = serde_json::from_value(payload.clone())
                    .map_err(|e| malformed(&e.to_string()))?;
                if message == PeerMessage::default() {
                    return Ok(Vec::new());
                }
                Ok(vec![Self::Message(message)])
            }
            channel::NETWORK_SCAN => {
                let items = payload
                    .get("data")
                    .and_then(Value::as_array)
                    .ok_or_else(|| malformed("missing 'data' array"))?;
                Ok(vec![Self::NetworkScan(scan_entries(items))])
            }
            channel::DEVICE_FOUND => {
                let address = payload
                    .get("mac")
                    .or_else(|| payload.get("address"))
                    .and_then(Value::as_str)
                    .ok_or_else(|| malformed("missing device address"))?;
                let name = payload
                    .get("name")
                    .and_then(Value::as_str)
                    .filter(|n| !n.is_empty())
                    .map(str::to_owned);
                Ok(vec![Self::Discovery {
                    address: address.to_owned(),
                    name,
                    rssi: rssi_of(payload),
                }])
            }
            _ => Ok(Vec::new()),
        }
    }
}

fn scan_entries(items: &[Value]) -> Vec<ScanEntry> {
    items
        .iter()
        .filter_map(|item| {
            let ssid = item.get("ssid").and_then(Value::as_str)?;
            Some(ScanEntry {
                ssid: ssid.to_owned(),
                rssi: rssi_of(item),
            })
        })
        .collect()
}

fn rssi_of(value: &Value) -> i16 {
    value
        .get("rssi")
        .and_then(Value::as_i64)
        .and_then(|r| i16::try_from(r).ok())
        .unwrap_or(i16::MIN)
}
