// ── Peer commands ──
//
// Everything the host can ask of a Blufi peer. Commands carry no reply
// channel: acceptance is synchronous, any outcome arrives later as a
// `RawEvent` on the transport's event stream.

use std::fmt;

use secrecy::SecretString;
use strum::EnumDiscriminants;

/// Keys for opaque custom-data writes (`"<code>:<value>"` on the wire).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigKey {
    BrokerHost,
    BrokerPort,
    /// Commits pending configuration; the peer reboots afterwards.
    Apply,
    /// Asks the peer to echo its identifier and current link status.
    StatusProbe,
}

impl ConfigKey {
    pub const fn code(self) -> u8 {
        match self {
            Self::BrokerHost => 1,
            Self::BrokerPort => 2,
            Self::Apply => 8,
            Self::StatusProbe => 12,
        }
    }

    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::BrokerHost),
            2 => Some(Self::BrokerPort),
            8 => Some(Self::Apply),
            12 => Some(Self::StatusProbe),
            _ => None,
        }
    }
}

/// Peer operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OpMode {
    Null,
    #[default]
    Station,
    SoftAp,
    StationSoftAp,
}

impl OpMode {
    pub const fn code(self) -> u8 {
        match self {
            Self::Null => 0,
            Self::Station => 1,
            Self::SoftAp => 2,
            Self::StationSoftAp => 3,
        }
    }
}

/// A single command for the transport.
///
/// `Debug` never exposes the network secret.
#[derive(Debug, Clone, EnumDiscriminants)]
#[strum_discriminants(name(CommandKind), derive(Hash))]
#[non_exhaustive]
pub enum Command {
    /// Open a client to `address`, tearing down any previous client.
    Connect { address: String },
    Disconnect,
    NegotiateSecurity,
    ConfigureNetwork { ssid: String, secret: SecretString },
    PostCustomData { key: ConfigKey, value: String },
    RequestStatus,
    RequestVersion,
    SetOpMode(OpMode),
    StartDiscovery,
    StopDiscovery,
    RequestWifiScan,
}

impl Command {
    /// Status probe write (`12:`).
    pub fn status_probe() -> Self {
        Self::PostCustomData {
            key: ConfigKey::StatusProbe,
            value: String::new(),
        }
    }

    pub fn kind(&self) -> CommandKind {
        CommandKind::from(self)
    }

    /// The opaque custom-data string, for `PostCustomData` only.
    pub fn payload(&self) -> Option<String> {
        match self {
            Self::PostCustomData { key, value } => Some(format!("{}:{value}", key.code())),
            _ => None,
        }
    }

    /// Whether the command needs an open client.
    pub fn requires_link(&self) -> bool {
        !matches!(
            self,
            Self::Connect { .. } | Self::Disconnect | Self::StartDiscovery | Self::StopDiscovery
        )
    }
}

impl CommandKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Disconnect => "disconnect",
            Self::NegotiateSecurity => "negotiate_security",
            Self::ConfigureNetwork => "configure_network",
            Self::PostCustomData => "post_custom_data",
            Self::RequestStatus => "request_status",
            Self::RequestVersion => "request_version",
            Self::SetOpMode => "set_op_mode",
            Self::StartDiscovery => "start_discovery",
            Self::StopDiscovery => "stop_discovery",
            Self::RequestWifiScan => "request_wifi_scan",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = self.kind();
        match self {
            Self::Connect { address } => write!(f, "{kind} {address}"),
            Self::ConfigureNetwork { ssid, .. } => write!(f, "{kind} ssid={ssid}"),
            Self::PostCustomData { .. } => {
                write!(f, "{kind} {}", self.payload().unwrap_or_default())
            }
            Self::SetOpMode(mode) => write!(f, "{kind} {}", mode.code()),
            _ => write!(f, "{kind}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn custom_data_payload_uses_numeric_key() {
        let cmd = Command::PostCustomData {
            key: ConfigKey::BrokerHost,
            value: "10.0.0.7".into(),
        };
        assert_eq!(cmd.payload().as_deref(), Some("1:10.0.0.7"));
        assert_eq!(Command::status_probe().payload().as_deref(), Some("12:"));
        assert_eq!(Command::RequestStatus.payload(), None);
    }

    #[test]
    fn config_key_codes_round_trip() {
        for key in [
            ConfigKey::BrokerHost,
            ConfigKey::BrokerPort,
            ConfigKey::Apply,
            ConfigKey::StatusProbe,
        ] {
            assert_eq!(ConfigKey::from_code(key.code()), Some(key));
        }
        assert_eq!(ConfigKey::from_code(3), None);
    }

    #[test]
    fn display_and_debug_hide_the_secret() {
        let cmd = Command::ConfigureNetwork {
            ssid: "HomeNet".into(),
            secret: SecretString::from("hunter22"),
        };
        assert_eq!(cmd.to_string(), "configure_network ssid=HomeNet");
        assert!(!format!("{cmd:?}").contains("hunter22"));
    }

    #[test]
    fn link_requirements() {
        assert!(!Command::Connect { address: "aa".into() }.requires_link());
        assert!(!Command::StartDiscovery.requires_link());
        assert!(Command::NegotiateSecurity.requires_link());
        assert!(Command::status_probe().requires_link());
    }
}
