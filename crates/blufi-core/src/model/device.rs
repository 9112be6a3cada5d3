use serde::{Deserialize, Serialize};

/// A provisionable peer seen during discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredDevice {
    pub address: String,
    pub name: Option<String>,
    /// Signal strength in dBm.
    pub rssi: i16,
}

impl DiscoveredDevice {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("Unknown Device")
    }

    /// Case-insensitive substring match on name or address.
    pub fn matches(&self, query: &str) -> bool {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return true;
        }
        self.address.to_lowercase().contains(&query)
            || self
                .name
                .as_deref()
                .is_some_and(|n| n.to_lowercase().contains(&query))
    }
}

/// A Wi-Fi network reported by the peer's scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WifiNetwork {
    pub ssid: String,
    pub rssi: i16,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_name_or_address_ignoring_case() {
        let device = DiscoveredDevice {
            address: "24:0A:C4:12:34:56".into(),
            name: Some("Sensor-9876543210".into()),
            rssi: -60,
        };
        assert!(device.matches("c4:12"));
        assert!(device.matches("SENSOR"));
        assert!(device.matches("98765"));
        assert!(device.matches("  "));
        assert!(!device.matches("thermostat"));
    }

    #[test]
    fn unnamed_devices_get_a_placeholder() {
        let device = DiscoveredDevice {
            address: "aa".into(),
            name: None,
            rssi: -90,
        };
        assert_eq!(device.display_name(), "Unknown Device");
        assert!(!device.matches("unknown"));
    }
}
