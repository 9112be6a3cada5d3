// ── Discovery catalog ──
//
// Devices found by discovery and networks reported by the peer's scan.
// Both lists are deduplicated and kept in descending signal order.

use std::cmp::Ordering;
use std::sync::Arc;

use tokio::sync::watch;

use super::collection::SortedCollection;
use crate::model::{DiscoveredDevice, WifiNetwork};

pub struct Catalog {
    devices: SortedCollection<DiscoveredDevice>,
    networks: SortedCollection<WifiNetwork>,
}

fn device_order(a: &DiscoveredDevice, b: &DiscoveredDevice) -> Ordering {
    b.rssi.cmp(&a.rssi).then_with(|| a.address.cmp(&b.address))
}

fn network_order(a: &WifiNetwork, b: &WifiNetwork) -> Ordering {
    b.rssi.cmp(&a.rssi).then_with(|| a.ssid.cmp(&b.ssid))
}

impl Catalog {
    pub(crate) fn new() -> Self {
        Self {
            devices: SortedCollection::new(device_order),
            networks: SortedCollection::new(network_order),
        }
    }

    // ── Devices ──────────────────────────────────────────────────

    /// Record an advertisement. Later advertisements refresh name and signal.
    pub(crate) fn record_device(&self, device: DiscoveredDevice) -> bool {
        let key = device.address.to_lowercase();
        self.devices.merge(key, device, |old, new| old != new)
    }

    pub(crate) fn clear_devices(&self) {
        self.devices.clear();
    }

    pub fn devices(&self) -> Arc<Vec<Arc<DiscoveredDevice>>> {
        self.devices.snapshot()
    }

    pub fn subscribe_devices(&self) -> watch::Receiver<Arc<Vec<Arc<DiscoveredDevice>>>> {
        self.devices.subscribe()
    }

    /// Look up a device by address, ignoring case.
    pub fn device(&self, address: &str) -> Option<Arc<DiscoveredDevice>> {
        self.devices.get(&address.to_lowercase())
    }

    /// Devices whose name or address contains `query`, in signal order.
    pub fn filter_devices(&self, query: &str) -> Vec<Arc<DiscoveredDevice>> {
        self.devices()
            .iter()
            .filter(|d| d.matches(query))
            .cloned()
            .collect()
    }

    // ── Networks ─────────────────────────────────────────────────

    /// Merge one scan burst. Duplicate SSIDs keep their strongest reading;
    /// hidden (empty) SSIDs are dropped.
    pub(crate) fn ingest_networks(&self, batch: &[WifiNetwork]) {
        for network in batch {
            if network.ssid.is_empty() {
                continue;
            }
            self.networks
                .merge(network.ssid.clone(), network.clone(), |old, new| new.rssi > old.rssi);
        }
    }

    pub(crate) fn clear_networks(&self) {
        self.networks.clear();
    }

    pub fn networks(&self) -> Arc<Vec<Arc<WifiNetwork>>> {
        self.networks.snapshot()
    }

    pub fn subscribe_networks(&self) -> watch::Receiver<Arc<Vec<Arc<WifiNetwork>>>> {
        self.networks.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn net(ssid: &str, rssi: i16) -> WifiNetwork {
        WifiNetwork {
            ssid: ssid.into(),
            rssi,
        }
    }

    fn ssids(catalog: &Catalog) -> Vec<(String, i16)> {
        catalog
            .networks()
            .iter()
            .map(|n| (n.ssid.clone(), n.rssi))
            .collect()
    }

    #[test]
    fn networks_are_unique_and_sorted_regardless_of_input_order() {
        let catalog = Catalog::new();
        catalog.ingest_networks(&[
            net("Cafe", -80),
            net("HomeNet", -60),
            net("Cafe", -50),
            net("", -20),
            net("Office", -70),
            net("HomeNet", -65),
        ]);

        assert_eq!(
            ssids(&catalog),
            vec![
                ("Cafe".to_owned(), -50),
                ("HomeNet".to_owned(), -60),
                ("Office".to_owned(), -70),
            ]
        );
    }

    #[test]
    fn later_bursts_merge_into_the_same_list() {
        let catalog = Catalog::new();
        catalog.ingest_networks(&[net("A", -70)]);
        catalog.ingest_networks(&[net("B", -40), net("A", -90)]);
        assert_eq!(
            ssids(&catalog),
            vec![("B".to_owned(), -40), ("A".to_owned(), -70)]
        );

        catalog.clear_networks();
        assert!(catalog.networks().is_empty());
    }

    #[test]
    fn devices_dedupe_by_address_ignoring_case() {
        let catalog = Catalog::new();
        let device = |address: &str, rssi| DiscoveredDevice {
            address: address.into(),
            name: Some("BLUFI_DEVICE".into()),
            rssi,
        };
        assert!(catalog.record_device(device("24:0A:C4:00:00:01", -70)));
        assert!(catalog.record_device(device("24:0A:C4:00:00:02", -50)));
        assert!(catalog.record_device(device("24:0a:c4:00:00:01", -45)));
        assert!(!catalog.record_device(device("24:0a:c4:00:00:01", -45)));

        let order: Vec<_> = catalog.devices().iter().map(|d| d.rssi).collect();
        assert_eq!(order, vec![-45, -50]);
        assert!(catalog.device("24:0A:C4:00:00:02").is_some());
        assert_eq!(catalog.filter_devices("00:02").len(), 1);
    }
}
