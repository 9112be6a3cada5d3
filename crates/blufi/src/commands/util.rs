//! Shared helpers for command handlers.

use std::io::IsTerminal;
use std::sync::Arc;

use blufi_api::{Negotiation, PeerProfile, ScanEntry, SimulatedPeer, Transport};
use blufi_core::{DiscoveredDevice, Provisioner};

use crate::cli::{DeviceArgs, SimNegotiation, SimOpts};
use crate::error::CliError;

/// Networks every simulated device reports when scanning.
const SIM_NETWORKS: &[(&str, i16)] = &[
    ("HomeNet", -48),
    ("HomeNet-5G", -57),
    ("Workshop", -66),
    ("Guest", -71),
];

/// Build the transport for this invocation.
///
/// Only the simulated bridge ships with the CLI; without `--simulate`
/// there is nothing to talk to.
pub fn transport(sim: &SimOpts) -> Result<Arc<dyn Transport>, CliError> {
    if !sim.simulate {
        return Err(CliError::AdapterUnavailable {
            reason: "no radio bridge is compiled into this build".into(),
        });
    }
    let peers = (1..=sim.sim_devices).map(|n| sim_peer(sim, n)).collect();
    let transport: Arc<dyn Transport> = Arc::new(SimulatedPeer::new(peers));
    Ok(transport)
}

fn sim_peer(sim: &SimOpts, n: u8) -> PeerProfile {
    let negotiation = match sim.sim_negotiation {
        SimNegotiation::Succeed => Negotiation::Succeed,
        SimNegotiation::Fail => Negotiation::Fail(-1),
        SimNegotiation::Silent => Negotiation::Silent,
    };
    PeerProfile {
        name: Some(format!("BLUFI_DEVICE_{n}")),
        rssi: -45 - 7 * i16::from(n),
        uid: Some(sim.sim_uid.clone()).filter(|uid| !uid.is_empty()),
        reachable: !sim.sim_unreachable,
        negotiation,
        joins_network: !sim.sim_no_join,
        networks: SIM_NETWORKS
            .iter()
            .map(|&(ssid, rssi)| ScanEntry {
                ssid: ssid.into(),
                rssi,
            })
            .collect(),
        ..PeerProfile::new(sim_address(n))
    }
}

/// Address of the n-th simulated device, counting from 1.
pub fn sim_address(n: u8) -> String {
    format!("24:0A:C4:00:00:{n:02X}")
}

/// Discover until `target.device` shows up, then select it.
pub async fn find_device(
    provisioner: &Provisioner,
    target: &DeviceArgs,
) -> Result<DiscoveredDevice, CliError> {
    let mut devices = provisioner.device_stream();
    provisioner.start_discovery()?;

    let address = target.device.as_str();
    let seen = devices.wait_for(|list| {
        list.iter()
            .any(|d| d.address.eq_ignore_ascii_case(address))
    });
    let found = tokio::time::timeout(target.discover_timeout, seen)
        .await
        .is_ok_and(|snapshot| snapshot.is_some());

    if !found {
        if let Err(e) = provisioner.stop_discovery() {
            tracing::warn!(error = %e, "could not stop discovery");
        }
        return Err(CliError::DeviceNotFound {
            address: address.into(),
        });
    }
    Ok(provisioner.select_device(address)?)
}

/// Prompt for confirmation. `--yes` or a non-interactive stdin approves.
pub fn confirm(message: &str, yes_flag: bool) -> Result<bool, CliError> {
    if yes_flag || !std::io::stdin().is_terminal() {
        return Ok(true);
    }
    dialoguer::Confirm::new()
        .with_prompt(message)
        .default(true)
        .interact()
        .map_err(|e| CliError::Io(std::io::Error::other(e)))
}
