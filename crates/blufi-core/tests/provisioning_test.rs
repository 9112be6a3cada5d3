#![allow(clippy::unwrap_used)]
// End-to-end provisioning sessions against a `SimulatedPeer`, on virtual time.

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;

use tokio::time::Instant;

use blufi_api::{Command, CommandKind, PeerProfile, RawEvent, ScanEntry, SimulatedPeer};
use blufi_core::{
    EventKind, LogLevel, Phase, Provisioner, ProvisionerConfig, ProvisioningRequest, Timings,
};

const ADDRESS: &str = "24:0A:C4:12:34:56";

// ── Helpers ─────────────────────────────────────────────────────────

/// A provisioner over `sim` with `ADDRESS` discovered and selected.
async fn setup(sim: &SimulatedPeer) -> Provisioner {
    let provisioner = Provisioner::new(ProvisionerConfig::default(), Arc::new(sim.clone()));
    provisioner.start_discovery().unwrap();

    let mut devices = provisioner.device_stream();
    sim.inject(RawEvent::Discovery {
        address: ADDRESS.into(),
        name: Some("BLUFI_DEVICE".into()),
        rssi: -48,
    });
    devices.wait_for(|d| !d.is_empty()).await.unwrap();
    provisioner.select_device(ADDRESS).unwrap();
    provisioner
}

fn request() -> ProvisioningRequest {
    ProvisioningRequest::new("HomeNet", "hunter22").with_broker("broker.local", 1883)
}

async fn reach(provisioner: &Provisioner, phase: Phase) {
    provisioner
        .watch_phase()
        .wait_for(|p| *p == phase)
        .await
        .unwrap();
}

fn messages(provisioner: &Provisioner) -> Vec<String> {
    provisioner.log().iter().map(|e| e.message.clone()).collect()
}

/// When the first command matching `pick` went out.
fn issued(sim: &SimulatedPeer, pick: impl Fn(&Command) -> bool) -> Instant {
    sim.timeline()
        .into_iter()
        .find(|(_, c)| pick(c))
        .map(|(at, _)| at)
        .unwrap()
}

fn issued_kind(sim: &SimulatedPeer, kind: CommandKind) -> Instant {
    issued(sim, |c| c.kind() == kind)
}

fn issued_payload(sim: &SimulatedPeer, payload: &str) -> Instant {
    issued(sim, |c| c.payload().as_deref() == Some(payload))
}

// ── Scenarios ───────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_silent_negotiation_still_succeeds() {
    let sim = SimulatedPeer::manual();
    let provisioner = setup(&sim).await;
    provisioner.start_provisioning(request()).await.unwrap();

    reach(&provisioner, Phase::Connecting).await;
    tokio::time::sleep(Duration::from_secs(2)).await;
    sim.inject(RawEvent::ConnectionState { connected: true });

    reach(&provisioner, Phase::ConfiguringNetwork).await;
    reach(&provisioner, Phase::AwaitingConfirmation).await;
    tokio::time::sleep(Duration::from_secs(5)).await;
    sim.inject(RawEvent::status("Connected to Wi-Fi"));

    assert_eq!(provisioner.finish().await, Phase::Succeeded);

    let payloads = sim.payloads();
    assert_eq!(payloads[..4], ["12:", "1:broker.local", "2:1883", "8:0"]);
    assert_eq!(sim.count(CommandKind::ConfigureNetwork), 1);
    // Negotiation waited out its full window before moving on.
    let waited = issued_kind(&sim, CommandKind::ConfigureNetwork)
        - issued_kind(&sim, CommandKind::NegotiateSecurity);
    assert!(waited >= Timings::default().negotiate_timeout, "waited {waited:?}");
    // The peer never released the link, so it is left alone.
    assert_eq!(sim.count(CommandKind::Disconnect), 0);

    let log = provisioner.log();
    assert!(log.iter().any(|e| e.level == LogLevel::Warning
        && e.message.contains("No security negotiation result")));
}

#[tokio::test(start_paused = true)]
async fn test_configuration_writes_are_paced() {
    let sim = SimulatedPeer::manual();
    let provisioner = setup(&sim).await;
    provisioner.start_provisioning(request()).await.unwrap();

    reach(&provisioner, Phase::Connecting).await;
    sim.inject(RawEvent::ConnectionState { connected: true });
    reach(&provisioner, Phase::AwaitingConfirmation).await;
    sim.inject(RawEvent::status("Connected to Wi-Fi"));
    assert_eq!(provisioner.finish().await, Phase::Succeeded);

    let timings = Timings::default();
    let network = issued_kind(&sim, CommandKind::ConfigureNetwork);
    let status = issued_payload(&sim, "12:");
    let host = issued_payload(&sim, "1:broker.local");
    let port = issued_payload(&sim, "2:1883");
    let apply = issued_payload(&sim, "8:0");

    assert!(status - network >= timings.network_settle);
    assert!(host - status >= timings.probe_settle);
    assert!(port - host >= timings.command_pacing);
    assert!(apply - port >= timings.command_pacing);
}

#[tokio::test(start_paused = true)]
async fn test_link_down_before_link_up_is_not_a_release() {
    let sim = SimulatedPeer::manual();
    let provisioner = setup(&sim).await;
    provisioner.start_provisioning(request()).await.unwrap();

    reach(&provisioner, Phase::Connecting).await;
    // A failed attempt reports link-down before the retry comes up.
    sim.inject(RawEvent::ConnectionState { connected: false });
    sim.inject(RawEvent::ConnectionState { connected: true });

    reach(&provisioner, Phase::AwaitingConfirmation).await;
    assert!(!provisioner.peer_released());
    sim.inject(RawEvent::status("Connected to Wi-Fi"));

    assert_eq!(provisioner.finish().await, Phase::Succeeded);
    assert!(!provisioner.peer_released());
    // The link is still held by the peer, so it is left alone.
    assert_eq!(sim.count(CommandKind::Disconnect), 0);
}

#[tokio::test(start_paused = true)]
async fn test_connection_timeout_fails_without_configuring() {
    let sim = SimulatedPeer::manual();
    let provisioner = setup(&sim).await;
    provisioner.start_provisioning(request()).await.unwrap();

    let started = tokio::time::Instant::now();
    let phase = provisioner.finish().await;

    assert_eq!(phase, Phase::Failed("connection timeout".into()));
    assert_eq!(started.elapsed(), Duration::from_secs(15));
    assert_eq!(sim.count(CommandKind::Disconnect), 1);
    assert_eq!(sim.count(CommandKind::ConfigureNetwork), 0);
    assert_eq!(sim.count(CommandKind::PostCustomData), 0);
    assert_eq!(
        messages(&provisioner).last().map(String::as_str),
        Some("Error: connection timeout")
    );
}

#[tokio::test(start_paused = true)]
async fn test_first_uid_is_kept() {
    let sim = SimulatedPeer::manual();
    let provisioner = setup(&sim).await;
    let mut logs = provisioner.subscribe(&[EventKind::Log]);

    sim.inject(RawEvent::log("Received Custom Data: 12:9876543210"));
    sim.inject(RawEvent::log("Received Custom Data: 12:123"));
    sim.inject(RawEvent::log("Version Response: 1234567890123"));
    for _ in 0..3 {
        logs.recv().await.unwrap();
    }

    assert_eq!(provisioner.uid().as_deref(), Some("9876543210"));
}

#[tokio::test(start_paused = true)]
async fn test_cancel_twice_is_cancel_once() {
    let sim = SimulatedPeer::manual();
    let provisioner = setup(&sim).await;
    provisioner.start_provisioning(request()).await.unwrap();
    reach(&provisioner, Phase::Connecting).await;

    provisioner.cancel().await;
    provisioner.cancel().await;

    assert_eq!(provisioner.phase(), Phase::Cancelled);
    assert_eq!(sim.count(CommandKind::Disconnect), 1);
    let cancelled = messages(&provisioner)
        .iter()
        .filter(|m| m.as_str() == "Provisioning cancelled")
        .count();
    assert_eq!(cancelled, 1);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_before_apply_fails() {
    let sim = SimulatedPeer::manual();
    let provisioner = setup(&sim).await;
    provisioner.start_provisioning(request()).await.unwrap();

    reach(&provisioner, Phase::Connecting).await;
    sim.inject(RawEvent::ConnectionState { connected: true });
    reach(&provisioner, Phase::Negotiating).await;
    sim.inject(RawEvent::ConnectionState { connected: false });

    assert_eq!(
        provisioner.finish().await,
        Phase::Failed("Peer disconnected before confirmation".into())
    );
    assert!(provisioner.peer_released());
    assert_eq!(sim.count(CommandKind::Disconnect), 1);
    assert_eq!(sim.count(CommandKind::PostCustomData), 0);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_after_final_write_confirms() {
    let sim = SimulatedPeer::manual();
    let provisioner = setup(&sim).await;
    let no_broker = ProvisioningRequest::new("HomeNet", "hunter22");
    provisioner.start_provisioning(no_broker).await.unwrap();

    reach(&provisioner, Phase::Connecting).await;
    sim.inject(RawEvent::ConnectionState { connected: true });
    reach(&provisioner, Phase::ConfiguringNetwork).await;
    sim.inject(RawEvent::status("Disconnected"));

    assert_eq!(provisioner.finish().await, Phase::Succeeded);
    assert_eq!(sim.count(CommandKind::Disconnect), 1);
    assert!(sim.payloads().iter().all(|p| p == "12:"));
}

#[tokio::test(start_paused = true)]
async fn test_rejected_command_fails_immediately() {
    let sim = SimulatedPeer::manual();
    sim.reject(CommandKind::ConfigureNetwork);
    let provisioner = setup(&sim).await;
    provisioner.start_provisioning(request()).await.unwrap();

    reach(&provisioner, Phase::Connecting).await;
    sim.inject(RawEvent::ConnectionState { connected: true });

    let Phase::Failed(reason) = provisioner.finish().await else {
        panic!("expected failure, got {:?}", provisioner.phase());
    };
    assert!(reason.starts_with("configure_network failed"), "{reason}");
    assert_eq!(sim.count(CommandKind::Disconnect), 1);
}

#[tokio::test(start_paused = true)]
async fn test_confirmation_window_exhausts() {
    let sim = SimulatedPeer::manual();
    let provisioner = setup(&sim).await;
    provisioner.start_provisioning(request()).await.unwrap();

    reach(&provisioner, Phase::Connecting).await;
    sim.inject(RawEvent::ConnectionState { connected: true });

    assert_eq!(
        provisioner.finish().await,
        Phase::Failed("confirmation timeout".into())
    );
    assert!(sim.count(CommandKind::RequestStatus) > 10);
    assert!(messages(&provisioner).iter().any(|m| m.starts_with("Checking status")));
    assert_eq!(sim.count(CommandKind::Disconnect), 1);
}

#[tokio::test(start_paused = true)]
async fn test_new_session_replaces_previous() {
    let sim = SimulatedPeer::manual();
    let provisioner = setup(&sim).await;
    let first = provisioner.start_provisioning(request()).await.unwrap();
    reach(&provisioner, Phase::Connecting).await;

    let second = provisioner.start_provisioning(request()).await.unwrap();
    assert_ne!(first, second);
    reach(&provisioner, Phase::Connecting).await;
    // Only the torn-down session's disconnect so far.
    assert_eq!(sim.count(CommandKind::Disconnect), 1);
    assert_eq!(sim.count(CommandKind::Connect), 2);
    assert!(!messages(&provisioner).iter().any(|m| m == "Provisioning cancelled"));

    provisioner.cancel().await;
    assert_eq!(provisioner.phase(), Phase::Cancelled);
}

#[tokio::test(start_paused = true)]
async fn test_invalid_request_is_rejected_up_front() {
    let sim = SimulatedPeer::manual();
    let provisioner = setup(&sim).await;

    let result = provisioner
        .start_provisioning(ProvisioningRequest::new("", "hunter22"))
        .await;
    assert!(matches!(result, Err(blufi_core::CoreError::ValidationFailed { .. })));
    assert_eq!(sim.count(CommandKind::Connect), 0);
}

// ── Scripted peer ───────────────────────────────────────────────────

fn scripted() -> SimulatedPeer {
    SimulatedPeer::new(vec![PeerProfile {
        uid: Some("9876543210".into()),
        networks: vec![
            ScanEntry { ssid: "Cafe".into(), rssi: -80 },
            ScanEntry { ssid: "HomeNet".into(), rssi: -52 },
            ScanEntry { ssid: "Cafe".into(), rssi: -61 },
            ScanEntry { ssid: String::new(), rssi: -30 },
        ],
        ..PeerProfile::new(ADDRESS)
    }])
}

#[tokio::test(start_paused = true)]
async fn test_scripted_peer_full_flow() {
    let sim = scripted();
    let provisioner = Provisioner::new(ProvisionerConfig::default(), Arc::new(sim.clone()));
    provisioner.start_discovery().unwrap();
    let mut devices = provisioner.device_stream();
    devices.wait_for(|d| !d.is_empty()).await.unwrap();
    provisioner.select_device(ADDRESS).unwrap();

    provisioner.start_provisioning(request()).await.unwrap();
    assert_eq!(provisioner.finish().await, Phase::Succeeded);

    assert_eq!(provisioner.uid().as_deref(), Some("9876543210"));
    assert!(provisioner.peer_released());
    assert_eq!(sim.count(CommandKind::Disconnect), 1);
    let last = messages(&provisioner);
    assert!(last.iter().any(|m| m == "Provisioning complete, device UID 9876543210"));
}

#[tokio::test(start_paused = true)]
async fn test_scripted_network_scan() {
    let sim = scripted();
    let provisioner = Provisioner::new(ProvisionerConfig::default(), Arc::new(sim.clone()));
    provisioner.start_discovery().unwrap();
    let mut devices = provisioner.device_stream();
    devices.wait_for(|d| !d.is_empty()).await.unwrap();
    provisioner.select_device(ADDRESS).unwrap();

    let networks = provisioner.scan_networks().await.unwrap();
    let found: Vec<_> = networks.iter().map(|n| (n.ssid.as_str(), n.rssi)).collect();
    assert_eq!(found, vec![("HomeNet", -52), ("Cafe", -61)]);
    assert_eq!(sim.count(CommandKind::SetOpMode), 1);
    assert_eq!(sim.count(CommandKind::Disconnect), 1);
    assert_eq!(provisioner.phase(), Phase::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_abandoned_scan_frees_the_slot() {
    let sim = scripted();
    let provisioner = Provisioner::new(ProvisionerConfig::default(), Arc::new(sim.clone()));
    provisioner.start_discovery().unwrap();
    let mut devices = provisioner.device_stream();
    devices.wait_for(|d| !d.is_empty()).await.unwrap();
    provisioner.select_device(ADDRESS).unwrap();

    // Give up while the link is still settling.
    let abandoned =
        tokio::time::timeout(Duration::from_millis(500), provisioner.scan_networks()).await;
    assert!(abandoned.is_err());
    assert_eq!(sim.count(CommandKind::Disconnect), 1);

    let networks = provisioner.scan_networks().await.unwrap();
    assert_eq!(networks.len(), 2);
    assert_eq!(sim.count(CommandKind::Connect), 2);
}
