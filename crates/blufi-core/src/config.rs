// ── Provisioner configuration ──
//
// Pacing delays are part of the protocol: peers drop configuration
// writes that arrive back-to-back.

use std::time::Duration;

/// Deadlines and fixed delays used by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timings {
    /// Wait for the link to come up when provisioning.
    pub connect_timeout: Duration,
    /// Wait for the link to come up before a network scan.
    pub scan_connect_timeout: Duration,
    /// Best-effort wait for a security-negotiation result.
    pub negotiate_timeout: Duration,
    /// Pause after the link is confirmed.
    pub link_settle: Duration,
    /// Pause after negotiation finishes (or gives up).
    pub negotiate_settle: Duration,
    /// Pause after writing network credentials.
    pub network_settle: Duration,
    /// Pause after the first status probe.
    pub probe_settle: Duration,
    /// Pause after each broker configuration write.
    pub command_pacing: Duration,
    /// Pause after the apply marker, before polling.
    pub broker_settle: Duration,
    /// Total confirmation window.
    pub confirm_deadline: Duration,
    /// Interval between status probes while confirming.
    pub confirm_interval: Duration,
    /// How long a succeeded session waits for the peer to drop the link.
    pub release_timeout: Duration,
    /// Pause after switching op mode before a scan.
    pub op_mode_settle: Duration,
    /// Wait for the peer's network scan result.
    pub scan_timeout: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(15),
            scan_connect_timeout: Duration::from_secs(10),
            negotiate_timeout: Duration::from_secs(10),
            link_settle: Duration::from_secs(1),
            negotiate_settle: Duration::from_secs(1),
            network_settle: Duration::from_secs(3),
            probe_settle: Duration::from_secs(1),
            command_pacing: Duration::from_millis(300),
            broker_settle: Duration::from_secs(2),
            confirm_deadline: Duration::from_secs(30),
            confirm_interval: Duration::from_secs(2),
            release_timeout: Duration::from_secs(30),
            op_mode_settle: Duration::from_millis(500),
            scan_timeout: Duration::from_secs(15),
        }
    }
}

/// Configuration for a [`Provisioner`](crate::Provisioner).
#[derive(Debug, Clone)]
pub struct ProvisionerConfig {
    pub timings: Timings,
    /// Attempt security negotiation before configuring.
    pub negotiate_security: bool,
    /// Capacity of the domain event fan-out channel.
    pub event_buffer: usize,
}

impl Default for ProvisionerConfig {
    fn default() -> Self {
        Self {
            timings: Timings::default(),
            negotiate_security: true,
            event_buffer: 256,
        }
    }
}
