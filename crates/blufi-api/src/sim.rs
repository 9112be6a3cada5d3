// ── Simulated peer ──
//
// An in-process stand-in for the radio bridge. In scripted mode it answers
// commands with the same status/log lines a Blufi device produces, on a
// realistic schedule. In manual mode it only records commands and leaves
// every event to the caller via `inject`.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::command::{Command, CommandKind, ConfigKey};
use crate::error::Error;
use crate::event::{RawEvent, ScanEntry};
use crate::transport::Transport;

const EVENT_CHANNEL_SIZE: usize = 256;

const REPLY_DELAY: Duration = Duration::from_millis(200);
const SCAN_DELAY: Duration = Duration::from_secs(1);
const ADVERTISE_INTERVAL: Duration = Duration::from_millis(150);

/// How a simulated peer answers security negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Negotiation {
    #[default]
    Succeed,
    /// Report a non-zero result code.
    Fail(i32),
    /// Never answer.
    Silent,
}

/// Behaviour of one simulated device.
#[derive(Debug, Clone)]
pub struct PeerProfile {
    pub address: String,
    pub name: Option<String>,
    pub rssi: i16,
    /// Identifier echoed in reply to a status probe.
    pub uid: Option<String>,
    pub firmware: String,
    /// Whether `connect` ever completes.
    pub reachable: bool,
    pub connect_delay: Duration,
    pub negotiation: Negotiation,
    /// Whether the peer joins the network after the apply marker.
    pub joins_network: bool,
    pub reboot_delay: Duration,
    pub networks: Vec<ScanEntry>,
}

impl PeerProfile {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            name: Some("BLUFI_DEVICE".into()),
            rssi: -55,
            uid: None,
            firmware: "V1.3".into(),
            reachable: true,
            connect_delay: Duration::from_millis(800),
            negotiation: Negotiation::Succeed,
            joins_network: true,
            reboot_delay: Duration::from_secs(4),
            networks: Vec::new(),
        }
    }
}

// ── SimulatedPeer ────────────────────────────────────────────────

/// Cheaply cloneable handle to the simulated bridge.
#[derive(Clone)]
pub struct SimulatedPeer {
    inner: Arc<SimInner>,
}

struct SimInner {
    events: broadcast::Sender<RawEvent>,
    peers: Vec<PeerProfile>,
    scripted: bool,
    link: Mutex<LinkState>,
    journal: Mutex<Vec<(Instant, Command)>>,
    rejected: Mutex<HashSet<CommandKind>>,
}

#[derive(Default)]
struct LinkState {
    /// Index into `peers` (always 0 in manual mode).
    peer: Option<usize>,
    link_epoch: u64,
    discovery_epoch: u64,
    applied: bool,
}

/// What must still hold for a scheduled emission to go out.
#[derive(Clone, Copy)]
enum Epoch {
    Link(u64),
    Discovery(u64),
}

impl SimulatedPeer {
    /// A scripted bridge with the given devices in radio range.
    pub fn new(peers: Vec<PeerProfile>) -> Self {
        Self::build(peers, true)
    }

    /// A bridge that records commands and emits only injected events.
    pub fn manual() -> Self {
        Self::build(Vec::new(), false)
    }

    fn build(peers: Vec<PeerProfile>, scripted: bool) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_SIZE);
        Self {
            inner: Arc::new(SimInner {
                events,
                peers,
                scripted,
                link: Mutex::new(LinkState::default()),
                journal: Mutex::new(Vec::new()),
                rejected: Mutex::new(HashSet::new()),
            }),
        }
    }

    /// Emit an event as if the bridge produced it.
    pub fn inject(&self, event: RawEvent) {
        trace!(?event, "injecting simulated event");
        let _ = self.inner.events.send(event);
    }

    /// Make every future command of `kind` fail synchronously.
    pub fn reject(&self, kind: CommandKind) {
        lock(&self.inner.rejected).insert(kind);
    }

    // ── Journal ──────────────────────────────────────────────────

    /// Every command issued so far, rejected ones included.
    pub fn commands(&self) -> Vec<Command> {
        lock(&self.inner.journal)
            .iter()
            .map(|(_, c)| c.clone())
            .collect()
    }

    /// Commands with the (tokio) instant each was issued at.
    pub fn timeline(&self) -> Vec<(Instant, Command)> {
        lock(&self.inner.journal).clone()
    }

    pub fn kinds(&self) -> Vec<CommandKind> {
        lock(&self.inner.journal)
            .iter()
            .map(|(_, c)| c.kind())
            .collect()
    }

    pub fn count(&self, kind: CommandKind) -> usize {
        lock(&self.inner.journal)
            .iter()
            .filter(|(_, c)| c.kind() == kind)
            .count()
    }

    /// Custom-data payloads in issue order.
    pub fn payloads(&self) -> Vec<String> {
        lock(&self.inner.journal)
            .iter()
            .filter_map(|(_, c)| c.payload())
            .collect()
    }

    // ── Script ───────────────────────────────────────────────────

    fn respond(&self, command: &Command) -> Result<(), Error> {
        let mut link = lock(&self.inner.link);

        match command {
            Command::Connect { address } => {
                link.link_epoch += 1;
                link.applied = false;
                if !self.inner.scripted {
                    link.peer = Some(0);
                    return Ok(());
                }
                let index = self
                    .inner
                    .peers
                    .iter()
                    .position(|p| p.address.eq_ignore_ascii_case(address))
                    .ok_or_else(|| Error::DeviceNotFound {
                        address: address.clone(),
                    })?;
                link.peer = Some(index);
                let peer = &self.inner.peers[index];
                if peer.reachable {
                    self.schedule(
                        peer.connect_delay,
                        Epoch::Link(link.link_epoch),
                        vec![
                            RawEvent::log("Gatt Connection State: Connected (2), Status: 0"),
                            RawEvent::status("Connected"),
                            RawEvent::ConnectionState { connected: true },
                            RawEvent::log("Gatt Prepared (Service Discovered). Requesting MTU 512..."),
                            RawEvent::log("MTU Changed to: 512"),
                        ],
                    );
                }
                return Ok(());
            }
            Command::Disconnect => {
                link.link_epoch += 1;
                link.peer = None;
                return Ok(());
            }
            Command::StartDiscovery => {
                link.discovery_epoch += 1;
                if self.inner.scripted {
                    for (i, peer) in self.inner.peers.iter().enumerate() {
                        let steps = u32::try_from(i + 1).unwrap_or(u32::MAX);
                        self.schedule(
                            ADVERTISE_INTERVAL.saturating_mul(steps),
                            Epoch::Discovery(link.discovery_epoch),
                            vec![RawEvent::Discovery {
                                address: peer.address.clone(),
                                name: peer.name.clone(),
                                rssi: peer.rssi,
                            }],
                        );
                    }
                }
                return Ok(());
            }
            Command::StopDiscovery => {
                link.discovery_epoch += 1;
                return Ok(());
            }
            _ => {}
        }

        let Some(index) = link.peer else {
            return Err(Error::NotConnected);
        };
        if !self.inner.scripted {
            return Ok(());
        }

        let peer = &self.inner.peers[index];
        let epoch = Epoch::Link(link.link_epoch);
        match command {
            Command::NegotiateSecurity => match peer.negotiation {
                Negotiation::Succeed => self.schedule(REPLY_DELAY, epoch, security_result(0)),
                Negotiation::Fail(code) => self.schedule(REPLY_DELAY, epoch, security_result(code)),
                Negotiation::Silent => {}
            },
            Command::ConfigureNetwork { .. } | Command::SetOpMode(_) => {
                self.schedule(
                    REPLY_DELAY,
                    epoch,
                    vec![
                        RawEvent::status("Configure Params: 0"),
                        RawEvent::log("Post Configure Params Result: 0"),
                    ],
                );
            }
            Command::PostCustomData { key, .. } => match key {
                ConfigKey::StatusProbe => {
                    if let Some(uid) = &peer.uid {
                        self.schedule(
                            REPLY_DELAY,
                            epoch,
                            vec![
                                RawEvent::log(format!("Received Custom Data: 12:{uid}")),
                                RawEvent::data(format!("12:{uid}")),
                            ],
                        );
                    }
                }
                ConfigKey::Apply => {
                    link.applied = true;
                    if peer.joins_network {
                        self.schedule(
                            peer.reboot_delay,
                            epoch,
                            vec![
                                RawEvent::status("Connected to Wi-Fi"),
                                RawEvent::log("Gatt Connection State: Disconnected (0), Status: 0"),
                                RawEvent::status("Disconnected"),
                                RawEvent::ConnectionState { connected: false },
                            ],
                        );
                    }
                }
                ConfigKey::BrokerHost | ConfigKey::BrokerPort => {}
            },
            Command::RequestStatus => {
                let state = u8::from(!(link.applied && peer.joins_network));
                self.schedule(
                    REPLY_DELAY,
                    epoch,
                    vec![
                        RawEvent::status("Device Status: 0"),
                        RawEvent::log(format!(
                            "Status Response: OpMode: 1, Station Connection State: {state}"
                        )),
                    ],
                );
            }
            Command::RequestVersion => {
                self.schedule(
                    REPLY_DELAY,
                    epoch,
                    vec![
                        RawEvent::status("Device Version: 0"),
                        RawEvent::log(format!("Version Response: {}", peer.firmware)),
                    ],
                );
            }
            Command::RequestWifiScan => {
                self.schedule(
                    SCAN_DELAY,
                    epoch,
                    vec![
                        RawEvent::NetworkScan(peer.networks.clone()),
                        RawEvent::status("Device Scan Result: 0"),
                    ],
                );
            }
            _ => {}
        }
        Ok(())
    }

    fn schedule(&self, delay: Duration, epoch: Epoch, events: Vec<RawEvent>) {
        let Ok(runtime) = Handle::try_current() else {
            debug!("no runtime, dropping simulated reply");
            return;
        };
        let inner = Arc::clone(&self.inner);
        runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            let link = lock(&inner.link);
            let current = match epoch {
                Epoch::Link(e) => e == link.link_epoch,
                Epoch::Discovery(e) => e == link.discovery_epoch,
            };
            drop(link);
            if current {
                for event in events {
                    let _ = inner.events.send(event);
                }
            }
        });
    }
}

impl Transport for SimulatedPeer {
    fn send(&self, command: Command) -> Result<(), Error> {
        debug!(command = %command, "simulated transport command");
        lock(&self.inner.journal).push((Instant::now(), command.clone()));

        let kind = command.kind();
        if lock(&self.inner.rejected).contains(&kind) {
            return Err(Error::Rejected {
                command: kind.to_string(),
                reason: "rejected by simulated peer".into(),
            });
        }
        self.respond(&command)
    }

    fn subscribe(&self) -> broadcast::Receiver<RawEvent> {
        self.inner.events.subscribe()
    }
}

fn security_result(code: i32) -> Vec<RawEvent> {
    vec![
        RawEvent::status(format!("Security Result: {code}")),
        RawEvent::log(format!("Security Negotiation Result: {code}")),
    ]
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
