// ── Event bus ──
//
// Single consumer of the transport's raw event stream. Each raw event is
// normalized into domain events, classified by the status matcher, written
// to the stores, and only then fanned out to subscribers. Subscriptions are
// scoped to a cancellation token and unregister themselves on drop.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use blufi_api::{PeerMessage, RawEvent};

use crate::matcher::{self, Signal};
use crate::model::{DiscoveredDevice, DomainEvent, EventKind, LogLevel, LogSource, WifiNetwork};
use crate::store::{Catalog, SessionLog};

/// A domain event together with what the matcher made of it.
#[derive(Debug, Clone)]
pub struct Observed {
    /// Bus-wide delivery order.
    pub seq: u64,
    pub at: DateTime<Utc>,
    pub event: DomainEvent,
    pub signal: Option<Signal>,
    pub uid: Option<String>,
}

// ── EventBus ─────────────────────────────────────────────────────

#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

struct BusInner {
    tx: broadcast::Sender<Arc<Observed>>,
    registry: Arc<DashMap<u64, CancellationToken>>,
    next_subscription: AtomicU64,
    next_seq: AtomicU64,
    log: Arc<SessionLog>,
    catalog: Arc<Catalog>,
    shutdown: CancellationToken,
}

impl EventBus {
    pub(crate) fn new(capacity: usize, log: Arc<SessionLog>, catalog: Arc<Catalog>) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            inner: Arc::new(BusInner {
                tx,
                registry: Arc::new(DashMap::new()),
                next_subscription: AtomicU64::new(0),
                next_seq: AtomicU64::new(0),
                log,
                catalog,
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Spawn the consumer loop for a transport's raw event stream.
    pub(crate) fn attach(&self, rx: broadcast::Receiver<RawEvent>) -> JoinHandle<()> {
        tokio::spawn(pump(self.clone(), rx))
    }

    /// A fresh scope for subscriptions; cancelled by the bus on shutdown.
    pub fn scope(&self) -> CancellationToken {
        self.inner.shutdown.child_token()
    }

    /// Subscribe to the given kinds for as long as `scope` lives.
    pub fn subscribe(&self, kinds: &[EventKind], scope: &CancellationToken) -> Subscription {
        let id = self.inner.next_subscription.fetch_add(1, Ordering::Relaxed);
        let token = scope.child_token();
        self.inner.registry.insert(id, token.clone());
        trace!(id, ?kinds, "subscription opened");
        Subscription {
            id,
            kinds: kinds.to_vec(),
            rx: self.inner.tx.subscribe(),
            token,
            registry: Arc::clone(&self.inner.registry),
        }
    }

    /// Number of live subscriptions.
    pub fn active_subscriptions(&self) -> usize {
        self.inner.registry.len()
    }

    /// Stop the consumer loop and cancel every subscription.
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
    }

    // ── Ingestion ────────────────────────────────────────────────

    /// Normalize, classify, record, then fan out.
    pub(crate) fn ingest(&self, raw: RawEvent) {
        for event in normalize(raw) {
            let (signal, uid) = match &event {
                DomainEvent::ConnectionChanged { connected: true } => (Some(Signal::Connected), None),
                DomainEvent::ConnectionChanged { connected: false } => {
                    (Some(Signal::Disconnected), None)
                }
                other => other.text().map_or((None, None), |text| {
                    let c = matcher::classify(text);
                    (c.signal, c.uid)
                }),
            };

            self.record(&event, signal, uid.as_deref());

            let observed = Observed {
                seq: self.inner.next_seq.fetch_add(1, Ordering::Relaxed),
                at: Utc::now(),
                event,
                signal,
                uid,
            };
            trace!(seq = observed.seq, kind = %observed.event.kind(), ?signal, "routing event");
            // No receivers is fine.
            let _ = self.inner.tx.send(Arc::new(observed));
        }
    }

    fn record(&self, event: &DomainEvent, signal: Option<Signal>, uid: Option<&str>) {
        let inner = &self.inner;

        if let Some(text) = event.text() {
            inner.log.append(level_for(signal), LogSource::Peer, text);
        }
        if let Some(uid) = uid {
            if inner.log.offer_uid(uid) {
                info!(uid, "device identifier captured");
            } else {
                debug!(uid, "ignoring later device identifier");
            }
        }
        match signal {
            Some(Signal::Connected) => inner.log.mark_link_up(),
            Some(Signal::Disconnected) => {
                if !inner.log.mark_released() {
                    debug!("link down before it was confirmed up");
                }
            }
            Some(Signal::PeerError { code }) if code != 0 => {
                warn!(code, "peer reported an error");
            }
            _ => {}
        }
        match event {
            DomainEvent::DeviceDiscovered { device } => {
                inner.catalog.record_device(device.clone());
            }
            DomainEvent::ScanResult { networks } => inner.catalog.ingest_networks(networks),
            _ => {}
        }
    }
}

async fn pump(bus: EventBus, mut rx: broadcast::Receiver<RawEvent>) {
    let shutdown = bus.inner.shutdown.clone();
    loop {
        tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            next = rx.recv() => match next {
                Ok(raw) => bus.ingest(raw),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event bus lagged behind transport");
                }
                Err(RecvError::Closed) => {
                    debug!("transport event stream closed");
                    break;
                }
            },
        }
    }
}

fn normalize(raw: RawEvent) -> Vec<DomainEvent> {
    match raw {
        RawEvent::ConnectionState { connected } => vec![DomainEvent::ConnectionChanged { connected }],
        RawEvent::Message(PeerMessage { log, status, data }) => {
            let mut events = Vec::with_capacity(3);
            if let Some(text) = status.filter(|t| !t.is_empty()) {
                events.push(DomainEvent::StatusReport { text });
            }
            for text in [log, data].into_iter().flatten() {
                if !text.is_empty() {
                    events.push(DomainEvent::LogLine { text });
                }
            }
            events
        }
        RawEvent::Discovery { address, name, rssi } => vec![DomainEvent::DeviceDiscovered {
            device: DiscoveredDevice {
                address,
                name,
                rssi,
            },
        }],
        RawEvent::NetworkScan(entries) => vec![DomainEvent::ScanResult {
            networks: entries
                .into_iter()
                .map(|e| WifiNetwork {
                    ssid: e.ssid,
                    rssi: e.rssi,
                })
                .collect(),
        }],
    }
}

fn level_for(signal: Option<Signal>) -> LogLevel {
    match signal {
        Some(Signal::WifiJoined | Signal::SecurityOk) => LogLevel::Success,
        Some(Signal::SecurityFailed { .. }) => LogLevel::Warning,
        Some(Signal::PeerError { code }) if code != 0 => LogLevel::Warning,
        _ => LogLevel::Info,
    }
}

// ── Subscription ─────────────────────────────────────────────────

/// A filtered view of the bus. Cancelling is idempotent; dropping cancels.
pub struct Subscription {
    id: u64,
    kinds: Vec<EventKind>,
    rx: broadcast::Receiver<Arc<Observed>>,
    token: CancellationToken,
    registry: Arc<DashMap<u64, CancellationToken>>,
}

impl Subscription {
    /// Next matching event; `None` once cancelled or the bus is gone.
    pub async fn recv(&mut self) -> Option<Arc<Observed>> {
        loop {
            if self.token.is_cancelled() {
                return None;
            }
            let next = tokio::select! {
                biased;
                () = self.token.cancelled() => return None,
                next = self.rx.recv() => next,
            };
            match next {
                Ok(observed) if self.wants(&observed) => return Some(observed),
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => warn!(id = self.id, skipped, "subscriber lagged"),
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Next already-delivered matching event, without waiting.
    pub fn try_recv(&mut self) -> Option<Arc<Observed>> {
        loop {
            if self.token.is_cancelled() {
                return None;
            }
            match self.rx.try_recv() {
                Ok(observed) if self.wants(&observed) => return Some(observed),
                Ok(_) | Err(TryRecvError::Lagged(_)) => {}
                Err(TryRecvError::Empty | TryRecvError::Closed) => return None,
            }
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
        if self.registry.remove(&self.id).is_some() {
            trace!(id = self.id, "subscription closed");
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    fn wants(&self, observed: &Observed) -> bool {
        self.kinds.contains(&observed.event.kind())
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}
