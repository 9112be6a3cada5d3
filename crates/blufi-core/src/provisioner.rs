// ── Provisioner ──
//
// Facade over the bus, the stores and the orchestrator. Owns the
// single-flight rule: one provisioning session or one network scan at a
// time, and a new session tears down the previous one first.

use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};

use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use blufi_api::{Command, Transport};

use crate::awaiter::Awaiter;
use crate::bus::{EventBus, Subscription};
use crate::config::ProvisionerConfig;
use crate::error::CoreError;
use crate::link::CommandLink;
use crate::model::{
    DiscoveredDevice, EventKind, LogEntry, Phase, ProvisioningRequest, WifiNetwork,
};
use crate::orchestrator::{self, Session, Steps};
use crate::scan;
use crate::store::{Catalog, SessionLog};
use crate::stream::SnapshotStream;

/// Entry point for presentation layers.
///
/// Cheaply cloneable via `Arc<ProvisionerInner>`. Must be created inside a
/// tokio runtime: construction spawns the bus consumer.
#[derive(Clone)]
pub struct Provisioner {
    inner: Arc<ProvisionerInner>,
}

struct ProvisionerInner {
    config: ProvisionerConfig,
    link: CommandLink,
    bus: EventBus,
    awaiter: Awaiter,
    log: Arc<SessionLog>,
    catalog: Arc<Catalog>,
    phase: Arc<watch::Sender<Phase>>,
    selected: watch::Sender<Option<DiscoveredDevice>>,
    active: Mutex<Option<ActiveSession>>,
    /// Scope of the running network scan, if any. Never held across an await.
    scan: StdMutex<Option<CancellationToken>>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

struct ActiveSession {
    id: Uuid,
    scope: CancellationToken,
    done: CancellationToken,
    handle: JoinHandle<Phase>,
}

impl Provisioner {
    pub fn new(config: ProvisionerConfig, transport: Arc<dyn Transport>) -> Self {
        let log = Arc::new(SessionLog::new());
        let catalog = Arc::new(Catalog::new());
        let bus = EventBus::new(config.event_buffer, Arc::clone(&log), Arc::clone(&catalog));
        let link = CommandLink::new(transport);
        let pump = bus.attach(link.subscribe());
        let (phase, _) = watch::channel(Phase::Idle);
        let (selected, _) = watch::channel(None);

        Self {
            inner: Arc::new(ProvisionerInner {
                config,
                link,
                awaiter: Awaiter::new(bus.clone()),
                bus,
                log,
                catalog,
                phase: Arc::new(phase),
                selected,
                active: Mutex::new(None),
                scan: StdMutex::new(None),
                pump: Mutex::new(Some(pump)),
            }),
        }
    }

    pub fn config(&self) -> &ProvisionerConfig {
        &self.inner.config
    }

    // ── Observation ──────────────────────────────────────────────

    pub fn phase(&self) -> Phase {
        self.inner.phase.borrow().clone()
    }

    pub fn watch_phase(&self) -> watch::Receiver<Phase> {
        self.inner.phase.subscribe()
    }

    pub fn log(&self) -> Arc<Vec<Arc<LogEntry>>> {
        self.inner.log.snapshot()
    }

    pub fn log_stream(&self) -> SnapshotStream<LogEntry> {
        SnapshotStream::new(self.inner.log.subscribe())
    }

    /// Device identifier captured this session, if any.
    pub fn uid(&self) -> Option<String> {
        self.inner.log.uid()
    }

    /// Whether the peer dropped the link on its own this session.
    pub fn peer_released(&self) -> bool {
        self.inner.log.released()
    }

    pub fn watch_peer_released(&self) -> watch::Receiver<bool> {
        self.inner.log.subscribe_released()
    }

    pub fn devices(&self) -> Arc<Vec<Arc<DiscoveredDevice>>> {
        self.inner.catalog.devices()
    }

    pub fn device_stream(&self) -> SnapshotStream<DiscoveredDevice> {
        SnapshotStream::new(self.inner.catalog.subscribe_devices())
    }

    pub fn filter_devices(&self, query: &str) -> Vec<Arc<DiscoveredDevice>> {
        self.inner.catalog.filter_devices(query)
    }

    pub fn networks(&self) -> Arc<Vec<Arc<WifiNetwork>>> {
        self.inner.catalog.networks()
    }

    pub fn network_stream(&self) -> SnapshotStream<WifiNetwork> {
        SnapshotStream::new(self.inner.catalog.subscribe_networks())
    }

    pub fn selected_device(&self) -> Option<DiscoveredDevice> {
        self.inner.selected.borrow().clone()
    }

    /// Raw domain events, for presentation that wants more than snapshots.
    pub fn subscribe(&self, kinds: &[EventKind]) -> Subscription {
        self.inner.bus.subscribe(kinds, &self.inner.bus.scope())
    }

    // ── Discovery ────────────────────────────────────────────────

    /// Start discovery. The device list is rebuilt from scratch.
    pub fn start_discovery(&self) -> Result<(), CoreError> {
        self.inner.catalog.clear_devices();
        info!("starting discovery");
        self.inner.link.issue(Command::StartDiscovery)
    }

    pub fn stop_discovery(&self) -> Result<(), CoreError> {
        self.inner.link.issue(Command::StopDiscovery)
    }

    /// Pick the target device. Discovery is stopped first.
    pub fn select_device(&self, address: &str) -> Result<DiscoveredDevice, CoreError> {
        if let Err(e) = self.stop_discovery() {
            warn!(error = %e, "could not stop discovery");
        }
        let device = self
            .inner
            .catalog
            .device(address)
            .ok_or_else(|| CoreError::DeviceNotFound {
                address: address.to_owned(),
            })?;
        let device = DiscoveredDevice::clone(&device);
        debug!(address = %device.address, "device selected");
        self.inner.selected.send_replace(Some(device.clone()));
        Ok(device)
    }

    // ── Network scan ─────────────────────────────────────────────

    /// Ask the selected device which Wi-Fi networks it can see.
    pub async fn scan_networks(&self) -> Result<Arc<Vec<Arc<WifiNetwork>>>, CoreError> {
        let device = self.selected_device().ok_or(CoreError::NoDeviceSelected)?;

        let (scope, slot) = {
            let active = self.inner.active.lock().await;
            if active.as_ref().is_some_and(|s| !s.handle.is_finished()) {
                return Err(CoreError::Busy);
            }
            let mut scan = lock(&self.inner.scan);
            if scan.is_some() {
                return Err(CoreError::Busy);
            }
            let scope = self.inner.bus.scope();
            *scan = Some(scope.clone());
            (scope, ScanSlot { inner: &self.inner, finished: false })
        };

        self.inner.catalog.clear_networks();
        let steps = self.steps(scope);
        let result = scan::scan_networks(&steps, &device, self.inner.config.negotiate_security).await;
        slot.finish();

        result.map(|()| self.networks())
    }

    // ── Provisioning ─────────────────────────────────────────────

    /// Start provisioning the selected device. Any previous session is
    /// torn down first. Returns the new session id.
    pub async fn start_provisioning(&self, request: ProvisioningRequest) -> Result<Uuid, CoreError> {
        request.validate()?;
        let device = self.selected_device().ok_or(CoreError::NoDeviceSelected)?;

        let mut active = self.inner.active.lock().await;
        if lock(&self.inner.scan).is_some() {
            return Err(CoreError::Busy);
        }
        if let Some(previous) = active.take() {
            debug!(session = %previous.id, "tearing down previous session");
            previous.scope.cancel();
            settle(previous.handle).await;
        }

        self.inner.log.reset();
        self.inner.phase.send_replace(Phase::Idle);

        let id = Uuid::new_v4();
        let scope = self.inner.bus.scope();
        let done = CancellationToken::new();
        let session = Session {
            id,
            device,
            request,
            negotiate: self.inner.config.negotiate_security,
            steps: self.steps(scope.clone()),
            phase: Arc::clone(&self.inner.phase),
            done: done.clone(),
        };
        info!(session = %id, "provisioning started");
        let handle = tokio::spawn(orchestrator::drive(session));
        *active = Some(ActiveSession {
            id,
            scope,
            done,
            handle,
        });
        Ok(id)
    }

    /// Wait for the current session to wind down and return its phase.
    pub async fn finish(&self) -> Phase {
        let done = self
            .inner
            .active
            .lock()
            .await
            .as_ref()
            .map(|s| s.done.clone());
        if let Some(done) = done {
            done.cancelled().await;
        }
        self.phase()
    }

    /// Cancel whatever is running. Calling it again is a no-op.
    pub async fn cancel(&self) {
        if let Some(scan) = lock(&self.inner.scan).as_ref() {
            scan.cancel();
        }
        let Some(session) = self.inner.active.lock().await.take() else {
            return;
        };
        session.scope.cancel();
        settle(session.handle).await;
    }

    /// Cancel, then forget the log, the UID, the selection and the catalog.
    pub async fn reset(&self) {
        self.cancel().await;
        self.inner.log.reset();
        self.inner.selected.send_replace(None);
        self.inner.catalog.clear_devices();
        self.inner.catalog.clear_networks();
        self.inner.phase.send_replace(Phase::Idle);
    }

    /// Cancel and stop the bus consumer.
    pub async fn shutdown(&self) {
        self.cancel().await;
        self.inner.bus.shutdown();
        if let Some(pump) = self.inner.pump.lock().await.take() {
            let _ = pump.await;
        }
    }

    fn steps(&self, scope: CancellationToken) -> Steps {
        Steps {
            link: self.inner.link.clone(),
            awaiter: self.inner.awaiter.clone(),
            log: Arc::clone(&self.inner.log),
            timings: self.inner.config.timings.clone(),
            scope,
        }
    }
}

/// Holds the scan slot for one scan. Dropping it frees the slot, and a
/// scan whose future was dropped mid-flight also gets its scope cancelled
/// and the link closed.
struct ScanSlot<'a> {
    inner: &'a ProvisionerInner,
    finished: bool,
}

impl ScanSlot<'_> {
    fn finish(mut self) {
        self.finished = true;
    }
}

impl Drop for ScanSlot<'_> {
    fn drop(&mut self) {
        let scope = lock(&self.inner.scan).take();
        if self.finished {
            return;
        }
        warn!("network scan abandoned before it finished");
        if let Some(scope) = scope {
            scope.cancel();
        }
        self.inner.link.best_effort_disconnect();
    }
}

fn lock<T>(mutex: &StdMutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn settle(handle: JoinHandle<Phase>) {
    match handle.await {
        Ok(phase) => debug!(%phase, "session ended"),
        Err(e) => warn!(error = %e, "session task ended abnormally"),
    }
}
