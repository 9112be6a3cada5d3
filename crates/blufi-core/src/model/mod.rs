// ── Domain model ──
//
// Canonical types shared by the bus, the stores, and the orchestrator.

pub mod device;
pub mod event;
pub mod request;
pub mod session;

pub use device::{DiscoveredDevice, WifiNetwork};
pub use event::{DomainEvent, EventKind};
pub use request::{BrokerConfig, ProvisioningRequest};
pub use session::{LogEntry, LogLevel, LogSource, Phase};
