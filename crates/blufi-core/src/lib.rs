//! Provisioning orchestration between `blufi-api` transports and presentation
//! layers (the CLI, or anything else that renders progress).
//!
//! - **[`Provisioner`]**: Central facade. Runs discovery, peer-side network
//!   scans, and single-flight provisioning sessions; exposes the phase, the
//!   session log, the captured device UID and the discovery catalog as
//!   `watch`-backed snapshots.
//!
//! - **[`EventBus`]**: Single consumer of the transport's raw events.
//!   Normalizes them into [`DomainEvent`]s, classifies their text with the
//!   [`matcher`], records side effects in the stores, then fans out to scoped
//!   [`Subscription`]s.
//!
//! - **[`Awaiter`]**: Races a predicate over bus events against a deadline,
//!   one subscription per wait.
//!
//! - **[`matcher`]**: Ordered regex rule table turning peer log/status text
//!   into [`Signal`]s and extracting the device UID.
//!
//! - **Domain model** ([`model`]): [`Phase`], [`LogEntry`],
//!   [`DiscoveredDevice`], [`WifiNetwork`], [`ProvisioningRequest`].

pub mod awaiter;
pub mod bus;
pub mod config;
pub mod error;
mod link;
pub mod matcher;
pub mod model;
mod orchestrator;
pub mod provisioner;
mod scan;
pub mod store;
pub mod stream;

// ── Primary re-exports ──────────────────────────────────────────────
pub use awaiter::{Awaiter, Expectation};
pub use bus::{EventBus, Observed, Subscription};
pub use config::{ProvisionerConfig, Timings};
pub use error::CoreError;
pub use matcher::{Classification, Signal};
pub use provisioner::Provisioner;
pub use store::{Catalog, SessionLog};
pub use stream::SnapshotStream;

pub use model::{
    BrokerConfig, DiscoveredDevice, DomainEvent, EventKind, LogEntry, LogLevel, LogSource, Phase,
    ProvisioningRequest, WifiNetwork,
};
