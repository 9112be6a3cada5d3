//! Transport capability surface for Blufi provisioning peers.
//!
//! This crate is the boundary between the provisioning logic in
//! `blufi-core` and whatever actually talks to the radio:
//!
//! - **[`Transport`]**: fire-and-forget [`Command`] issuance plus a
//!   broadcast stream of [`RawEvent`]s.
//! - **[`RawEvent`]**: events as the platform bridge delivers them, including
//!   decoding from the bridge's loosely-typed JSON maps.
//! - **[`SimulatedPeer`]**: an in-process peer that answers commands the way
//!   a Blufi device does. Used by tests and by the CLI's dry-run mode.

pub mod command;
pub mod error;
pub mod event;
pub mod sim;
pub mod transport;

pub use command::{Command, CommandKind, ConfigKey, OpMode};
pub use error::Error;
pub use event::{PeerMessage, RawEvent, ScanEntry};
pub use sim::{Negotiation, PeerProfile, SimulatedPeer};
pub use transport::Transport;
