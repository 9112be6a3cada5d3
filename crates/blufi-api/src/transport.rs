use tokio::sync::broadcast;

use crate::command::Command;
use crate::error::Error;
use crate::event::RawEvent;

/// A link to Blufi peers.
///
/// Implementations accept commands synchronously and report everything
/// that follows through [`subscribe`](Transport::subscribe). Events are
/// delivered on the transport's own task; callers must not assume any
/// ordering between a command's acceptance and its events beyond what the
/// peer produces.
pub trait Transport: Send + Sync + 'static {
    /// Issue a command. An `Err` means the command never left the host.
    fn send(&self, command: Command) -> Result<(), Error>;

    /// Attach a new receiver to the raw event stream.
    fn subscribe(&self) -> broadcast::Receiver<RawEvent>;
}
