use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, warn};

use blufi_api::{Command, RawEvent, Transport};

use crate::error::CoreError;

/// Outbound side of the transport, shared by everything that issues commands.
#[derive(Clone)]
pub(crate) struct CommandLink {
    transport: Arc<dyn Transport>,
}

impl CommandLink {
    pub(crate) fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    pub(crate) fn issue(&self, command: Command) -> Result<(), CoreError> {
        let kind = command.kind();
        debug!(command = %command, "issuing command");
        self.transport
            .send(command)
            .map_err(|e| CoreError::TransportCommand {
                command: kind.as_str().to_owned(),
                reason: e.to_string(),
            })
    }

    /// Disconnect, ignoring the outcome.
    pub(crate) fn best_effort_disconnect(&self) {
        if let Err(e) = self.transport.send(Command::Disconnect) {
            warn!(error = %e, "disconnect failed");
        }
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<RawEvent> {
        self.transport.subscribe()
    }
}
