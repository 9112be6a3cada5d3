// ── Network scan through the peer ──
//
// Short-lived session: connect, switch the peer to station mode, ask it
// for the Wi-Fi networks it can see, then hang up. Results land in the
// catalog through the bus.

use tracing::{debug, warn};

use blufi_api::{Command, OpMode};

use crate::error::CoreError;
use crate::model::{DiscoveredDevice, EventKind, LogLevel};
use crate::orchestrator::Steps;

/// Run a scan against `device`. Always ends with a disconnect.
pub(crate) async fn scan_networks(
    steps: &Steps,
    device: &DiscoveredDevice,
    negotiate: bool,
) -> Result<(), CoreError> {
    let outcome = tokio::select! {
        biased;
        () = steps.scope.cancelled() => Err(CoreError::Cancelled),
        result = run(steps, device, negotiate) => result,
    };

    if let Err(e) = &outcome {
        steps.note(LogLevel::Error, format!("Network scan failed: {e}"));
    }
    steps.link.best_effort_disconnect();
    steps.scope.cancel();
    outcome
}

async fn run(steps: &Steps, device: &DiscoveredDevice, negotiate: bool) -> Result<(), CoreError> {
    let timings = &steps.timings;

    steps.note(
        LogLevel::Info,
        format!("Connecting to {} to scan networks", device.display_name()),
    );
    steps
        .connect(&device.address, timings.scan_connect_timeout)
        .await?;
    if negotiate {
        steps.negotiate().await?;
    }

    steps.link.issue(Command::SetOpMode(OpMode::Station))?;
    tokio::time::sleep(timings.op_mode_settle).await;

    // Diagnostic only; the reply feeds UID capture.
    if let Err(e) = steps.link.issue(Command::RequestVersion) {
        warn!(error = %e, "version request failed");
    }

    let results = steps
        .awaiter
        .expect(&steps.scope, &[EventKind::Scan], |_| true);
    steps.note(LogLevel::Info, "Requesting Wi-Fi scan");
    steps.link.issue(Command::RequestWifiScan)?;

    match results.resolve_matching(timings.scan_timeout).await {
        Some(observed) => {
            debug!(seq = observed.seq, "scan result received");
            steps.note(LogLevel::Success, "Network scan complete");
            Ok(())
        }
        None if steps.scope.is_cancelled() => Err(CoreError::Cancelled),
        None => Err(CoreError::timeout("network scan", timings.scan_timeout)),
    }
}
