// ── Provisioning orchestrator ──
//
// One task per attempt. Sequences connect → negotiate → configure →
// confirm against the peer's event stream, then tears the session down.
// The phase only moves forward and never leaves a terminal state.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use blufi_api::{Command, ConfigKey};

use crate::awaiter::{Awaiter, Expectation};
use crate::config::Timings;
use crate::error::CoreError;
use crate::link::CommandLink;
use crate::matcher::Signal;
use crate::model::{DiscoveredDevice, LogLevel, LogSource, Phase, ProvisioningRequest};
use crate::store::SessionLog;

// ── Steps ────────────────────────────────────────────────────────

/// Building blocks shared by provisioning and network scans, bound to one
/// cancellation scope.
pub(crate) struct Steps {
    pub(crate) link: CommandLink,
    pub(crate) awaiter: Awaiter,
    pub(crate) log: Arc<SessionLog>,
    pub(crate) timings: Timings,
    pub(crate) scope: CancellationToken,
}

impl Steps {
    pub(crate) fn note(&self, level: LogLevel, message: impl Into<String>) {
        self.log.append(level, LogSource::Orchestrator, message);
    }

    /// The error to report when a wait came back empty-handed.
    fn interrupted(&self) -> CoreError {
        if self.scope.is_cancelled() {
            CoreError::Cancelled
        } else {
            CoreError::Internal("event bus closed".into())
        }
    }

    /// Open a link and wait for it to come up.
    pub(crate) async fn connect(&self, address: &str, deadline: Duration) -> Result<(), CoreError> {
        let up = self
            .awaiter
            .expect_signal(&self.scope, |s| s == Signal::Connected);
        self.log.link_opening();
        self.link.issue(Command::Connect {
            address: address.to_owned(),
        })?;

        if up.resolve(deadline).await {
            self.note(LogLevel::Success, "Stable connection confirmed");
            tokio::time::sleep(self.timings.link_settle).await;
            Ok(())
        } else if self.scope.is_cancelled() {
            Err(CoreError::Cancelled)
        } else {
            Err(CoreError::timeout("connection", deadline))
        }
    }

    /// Security negotiation. Only a failure to issue the command is fatal.
    pub(crate) async fn negotiate(&self) -> Result<(), CoreError> {
        let result = self.awaiter.expect_signal(&self.scope, |s| {
            matches!(s, Signal::SecurityOk | Signal::SecurityFailed { .. })
        });
        self.note(LogLevel::Info, "Negotiating security");
        self.link.issue(Command::NegotiateSecurity)?;

        let deadline = self.timings.negotiate_timeout;
        match result.resolve_matching(deadline).await.and_then(|o| o.signal) {
            Some(Signal::SecurityOk) => debug!("security negotiated"),
            Some(Signal::SecurityFailed { code }) => {
                warn!(code, "security negotiation failed, continuing");
                self.note(
                    LogLevel::Warning,
                    format!("Security negotiation failed (code {code}), continuing"),
                );
            }
            _ if self.scope.is_cancelled() => return Err(CoreError::Cancelled),
            _ => {
                warn!(timeout_secs = deadline.as_secs(), "no security result, continuing");
                self.note(
                    LogLevel::Warning,
                    "No security negotiation result, continuing without it",
                );
            }
        }
        tokio::time::sleep(self.timings.negotiate_settle).await;
        Ok(())
    }

    /// Status probe write followed by a status request.
    pub(crate) fn probe(&self) -> Result<(), CoreError> {
        self.link.issue(Command::status_probe())?;
        self.link.issue(Command::RequestStatus)
    }
}

// ── Session ──────────────────────────────────────────────────────

/// Everything one attempt owns.
pub(crate) struct Session {
    pub(crate) id: Uuid,
    pub(crate) device: DiscoveredDevice,
    pub(crate) request: ProvisioningRequest,
    pub(crate) negotiate: bool,
    pub(crate) steps: Steps,
    pub(crate) phase: Arc<watch::Sender<Phase>>,
    /// Cancelled once the session has fully wound down.
    pub(crate) done: CancellationToken,
}

/// How the configuration was confirmed, plus the still-armed listener for
/// the peer releasing the link.
struct Confirmation {
    signal: Signal,
    settled: Expectation,
}

impl Session {
    /// Move to `next`. Terminal phases are absorbing.
    fn advance(&self, next: Phase) -> bool {
        let changed = self.phase.send_if_modified(|current| {
            if current.is_terminal() || *current == next {
                return false;
            }
            *current = next.clone();
            true
        });
        if changed {
            info!(session = %self.id, phase = %next, "phase transition");
        }
        changed
    }

    async fn finish_succeeded(&self, confirmation: Confirmation) {
        let Confirmation {
            signal,
            mut settled,
        } = confirmation;
        let steps = &self.steps;

        self.advance(Phase::Succeeded);
        match steps.log.uid() {
            Some(uid) => steps.note(
                LogLevel::Success,
                format!("Provisioning complete, device UID {uid}"),
            ),
            None => steps.note(LogLevel::Success, "Provisioning complete"),
        }

        if signal == Signal::Disconnected || steps.log.released() {
            steps.link.best_effort_disconnect();
            return;
        }

        // The peer is rebooting onto the new network; let it drop the link.
        let timer = tokio::time::sleep(steps.timings.release_timeout);
        tokio::pin!(timer);
        loop {
            tokio::select! {
                biased;
                hit = settled.next_match() => match hit.and_then(|o| o.signal) {
                    Some(Signal::Disconnected) => {
                        debug!(session = %self.id, "peer released the link");
                        steps.link.best_effort_disconnect();
                        return;
                    }
                    Some(_) => {}
                    None => {
                        steps.link.best_effort_disconnect();
                        return;
                    }
                },
                () = &mut timer => {
                    warn!(session = %self.id, "peer kept the link open after provisioning");
                    return;
                }
            }
        }
    }

    fn finish_failed(&self, error: &CoreError) {
        let reason = failure_reason(error);
        warn!(session = %self.id, %reason, "provisioning failed");
        self.steps.note(LogLevel::Error, format!("Error: {reason}"));
        self.advance(Phase::Failed(reason));
        self.steps.link.best_effort_disconnect();
    }

    fn finish_cancelled(&self) {
        info!(session = %self.id, "provisioning cancelled");
        self.steps.note(LogLevel::Warning, "Provisioning cancelled");
        self.advance(Phase::Cancelled);
        self.steps.link.best_effort_disconnect();
    }
}

/// Short reason string surfaced in `Phase::Failed`.
pub(crate) fn failure_reason(error: &CoreError) -> String {
    match error {
        CoreError::Timeout { stage, .. } => format!("{stage} timeout"),
        other => other.to_string(),
    }
}

// ── Driver ───────────────────────────────────────────────────────

/// Run one attempt to completion and return its terminal phase.
pub(crate) async fn drive(session: Session) -> Phase {
    let scope = session.steps.scope.clone();

    let outcome = tokio::select! {
        biased;
        () = scope.cancelled() => Err(CoreError::Cancelled),
        result = run(&session) => result,
    };

    match outcome {
        Ok(confirmation) => session.finish_succeeded(confirmation).await,
        Err(CoreError::Cancelled) => session.finish_cancelled(),
        Err(e) => session.finish_failed(&e),
    }

    // Releases every subscription and timer the attempt still holds.
    scope.cancel();
    session.done.cancel();
    session.phase.borrow().clone()
}

async fn run(session: &Session) -> Result<Confirmation, CoreError> {
    let steps = &session.steps;

    session.advance(Phase::Connecting);
    steps.note(
        LogLevel::Info,
        format!(
            "Connecting to {} ({})",
            session.device.display_name(),
            session.device.address
        ),
    );
    steps
        .connect(&session.device.address, steps.timings.connect_timeout)
        .await?;

    // Armed from link-up so nothing the peer says during configuration is lost.
    let mut settled = steps
        .awaiter
        .expect_signal(&steps.scope, Signal::confirms_provisioning);
    // Shared with `configure` on this task only. A `Cell` here would make the
    // spawned session future `!Send`.
    let applied = AtomicBool::new(false);

    let configure = configure(session, &applied);
    tokio::pin!(configure);
    loop {
        tokio::select! {
            biased;
            done = &mut configure => {
                done?;
                break;
            }
            early = settled.next_match() => {
                let signal = early.and_then(|o| o.signal).ok_or_else(|| steps.interrupted())?;
                if applied.load(Ordering::Relaxed) {
                    session.advance(Phase::AwaitingConfirmation);
                    return Ok(Confirmation { signal, settled });
                }
                if signal == Signal::Disconnected {
                    return Err(CoreError::LinkLost);
                }
                debug!(?signal, "ignoring confirmation signal before configuration was applied");
            }
        }
    }

    session.advance(Phase::AwaitingConfirmation);
    let signal = confirm(steps, &mut settled).await?;
    Ok(Confirmation { signal, settled })
}

async fn configure(session: &Session, applied: &AtomicBool) -> Result<(), CoreError> {
    let steps = &session.steps;
    let timings = &steps.timings;
    let request = &session.request;

    session.advance(Phase::Negotiating);
    if session.negotiate {
        steps.negotiate().await?;
    } else {
        steps.note(LogLevel::Info, "Skipping security negotiation");
    }

    session.advance(Phase::ConfiguringNetwork);
    steps.note(
        LogLevel::Info,
        format!("Sending network configuration for \"{}\"", request.ssid),
    );
    steps.link.issue(Command::ConfigureNetwork {
        ssid: request.ssid.clone(),
        secret: request.secret.clone(),
    })?;
    if request.broker.is_none() {
        applied.store(true, Ordering::Relaxed);
    }
    tokio::time::sleep(timings.network_settle).await;
    steps.probe()?;
    tokio::time::sleep(timings.probe_settle).await;

    session.advance(Phase::ConfiguringBroker);
    let Some(broker) = &request.broker else {
        steps.note(LogLevel::Info, "No broker configured, skipping broker settings");
        return Ok(());
    };

    steps.note(
        LogLevel::Info,
        format!("Sending broker configuration {}:{}", broker.host, broker.port),
    );
    let writes = [
        (ConfigKey::BrokerHost, broker.host.clone()),
        (ConfigKey::BrokerPort, broker.port.to_string()),
        (ConfigKey::Apply, "0".to_owned()),
    ];
    for (key, value) in writes {
        steps.link.issue(Command::PostCustomData { key, value })?;
        if key == ConfigKey::Apply {
            applied.store(true, Ordering::Relaxed);
        }
        tokio::time::sleep(timings.command_pacing).await;
    }
    steps.note(LogLevel::Success, "Configuration applied");
    tokio::time::sleep(timings.broker_settle).await;
    Ok(())
}

/// Poll the peer until it confirms or the window closes.
async fn confirm(steps: &Steps, settled: &mut Expectation) -> Result<Signal, CoreError> {
    let timings = &steps.timings;
    let started = Instant::now();
    let deadline = tokio::time::sleep(timings.confirm_deadline);
    tokio::pin!(deadline);
    let mut ticker = tokio::time::interval(timings.confirm_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            hit = settled.next_match() => {
                return hit.and_then(|o| o.signal).ok_or_else(|| steps.interrupted());
            }
            () = &mut deadline => {
                return settled
                    .try_match()
                    .and_then(|o| o.signal)
                    .ok_or_else(|| CoreError::timeout("confirmation", timings.confirm_deadline));
            }
            _ = ticker.tick() => {
                let elapsed = started.elapsed().as_secs();
                steps.note(LogLevel::Info, format!("Checking status ({elapsed}s)..."));
                steps.probe()?;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeouts_surface_as_stage_reasons() {
        let err = CoreError::timeout("connection", Duration::from_secs(15));
        assert_eq!(failure_reason(&err), "connection timeout");
        assert_eq!(failure_reason(&CoreError::LinkLost), "Peer disconnected before confirmation");
    }
}
