//! Provision command handler: build the request, drive a session, follow
//! its progress log until it winds down.

use std::io::IsTerminal;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;

use blufi_config::ConfigError;
use blufi_core::{DiscoveredDevice, LogEntry, Phase, ProvisioningRequest, Provisioner};

use crate::cli::{OutputFormat, ProvisionArgs};
use crate::config::{self, Profile};
use crate::error::CliError;
use crate::output;

use super::{Context, util};

// ── Request ──────────────────────────────────────────────────────────

/// Profile values with command-line overrides applied.
fn merged_profile(base: Option<&Profile>, args: &ProvisionArgs) -> Profile {
    let mut profile = base.cloned().unwrap_or_default();
    if let Some(ssid) = &args.ssid {
        profile.ssid = Some(ssid.clone());
    }
    if let Some(env) = &args.secret_env {
        profile.secret_env = Some(env.clone());
    }
    if let Some(host) = &args.broker_host {
        profile.broker_host = Some(host.clone());
        profile.broker_port = args.broker_port;
    }
    profile
}

fn build_request(ctx: &Context<'_>, args: &ProvisionArgs) -> Result<ProvisioningRequest, CliError> {
    if ctx.global.profile.is_some() && ctx.profile.is_none() {
        let cfg = config::load_config_or_default();
        return Err(config::profile_not_found(ctx.profile_name, &cfg));
    }
    if let Some(env) = &args.secret_env {
        if std::env::var_os(env).is_none() {
            return Err(CliError::Validation {
                field: "secret-env".into(),
                reason: format!("environment variable {env} is not set"),
            });
        }
    }

    let mut profile = merged_profile(ctx.profile, args);
    match config::profile_to_request(&profile, ctx.profile_name) {
        Err(ConfigError::NoSecret { .. }) if std::io::stdin().is_terminal() => {
            let ssid = profile.ssid.clone().unwrap_or_default();
            let secret = rpassword::prompt_password(format!("Wi-Fi secret for {ssid}: "))?;
            profile.secret = Some(secret);
            Ok(config::profile_to_request(&profile, ctx.profile_name)?)
        }
        other => Ok(other?),
    }
}

// ── Progress ─────────────────────────────────────────────────────────

/// Spinner plus the progress log, printed above it as it grows.
struct Progress {
    bar: ProgressBar,
    show_log: bool,
    color: bool,
    printed: usize,
}

impl Progress {
    fn new(ctx: &Context<'_>) -> Result<Self, CliError> {
        let show_log = !ctx.global.quiet && matches!(ctx.global.output, OutputFormat::Table);
        let bar = if show_log {
            let bar = ProgressBar::new_spinner();
            bar.set_style(
                ProgressStyle::with_template("{spinner:.cyan} {msg}")
                    .map_err(|e| CliError::Render(e.to_string()))?,
            );
            bar.enable_steady_tick(Duration::from_millis(120));
            bar
        } else {
            ProgressBar::hidden()
        };
        Ok(Self {
            bar,
            show_log,
            color: output::should_color(&ctx.global.color),
            printed: 0,
        })
    }

    fn phase(&self, phase: &Phase) {
        self.bar.set_message(phase.to_string());
    }

    /// Print entries not shown yet. A shorter log means it was reset.
    fn log(&mut self, entries: &[std::sync::Arc<LogEntry>]) {
        if entries.len() < self.printed {
            self.printed = 0;
        }
        for entry in entries.iter().skip(self.printed) {
            let line = output::log_line(entry, self.color);
            if !self.show_log {
                continue;
            }
            if self.bar.is_hidden() {
                eprintln!("{line}");
            } else {
                self.bar.println(line);
            }
        }
        self.printed = entries.len();
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

/// Follow the running session until it winds down. The first Ctrl-C
/// cancels it.
async fn follow(provisioner: &Provisioner, progress: &mut Progress) -> Phase {
    let mut phase = provisioner.watch_phase();
    let mut log = provisioner.log_stream();
    let mut released = provisioner.watch_peer_released();
    progress.phase(&phase.borrow_and_update());
    progress.log(&log.latest());

    let finish = provisioner.finish();
    tokio::pin!(finish);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut cancelling = false;

    let outcome = loop {
        tokio::select! {
            outcome = &mut finish => break outcome,
            _ = &mut ctrl_c, if !cancelling => {
                cancelling = true;
                progress.bar.set_message("Cancelling");
                provisioner.cancel().await;
            }
            Ok(()) = phase.changed() => progress.phase(&phase.borrow_and_update()),
            Some(entries) = log.changed() => progress.log(&entries),
            Ok(()) = released.changed() => {
                if *released.borrow_and_update() {
                    progress.bar.set_message("Device left the link, finishing up");
                }
            }
        }
    };
    progress.log(&provisioner.log());
    progress.finish();
    outcome
}

// ── Report ───────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ProvisionReport {
    session: String,
    address: String,
    name: String,
    ssid: String,
    #[serde(flatten)]
    phase: Phase,
    uid: Option<String>,
    peer_released: bool,
}

fn detail(report: &ProvisionReport) -> String {
    let uid = report.uid.as_deref().unwrap_or("(not reported)");
    format!(
        "Provisioned {} ({}) onto {}\n  Device UID:    {uid}\n  Link released: {}",
        report.name,
        report.address,
        report.ssid,
        if report.peer_released { "yes" } else { "no" },
    )
}

fn into_result(phase: Phase) -> Result<(), CliError> {
    match phase {
        Phase::Succeeded => Ok(()),
        Phase::Cancelled => Err(CliError::Cancelled),
        Phase::Failed(reason) => Err(CliError::ProvisioningFailed { reason }),
        other => Err(CliError::ProvisioningFailed {
            reason: format!("session stopped while {other}"),
        }),
    }
}

// ── Handler ──────────────────────────────────────────────────────────

pub async fn handle(ctx: &Context<'_>, args: &ProvisionArgs) -> Result<(), CliError> {
    let request = build_request(ctx, args)?;
    let device: DiscoveredDevice = util::find_device(ctx.provisioner, &args.target).await?;

    let prompt = format!(
        "Provision {} ({}) onto {}?",
        device.display_name(),
        device.address,
        request.ssid
    );
    if !util::confirm(&prompt, ctx.global.yes)? {
        return Err(CliError::Cancelled);
    }

    let ssid = request.ssid.clone();
    let mut progress = Progress::new(ctx)?;
    let session = ctx.provisioner.start_provisioning(request).await?;
    let phase = follow(ctx.provisioner, &mut progress).await;

    let report = ProvisionReport {
        session: session.to_string(),
        address: device.address.clone(),
        name: device.display_name().to_owned(),
        ssid,
        phase: phase.clone(),
        uid: ctx.provisioner.uid(),
        peer_released: ctx.provisioner.peer_released(),
    };
    if phase == Phase::Succeeded || !matches!(ctx.global.output, OutputFormat::Table) {
        let out = output::render_single(&ctx.global.output, &report, detail, |r| {
            r.uid.clone().unwrap_or_default()
        })?;
        output::print_output(&out, ctx.global.quiet);
    }
    into_result(phase)
}
