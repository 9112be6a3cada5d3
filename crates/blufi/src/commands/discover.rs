//! Discovery command handler.

use std::sync::Arc;

use tabled::Tabled;

use blufi_core::DiscoveredDevice;

use crate::cli::{DiscoverArgs, OutputFormat};
use crate::error::CliError;
use crate::output;

use super::Context;

#[derive(Tabled)]
struct DeviceRow {
    #[tabled(rename = "Address")]
    address: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "RSSI")]
    rssi: String,
}

fn device_row(d: &DiscoveredDevice) -> DeviceRow {
    DeviceRow {
        address: d.address.clone(),
        name: d.display_name().to_owned(),
        rssi: format!("{} dBm", d.rssi),
    }
}

pub async fn handle(ctx: &Context<'_>, args: &DiscoverArgs) -> Result<(), CliError> {
    let provisioner = ctx.provisioner;
    provisioner.start_discovery()?;
    tokio::time::sleep(args.duration).await;
    if let Err(e) = provisioner.stop_discovery() {
        tracing::warn!(error = %e, "could not stop discovery");
    }

    let devices = provisioner.filter_devices(args.filter.as_deref().unwrap_or_default());
    if devices.is_empty() && matches!(ctx.global.output, OutputFormat::Table) {
        if !ctx.global.quiet {
            eprintln!("No devices found in {}", humantime::format_duration(args.duration));
        }
        return Ok(());
    }

    let out = output::render_list(
        &ctx.global.output,
        &devices,
        |d: &Arc<DiscoveredDevice>| device_row(d),
        |d| d.address.clone(),
    )?;
    output::print_output(&out, ctx.global.quiet);
    Ok(())
}
