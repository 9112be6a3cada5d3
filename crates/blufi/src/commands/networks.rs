//! Network scan command handler.

use std::sync::Arc;

use tabled::Tabled;

use blufi_core::WifiNetwork;

use crate::cli::NetworksArgs;
use crate::error::CliError;
use crate::output;

use super::{Context, util};

#[derive(Tabled)]
struct NetworkRow {
    #[tabled(rename = "SSID")]
    ssid: String,
    #[tabled(rename = "Signal")]
    rssi: String,
}

fn network_row(n: &WifiNetwork) -> NetworkRow {
    NetworkRow {
        ssid: n.ssid.clone(),
        rssi: format!("{} dBm", n.rssi),
    }
}

pub async fn handle(ctx: &Context<'_>, args: &NetworksArgs) -> Result<(), CliError> {
    let device = util::find_device(ctx.provisioner, &args.target).await?;
    tracing::info!(address = %device.address, "scanning networks");

    let scan = ctx.provisioner.scan_networks();
    tokio::pin!(scan);
    let networks = tokio::select! {
        result = &mut scan => result?,
        _ = tokio::signal::ctrl_c() => {
            ctx.provisioner.cancel().await;
            scan.await?
        }
    };

    let out = output::render_list(
        &ctx.global.output,
        &networks,
        |n: &Arc<WifiNetwork>| network_row(n),
        |n| n.ssid.clone(),
    )?;
    output::print_output(&out, ctx.global.quiet);
    Ok(())
}
