mod cli;
mod commands;
mod config;
mod error;
mod output;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_tracing(cli.global.verbose);

    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

fn init_tracing(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        // Config commands never touch the radio
        Command::Config(args) => commands::config_cmd::handle(args, &cli.global),

        Command::Completions(args) => {
            use clap::CommandFactory;
            use clap_complete::generate;

            let mut cmd = Cli::command();
            generate(args.shell, &mut cmd, "blufi", &mut std::io::stdout());
            Ok(())
        }

        cmd => {
            let cfg = config::load_config_or_default();
            let profile_name = config::active_profile_name(&cli.global, &cfg);
            let profile = cfg.profiles.get(&profile_name);

            let mut core_config = config::provisioner_config(profile);
            if matches!(&cmd, Command::Provision(args) if args.no_negotiate) {
                core_config.negotiate_security = false;
            }

            let transport = commands::util::transport(&cli.global.sim)?;
            let provisioner = blufi_core::Provisioner::new(core_config, transport);

            tracing::debug!(command = ?cmd, profile = %profile_name, "dispatching command");
            let ctx = commands::Context {
                provisioner: &provisioner,
                profile_name: &profile_name,
                profile,
                global: &cli.global,
            };
            let result = commands::dispatch(cmd, &ctx).await;
            provisioner.shutdown().await;
            result
        }
    }
}
