//! Clap derive structures for the `blufi` CLI.
//!
//! Defines the complete command tree, global flags, and shared types.

use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// blufi -- provision headless devices over Bluetooth LE
#[derive(Debug, Parser)]
#[command(
    name = "blufi",
    version,
    about = "Provision headless devices onto Wi-Fi over Bluetooth LE",
    long_about = "Discovers Blufi devices, sends them Wi-Fi and MQTT broker settings,\n\
        and confirms they joined the network before rebooting.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Provisioning profile to use
    #[arg(long, short = 'p', env = "BLUFI_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "BLUFI_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Skip confirmation prompts
    #[arg(long, short = 'y', global = true)]
    pub yes: bool,

    #[command(flatten)]
    pub sim: SimOpts,
}

/// In-process simulated peer, for dry runs without a radio.
#[derive(Debug, Args)]
#[command(next_help_heading = "Simulation")]
pub struct SimOpts {
    /// Talk to simulated devices instead of a radio adapter
    #[arg(long, env = "BLUFI_SIMULATE", global = true)]
    pub simulate: bool,

    /// Number of simulated devices in range
    #[arg(long, default_value = "1", global = true)]
    pub sim_devices: u8,

    /// Device identifier the simulated devices report
    #[arg(long, default_value = "9876543210", global = true)]
    pub sim_uid: String,

    /// How simulated devices answer security negotiation
    #[arg(long, default_value = "succeed", global = true)]
    pub sim_negotiation: SimNegotiation,

    /// Simulated devices never accept a connection
    #[arg(long, global = true)]
    pub sim_unreachable: bool,

    /// Simulated devices never join the network
    #[arg(long, global = true)]
    pub sim_no_join: bool,
}

// ── Enums ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum SimNegotiation {
    Succeed,
    Fail,
    Silent,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Discover provisionable devices nearby
    #[command(alias = "scan", alias = "d")]
    Discover(DiscoverArgs),

    /// List the Wi-Fi networks a device can see
    #[command(alias = "net", alias = "n")]
    Networks(NetworksArgs),

    /// Send Wi-Fi and broker settings to a device
    #[command(alias = "p")]
    Provision(ProvisionArgs),

    /// Manage CLI configuration and profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Discovery ────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct DiscoverArgs {
    /// How long to listen for advertisements (e.g. "3s", "500ms")
    #[arg(long, short = 't', default_value = "3s", value_parser = parse_duration)]
    pub duration: Duration,

    /// Only show devices whose name or address contains this text
    #[arg(long, short = 'f')]
    pub filter: Option<String>,
}

/// Shared target-device arguments.
#[derive(Debug, Args)]
pub struct DeviceArgs {
    /// Device address (as shown by `blufi discover`)
    #[arg(long, short = 'd')]
    pub device: String,

    /// How long to look for the device before giving up
    #[arg(long, default_value = "5s", value_parser = parse_duration)]
    pub discover_timeout: Duration,
}

#[derive(Debug, Args)]
pub struct NetworksArgs {
    #[command(flatten)]
    pub target: DeviceArgs,
}

// ── Provisioning ─────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ProvisionArgs {
    #[command(flatten)]
    pub target: DeviceArgs,

    /// Wi-Fi network name (overrides profile)
    #[arg(long)]
    pub ssid: Option<String>,

    /// Environment variable holding the Wi-Fi secret (overrides profile)
    #[arg(long)]
    pub secret_env: Option<String>,

    /// MQTT broker host (overrides profile)
    #[arg(long)]
    pub broker_host: Option<String>,

    /// MQTT broker port
    #[arg(long, requires = "broker_host")]
    pub broker_port: Option<u16>,

    /// Skip security negotiation
    #[arg(long)]
    pub no_negotiate: bool,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Create initial config file with guided setup
    Init,

    /// Display current resolved configuration
    Show,

    /// Print the config file location
    Path,

    /// Store a profile's Wi-Fi secret in the system keyring
    SetSecret {
        /// Profile name
        #[arg(long)]
        profile: Option<String>,
    },
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}

fn parse_duration(raw: &str) -> Result<Duration, String> {
    humantime::parse_duration(raw).map_err(|e| e.to_string())
}
