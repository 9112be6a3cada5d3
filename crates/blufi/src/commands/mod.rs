//! Command dispatch: bridges CLI args -> provisioner calls -> output formatting.

pub mod config_cmd;
pub mod discover;
pub mod networks;
pub mod provision;
pub mod util;

use blufi_config::Profile;
use blufi_core::Provisioner;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Everything a radio-bound handler needs.
pub struct Context<'a> {
    pub provisioner: &'a Provisioner,
    pub profile_name: &'a str,
    /// `None` when the config has no profile of that name.
    pub profile: Option<&'a Profile>,
    pub global: &'a GlobalOpts,
}

/// Dispatch a radio-bound command to the appropriate handler.
pub async fn dispatch(cmd: Command, ctx: &Context<'_>) -> Result<(), CliError> {
    match cmd {
        Command::Discover(args) => discover::handle(ctx, &args).await,
        Command::Networks(args) => networks::handle(ctx, &args).await,
        Command::Provision(args) => provision::handle(ctx, &args).await,
        // Config and Completions are handled before dispatch
        Command::Config(_) | Command::Completions(_) => unreachable!(),
    }
}
