//! CLI view of the shared configuration.
//!
//! Loading, saving and secret resolution live in `blufi_config`; this module
//! only adds the flag-aware profile lookup.

pub use blufi_config::{
    Config, Profile, config_path, load_config_or_default, profile_to_request,
    provisioner_config, save_config, store_secret,
};

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// Resolve the active profile name from CLI flags and config.
pub fn active_profile_name(global: &GlobalOpts, config: &Config) -> String {
    global
        .profile
        .clone()
        .or_else(|| config.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

/// `ProfileNotFound` listing what the config does have.
pub fn profile_not_found(name: &str, config: &Config) -> CliError {
    let mut available: Vec<_> = config.profiles.keys().cloned().collect();
    available.sort();
    CliError::ProfileNotFound {
        name: name.into(),
        available: if available.is_empty() {
            "(none)".into()
        } else {
            available.join(", ")
        },
    }
}
