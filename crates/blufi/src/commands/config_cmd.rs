//! Config subcommand handlers.

use dialoguer::{Confirm, Input, Select};
use secrecy::SecretString;

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::config::{self, Profile};
use crate::error::CliError;
use crate::output;

const MASK: &str = "********";

/// Map a dialoguer / interactive I/O failure into CliError.
fn prompt_err(e: impl std::fmt::Display) -> CliError {
    CliError::Validation {
        field: "interactive".into(),
        reason: format!("prompt failed: {e}"),
    }
}

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Init => init(),

        ConfigCommand::Show => {
            let mut cfg = config::load_config_or_default();
            for profile in cfg.profiles.values_mut() {
                if profile.secret.is_some() {
                    profile.secret = Some(MASK.into());
                }
            }
            let out = output::render_single(
                &global.output,
                &cfg,
                |c| serde_yaml::to_string(c).unwrap_or_else(|_| format!("{c:#?}")),
                |c| c.default_profile.clone().unwrap_or_default(),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ConfigCommand::Path => {
            println!("{}", config::config_path().display());
            Ok(())
        }

        ConfigCommand::SetSecret { profile } => {
            let cfg = config::load_config_or_default();
            let profile_name = profile.unwrap_or_else(|| config::active_profile_name(global, &cfg));
            if !cfg.profiles.contains_key(&profile_name) {
                return Err(config::profile_not_found(&profile_name, &cfg));
            }

            let secret = rpassword::prompt_password("Wi-Fi secret: ").map_err(prompt_err)?;
            if secret.is_empty() {
                return Err(CliError::Validation {
                    field: "secret".into(),
                    reason: "value cannot be empty".into(),
                });
            }
            config::store_secret(&profile_name, &SecretString::from(secret))?;

            eprintln!("✓ Wi-Fi secret stored in system keyring for profile '{profile_name}'");
            Ok(())
        }
    }
}

// ── Init: interactive wizard ─────────────────────────────────────────

fn init() -> Result<(), CliError> {
    let config_path = config::config_path();
    eprintln!("blufi configuration wizard");
    eprintln!("   Config path: {}\n", config_path.display());

    let mut cfg = config::load_config_or_default();

    let profile_name: String = Input::new()
        .with_prompt("Profile name")
        .default("default".into())
        .interact_text()
        .map_err(prompt_err)?;

    let ssid: String = Input::new()
        .with_prompt("Wi-Fi network (SSID)")
        .interact_text()
        .map_err(prompt_err)?;

    let secret = rpassword::prompt_password("Wi-Fi secret (empty to skip): ").map_err(prompt_err)?;
    let plaintext = if secret.is_empty() {
        None
    } else {
        let store_choices = &[
            "Store in system keyring (recommended)",
            "Save to config file (plaintext)",
        ];
        let store_selection = Select::new()
            .with_prompt("Where to store the secret?")
            .items(store_choices)
            .default(0)
            .interact()
            .map_err(prompt_err)?;
        if store_selection == 0 {
            config::store_secret(&profile_name, &SecretString::from(secret))?;
            eprintln!("   ✓ Secret stored in system keyring");
            None
        } else {
            Some(secret)
        }
    };

    let broker_host: String = Input::new()
        .with_prompt("MQTT broker host (empty to skip)")
        .allow_empty(true)
        .interact_text()
        .map_err(prompt_err)?;
    let broker_port = if broker_host.is_empty() {
        None
    } else {
        let port: u16 = Input::new()
            .with_prompt("MQTT broker port")
            .default(1883)
            .interact_text()
            .map_err(prompt_err)?;
        Some(port)
    };

    let negotiate = Confirm::new()
        .with_prompt("Negotiate security before configuring?")
        .default(true)
        .interact()
        .map_err(prompt_err)?;

    cfg.profiles.insert(
        profile_name.clone(),
        Profile {
            ssid: Some(ssid),
            secret: plaintext,
            broker_host: Some(broker_host).filter(|h| !h.is_empty()),
            broker_port,
            negotiate_security: (!negotiate).then_some(false),
            ..Profile::default()
        },
    );
    cfg.default_profile = Some(profile_name.clone());
    config::save_config(&cfg)?;

    eprintln!("\n✓ Configuration written to {}", config_path.display());
    eprintln!("  Active profile: {profile_name}");
    eprintln!("\n  Try it: blufi --simulate provision --device 24:0A:C4:00:00:01");
    Ok(())
}
