//! Config subcommand handlers.

use dialoguer::{Confirm, Input, Select};

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::config::{self, Config};
use crate::error::CliError;
use crate::output;

use uprotect_config::{ConfigError, Profile};

// ── Helpers ─────────────────────────────────────────────────────────

/// Render the config as TOML with every stored password masked.
fn redacted_toml(cfg: &Config) -> Result<String, CliError> {
    let mut doc = toml::Value::try_from(cfg).map_err(ConfigError::Serialization)?;
    let profiles = doc
        .get_mut("profiles")
        .and_then(toml::Value::as_table_mut)
        .into_iter()
        .flat_map(|t| t.iter_mut().map(|(_, v)| v));
    for profile in profiles {
        if let Some(password) = profile.get_mut("password") {
            *password = toml::Value::String("****".into());
        }
    }
    Ok(toml::to_string_pretty(&doc).map_err(ConfigError::Serialization)?)
}

fn prompt_err(e: impl std::fmt::Display) -> CliError {
    CliError::Validation {
        field: "prompt".into(),
        reason: e.to_string(),
    }
}

/// Offer to store the password in the keyring.
///
/// Returns `Some(password)` if the user chose plaintext, `None` if stored.
fn prompt_password_storage(profile_name: &str, password: String) -> Result<Option<String>, CliError> {
    let use_keyring = Select::new()
        .with_prompt("Password storage")
        .items(&["OS keyring", "config file (plaintext)"])
        .default(0)
        .interact()
        .map_err(prompt_err)?
        == 0;

    if use_keyring {
        uprotect_config::store_password(profile_name, &password)?;
        eprintln!("   ✓ password stored in system keyring");
        Ok(None)
    } else {
        Ok(Some(password))
    }
}

fn init() -> Result<(), CliError> {
    let path = config::config_path();
    eprintln!("Writing NVR profile to {}\n", path.display());

    let profile_name: String = Input::new()
        .with_prompt("Profile")
        .default("default".into())
        .interact_text()
        .map_err(prompt_err)?;

    let controller: String = Input::new()
        .with_prompt("NVR console URL")
        .default("https://unvr.local".into())
        .interact_text()
        .map_err(prompt_err)?;
    uprotect_config::parse_controller_url(&controller)?;

    let username: String = Input::new()
        .with_prompt("Username (local console account)")
        .interact_text()
        .map_err(prompt_err)?;

    let password = rpassword::prompt_password("Password: ").map_err(prompt_err)?;
    if username.is_empty() || password.is_empty() {
        return Err(CliError::Validation {
            field: "username/password".into(),
            reason: "both are required".into(),
        });
    }
    let password = prompt_password_storage(&profile_name, password)?;

    let insecure = Confirm::new()
        .with_prompt("Accept the console's self-signed certificate?")
        .default(true)
        .interact()
        .map_err(prompt_err)?;

    let mut cfg = config::load_config_or_default();
    cfg.profiles.insert(
        profile_name.clone(),
        Profile {
            controller,
            username: Some(username),
            password,
            insecure: Some(insecure),
            ..Profile::default()
        },
    );
    if cfg.profiles.len() == 1 {
        cfg.default_profile = Some(profile_name.clone());
    }
    config::save_config(&cfg)?;

    eprintln!("\n   ✓ profile '{profile_name}' saved to {}", path.display());
    eprintln!("   Try: uprotect --profile {profile_name} bootstrap");
    Ok(())
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(args: &ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match &args.command {
        ConfigCommand::Init => init(),

        ConfigCommand::Show => {
            let cfg = config::load_config_or_default();
            output::print_output(redacted_toml(&cfg)?.trim_end(), global.quiet);
            Ok(())
        }

        ConfigCommand::Path => {
            output::print_output(&config::config_path().display().to_string(), global.quiet);
            Ok(())
        }

        ConfigCommand::Profiles => {
            let cfg = config::load_config_or_default();
            let active = config::active_profile_name(global, &cfg);
            let mut names: Vec<_> = cfg.profiles.keys().collect();
            names.sort();
            let listing = names
                .into_iter()
                .map(|name| {
                    let marker = if *name == active { "*" } else { " " };
                    format!("{marker} {name}\t{}", cfg.profiles[name].controller)
                })
                .collect::<Vec<_>>()
                .join("\n");
            output::print_output(&listing, global.quiet);
            Ok(())
        }

        ConfigCommand::Use { name } => {
            let mut cfg = config::load_config_or_default();
            if !cfg.profiles.contains_key(name) {
                let mut available: Vec<_> = cfg.profiles.keys().cloned().collect();
                available.sort();
                return Err(CliError::ProfileNotFound {
                    name: name.clone(),
                    available: available.join(", "),
                });
            }
            cfg.default_profile = Some(name.clone());
            config::save_config(&cfg)?;
            eprintln!("Default profile set to '{name}'");
            Ok(())
        }

        ConfigCommand::SetPassword => {
            let cfg = config::load_config_or_default();
            let profile_name = config::active_profile_name(global, &cfg);
            let password = rpassword::prompt_password(format!("Password for '{profile_name}': "))
                .map_err(prompt_err)?;
            if password.is_empty() {
                return Err(CliError::Validation {
                    field: "password".into(),
                    reason: "password cannot be empty".into(),
                });
            }
            uprotect_config::store_password(&profile_name, &password)?;
            eprintln!("Password for '{profile_name}' stored in system keyring");
            Ok(())
        }
    }
}
