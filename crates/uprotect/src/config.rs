//! CLI configuration -- thin wrapper around `uprotect_config`.
//!
//! Adds resolution that respects `GlobalOpts` flag overrides
//! (--controller, --username, --insecure, --timeout).

use std::time::Duration;

use uprotect_config::{Defaults, Profile};
use uprotect_core::{AuthCredentials, ControllerConfig, TlsVerification};

use crate::cli::GlobalOpts;
use crate::error::CliError;

pub use uprotect_config::{Config, config_path, load_config_or_default, save_config};

/// Resolve the active profile name from CLI flags and config.
pub fn active_profile_name(global: &GlobalOpts, config: &Config) -> String {
    global
        .profile
        .clone()
        .or_else(|| config.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

/// Build a `ControllerConfig` from the config file, profile, and flags.
pub fn build_controller_config(global: &GlobalOpts) -> Result<ControllerConfig, CliError> {
    let cfg = load_config_or_default();
    let profile_name = active_profile_name(global, &cfg);

    if let Some(profile) = cfg.profiles.get(&profile_name) {
        return resolve_profile(profile, &profile_name, &cfg.defaults, global);
    }

    // An explicitly named profile must exist.
    if global.profile.is_some() {
        let mut available: Vec<_> = cfg.profiles.keys().cloned().collect();
        available.sort();
        return Err(CliError::ProfileNotFound {
            name: profile_name,
            available: if available.is_empty() {
                "(none)".into()
            } else {
                available.join(", ")
            },
        });
    }

    // No profile: build from flags / env alone.
    if global.controller.is_none() {
        return Err(CliError::NoConfig {
            path: config_path().display().to_string(),
        });
    }
    let adhoc = Profile {
        controller: String::new(),
        ..Profile::default()
    };
    resolve_profile(&adhoc, &profile_name, &cfg.defaults, global)
}

/// Translate a `Profile` + global flags into a `ControllerConfig`.
///
/// Flag overrides take priority over profile values.
pub fn resolve_profile(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
    global: &GlobalOpts,
) -> Result<ControllerConfig, CliError> {
    let url_str = global.controller.as_deref().unwrap_or(&profile.controller);
    let url = uprotect_config::parse_controller_url(url_str)?;

    let username = global
        .username
        .clone()
        .or_else(|| profile.username.clone())
        .ok_or_else(|| CliError::NoCredentials {
            profile: profile_name.into(),
        })?;
    let password = uprotect_config::resolve_password(profile, profile_name)?;

    let tls = if global.insecure {
        TlsVerification::DangerAcceptInvalid
    } else {
        uprotect_config::tls_for(profile, defaults)
    };

    let timeout = global
        .timeout
        .or(profile.timeout)
        .unwrap_or(defaults.timeout);

    let mut config = ControllerConfig::new(url, Some(AuthCredentials { username, password }));
    config.tls = tls;
    config.timeout = Duration::from_secs(timeout);
    config.init_timeout = Duration::from_secs(defaults.init_timeout.max(timeout));
    config.websocket_enabled = profile.websocket.unwrap_or(true);
    Ok(config)
}
