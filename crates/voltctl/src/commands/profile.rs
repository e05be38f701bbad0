//! Profile management command implementations

use crate::cli::{OutputFormat, ProfileCommands};
use crate::connection::ConnectionManager;
use crate::error::VoltCtlError;
use crate::output;
use anyhow::Context;
use colored::Colorize;
use serde::Serialize;
use std::io::{self, BufRead, Write};
use tracing::{debug, trace};
use voltctl_core::config::{Config, CredentialStore, Profile};

/// Handle profile management commands
pub async fn handle_profile_command(
    profile_cmd: &ProfileCommands,
    conn_mgr: &ConnectionManager,
    output_format: OutputFormat,
) -> Result<(), VoltCtlError> {
    use ProfileCommands::*;

    match profile_cmd {
        List => handle_list(conn_mgr, output_format).await,
        Path => handle_path(conn_mgr, output_format).await,
        Show { name } => handle_show(conn_mgr, name, output_format).await,
        Set {
            name,
            hosts,
            username,
            password,
            tls,
            insecure,
            ca_cert,
            poll_interval,
            #[cfg(feature = "secure-storage")]
            use_keyring,
        } => {
            let request = SetRequest {
                hosts,
                username: username.as_deref(),
                password: password.as_deref(),
                tls: *tls,
                insecure: *insecure,
                ca_cert: ca_cert.as_deref(),
                poll_interval: *poll_interval,
                #[cfg(feature = "secure-storage")]
                use_keyring: *use_keyring,
                #[cfg(not(feature = "secure-storage"))]
                use_keyring: false,
            };
            handle_set(conn_mgr, name, request).await
        }
        Remove { name, yes } => handle_remove(conn_mgr, name, *yes).await,
        Default { name } => handle_default(conn_mgr, name).await,
    }
}

/// Profile as shown to the user; stored passwords are never printed
#[derive(Debug, Serialize)]
struct ProfileView<'a> {
    name: &'a str,
    is_default: bool,
    hosts: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    username: Option<&'a str>,
    password: &'static str,
    tls: bool,
    insecure: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    ca_cert: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    poll_interval_secs: Option<u64>,
}

impl<'a> ProfileView<'a> {
    fn new(config: &Config, name: &'a str, profile: &'a Profile) -> Self {
        let password = match profile.password.as_deref() {
            None => "none",
            Some(p) if CredentialStore::is_keyring_reference(p) => "keyring",
            Some(_) => "stored",
        };
        Self {
            name,
            is_default: config.default_profile.as_deref() == Some(name),
            hosts: &profile.hosts,
            username: profile.username.as_deref(),
            password,
            tls: profile.tls,
            insecure: profile.insecure,
            ca_cert: profile.ca_cert.as_deref(),
            poll_interval_secs: profile.poll_interval_secs,
        }
    }
}

async fn handle_list(
    conn_mgr: &ConnectionManager,
    output_format: OutputFormat,
) -> Result<(), VoltCtlError> {
    debug!("Listing all configured profiles");
    let profiles: Vec<ProfileView<'_>> = conn_mgr
        .config
        .list_profiles()
        .into_iter()
        .map(|(name, profile)| ProfileView::new(&conn_mgr.config, name, profile))
        .collect();
    trace!("Found {} profiles", profiles.len());

    if let Some(format) = output_format.structured() {
        output::print_output(&profiles, format)?;
        return Ok(());
    }

    if profiles.is_empty() {
        println!("No profiles configured.");
        println!("Use 'voltctl profile set <name> --hosts <hosts>' to create one.");
        return Ok(());
    }

    for view in &profiles {
        let marker = if view.is_default {
            "*".green().bold().to_string()
        } else {
            " ".to_string()
        };
        println!("{} {:<16} {}", marker, view.name, view.hosts.join(","));
    }
    Ok(())
}

async fn handle_path(
    conn_mgr: &ConnectionManager,
    output_format: OutputFormat,
) -> Result<(), VoltCtlError> {
    let config_path = match &conn_mgr.config_path {
        Some(path) => path.clone(),
        None => Config::config_path()?,
    };

    if let Some(format) = output_format.structured() {
        let output_data = serde_json::json!({
            "config_path": config_path.to_string_lossy(),
        });
        output::print_output(&output_data, format)?;
    } else {
        println!("{}", config_path.display());
    }
    Ok(())
}

async fn handle_show(
    conn_mgr: &ConnectionManager,
    name: &str,
    output_format: OutputFormat,
) -> Result<(), VoltCtlError> {
    let profile = conn_mgr
        .config
        .profiles
        .get(name)
        .ok_or_else(|| VoltCtlError::ProfileNotFound { name: name.into() })?;
    let view = ProfileView::new(&conn_mgr.config, name, profile);

    if let Some(format) = output_format.structured() {
        output::print_output(&view, format)?;
        return Ok(());
    }

    println!("Profile: {}{}", name, if view.is_default { " (default)" } else { "" });
    println!("Hosts: {}", view.hosts.join(", "));
    if let Some(username) = view.username {
        println!("Username: {}", username);
    }
    println!("Password: {}", view.password);
    println!("TLS: {}", view.tls);
    if view.insecure {
        println!("Insecure: true");
    }
    if let Some(ca_cert) = view.ca_cert {
        println!("CA certificate: {}", ca_cert);
    }
    if let Some(secs) = view.poll_interval_secs {
        println!("Poll interval: {}s", secs);
    }
    Ok(())
}

struct SetRequest<'a> {
    hosts: &'a [String],
    username: Option<&'a str>,
    password: Option<&'a str>,
    tls: bool,
    insecure: bool,
    ca_cert: Option<&'a str>,
    poll_interval: Option<u64>,
    use_keyring: bool,
}

async fn handle_set(
    conn_mgr: &ConnectionManager,
    name: &str,
    request: SetRequest<'_>,
) -> Result<(), VoltCtlError> {
    debug!("Setting profile: {}", name);

    // Reject bad host lists before anything is written
    voltctl_core::parse_endpoints(request.hosts, None, 1, None)
        .map_err(voltctl_core::CoreError::from)?;
    if request.poll_interval == Some(0) {
        return Err(VoltCtlError::InvalidInput {
            message: "poll interval must be greater than zero".to_string(),
        });
    }

    let password = match (request.username, request.password) {
        (_, Some(p)) => Some(p.to_string()),
        (Some(_), None) => {
            let pass = rpassword::prompt_password("Enter password (press Enter for none): ")
                .context("Failed to read password")?;
            (!pass.is_empty()).then_some(pass)
        }
        (None, None) => None,
    };

    let store = if request.use_keyring {
        CredentialStore::new()
    } else {
        CredentialStore::plaintext()
    };
    let username = request
        .username
        .map(|u| store.store_credential(&format!("{}-username", name), u))
        .transpose()?;
    let password = password
        .map(|p| store.store_credential(&format!("{}-password", name), &p))
        .transpose()?;

    let profile = Profile {
        hosts: request.hosts.to_vec(),
        username,
        password,
        tls: request.tls,
        insecure: request.insecure,
        ca_cert: request.ca_cert.map(String::from),
        poll_interval_secs: request.poll_interval,
    };

    let existed = conn_mgr.config.profiles.contains_key(name);
    let mut conn_mgr = conn_mgr.clone();
    conn_mgr.config.set_profile(name.to_string(), profile);
    conn_mgr.save_config()?;

    if existed {
        println!("Profile '{}' updated.", name);
    } else {
        println!("Profile '{}' created.", name);
    }
    if request.use_keyring {
        println!("Credentials stored in {}.", store.storage_backend());
    }
    Ok(())
}

async fn handle_remove(
    conn_mgr: &ConnectionManager,
    name: &str,
    yes: bool,
) -> Result<(), VoltCtlError> {
    debug!("Removing profile: {}", name);

    if !conn_mgr.config.profiles.contains_key(name) {
        return Err(VoltCtlError::ProfileNotFound { name: name.into() });
    }
    let is_default = conn_mgr.config.default_profile.as_deref() == Some(name);
    if is_default {
        println!("Warning: '{}' is the default profile.", name);
    }

    if !yes && !confirm(&format!("Are you sure you want to remove profile '{}'?", name))? {
        println!("Profile removal cancelled.");
        return Ok(());
    }

    let mut conn_mgr = conn_mgr.clone();
    if let Some(removed) = conn_mgr.config.remove_profile(name) {
        let store = CredentialStore::new();
        for value in removed.username.iter().chain(removed.password.iter()) {
            if let Err(e) = store.delete_credential(value) {
                debug!("Could not delete keyring entry: {}", e);
            }
        }
    }
    conn_mgr.save_config()?;

    if is_default {
        println!("Default profile cleared.");
    }
    println!("Profile '{}' removed successfully.", name);
    Ok(())
}

async fn handle_default(conn_mgr: &ConnectionManager, name: &str) -> Result<(), VoltCtlError> {
    debug!("Setting default profile: {}", name);

    if !conn_mgr.config.profiles.contains_key(name) {
        return Err(VoltCtlError::ProfileNotFound { name: name.into() });
    }

    let mut conn_mgr = conn_mgr.clone();
    conn_mgr.config.default_profile = Some(name.to_string());
    conn_mgr.save_config()?;

    println!("Default profile set to '{}'.", name);
    Ok(())
}

/// Ask a yes/no question on stdin; anything but "y" or "yes" means no
fn confirm(question: &str) -> Result<bool, VoltCtlError> {
    print!("{} (y/N): ", question);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().lock().read_line(&mut input)?;
    let input = input.trim().to_lowercase();
    Ok(input == "y" || input == "yes")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_view_hides_password() {
        let mut config = Config::default();
        let profile = Profile {
            hosts: vec!["db1".into()],
            username: Some("admin".into()),
            password: Some("hunter2".into()),
            ..Default::default()
        };
        config.set_profile("prod".into(), profile.clone());
        config.default_profile = Some("prod".into());

        let view = ProfileView::new(&config, "prod", &profile);
        let json = serde_json::to_string(&view).unwrap();
        assert!(!json.contains("hunter2"));
        assert!(json.contains("\"password\":\"stored\""));
        assert!(view.is_default);

        let keyring = Profile {
            password: Some("keyring:prod-password".into()),
            ..profile
        };
        assert_eq!(ProfileView::new(&config, "prod", &keyring).password, "keyring");
    }
}
