//! Connection management for cluster admin sessions
//!
//! Settings are merged with the precedence CLI flags > environment >
//! profile. An explicit `--config-file` switches the environment layer off.

use crate::cli::ConnectionArgs;
use crate::error::{Result as CliResult, VoltCtlError};
use anyhow::Context;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, trace};
use voltctl_core::address::{Endpoint, parse_endpoints};
use voltctl_core::client::{ClientSettings, DEFAULT_HTTP_PORT, JsonApiClient, JsonApiConnector};
use voltctl_core::config::{Config, Credentials, ENV_HOST, ENV_PASSWORD, ENV_USER, Profile};
use voltctl_core::ProcedureCaller;
use voltctl_core::operations::drain::DEFAULT_POLL_INTERVAL;

/// Connection manager for opening authenticated cluster sessions
#[derive(Clone)]
pub struct ConnectionManager {
    pub config: Config,
    pub config_path: Option<PathBuf>,
}

/// Where a command connects and how
#[derive(Debug, Clone)]
pub struct ResolvedConnection {
    pub profile: Option<String>,
    pub hosts: Vec<Endpoint>,
    pub settings: ClientSettings,
    pub poll_interval: Duration,
}

/// An open admin session: the first host that answered plus a connector for
/// reaching the other members
pub struct Session {
    pub client: JsonApiClient,
    pub connector: JsonApiConnector,
    pub poll_interval: Duration,
}

impl ConnectionManager {
    /// Create a new connection manager with a custom config path
    pub fn with_config_path(config: Config, config_path: Option<PathBuf>) -> Self {
        Self {
            config,
            config_path,
        }
    }

    /// Save the configuration to the appropriate location
    pub fn save_config(&self) -> CliResult<()> {
        if let Some(ref path) = self.config_path {
            self.config
                .save_to_path(path)
                .context("Failed to save configuration")?;
        } else {
            self.config.save().context("Failed to save configuration")?;
        }
        Ok(())
    }

    /// Merge flags, environment and profile into connection settings.
    ///
    /// When --config-file is explicitly specified, environment variables are
    /// ignored so the file alone (plus flags) decides where to connect.
    pub fn resolve(
        &self,
        profile_name: Option<&str>,
        args: &ConnectionArgs,
    ) -> CliResult<ResolvedConnection> {
        let use_env_vars = self.config_path.is_none();
        debug!(
            "Config path: {:?}, use_env_vars: {}",
            self.config_path, use_env_vars
        );
        if !use_env_vars {
            info!("--config-file specified explicitly, ignoring environment variables");
        }

        let resolved_name = self.config.resolve_profile(profile_name)?;
        let profile = resolved_name
            .as_deref()
            .and_then(|name| self.config.profiles.get(name));
        trace!("Resolved profile: {:?}", resolved_name);

        let hosts = resolve_hosts(args, profile, use_env_vars)?;
        let credentials = resolve_credentials(args, profile, use_env_vars)?;

        let settings = ClientSettings {
            username: credentials.username,
            password: credentials.password,
            tls: args.tls || profile.is_some_and(|p| p.tls),
            insecure: args.insecure || profile.is_some_and(|p| p.insecure),
            ca_cert: args
                .ca_cert
                .clone()
                .or_else(|| profile.and_then(|p| p.ca_cert.clone()))
                .map(PathBuf::from),
            request_timeout: None,
        };

        Ok(ResolvedConnection {
            profile: resolved_name,
            hosts,
            settings,
            poll_interval: profile
                .and_then(Profile::poll_interval)
                .unwrap_or(DEFAULT_POLL_INTERVAL),
        })
    }

    /// Connect to the first host that answers
    pub async fn open_session(
        &self,
        profile_name: Option<&str>,
        args: &ConnectionArgs,
    ) -> CliResult<Session> {
        let resolved = self.resolve(profile_name, args)?;
        debug!(
            hosts = resolved.hosts.len(),
            profile = ?resolved.profile,
            "opening admin session"
        );

        let client = JsonApiClient::connect_any(&resolved.hosts, &resolved.settings)
            .await
            .map_err(voltctl_core::CoreError::from)?;
        info!("Connected to {}", client.endpoint());

        Ok(Session {
            client,
            connector: JsonApiConnector::new(resolved.settings),
            poll_interval: resolved.poll_interval,
        })
    }
}

fn resolve_hosts(
    args: &ConnectionArgs,
    profile: Option<&Profile>,
    use_env_vars: bool,
) -> CliResult<Vec<Endpoint>> {
    let specs: Vec<String> = if let Some(hosts) = &args.host {
        vec![hosts.clone()]
    } else if let Some(hosts) = use_env_vars.then(|| std::env::var(ENV_HOST).ok()).flatten() {
        debug!("Using hosts from {}", ENV_HOST);
        vec![hosts]
    } else if let Some(profile) = profile.filter(|p| !p.hosts.is_empty()) {
        profile.hosts.clone()
    } else {
        return Err(VoltCtlError::NoHostsConfigured);
    };

    Ok(parse_endpoints(&specs, Some(DEFAULT_HTTP_PORT), 1, None)
        .map_err(voltctl_core::CoreError::from)?)
}

fn resolve_credentials(
    args: &ConnectionArgs,
    profile: Option<&Profile>,
    use_env_vars: bool,
) -> CliResult<Credentials> {
    let mut credentials = match profile {
        Some(profile) => profile.resolve_credentials(use_env_vars)?,
        None if use_env_vars => Credentials {
            username: std::env::var(ENV_USER).ok(),
            password: std::env::var(ENV_PASSWORD).ok(),
        },
        None => Credentials::default(),
    };

    if let Some(user) = &args.user {
        credentials.username = Some(user.clone());
    }
    if let Some(password) = &args.password {
        credentials.password = Some(password.clone());
    }

    if credentials.username.is_some()
        && credentials.password.is_none()
        && std::io::stdin().is_terminal()
    {
        let password =
            rpassword::prompt_password("Password: ").context("Failed to read password")?;
        credentials.password = Some(password);
    }

    Ok(credentials)
}
