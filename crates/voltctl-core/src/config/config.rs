//! Configuration management for voltctl
//!
//! Handles configuration loading from files and environment variables.
//! Configuration is stored in TOML format with support for multiple named
//! connection profiles.

#[cfg(target_os = "macos")]
use directories::BaseDirs;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::credential::CredentialStore;
use super::error::{ConfigError, Result};

/// Overrides the profile's host list
pub const ENV_HOST: &str = "VOLTCTL_HOST";
/// Overrides the profile's username
pub const ENV_USER: &str = "VOLTCTL_USER";
/// Overrides the profile's password
pub const ENV_PASSWORD: &str = "VOLTCTL_PASSWORD";

/// Main configuration structure
#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq)]
pub struct Config {
    /// Profile used when none is named on the command line
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_profile: Option<String>,
    /// Map of profile name -> profile configuration
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

/// Connection settings for one cluster
#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq)]
pub struct Profile {
    /// `host[:port]` addresses of the HTTP interface, tried in order
    #[serde(default)]
    pub hosts: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Plaintext or `keyring:<key>` reference
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default)]
    pub tls: bool,
    /// Skip certificate verification
    #[serde(default)]
    pub insecure: bool,
    /// Path to a PEM root certificate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_cert: Option<String>,
    /// Seconds between drain polls
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll_interval_secs: Option<u64>,
}

/// Username and password after keyring and environment resolution
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Profile {
    /// Check if this profile has a stored password
    pub fn has_password(&self) -> bool {
        self.password.is_some()
    }

    pub fn poll_interval(&self) -> Option<Duration> {
        self.poll_interval_secs.map(Duration::from_secs)
    }

    /// Resolve the username and password, following keyring references.
    ///
    /// With `env_overrides`, `VOLTCTL_USER` and `VOLTCTL_PASSWORD` take
    /// precedence over the stored values.
    pub fn resolve_credentials(&self, env_overrides: bool) -> Result<Credentials> {
        let store = CredentialStore::new();
        let resolve = |value: Option<&String>, env_var: &str, what: &str| -> Result<Option<String>> {
            let env_var = env_overrides.then_some(env_var);
            if let Some(var) = env_var
                && let Ok(env_value) = std::env::var(var)
            {
                return Ok(Some(env_value));
            }
            value
                .map(|v| {
                    store.get_credential(v, None).map_err(|e| {
                        ConfigError::CredentialError(format!("Failed to resolve {}: {}", what, e))
                    })
                })
                .transpose()
        };

        Ok(Credentials {
            username: resolve(self.username.as_ref(), ENV_USER, "username")?,
            password: resolve(self.password.as_ref(), ENV_PASSWORD, "password")?,
        })
    }
}

impl Config {
    /// Resolve which profile to use.
    ///
    /// An explicitly named profile must exist. Otherwise the configured
    /// default is used, then the alphabetically first profile. `None` means
    /// no profiles are configured at all.
    pub fn resolve_profile(&self, explicit_profile: Option<&str>) -> Result<Option<String>> {
        if let Some(name) = explicit_profile {
            if !self.profiles.contains_key(name) {
                return Err(ConfigError::ProfileNotFound {
                    name: name.to_string(),
                });
            }
            return Ok(Some(name.to_string()));
        }

        if let Some(ref default) = self.default_profile {
            if !self.profiles.contains_key(default) {
                return Err(ConfigError::ProfileNotFound {
                    name: default.clone(),
                });
            }
            return Ok(Some(default.clone()));
        }

        Ok(self.list_profiles().first().map(|(name, _)| (*name).clone()))
    }

    /// Load configuration from the standard location
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            return Ok(Config::default());
        }

        let content = fs::read_to_string(config_path).map_err(|e| ConfigError::LoadError {
            path: config_path.display().to_string(),
            source: e,
        })?;

        // Expand environment variables in the config content
        let expanded_content = Self::expand_env_vars(&content);

        let config: Config = toml::from_str(&expanded_content)?;

        Ok(config)
    }

    /// Save configuration to the standard location
    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;
        self.save_to_path(&config_path)
    }

    /// Save configuration to a specific path
    pub fn save_to_path(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::SaveError {
                path: parent.display().to_string(),
                source: e,
            })?;
        }

        let content = toml::to_string_pretty(self)?;

        fs::write(config_path, content).map_err(|e| ConfigError::SaveError {
            path: config_path.display().to_string(),
            source: e,
        })?;

        Ok(())
    }

    /// Set or update a profile
    pub fn set_profile(&mut self, name: String, profile: Profile) {
        self.profiles.insert(name, profile);
    }

    /// Remove a profile by name, clearing the default if it pointed there
    pub fn remove_profile(&mut self, name: &str) -> Option<Profile> {
        if self.default_profile.as_deref() == Some(name) {
            self.default_profile = None;
        }
        self.profiles.remove(name)
    }

    /// List all profiles sorted by name
    pub fn list_profiles(&self) -> Vec<(&String, &Profile)> {
        let mut profiles: Vec<_> = self.profiles.iter().collect();
        profiles.sort_by_key(|(name, _)| *name);
        profiles
    }

    /// Get the path to the configuration file
    ///
    /// On macOS, `~/.config/voltctl/config.toml` is preferred when it (or its
    /// directory) exists, falling back to
    /// `~/Library/Application Support/com.voltdb.voltctl/config.toml`.
    ///
    /// On Linux: ~/.config/voltctl/config.toml
    /// On Windows: %APPDATA%\voltdb\voltctl\config\config.toml
    pub fn config_path() -> Result<PathBuf> {
        #[cfg(target_os = "macos")]
        {
            if let Some(base_dirs) = BaseDirs::new() {
                let linux_style_path = base_dirs
                    .home_dir()
                    .join(".config")
                    .join("voltctl")
                    .join("config.toml");

                if linux_style_path.exists()
                    || linux_style_path
                        .parent()
                        .map(|p| p.exists())
                        .unwrap_or(false)
                {
                    return Ok(linux_style_path);
                }
            }
        }

        let proj_dirs =
            ProjectDirs::from("com", "voltdb", "voltctl").ok_or(ConfigError::ConfigDirError)?;

        Ok(proj_dirs.config_dir().join("config.toml"))
    }

    /// Expand environment variables in configuration content
    ///
    /// Supports ${VAR} and ${VAR:-default} syntax. Unset variables without a
    /// default are left as-is so that unused profiles do not fail to load.
    ///
    /// Example:
    /// ```toml
    /// hosts = ["${VOLT_PROD_HOST:-db1.example.com:8080}"]
    /// password = "${VOLT_PROD_PASSWORD}"
    /// ```
    fn expand_env_vars(content: &str) -> String {
        let expanded =
            shellexpand::env_with_context_no_errors(content, |var| std::env::var(var).ok());
        expanded.to_string()
    }
}
