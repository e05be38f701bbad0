//! Connection profiles for voltctl
//!
// Allow nested config module - this is intentional for the config subsystem

#![allow(clippy::module_inception)]
//!
//! # Features
//!
//! - Multiple named profiles, one per cluster
//! - Password storage in the OS keyring (optional `secure-storage` feature)
//! - Environment variable expansion in config files
//! - Platform-specific config file locations

pub mod config;
pub mod credential;
pub mod error;

pub use config::{Config, Credentials, ENV_HOST, ENV_PASSWORD, ENV_USER, Profile};
pub use credential::{CredentialStorage, CredentialStore};
pub use error::{ConfigError, Result};
