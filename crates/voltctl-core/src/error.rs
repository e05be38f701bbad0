//! Unified error handling for voltctl-core
//!
//! Errors here are the failures that happen *before* an operation has changed
//! anything on the cluster: bad options, addresses that do not resolve to a
//! member, or not being able to reach the cluster at all. Once a mutating call
//! has been issued, results are reported as an
//! [`OperationOutcome`](crate::operations::OperationOutcome) instead.
//!
//! # Example
//!
//! ```rust
//! use voltctl_core::{CoreError, UsageError};
//!
//! let err: CoreError = UsageError::NonPositiveTimeout.into();
//! assert!(err.is_usage());
//! assert!(!err.is_connection());
//! ```

use crate::address::AddressError;
use crate::client::CallError;
use crate::config::ConfigError;
use crate::topology::TopologyError;
use thiserror::Error;

/// Invalid options, detected before any remote call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UsageError {
    #[error("timeout must be greater than zero")]
    NonPositiveTimeout,

    #[error("--{first} and --{second} cannot be used together")]
    ConflictingFlags {
        first: &'static str,
        second: &'static str,
    },

    #[error("{0}")]
    Invalid(String),
}

/// The cluster was reached but the requested target cannot be acted on safely
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("host {hostname}:{port} not found in cluster")]
    HostNotFound { hostname: String, port: u16 },

    #[error("the entire cluster is being stopped, use shutdown instead")]
    EntireCluster,

    #[error("target host {hostname} (id {host_id}) is the connected host")]
    TargetIsConnection { host_id: u32, hostname: String },

    #[error("system information returned no hosts")]
    EmptyCluster,
}

/// Core error type
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Usage error: {0}")]
    Usage(#[from] UsageError),

    #[error("Invalid address: {0}")]
    Address(#[from] AddressError),

    #[error("{0}")]
    Resolution(#[from] ResolutionError),

    #[error("Unexpected system information: {0}")]
    Topology(#[from] TopologyError),

    #[error("{0}")]
    Call(#[from] CallError),

    /// A non-mutating query such as `@SystemInformation` failed
    #[error("{procedure} failed: {message}")]
    Query { procedure: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

impl CoreError {
    /// Returns true for mistakes in the invocation itself
    #[must_use]
    pub fn is_usage(&self) -> bool {
        matches!(self, CoreError::Usage(_) | CoreError::Address(_))
    }

    /// Returns true when the target could not be resolved to a safe member
    #[must_use]
    pub fn is_resolution(&self) -> bool {
        matches!(self, CoreError::Resolution(_))
    }

    /// Returns true when the cluster could not be reached or the link dropped
    #[must_use]
    pub fn is_connection(&self) -> bool {
        matches!(
            self,
            CoreError::Call(CallError::Connection { .. } | CallError::ConnectionLost { .. })
        )
    }

    /// Returns true if this is a timeout error
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, CoreError::Call(e) if e.is_timeout())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_errors() {
        let err: CoreError = UsageError::ConflictingFlags {
            first: "force",
            second: "save",
        }
        .into();
        assert!(err.is_usage());
        assert_eq!(
            err.to_string(),
            "Usage error: --force and --save cannot be used together"
        );

        let err: CoreError = AddressError::Empty.into();
        assert!(err.is_usage());
        assert!(!err.is_resolution());
    }

    #[test]
    fn test_resolution_errors() {
        let err: CoreError = ResolutionError::EntireCluster.into();
        assert!(err.is_resolution());
        assert!(!err.is_usage());
        assert!(err.to_string().contains("use shutdown instead"));
    }

    #[test]
    fn test_call_error_classification() {
        let err: CoreError = CallError::Connection {
            endpoint: "db1:8080".into(),
            message: "refused".into(),
        }
        .into();
        assert!(err.is_connection());
        assert!(!err.is_timeout());

        let err: CoreError = CallError::Timeout {
            procedure: "@Statistics".into(),
        }
        .into();
        assert!(err.is_timeout());
        assert!(!err.is_connection());
    }
}
