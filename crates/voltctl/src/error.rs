//! Error types for voltctl
//!
//! Everything that stops a command before it produces an
//! [`OperationOutcome`](voltctl_core::OperationOutcome) ends up here, together
//! with hints for the operator.

use colored::Colorize;
use thiserror::Error;
use voltctl_core::config::ConfigError;
use voltctl_core::{CallError, CoreError};

/// Exit code for invalid invocations
pub const EXIT_USAGE: i32 = 2;

/// Cargo-style diagnostic formatter for CLI errors.
///
/// Produces structured output like:
/// ```text
/// error: host db9:3021 not found in cluster
///
///   tip: check the member's hostname and internal port
/// ```
pub struct CliDiagnostic {
    message: String,
    detail: Option<String>,
    tips: Vec<(String, Vec<String>)>,
}

impl CliDiagnostic {
    /// Start a new error diagnostic with the given message.
    pub fn error(message: &str) -> Self {
        Self {
            message: message.to_string(),
            detail: None,
            tips: Vec::new(),
        }
    }

    /// Add a detail line below the error message.
    pub fn detail(mut self, text: &str) -> Self {
        self.detail = Some(text.to_string());
        self
    }

    /// Add a tip with optional example commands.
    pub fn tip(mut self, description: &str, commands: &[&str]) -> Self {
        self.tips.push((
            description.to_string(),
            commands.iter().map(|s| s.to_string()).collect(),
        ));
        self
    }

    /// Print the diagnostic to stderr with colored formatting.
    pub fn print(&self) {
        eprint!("{}{}", "error".red().bold(), ": ".bold());
        eprintln!("{}", self.message);

        if let Some(detail) = &self.detail {
            eprintln!("  {}", detail);
        }

        for (description, commands) in &self.tips {
            eprintln!();
            eprint!("  {}{}", "tip".yellow().bold(), ": ".bold());
            eprintln!("{}", description);
            for cmd in commands {
                eprintln!("      {}", cmd);
            }
        }
    }
}

/// Main error type for the voltctl application
#[derive(Error, Debug)]
pub enum VoltCtlError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Profile '{name}' not found")]
    ProfileNotFound { name: String },

    #[error("No cluster hosts given")]
    NoHostsConfigured,

    #[error("{message}")]
    Usage { message: String },

    #[error("{message}")]
    HostResolution { message: String },

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("Connection error: {message}")]
    ConnectionError { message: String },

    #[error("Timeout: {message}")]
    Timeout { message: String },

    #[error("API error: {message}")]
    ApiError { message: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Output formatting error: {message}")]
    OutputError { message: String },
}

/// Result type for voltctl commands
pub type Result<T> = std::result::Result<T, VoltCtlError>;

impl VoltCtlError {
    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            VoltCtlError::Usage { .. } | VoltCtlError::InvalidInput { .. } => EXIT_USAGE,
            _ => voltctl_core::operations::EXIT_FAILURE,
        }
    }

    /// Get helpful suggestions for resolving this error
    pub fn suggestions(&self) -> Vec<String> {
        match self {
            VoltCtlError::ProfileNotFound { name } => vec![
                "List available profiles: voltctl profile list".to_string(),
                format!("Create profile '{}': voltctl profile set {} --hosts <hosts>", name, name),
            ],
            VoltCtlError::NoHostsConfigured => vec![
                "Pass hosts directly: voltctl <command> --host db1,db2".to_string(),
                "Or set VOLTCTL_HOST, or save a profile: voltctl profile set <name> --hosts db1,db2".to_string(),
            ],
            VoltCtlError::Usage { .. } => {
                vec!["Check the command syntax: voltctl <command> --help".to_string()]
            }
            VoltCtlError::HostResolution { message } if message.contains("not found") => vec![
                "Check the member's hostname and internal port (default 3021)".to_string(),
            ],
            VoltCtlError::HostResolution { message } if message.contains("entire cluster") => {
                vec!["To stop every member use: voltctl shutdown".to_string()]
            }
            VoltCtlError::AuthenticationFailed { .. } => vec![
                "Check your credentials: voltctl profile show <profile>".to_string(),
                "Verify VOLTCTL_USER and VOLTCTL_PASSWORD if they are set".to_string(),
            ],
            VoltCtlError::ConnectionError { message }
                if message.contains("certificate") || message.contains("TLS") =>
            {
                vec![
                    "Try --insecure for self-signed certificates".to_string(),
                    "Or point --ca-cert at the cluster's CA certificate".to_string(),
                ]
            }
            VoltCtlError::ConnectionError { .. } => vec![
                "Check that the hosts are reachable and serve the JSON API (port 8080)".to_string(),
                "Verify the host list: voltctl profile show <profile>".to_string(),
            ],
            _ => vec![],
        }
    }

    /// Print a cargo-style diagnostic to stderr using colored formatting.
    pub fn print_diagnostic(&self) {
        let mut diag = CliDiagnostic::error(&format!("{}", self));

        if let VoltCtlError::HostResolution { message } = self
            && message.contains("connected host")
        {
            diag = diag.detail("The stop request has to be sent through another member.");
        }

        for suggestion in self.suggestions() {
            diag = diag.tip(&suggestion, &[]);
        }

        diag.print();
    }
}

impl From<CoreError> for VoltCtlError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Usage(_) | CoreError::Address(_) => VoltCtlError::Usage {
                message: err.to_string(),
            },
            CoreError::Resolution(e) => VoltCtlError::HostResolution {
                message: e.to_string(),
            },
            CoreError::Call(CallError::Authentication(message)) => {
                VoltCtlError::AuthenticationFailed { message }
            }
            CoreError::Call(e @ (CallError::Connection { .. } | CallError::ConnectionLost { .. })) => {
                VoltCtlError::ConnectionError {
                    message: e.to_string(),
                }
            }
            CoreError::Call(e @ CallError::Timeout { .. }) => VoltCtlError::Timeout {
                message: e.to_string(),
            },
            CoreError::Config(e) => e.into(),
            CoreError::Call(_) | CoreError::Topology(_) | CoreError::Query { .. } => {
                VoltCtlError::ApiError {
                    message: err.to_string(),
                }
            }
        }
    }
}

impl From<ConfigError> for VoltCtlError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::ProfileNotFound { name } => VoltCtlError::ProfileNotFound { name },
            other => VoltCtlError::Configuration(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for VoltCtlError {
    fn from(err: serde_json::Error) -> Self {
        VoltCtlError::OutputError {
            message: format!("JSON error: {}", err),
        }
    }
}

impl From<std::io::Error> for VoltCtlError {
    fn from(err: std::io::Error) -> Self {
        VoltCtlError::OutputError {
            message: format!("IO error: {}", err),
        }
    }
}

impl From<anyhow::Error> for VoltCtlError {
    fn from(err: anyhow::Error) -> Self {
        VoltCtlError::Configuration(format!("{:#}", err))
    }
}
