//! CLI structure and command definitions
//!
//! Cluster operations (`stop`, `pause`, `resume`, `shutdown`) take their
//! connection settings from flags, the environment or a saved profile.
//! `profile` manages those saved profiles.

use clap::{Args, Parser, Subcommand};
use voltctl_core::operations::{DEFAULT_TIMEOUT_SECS, DEFAULT_WAITLIMIT_SECS};

/// VoltDB cluster administration CLI
#[derive(Parser, Debug)]
#[command(name = "voltctl")]
#[command(version, about = "VoltDB cluster administration CLI")]
#[command(long_about = "
VoltDB cluster administration CLI

Stops individual members, pauses and resumes the cluster, and runs or cancels
a cluster shutdown. Connection settings come from command-line flags, then
VOLTCTL_HOST / VOLTCTL_USER / VOLTCTL_PASSWORD, then the selected profile.

EXAMPLES:
    # Save a profile for a three-node cluster
    voltctl profile set prod --hosts db1,db2,db3 --username admin

    # Gracefully stop one member, connecting through another
    voltctl stop db3

    # Pause and wait until export and DR traffic has drained
    voltctl pause --wait --timeout 300

    # Resume a paused cluster
    voltctl resume --host db1:8080

    # Shut down after taking a final snapshot
    voltctl shutdown --save

    # Get JSON output for scripting
    voltctl stop db3 -o json

For more help on a specific command, run:
    voltctl <command> --help
")]
pub struct Cli {
    /// Profile to use for this command
    #[arg(long, short, global = true, env = "VOLTCTL_PROFILE")]
    pub profile: Option<String>,

    /// Path to alternate configuration file
    #[arg(long, global = true, env = "VOLTCTL_CONFIG_FILE")]
    pub config_file: Option<String>,

    /// Output format
    #[arg(long, short = 'o', global = true, value_enum, default_value = "auto")]
    pub output: OutputFormat,

    /// Enable verbose logging
    #[arg(long, short, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text
    Auto,
    /// JSON output
    Json,
    /// YAML output
    Yaml,
    /// Human-readable table format
    Table,
}

/// How to reach the cluster
#[derive(Args, Debug, Clone, Default)]
pub struct ConnectionArgs {
    /// Comma-separated cluster hosts as host[:port] (port defaults to 8080)
    #[arg(long, short = 'H', value_name = "HOSTS")]
    pub host: Option<String>,

    /// Username for an authenticated cluster
    #[arg(long, short = 'u', visible_alias = "username")]
    pub user: Option<String>,

    /// Password (prompted for when a user is given without one)
    #[arg(long)]
    pub password: Option<String>,

    /// Use HTTPS for the JSON API
    #[arg(long)]
    pub tls: bool,

    /// Accept invalid TLS certificates
    #[arg(long)]
    pub insecure: bool,

    /// Path to a PEM CA certificate for TLS verification
    #[arg(long, value_name = "PATH")]
    pub ca_cert: Option<String>,
}

/// Top-level commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Stop a single member of the cluster
    #[command(after_help = "EXAMPLES:
    # Drain the member's work and stop it
    voltctl stop db3

    # Target port is matched against the internal port (default 3021)
    voltctl stop db3:3022

    # Stop immediately without waiting
    voltctl stop db3 --force

    # Allow up to five minutes for the member to hand off its work
    voltctl stop db3 --timeout 300 --waitlimit 120
")]
    Stop {
        /// Member to stop as host[:port]
        target_host: String,

        /// Stop immediately, without waiting for in-flight work
        #[arg(long, short)]
        force: bool,

        /// Seconds to wait for the member to become ready to stop
        #[arg(long, short, default_value_t = DEFAULT_TIMEOUT_SECS)]
        timeout: u32,

        /// Seconds the server waits for each drain step
        #[arg(long, short, default_value_t = DEFAULT_WAITLIMIT_SECS)]
        waitlimit: u32,

        #[command(flatten)]
        connection: ConnectionArgs,
    },

    /// Pause the cluster, optionally waiting for it to go quiet
    #[command(after_help = "EXAMPLES:
    # Enter admin mode and return
    voltctl pause

    # Also quiesce and wait for export and DR traffic to drain
    voltctl pause --wait --timeout 600
")]
    Pause {
        /// Quiesce and wait for export and DR traffic to drain
        #[arg(long)]
        wait: bool,

        /// Seconds to wait for drain
        #[arg(long, short, default_value_t = DEFAULT_TIMEOUT_SECS)]
        timeout: u32,

        /// Seconds between statistics polls while waiting
        #[arg(long, value_name = "SECS")]
        poll_interval: Option<u64>,

        #[command(flatten)]
        connection: ConnectionArgs,
    },

    /// Resume a paused cluster
    Resume {
        #[command(flatten)]
        connection: ConnectionArgs,
    },

    /// Shut down the cluster, or cancel a shutdown in progress
    #[command(after_help = "EXAMPLES:
    # Drain and shut down
    voltctl shutdown

    # Take a final snapshot first
    voltctl shutdown --save

    # Shut down immediately
    voltctl shutdown --force

    # Do not wait for stuck export or DR work
    voltctl shutdown --xforce

    # Cancel a graceful shutdown that is still draining
    voltctl shutdown --cancel
")]
    Shutdown {
        /// Shut down immediately, without draining
        #[arg(long, short)]
        force: bool,

        /// Take a final snapshot before shutting down
        #[arg(long, short = 'b')]
        save: bool,

        /// Cancel a shutdown in progress
        #[arg(long, short)]
        cancel: bool,

        /// Do not wait for export or DR work to drain
        #[arg(long, short = 'x')]
        xforce: bool,

        /// Seconds to wait for the cluster to drain
        #[arg(long, short, default_value_t = DEFAULT_TIMEOUT_SECS)]
        timeout: u32,

        /// Seconds the server waits for each drain step
        #[arg(long, short, default_value_t = DEFAULT_WAITLIMIT_SECS)]
        waitlimit: u32,

        #[command(flatten)]
        connection: ConnectionArgs,
    },

    /// Profile management
    #[command(subcommand, visible_alias = "prof", visible_alias = "pr")]
    Profile(ProfileCommands),

    /// Version information
    #[command(visible_alias = "ver")]
    Version,

    /// Generate shell completions
    #[command(visible_alias = "comp")]
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Supported shells for completion generation
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
#[allow(clippy::enum_variant_names)]
pub enum Shell {
    /// Bourne Again Shell
    Bash,
    /// Z Shell
    Zsh,
    /// Friendly Interactive Shell
    Fish,
    /// PowerShell
    #[value(name = "powershell", alias = "power-shell")]
    PowerShell,
    /// Elvish
    Elvish,
}

/// Profile management commands
#[derive(Subcommand, Debug)]
pub enum ProfileCommands {
    /// List all configured profiles
    #[command(visible_alias = "ls", visible_alias = "l")]
    List,

    /// Show the path to the configuration file
    Path,

    /// Show details of a specific profile
    #[command(visible_alias = "sh", visible_alias = "get")]
    Show {
        /// Profile name to show
        name: String,
    },

    /// Set or create a profile
    #[command(visible_alias = "add", visible_alias = "create")]
    #[command(after_help = "EXAMPLES:
    # Unauthenticated local cluster
    voltctl profile set local --hosts localhost

    # Authenticated cluster (password will be prompted)
    voltctl profile set prod --hosts db1,db2,db3:8443 --username admin --tls

    # Self-signed certificates
    voltctl profile set staging --hosts staging1 --tls --insecure

    # Poll drain statistics every five seconds
    voltctl profile set prod --hosts db1 --poll-interval 5
")]
    Set {
        /// Profile name
        name: String,

        /// Cluster hosts as host[:port], comma-separated or repeated
        #[arg(long, required = true, value_delimiter = ',')]
        hosts: Vec<String>,

        /// Username
        #[arg(long, visible_alias = "user")]
        username: Option<String>,

        /// Password (prompted for when a username is given without one)
        #[arg(long)]
        password: Option<String>,

        /// Use HTTPS for the JSON API
        #[arg(long)]
        tls: bool,

        /// Accept invalid TLS certificates
        #[arg(long)]
        insecure: bool,

        /// Path to a PEM CA certificate for TLS verification
        #[arg(long)]
        ca_cert: Option<String>,

        /// Seconds between statistics polls for `pause --wait`
        #[arg(long, value_name = "SECS")]
        poll_interval: Option<u64>,

        /// Store credentials in OS keyring instead of config file
        #[cfg(feature = "secure-storage")]
        #[arg(long)]
        use_keyring: bool,
    },

    /// Remove a profile
    #[command(visible_alias = "rm", visible_alias = "del", visible_alias = "delete")]
    Remove {
        /// Profile name to remove
        name: String,

        /// Skip the confirmation prompt
        #[arg(long, short)]
        yes: bool,
    },

    /// Set the default profile
    #[command(visible_alias = "def")]
    Default {
        /// Profile name to use when --profile is not given
        name: String,
    },
}
