use clap::{CommandFactory, Parser};
use clap_complete::{generate, shells};
use tracing::{debug, error, info, trace, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use voltctl_core::{Interrupt, OperationOutcome};
use voltctl_core::config::Config;
use voltctl_core::operations::shutdown::ShutdownOptions;
use voltctl_core::operations::stop::StopOptions;

mod cli;
mod commands;
mod connection;
mod error;
mod output;

use cli::{Cli, Commands, ConnectionArgs};
use commands::operations::{
    OperationContext, handle_pause, handle_resume, handle_shutdown, handle_stop,
};
use connection::ConnectionManager;
use error::VoltCtlError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing based on verbosity level
    init_tracing(cli.verbose);

    let code = match run(&cli).await {
        Ok(code) => code,
        Err(e) => {
            e.print_diagnostic();
            e.exit_code()
        }
    };
    let _ = std::io::Write::flush(&mut std::io::stdout());
    std::process::exit(code);
}

async fn run(cli: &Cli) -> Result<i32, VoltCtlError> {
    // Load configuration from specified path or default location
    let (config, config_path) = if let Some(config_file) = &cli.config_file {
        let path = std::path::PathBuf::from(config_file);
        debug!("Loading config from explicit path: {:?}", path);
        let config = Config::load_from_path(&path)?;
        (config, Some(path))
    } else {
        debug!("Loading config from default location");
        (Config::load()?, None)
    };
    let conn_mgr = ConnectionManager::with_config_path(config, config_path);

    let (handle, interrupt) = Interrupt::new();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping at the next safe point");
            handle.trigger();
        }
    });

    execute_command(cli, &conn_mgr, &interrupt).await
}

fn init_tracing(verbose: u8) {
    // Check for RUST_LOG env var first, then fall back to verbosity flag
    let filter = if std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::EnvFilter::from_default_env()
    } else {
        let level = match verbose {
            0 => "voltctl=warn,voltctl_core=warn",
            1 => "voltctl=info,voltctl_core=info",
            2 => "voltctl=debug,voltctl_core=debug",
            _ => "voltctl=trace,voltctl_core=trace",
        };
        tracing_subscriber::EnvFilter::new(level)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(false)
                .with_thread_names(false)
                .compact(),
        )
        .init();

    debug!("Tracing initialized with verbosity level: {}", verbose);
}

/// Run one command and return the process exit code
async fn execute_command(
    cli: &Cli,
    conn_mgr: &ConnectionManager,
    interrupt: &Interrupt,
) -> Result<i32, VoltCtlError> {
    trace!("Executing command: {:?}", cli.command);
    info!("Command: {}", format_command(&cli.command));

    let start = std::time::Instant::now();
    let result = match &cli.command {
        Commands::Version => {
            match cli.output.structured() {
                Some(format) => {
                    let output_data = serde_json::json!({
                        "name": env!("CARGO_PKG_NAME"),
                        "version": env!("CARGO_PKG_VERSION"),
                    });
                    output::print_output(&output_data, format)?;
                }
                None => println!("voltctl {}", env!("CARGO_PKG_VERSION")),
            }
            Ok(0)
        }

        Commands::Completions { shell } => {
            generate_completions(*shell);
            Ok(0)
        }

        Commands::Profile(profile_cmd) => {
            commands::profile::handle_profile_command(profile_cmd, conn_mgr, cli.output)
                .await
                .map(|_| 0)
        }

        Commands::Stop {
            target_host,
            force,
            timeout,
            waitlimit,
            connection,
        } => {
            let options = StopOptions {
                target: target_host.clone(),
                force: *force,
                timeout_secs: *timeout,
                waitlimit_secs: *waitlimit,
            };
            let ctx = operation_context(cli, conn_mgr, connection, interrupt);
            report(handle_stop(&ctx, options).await, cli)
        }

        Commands::Pause {
            wait,
            timeout,
            poll_interval,
            connection,
        } => {
            let ctx = operation_context(cli, conn_mgr, connection, interrupt);
            report(handle_pause(&ctx, *wait, *timeout, *poll_interval).await, cli)
        }

        Commands::Resume { connection } => {
            let ctx = operation_context(cli, conn_mgr, connection, interrupt);
            report(handle_resume(&ctx).await, cli)
        }

        Commands::Shutdown {
            force,
            save,
            cancel,
            xforce,
            timeout,
            waitlimit,
            connection,
        } => {
            let options = ShutdownOptions {
                force: *force,
                save: *save,
                cancel: *cancel,
                xforce: *xforce,
                timeout_secs: *timeout,
                waitlimit_secs: *waitlimit,
            };
            let ctx = operation_context(cli, conn_mgr, connection, interrupt);
            report(handle_shutdown(&ctx, options).await, cli)
        }
    };

    let duration = start.elapsed();
    match &result {
        Ok(0) => info!("Command completed successfully in {:?}", duration),
        Ok(code) => info!("Command finished with exit code {} in {:?}", code, duration),
        Err(e) => error!("Command failed after {:?}: {}", duration, e),
    }

    result
}

fn operation_context<'a>(
    cli: &'a Cli,
    conn_mgr: &'a ConnectionManager,
    connection: &'a ConnectionArgs,
    interrupt: &'a Interrupt,
) -> OperationContext<'a> {
    OperationContext {
        conn_mgr,
        profile: cli.profile.as_deref(),
        connection,
        interrupt,
    }
}

/// Print an operation outcome and turn it into the exit code
fn report(
    outcome: Result<OperationOutcome, VoltCtlError>,
    cli: &Cli,
) -> Result<i32, VoltCtlError> {
    let outcome = outcome?;
    output::print_outcome(&outcome, cli.output)?;
    Ok(outcome.exit_code)
}

/// Generate shell completions
fn generate_completions(shell: cli::Shell) {
    let mut cmd = cli::Cli::command();
    let name = cmd.get_name().to_string();

    match shell {
        cli::Shell::Bash => generate(shells::Bash, &mut cmd, name, &mut std::io::stdout()),
        cli::Shell::Zsh => generate(shells::Zsh, &mut cmd, name, &mut std::io::stdout()),
        cli::Shell::Fish => generate(shells::Fish, &mut cmd, name, &mut std::io::stdout()),
        cli::Shell::PowerShell => {
            generate(shells::PowerShell, &mut cmd, name, &mut std::io::stdout())
        }
        cli::Shell::Elvish => generate(shells::Elvish, &mut cmd, name, &mut std::io::stdout()),
    }
}

/// Format command for human-readable logging (without sensitive data)
fn format_command(command: &Commands) -> String {
    match command {
        Commands::Stop {
            target_host, force, ..
        } => {
            if *force {
                format!("stop {} --force", target_host)
            } else {
                format!("stop {}", target_host)
            }
        }
        Commands::Pause { wait: true, .. } => "pause --wait".to_string(),
        Commands::Pause { .. } => "pause".to_string(),
        Commands::Resume { .. } => "resume".to_string(),
        Commands::Shutdown {
            force,
            save,
            cancel,
            xforce,
            ..
        } => {
            let mut parts = vec!["shutdown"];
            for (set, flag) in [
                (*force, "--force"),
                (*save, "--save"),
                (*cancel, "--cancel"),
                (*xforce, "--xforce"),
            ] {
                if set {
                    parts.push(flag);
                }
            }
            parts.join(" ")
        }
        Commands::Profile(cmd) => {
            use cli::ProfileCommands::*;
            match cmd {
                List => "profile list".to_string(),
                Path => "profile path".to_string(),
                Show { name } => format!("profile show {}", name),
                Set { name, .. } => format!("profile set {} [credentials redacted]", name),
                Remove { name, .. } => format!("profile remove {}", name),
                Default { name } => format!("profile default {}", name),
            }
        }
        Commands::Version => "version".to_string(),
        Commands::Completions { shell } => format!("completions {:?}", shell),
    }
}
