//! Cluster operation commands: stop, pause, resume and shutdown
//!
//! Each handler checks its options before opening a session, so a bad
//! invocation never reaches the network.

use crate::cli::ConnectionArgs;
use crate::connection::ConnectionManager;
use crate::error::VoltCtlError;
use std::time::Duration;
use tracing::{debug, info};
use voltctl_core::operations::pause::{PauseOptions, pause_cluster};
use voltctl_core::operations::progress::{ProgressCallback, ProgressEvent};
use voltctl_core::operations::resume::resume_cluster;
use voltctl_core::operations::shutdown::{ShutdownOptions, shutdown_cluster};
use voltctl_core::operations::stop::{StopOptions, stop_node};
use voltctl_core::{CoreError, Interrupt, OperationOutcome};

/// Shared inputs of every cluster command
pub struct OperationContext<'a> {
    pub conn_mgr: &'a ConnectionManager,
    pub profile: Option<&'a str>,
    pub connection: &'a ConnectionArgs,
    pub interrupt: &'a Interrupt,
}

pub async fn handle_stop(
    ctx: &OperationContext<'_>,
    options: StopOptions,
) -> Result<OperationOutcome, VoltCtlError> {
    let target = options.validate()?;
    debug!(%target, force = options.force, "stop requested");

    let session = ctx.conn_mgr.open_session(ctx.profile, ctx.connection).await?;
    Ok(stop_node(&session.client, &session.connector, &options, ctx.interrupt).await?)
}

pub async fn handle_pause(
    ctx: &OperationContext<'_>,
    wait: bool,
    timeout_secs: u32,
    poll_interval: Option<u64>,
) -> Result<OperationOutcome, VoltCtlError> {
    let mut options = PauseOptions {
        wait,
        timeout_secs,
        ..Default::default()
    };
    options.validate().map_err(CoreError::from)?;
    if poll_interval == Some(0) {
        return Err(VoltCtlError::Usage {
            message: "poll interval must be greater than zero".to_string(),
        });
    }

    let session = ctx.conn_mgr.open_session(ctx.profile, ctx.connection).await?;
    options.poll_interval = poll_interval
        .map(Duration::from_secs)
        .unwrap_or(session.poll_interval);

    let progress = wait.then(log_progress);
    Ok(pause_cluster(&session.client, &options, ctx.interrupt, progress).await?)
}

pub async fn handle_resume(ctx: &OperationContext<'_>) -> Result<OperationOutcome, VoltCtlError> {
    let session = ctx.conn_mgr.open_session(ctx.profile, ctx.connection).await?;
    Ok(resume_cluster(&session.client, ctx.interrupt).await?)
}

pub async fn handle_shutdown(
    ctx: &OperationContext<'_>,
    options: ShutdownOptions,
) -> Result<OperationOutcome, VoltCtlError> {
    options.validate().map_err(CoreError::from)?;
    debug!(bits = options.option_bits(), "shutdown requested");

    let session = ctx.conn_mgr.open_session(ctx.profile, ctx.connection).await?;
    Ok(shutdown_cluster(&session.client, &options, ctx.interrupt).await?)
}

/// Report drain progress through the log
fn log_progress() -> ProgressCallback {
    Box::new(|event| match event {
        ProgressEvent::Started { kind } => info!("Waiting for {} traffic to drain", kind),
        ProgressEvent::Polling {
            kind,
            pending,
            elapsed,
        } => info!(
            pending,
            "{} still pending after {}s",
            kind,
            elapsed.as_secs()
        ),
        ProgressEvent::Drained { kind, elapsed } => {
            info!("{} drained after {:.1}s", kind, elapsed.as_secs_f64())
        }
        ProgressEvent::Requiescing => info!("Statistics timed out, quiescing again"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use voltctl_core::config::Config;

    fn offline_manager() -> ConnectionManager {
        ConnectionManager::with_config_path(Config::default(), Some("/nonexistent.toml".into()))
    }

    #[tokio::test]
    async fn test_invalid_options_fail_before_connecting() {
        // No hosts are configured, so reaching the network would fail differently
        let conn_mgr = offline_manager();
        let connection = ConnectionArgs::default();
        let interrupt = Interrupt::never();
        let ctx = OperationContext {
            conn_mgr: &conn_mgr,
            profile: None,
            connection: &connection,
            interrupt: &interrupt,
        };

        let err = handle_shutdown(
            &ctx,
            ShutdownOptions {
                force: true,
                cancel: true,
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.exit_code(), 2);

        let mut stop = StopOptions::new("db1,db2");
        let err = handle_stop(&ctx, stop.clone()).await.unwrap_err();
        assert_eq!(err.exit_code(), 2);
        stop.target = "db1".into();
        stop.timeout_secs = 0;
        assert_eq!(handle_stop(&ctx, stop).await.unwrap_err().exit_code(), 2);

        let err = handle_pause(&ctx, true, 0, None).await.unwrap_err();
        assert_eq!(err.exit_code(), 2);
        let err = handle_pause(&ctx, true, 10, Some(0)).await.unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[tokio::test]
    async fn test_valid_options_need_hosts() {
        let conn_mgr = offline_manager();
        let connection = ConnectionArgs::default();
        let interrupt = Interrupt::never();
        let ctx = OperationContext {
            conn_mgr: &conn_mgr,
            profile: None,
            connection: &connection,
            interrupt: &interrupt,
        };
        let err = handle_resume(&ctx).await.unwrap_err();
        assert!(matches!(err, VoltCtlError::NoHostsConfigured));
    }
}
