//! Pausing the cluster, optionally waiting until it is quiet
//!
//! A plain pause puts the cluster into admin mode and returns. With `wait`,
//! the sequencer also quiesces the cluster and polls statistics until export
//! and DR producer traffic has drained, bounded by one overall deadline. The
//! pause is never undone, whatever happens afterwards.

use super::drain::{DEFAULT_POLL_INTERVAL, DrainError, wait_for_drain};
use super::progress::{DrainKind, ProgressCallback, ProgressEvent, emit};
use super::{
    DEFAULT_TIMEOUT_SECS, Interrupt, Operation, OperationOutcome, Raced, call_failed,
    check_response, procedures, until_interrupted,
};
use crate::client::ProcedureCaller;
use crate::error::{Result, UsageError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

const REMAINS_PAUSED: &str =
    "the cluster remains paused; transactions may not be fully drained";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PauseOptions {
    /// Quiesce and wait for drain after pausing
    pub wait: bool,
    /// Overall bound on the drain wait
    pub timeout_secs: u32,
    pub poll_interval: Duration,
}

impl Default for PauseOptions {
    fn default() -> Self {
        Self {
            wait: false,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl PauseOptions {
    pub fn validate(&self) -> std::result::Result<(), UsageError> {
        if self.timeout_secs == 0 {
            return Err(UsageError::NonPositiveTimeout);
        }
        Ok(())
    }
}

enum Step {
    Continue,
    Stop(OperationOutcome),
}

/// Issue one admin procedure and classify its result
async fn admin_call(
    caller: &dyn ProcedureCaller,
    procedure: &str,
    context: &str,
    interrupt: &Interrupt,
) -> Result<Step> {
    debug!(procedure, "calling");
    match until_interrupted(interrupt, caller.call_procedure(procedure, &[])).await {
        Raced::Interrupted => {
            warn!(procedure, "interrupted");
            let state = if procedure == procedures::PAUSE {
                "the cluster may or may not be paused"
            } else {
                REMAINS_PAUSED
            };
            Ok(Step::Stop(OperationOutcome::interrupted(
                Operation::Pause,
                format!("interrupted during {}; {}", procedure, state),
            )))
        }
        Raced::Done(Ok(resp)) => Ok(match check_response(Operation::Pause, &resp, context) {
            Some(failed) => Step::Stop(failed),
            None => Step::Continue,
        }),
        Raced::Done(Err(err)) => call_failed(Operation::Pause, err, context).map(Step::Stop),
    }
}

/// Pause the cluster `caller` is connected to.
pub async fn pause_cluster(
    caller: &dyn ProcedureCaller,
    options: &PauseOptions,
    interrupt: &Interrupt,
    on_progress: Option<ProgressCallback>,
) -> Result<OperationOutcome> {
    options.validate()?;
    if interrupt.is_triggered() {
        return Ok(OperationOutcome::cancelled(
            Operation::Pause,
            "interrupted before the cluster was paused",
        ));
    }
    let deadline = Instant::now() + Duration::from_secs(options.timeout_secs.into());

    if let Step::Stop(outcome) = admin_call(caller, procedures::PAUSE, "pause", interrupt).await? {
        return Ok(outcome);
    }
    if !options.wait {
        return Ok(OperationOutcome::success(Operation::Pause, "cluster paused"));
    }

    if let Step::Stop(outcome) =
        admin_call(caller, procedures::QUIESCE, "quiesce", interrupt).await?
    {
        return Ok(outcome);
    }

    for kind in [DrainKind::Export, DrainKind::DrProducer] {
        let drained = until_interrupted(
            interrupt,
            wait_for_drain(caller, kind, deadline, options.poll_interval, &on_progress),
        )
        .await;

        let err = match drained {
            Raced::Done(Ok(())) => continue,
            Raced::Done(Err(err)) => err,
            Raced::Interrupted => {
                warn!(%kind, "interrupted while waiting for drain");
                return Ok(OperationOutcome::interrupted(
                    Operation::Pause,
                    format!("interrupted while waiting for {} drain; {}", kind, REMAINS_PAUSED),
                ));
            }
        };

        match err {
            // Statistics can stall while export is still flushing; quiesce
            // once more and carry on with DR
            DrainError::Call(call) if call.is_timeout() && kind == DrainKind::Export => {
                warn!("export statistics timed out, quiescing again");
                emit(&on_progress, ProgressEvent::Requiescing);
                if let Step::Stop(outcome) =
                    admin_call(caller, procedures::QUIESCE, "quiesce", interrupt).await?
                {
                    return Ok(outcome);
                }
            }
            DrainError::TimedOut { .. } => {
                warn!(%kind, "drain wait timed out");
                return Ok(OperationOutcome::timed_out(
                    Operation::Pause,
                    format!(
                        "{} traffic did not drain within {}s; {}",
                        kind, options.timeout_secs, REMAINS_PAUSED
                    ),
                ));
            }
            DrainError::Call(call) if call.is_timeout() => {
                return Ok(OperationOutcome::timed_out(
                    Operation::Pause,
                    format!("{}; {}", call, REMAINS_PAUSED),
                ));
            }
            other => {
                return Ok(OperationOutcome::failed(
                    Operation::Pause,
                    None,
                    format!("waiting for {} drain failed: {}; {}", kind, other, REMAINS_PAUSED),
                ));
            }
        }
    }

    Ok(OperationOutcome::success(
        Operation::Pause,
        "cluster paused and drained",
    ))
}
