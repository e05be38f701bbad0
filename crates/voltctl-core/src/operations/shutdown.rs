//! Shutting down the whole cluster
//!
//! Three mutually exclusive modes:
//!
//! - cancel: withdraw a shutdown that is still preparing
//! - force: shut down immediately; the server drops the connection
//! - graceful (default): let in-flight work and, with `save`, a final
//!   snapshot complete first

use super::{
    DEFAULT_TIMEOUT_SECS, DEFAULT_WAITLIMIT_SECS, Interrupt, Operation, OperationOutcome, Raced,
    call_failed, check_response, fetch_topology, procedures, secs_param, until_interrupted,
};
use crate::client::{Param, ProcedureCaller};
use crate::error::{Result, UsageError};
use tracing::{debug, warn};

/// Option bit: take a final snapshot before exiting
pub const SHUTDOWN_SAVE: i32 = 0x1;
/// Option bit: do not wait for stuck export or DR work
pub const SHUTDOWN_XFORCE: i32 = 0x2;

const MAY_STILL_SHUT_DOWN: &str = "the cluster may still be shutting down";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownOptions {
    pub force: bool,
    pub save: bool,
    pub cancel: bool,
    pub xforce: bool,
    pub timeout_secs: u32,
    pub waitlimit_secs: u32,
}

impl Default for ShutdownOptions {
    fn default() -> Self {
        Self {
            force: false,
            save: false,
            cancel: false,
            xforce: false,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            waitlimit_secs: DEFAULT_WAITLIMIT_SECS,
        }
    }
}

impl ShutdownOptions {
    /// The `save` and `xforce` flags as a procedure option bitmask
    pub fn option_bits(&self) -> i32 {
        let mut bits = 0;
        if self.save {
            bits |= SHUTDOWN_SAVE;
        }
        if self.xforce {
            bits |= SHUTDOWN_XFORCE;
        }
        bits
    }

    /// Reject conflicting modes and a zero timeout
    pub fn validate(&self) -> std::result::Result<(), UsageError> {
        let modes = [("force", self.force), ("save", self.save), ("cancel", self.cancel)];
        for (i, &(first, a)) in modes.iter().enumerate() {
            for &(second, b) in &modes[i + 1..] {
                if a && b {
                    return Err(UsageError::ConflictingFlags { first, second });
                }
            }
        }
        if self.timeout_secs == 0 {
            return Err(UsageError::NonPositiveTimeout);
        }
        Ok(())
    }
}

/// Cancel, force or gracefully run a cluster shutdown
pub async fn shutdown_cluster(
    caller: &dyn ProcedureCaller,
    options: &ShutdownOptions,
    interrupt: &Interrupt,
) -> Result<OperationOutcome> {
    options.validate()?;
    let timeout = secs_param("timeout", options.timeout_secs)?;
    let waitlimit = secs_param("waitlimit", options.waitlimit_secs)?;
    let bits = Param::Integer(options.option_bits());

    if interrupt.is_triggered() {
        return Ok(OperationOutcome::cancelled(
            Operation::Shutdown,
            "interrupted before the shutdown request was sent",
        ));
    }

    if options.cancel {
        cancel(caller, interrupt).await
    } else if options.force {
        forced(caller, bits, interrupt).await
    } else {
        graceful(caller, [bits, timeout, waitlimit], interrupt).await
    }
}

async fn cancel(caller: &dyn ProcedureCaller, interrupt: &Interrupt) -> Result<OperationOutcome> {
    debug!("cancelling shutdown");
    let op = Operation::CancelShutdown;
    match until_interrupted(interrupt, caller.call_procedure(procedures::CANCEL_SHUTDOWN, &[]))
        .await
    {
        Raced::Interrupted => Ok(OperationOutcome::interrupted(
            op,
            "interrupted; the shutdown may or may not have been cancelled",
        )),
        Raced::Done(Ok(resp)) => Ok(check_response(op, &resp, "cancel shutdown")
            .unwrap_or_else(|| OperationOutcome::success(op, "shutdown cancelled"))),
        Raced::Done(Err(err)) => call_failed(op, err, "cancel shutdown"),
    }
}

async fn forced(
    caller: &dyn ProcedureCaller,
    bits: Param,
    interrupt: &Interrupt,
) -> Result<OperationOutcome> {
    debug!(?bits, "issuing forced shutdown");
    let params = [bits];
    let requested = || OperationOutcome::success(Operation::Shutdown, "cluster shutdown requested");
    match until_interrupted(interrupt, caller.call_procedure(procedures::SHUTDOWN, &params)).await {
        Raced::Interrupted => {
            warn!("interrupted during forced shutdown");
            Ok(OperationOutcome::interrupted(
                Operation::Shutdown,
                format!("interrupted; {}", MAY_STILL_SHUT_DOWN),
            ))
        }
        // The server exits without a reliable answer, so any reply will do
        Raced::Done(Ok(_)) => Ok(requested()),
        Raced::Done(Err(err)) if err.is_disconnect() => Ok(requested()),
        Raced::Done(Err(err)) => call_failed(Operation::Shutdown, err, "shutdown"),
    }
}

async fn graceful(
    caller: &dyn ProcedureCaller,
    params: [Param; 3],
    interrupt: &Interrupt,
) -> Result<OperationOutcome> {
    let topology = match until_interrupted(interrupt, fetch_topology(caller)).await {
        Raced::Done(topology) => topology?,
        Raced::Interrupted => {
            return Ok(OperationOutcome::cancelled(
                Operation::Shutdown,
                "interrupted before the shutdown request was sent",
            ));
        }
    };
    let reporter = topology
        .hosts()
        .next()
        .map(|h| format!("{} (id {})", h.display_name(), h.id))
        .unwrap_or_default();
    debug!(hosts = topology.len(), ?params, "issuing graceful shutdown");

    match until_interrupted(
        interrupt,
        caller.call_procedure(procedures::PREPARE_SHUTDOWN, &params),
    )
    .await
    {
        Raced::Interrupted => {
            warn!("interrupted during graceful shutdown");
            Ok(OperationOutcome::interrupted(
                Operation::Shutdown,
                format!("interrupted; {}", MAY_STILL_SHUT_DOWN),
            ))
        }
        Raced::Done(Ok(resp)) => Ok(check_response(Operation::Shutdown, &resp, "shutdown")
            .unwrap_or_else(|| {
                OperationOutcome::success(
                    Operation::Shutdown,
                    format!(
                        "cluster of {} host(s) shut down, reported by {}",
                        topology.len(),
                        reporter
                    ),
                )
            })),
        Raced::Done(Err(err)) if err.is_disconnect() => Ok(OperationOutcome::success(
            Operation::Shutdown,
            format!("connection to {} closed as the cluster shut down", reporter),
        )),
        Raced::Done(Err(err)) => call_failed(Operation::Shutdown, err, "shutdown"),
    }
}
