//! Taking the cluster out of the paused state

use super::{
    Interrupt, Operation, OperationOutcome, Raced, call_failed, check_response, procedures,
    until_interrupted,
};
use crate::client::ProcedureCaller;
use crate::error::Result;
use tracing::{debug, warn};

/// Resume normal operation of a paused cluster
pub async fn resume_cluster(
    caller: &dyn ProcedureCaller,
    interrupt: &Interrupt,
) -> Result<OperationOutcome> {
    if interrupt.is_triggered() {
        return Ok(OperationOutcome::cancelled(
            Operation::Resume,
            "interrupted before the cluster was resumed",
        ));
    }

    debug!(endpoint = %caller.endpoint(), "resuming cluster");
    match until_interrupted(interrupt, caller.call_procedure(procedures::RESUME, &[])).await {
        Raced::Interrupted => {
            warn!("interrupted during resume");
            Ok(OperationOutcome::interrupted(
                Operation::Resume,
                "interrupted during resume; the cluster may still be paused",
            ))
        }
        Raced::Done(Ok(resp)) => Ok(check_response(Operation::Resume, &resp, "resume")
            .unwrap_or_else(|| OperationOutcome::success(Operation::Resume, "cluster resumed"))),
        Raced::Done(Err(err)) => call_failed(Operation::Resume, err, "resume"),
    }
}

#[cfg(test)]
mod tests {
    use super::super::OutcomeStatus;
    use super::super::testing::*;
    use super::*;
    use crate::client::{Response, status};

    #[tokio::test]
    async fn test_resume() {
        let caller = ScriptedCaller::new("db1:8080", vec![Reply::Respond(status_row(0))]);
        let outcome = resume_cluster(&caller, &Interrupt::never()).await.unwrap();
        assert!(outcome.is_success());
        assert_eq!(caller.call_names(), vec!["@Resume"]);
    }

    #[tokio::test]
    async fn test_resume_of_running_cluster_fails() {
        let caller = ScriptedCaller::new(
            "db1:8080",
            vec![Reply::Respond(Response::failure(
                status::GRACEFUL_FAILURE,
                "cluster is not paused",
            ))],
        );
        let outcome = resume_cluster(&caller, &Interrupt::never()).await.unwrap();
        assert_eq!(outcome.status, OutcomeStatus::Failed { status: Some(-2) });
        assert!(outcome.detail.unwrap().contains("not paused"));
    }
}
