//! Stopping a single cluster member
//!
//! The stop request cannot be sent to the node being stopped: it would drop
//! the connection before answering. The sequencer therefore resolves the
//! target in the topology, picks a different member, opens an admin
//! connection to it and issues the stop there.

use super::{
    DEFAULT_TIMEOUT_SECS, DEFAULT_WAITLIMIT_SECS, Interrupt, Operation, OperationOutcome, Raced,
    call_failed, check_response, fetch_topology, procedures, secs_param, until_interrupted,
};
use crate::address::{Endpoint, parse_endpoints};
use crate::client::{Connector, Param, ProcedureCaller, status};
use crate::error::{ResolutionError, Result, UsageError};
use crate::topology::Host;
use tracing::{debug, warn};

/// Port assumed for the target when none is given; targets are matched
/// against each member's internal port
pub const DEFAULT_INTERNAL_PORT: u16 = 3021;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopOptions {
    /// `host[:port]` of the member to stop
    pub target: String,
    /// Stop immediately instead of waiting for in-flight work
    pub force: bool,
    pub timeout_secs: u32,
    pub waitlimit_secs: u32,
}

impl StopOptions {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            force: false,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            waitlimit_secs: DEFAULT_WAITLIMIT_SECS,
        }
    }

    /// Check the options and parse the target without contacting the cluster
    pub fn validate(&self) -> Result<Endpoint> {
        if !self.force && self.timeout_secs == 0 {
            return Err(UsageError::NonPositiveTimeout.into());
        }
        secs_param("timeout", self.timeout_secs)?;
        secs_param("waitlimit", self.waitlimit_secs)?;

        let mut targets = parse_endpoints(&[&self.target], Some(DEFAULT_INTERNAL_PORT), 1, Some(1))?;
        Ok(targets.remove(0))
    }
}

fn describe(host: &Host, port: u16) -> String {
    format!("host {} (id {}, port {})", host.display_name(), host.id, port)
}

/// Stop one member of the cluster `caller` is connected to.
///
/// Resolution problems are errors and nothing is sent. Once the stop request
/// is out, every result (including an interrupt) is an outcome, and the
/// request is never repeated.
pub async fn stop_node(
    caller: &dyn ProcedureCaller,
    connector: &dyn Connector,
    options: &StopOptions,
    interrupt: &Interrupt,
) -> Result<OperationOutcome> {
    let target_endpoint = options.validate()?;
    let timeout = secs_param("timeout", options.timeout_secs)?;
    let waitlimit = secs_param("waitlimit", options.waitlimit_secs)?;
    let port = target_endpoint.port.unwrap_or(DEFAULT_INTERNAL_PORT);

    debug!(target = %target_endpoint, "resolving stop target");
    let topology = match until_interrupted(interrupt, fetch_topology(caller)).await {
        Raced::Done(topology) => topology?,
        Raced::Interrupted => {
            return Ok(OperationOutcome::cancelled(
                Operation::StopNode,
                "interrupted before the stop request was sent",
            ));
        }
    };

    let (target, connection) = topology.get_target_and_connection_host(&target_endpoint.host, port);
    let target = target.ok_or_else(|| ResolutionError::HostNotFound {
        hostname: target_endpoint.host.clone(),
        port,
    })?;
    let connection = connection.ok_or(ResolutionError::EntireCluster)?;
    if connection.id == target.id {
        return Err(ResolutionError::TargetIsConnection {
            host_id: target.id,
            hostname: target.hostname().to_string(),
        }
        .into());
    }
    let target_desc = describe(target, port);
    debug!(
        target_id = target.id,
        connection_id = connection.id,
        "connecting through {}",
        connection.display_name()
    );

    let admin = match until_interrupted(interrupt, connector.connect(connection)).await {
        Raced::Done(admin) => admin?,
        Raced::Interrupted => {
            return Ok(OperationOutcome::cancelled(
                Operation::StopNode,
                "interrupted before the stop request was sent",
            ));
        }
    };

    if options.force {
        forced(admin.as_ref(), target.id, &target_desc, interrupt).await
    } else {
        graceful(
            admin.as_ref(),
            target.id,
            &target_desc,
            timeout,
            waitlimit,
            interrupt,
        )
        .await
    }
}

async fn forced(
    admin: &dyn ProcedureCaller,
    target_id: u32,
    target_desc: &str,
    interrupt: &Interrupt,
) -> Result<OperationOutcome> {
    debug!(target_id, "issuing forced stop");
    let params = [Param::Integer(target_id as i32)];
    let raced = until_interrupted(interrupt, admin.call_procedure(procedures::STOP_NODE, &params)).await;

    let stopped = || OperationOutcome::success(Operation::StopNode, format!("stopped {}", target_desc));
    Ok(match raced {
        Raced::Interrupted => {
            warn!(target_id, "interrupted during forced stop");
            OperationOutcome::interrupted(
                Operation::StopNode,
                format!("stop of {} was sent; host may still be stopping", target_desc),
            )
        }
        Raced::Done(Ok(resp)) if resp.is_success() || resp.status() == status::CONNECTION_LOST => stopped(),
        Raced::Done(Ok(resp)) => OperationOutcome::failed(
            Operation::StopNode,
            Some(resp.status().into()),
            format!("stop of {} failed: {}", target_desc, resp.describe()),
        ),
        Raced::Done(Err(err)) if err.is_disconnect() => stopped(),
        Raced::Done(Err(err)) => {
            return call_failed(
                Operation::StopNode,
                err,
                &format!("stop request for {}", target_desc),
            );
        }
    })
}

async fn graceful(
    admin: &dyn ProcedureCaller,
    target_id: u32,
    target_desc: &str,
    timeout: Param,
    waitlimit: Param,
    interrupt: &Interrupt,
) -> Result<OperationOutcome> {
    debug!(target_id, ?timeout, ?waitlimit, "issuing graceful stop");
    let params = [Param::Integer(target_id as i32), timeout, waitlimit];
    let raced = until_interrupted(
        interrupt,
        admin.call_procedure(procedures::PREPARE_STOP_NODE, &params),
    )
    .await;

    Ok(match raced {
        Raced::Interrupted => {
            warn!(target_id, "interrupted during graceful stop");
            OperationOutcome::interrupted(
                Operation::StopNode,
                format!("stop of {} was sent; host may still be stopping", target_desc),
            )
        }
        Raced::Done(Ok(resp)) => check_response(
            Operation::StopNode,
            &resp,
            &format!("stop of {}", target_desc),
        )
        .unwrap_or_else(|| {
            OperationOutcome::success(Operation::StopNode, format!("stopped {}", target_desc))
        }),
        Raced::Done(Err(err)) => {
            return call_failed(
                Operation::StopNode,
                err,
                &format!("stop request for {}", target_desc),
            );
        }
    })
}

#[cfg(test)]
mod tests {
    use super::super::OutcomeStatus;
    use super::super::testing::*;
    use super::*;
    use crate::client::{CallError, Response};
    use crate::error::CoreError;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn three_node_caller() -> ScriptedCaller {
        ScriptedCaller::new(
            "db1:8080",
            vec![Reply::Respond(overview(&[
                (1, "a", 3021),
                (2, "b", 3021),
                (3, "c", 3021),
            ]))],
        )
    }

    #[tokio::test]
    async fn test_graceful_stop_goes_through_another_member() {
        let caller = three_node_caller();
        let connector = ScriptedConnector::new(
            vec![Reply::Respond(status_row(0))],
            caller.log.clone(),
        );

        let outcome = stop_node(&caller, &connector, &StopOptions::new("b"), &Interrupt::never())
            .await
            .unwrap();

        assert!(outcome.is_success());
        assert_eq!(outcome.exit_code, 0);
        assert_eq!(*connector.connected.lock().unwrap(), vec![1]);

        let calls = caller.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].name, "@SystemInformation");
        assert_eq!(calls[1].name, "@PrepareStopNode");
        assert_eq!(calls[1].endpoint, "10.0.0.1:21211");
        assert_eq!(
            calls[1].params,
            vec![
                Param::Integer(2),
                Param::Integer(120),
                Param::Integer(DEFAULT_WAITLIMIT_SECS as i32)
            ]
        );
    }

    #[tokio::test]
    async fn test_first_member_is_stopped_through_the_second() {
        let caller = three_node_caller();
        let connector = ScriptedConnector::new(
            vec![Reply::Respond(status_row(0))],
            caller.log.clone(),
        );

        stop_node(&caller, &connector, &StopOptions::new("a:3021"), &Interrupt::never())
            .await
            .unwrap();
        assert_eq!(*connector.connected.lock().unwrap(), vec![2]);
        assert_eq!(caller.calls()[1].params[0], Param::Integer(1));
    }

    #[tokio::test]
    async fn test_forced_stop_treats_disconnect_as_success() {
        let caller = three_node_caller();
        let connector = ScriptedConnector::new(
            vec![Reply::Fail(CallError::ConnectionLost {
                procedure: "@StopNode".into(),
                message: "reset by peer".into(),
            })],
            caller.log.clone(),
        );
        let options = StopOptions {
            force: true,
            ..StopOptions::new("c")
        };

        let outcome = stop_node(&caller, &connector, &options, &Interrupt::never())
            .await
            .unwrap();
        assert!(outcome.is_success());

        let calls = caller.calls();
        assert_eq!(calls[1].name, "@StopNode");
        assert_eq!(calls[1].params, vec![Param::Integer(3)]);
    }

    #[tokio::test]
    async fn test_remote_failure_passes_status_through() {
        let caller = three_node_caller();
        let connector = ScriptedConnector::new(
            vec![Reply::Respond(Response::failure(
                status::GRACEFUL_FAILURE,
                "partitions would be lost",
            ))],
            caller.log.clone(),
        );

        let outcome = stop_node(&caller, &connector, &StopOptions::new("b"), &Interrupt::never())
            .await
            .unwrap();
        assert_eq!(outcome.status, OutcomeStatus::Failed { status: Some(-2) });
        assert_eq!(outcome.exit_code, -2);
        assert!(outcome.detail.unwrap().contains("partitions would be lost"));
    }

    #[tokio::test]
    async fn test_single_node_cluster_is_refused() {
        let caller = ScriptedCaller::new(
            "db1:8080",
            vec![Reply::Respond(overview(&[(0, "solo", 3021)]))],
        );
        let connector = ScriptedConnector::new(vec![], caller.log.clone());

        let err = stop_node(&caller, &connector, &StopOptions::new("solo"), &Interrupt::never())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::Resolution(ResolutionError::EntireCluster)
        ));
        assert!(connector.connected.lock().unwrap().is_empty());
        assert_eq!(caller.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_target_or_port_is_not_found() {
        for target in ["zz", "b:3022"] {
            let caller = three_node_caller();
            let connector = ScriptedConnector::new(vec![], caller.log.clone());
            let err = stop_node(&caller, &connector, &StopOptions::new(target), &Interrupt::never())
                .await
                .unwrap_err();
            assert!(
                matches!(err, CoreError::Resolution(ResolutionError::HostNotFound { .. })),
                "{}: {:?}",
                target,
                err
            );
        }
    }

    #[tokio::test]
    async fn test_invalid_options_make_no_calls() {
        let caller = ScriptedCaller::new("db1:8080", vec![]);
        let connector = ScriptedConnector::new(vec![], caller.log.clone());

        let err = stop_node(&caller, &connector, &StopOptions::new("::1"), &Interrupt::never())
            .await
            .unwrap_err();
        assert!(err.is_usage());

        let err = stop_node(&caller, &connector, &StopOptions::new("a,b"), &Interrupt::never())
            .await
            .unwrap_err();
        assert!(err.is_usage());

        let options = StopOptions {
            timeout_secs: 0,
            ..StopOptions::new("b")
        };
        let err = stop_node(&caller, &connector, &options, &Interrupt::never())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::Usage(UsageError::NonPositiveTimeout)
        ));

        assert!(caller.calls().is_empty());
    }

    #[test]
    fn test_validate_fills_in_internal_port() {
        let target = StopOptions::new("db3").validate().unwrap();
        assert_eq!(target.port, Some(DEFAULT_INTERNAL_PORT));

        let forced = StopOptions {
            force: true,
            timeout_secs: 0,
            ..StopOptions::new("[fe80::1]:3022")
        };
        assert_eq!(forced.validate().unwrap().port, Some(3022));
    }

    #[tokio::test]
    async fn test_connect_failure_is_an_error() {
        let caller = three_node_caller();
        let connector = ScriptedConnector::failing(
            CallError::Connection {
                endpoint: "10.0.0.1:8080".into(),
                message: "refused".into(),
            },
            caller.log.clone(),
        );
        let err = stop_node(&caller, &connector, &StopOptions::new("b"), &Interrupt::never())
            .await
            .unwrap_err();
        assert!(err.is_connection());
    }

    #[tokio::test]
    async fn test_interrupt_before_stop_request_cancels() {
        let caller = ScriptedCaller::new("db1:8080", vec![]);
        let connector = ScriptedConnector::new(vec![], caller.log.clone());
        let (handle, interrupt) = Interrupt::new();
        handle.trigger();

        let outcome = stop_node(&caller, &connector, &StopOptions::new("b"), &interrupt)
            .await
            .unwrap();
        assert_eq!(outcome.status, OutcomeStatus::Cancelled);
        assert!(caller.calls().is_empty());
    }

    #[tokio::test]
    async fn test_interrupt_during_stop_request() {
        let caller = three_node_caller();
        let connector = ScriptedConnector::new(vec![Reply::Hang], caller.log.clone());
        let (handle, interrupt) = Interrupt::new();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            handle.trigger();
        });

        let outcome = stop_node(&caller, &connector, &StopOptions::new("b"), &interrupt)
            .await
            .unwrap();
        assert_eq!(outcome.status, OutcomeStatus::Interrupted);
        assert_eq!(outcome.exit_code, 1);
        assert!(outcome.detail.unwrap().contains("may still be stopping"));
        // The stop request is never repeated
        assert_eq!(caller.call_names(), vec!["@SystemInformation", "@PrepareStopNode"]);
    }
}
