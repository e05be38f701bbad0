//! Administrative operation sequencers
//!
//! Each operation runs as one sequential flow: validate options, resolve the
//! cluster topology when needed, then issue a bounded series of system
//! procedure calls. Every await on the network is raced against an
//! [`Interrupt`], and nothing is retried or rolled back once a mutating call
//! has gone out, because none of these procedures are safe to repeat blindly.
//!
//! ## Overview
//!
//! - [`stop::stop_node`] - stop one node, connecting through another member
//! - [`pause::pause_cluster`] - pause, optionally quiesce and wait for drain
//! - [`resume::resume_cluster`] - leave the paused state
//! - [`shutdown::shutdown_cluster`] - cancel, force or graceful shutdown
//!
//! ## Example
//!
//! ```rust,ignore
//! use voltctl_core::operations::{Interrupt, stop::{StopOptions, stop_node}};
//!
//! let (_handle, interrupt) = Interrupt::new();
//! let outcome = stop_node(&caller, &connector, &StopOptions::new("db2"), &interrupt).await?;
//! std::process::exit(outcome.exit_code);
//! ```

pub mod drain;
pub mod pause;
pub mod progress;
pub mod resume;
pub mod shutdown;
pub mod stop;

use crate::client::{CallError, Param, ProcedureCaller, Response};
use crate::error::{CoreError, ResolutionError, Result, UsageError};
use crate::topology::Topology;
use serde::Serialize;
use std::fmt;
use std::future::Future;
use tokio::sync::watch;
use tracing::{debug, trace};

/// System procedure names
pub mod procedures {
    pub const SYSTEM_INFORMATION: &str = "@SystemInformation";
    pub const STATISTICS: &str = "@Statistics";
    pub const STOP_NODE: &str = "@StopNode";
    pub const PREPARE_STOP_NODE: &str = "@PrepareStopNode";
    pub const PAUSE: &str = "@Pause";
    pub const QUIESCE: &str = "@Quiesce";
    pub const RESUME: &str = "@Resume";
    pub const SHUTDOWN: &str = "@Shutdown";
    pub const PREPARE_SHUTDOWN: &str = "@PrepareShutdown";
    pub const CANCEL_SHUTDOWN: &str = "@CancelShutdown";
}

/// Default seconds a graceful operation may take
pub const DEFAULT_TIMEOUT_SECS: u32 = 120;

/// Default seconds to wait for in-flight work before proceeding anyway
pub const DEFAULT_WAITLIMIT_SECS: u32 = 60;

/// Exit code for a failure that carries no server status
pub const EXIT_FAILURE: i32 = 1;

/// Which operation an outcome belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Operation {
    StopNode,
    Pause,
    Resume,
    Shutdown,
    CancelShutdown,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::StopNode => write!(f, "stop"),
            Operation::Pause => write!(f, "pause"),
            Operation::Resume => write!(f, "resume"),
            Operation::Shutdown => write!(f, "shutdown"),
            Operation::CancelShutdown => write!(f, "shutdown --cancel"),
        }
    }
}

/// How an operation ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "kebab-case")]
pub enum OutcomeStatus {
    Success,
    /// The server reported a failure, or the call failed after it was issued
    Failed { status: Option<i64> },
    TimedOut,
    /// Interrupted before any mutating call was issued
    Cancelled,
    /// Interrupted while a mutating call was in flight
    Interrupted,
}

/// Result of one operation attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationOutcome {
    pub operation: Operation,
    #[serde(flatten)]
    pub status: OutcomeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub exit_code: i32,
}

impl OperationOutcome {
    fn new(operation: Operation, status: OutcomeStatus, detail: impl Into<String>) -> Self {
        let exit_code = match &status {
            OutcomeStatus::Success => 0,
            // Pass the server's code through; a zero would read as success
            OutcomeStatus::Failed { status: Some(code) } if *code != 0 => {
                i32::try_from(*code).unwrap_or(EXIT_FAILURE)
            }
            _ => EXIT_FAILURE,
        };
        Self {
            operation,
            status,
            detail: Some(detail.into()),
            exit_code,
        }
    }

    pub fn success(operation: Operation, detail: impl Into<String>) -> Self {
        Self::new(operation, OutcomeStatus::Success, detail)
    }

    pub fn failed(operation: Operation, status: Option<i64>, detail: impl Into<String>) -> Self {
        Self::new(operation, OutcomeStatus::Failed { status }, detail)
    }

    pub fn timed_out(operation: Operation, detail: impl Into<String>) -> Self {
        Self::new(operation, OutcomeStatus::TimedOut, detail)
    }

    pub fn cancelled(operation: Operation, detail: impl Into<String>) -> Self {
        Self::new(operation, OutcomeStatus::Cancelled, detail)
    }

    pub fn interrupted(operation: Operation, detail: impl Into<String>) -> Self {
        Self::new(operation, OutcomeStatus::Interrupted, detail)
    }

    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Success
    }
}

/// Receiving side of a user interrupt (Ctrl-C, termination signal)
#[derive(Debug, Clone)]
pub struct Interrupt {
    rx: watch::Receiver<bool>,
}

/// Sending side of an [`Interrupt`]
#[derive(Debug)]
pub struct InterruptHandle {
    tx: watch::Sender<bool>,
}

impl InterruptHandle {
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }
}

impl Interrupt {
    pub fn new() -> (InterruptHandle, Interrupt) {
        let (tx, rx) = watch::channel(false);
        (InterruptHandle { tx }, Interrupt { rx })
    }

    /// An interrupt that never fires
    pub fn never() -> Interrupt {
        Self::new().1
    }

    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the interrupt fires; pends forever if it never can
    pub async fn triggered(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

pub(crate) enum Raced<T> {
    Done(T),
    Interrupted,
}

/// Run `fut` unless the interrupt fires first
pub(crate) async fn until_interrupted<F: Future>(interrupt: &Interrupt, fut: F) -> Raced<F::Output> {
    let mut interrupt = interrupt.clone();
    tokio::select! {
        biased;
        _ = interrupt.triggered() => Raced::Interrupted,
        out = fut => Raced::Done(out),
    }
}

/// Convert seconds to an INTEGER procedure parameter
pub(crate) fn secs_param(name: &str, secs: u32) -> std::result::Result<Param, UsageError> {
    i32::try_from(secs)
        .map(Param::Integer)
        .map_err(|_| UsageError::Invalid(format!("{} of {} seconds is too large", name, secs)))
}

/// Query `@SystemInformation OVERVIEW` and build the topology from it
pub async fn fetch_topology(caller: &dyn ProcedureCaller) -> Result<Topology> {
    debug!(endpoint = %caller.endpoint(), "querying system information");
    let response = caller
        .call_procedure(procedures::SYSTEM_INFORMATION, &[Param::from("OVERVIEW")])
        .await?;
    trace!(?response, "system information response");

    if !response.is_success() {
        return Err(CoreError::Query {
            procedure: procedures::SYSTEM_INFORMATION.to_string(),
            message: response.describe(),
        });
    }
    let table = response.table(0).ok_or_else(|| CoreError::Query {
        procedure: procedures::SYSTEM_INFORMATION.to_string(),
        message: "response has no result table".to_string(),
    })?;

    let topology = Topology::from_overview(table)?;
    if topology.is_empty() {
        return Err(ResolutionError::EmptyCluster.into());
    }
    debug!(hosts = topology.len(), "topology resolved");
    Ok(topology)
}

/// Result for a mutating call that failed at the transport level.
///
/// A refused connection or rejected credentials mean the request never
/// reached a server, which is an error like any other connection failure.
/// Anything else may have been applied, so it becomes a failed outcome that
/// tells the operator to check.
pub(crate) fn call_failed(
    operation: Operation,
    err: CallError,
    context: &str,
) -> Result<OperationOutcome> {
    match err {
        CallError::Connection { .. } | CallError::Authentication(_) => Err(err.into()),
        _ => Ok(OperationOutcome::failed(
            operation,
            None,
            format!("{}: {}; verify the cluster state manually", context, err),
        )),
    }
}

/// Failed outcome for a non-success response or non-zero `STATUS` column
pub(crate) fn check_response(
    operation: Operation,
    response: &Response,
    context: &str,
) -> Option<OperationOutcome> {
    if !response.is_success() {
        return Some(OperationOutcome::failed(
            operation,
            Some(response.status().into()),
            format!("{} failed: {}", context, response.describe()),
        ));
    }
    match response.status_column() {
        Some(code) if code != 0 => Some(OperationOutcome::failed(
            operation,
            Some(code),
            format!("{} failed with status {}", context, code),
        )),
        _ => None,
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted in-memory procedure caller for sequencer tests

    use super::*;
    use crate::client::{Connector, Response, Table};
    use crate::topology::Host;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// What a scripted call does
    #[derive(Clone)]
    pub enum Reply {
        Respond(Response),
        Fail(CallError),
        /// Never answers; only an interrupt or deadline ends the wait
        Hang,
        /// Answers after a delay
        Delay(Duration, Response),
    }

    #[derive(Debug, Clone, PartialEq)]
    pub struct Call {
        pub endpoint: String,
        pub name: String,
        pub params: Vec<Param>,
    }

    /// Call log shared between a caller and any connections opened from it
    pub type CallLog = Arc<Mutex<Vec<Call>>>;

    #[derive(Clone)]
    pub struct ScriptedCaller {
        endpoint: String,
        replies: Arc<Mutex<VecDeque<Reply>>>,
        pub log: CallLog,
    }

    impl ScriptedCaller {
        pub fn new(endpoint: &str, replies: Vec<Reply>) -> Self {
            Self {
                endpoint: endpoint.to_string(),
                replies: Arc::new(Mutex::new(replies.into())),
                log: Arc::new(Mutex::new(Vec::new())),
            }
        }

        pub fn with_log(endpoint: &str, replies: Vec<Reply>, log: CallLog) -> Self {
            Self {
                endpoint: endpoint.to_string(),
                replies: Arc::new(Mutex::new(replies.into())),
                log,
            }
        }

        pub fn calls(&self) -> Vec<Call> {
            self.log.lock().unwrap().clone()
        }

        pub fn call_names(&self) -> Vec<String> {
            self.calls().into_iter().map(|c| c.name).collect()
        }
    }

    #[async_trait]
    impl ProcedureCaller for ScriptedCaller {
        async fn call_procedure(
            &self,
            name: &str,
            params: &[Param],
        ) -> std::result::Result<Response, CallError> {
            self.log.lock().unwrap().push(Call {
                endpoint: self.endpoint.clone(),
                name: name.to_string(),
                params: params.to_vec(),
            });
            let reply = self
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| panic!("unexpected call to {}", name));
            match reply {
                Reply::Respond(r) => Ok(r),
                Reply::Fail(e) => Err(e),
                Reply::Hang => std::future::pending().await,
                Reply::Delay(d, r) => {
                    tokio::time::sleep(d).await;
                    Ok(r)
                }
            }
        }

        fn endpoint(&self) -> String {
            self.endpoint.clone()
        }
    }

    /// Connector handing out scripted callers that share one call log
    pub struct ScriptedConnector {
        replies: Mutex<Vec<Reply>>,
        log: CallLog,
        pub connected: Mutex<Vec<u32>>,
        fail: Option<CallError>,
    }

    impl ScriptedConnector {
        pub fn new(replies: Vec<Reply>, log: CallLog) -> Self {
            Self {
                replies: Mutex::new(replies),
                log,
                connected: Mutex::new(Vec::new()),
                fail: None,
            }
        }

        pub fn failing(err: CallError, log: CallLog) -> Self {
            Self {
                replies: Mutex::new(Vec::new()),
                log,
                connected: Mutex::new(Vec::new()),
                fail: Some(err),
            }
        }
    }

    #[async_trait]
    impl Connector for ScriptedConnector {
        async fn connect(
            &self,
            host: &Host,
        ) -> std::result::Result<Box<dyn ProcedureCaller>, CallError> {
            if let Some(err) = &self.fail {
                return Err(err.clone());
            }
            self.connected.lock().unwrap().push(host.id);
            let replies = std::mem::take(&mut *self.replies.lock().unwrap());
            Ok(Box::new(ScriptedCaller::with_log(
                &host.admin_endpoint().to_string(),
                replies,
                self.log.clone(),
            )))
        }
    }

    /// OVERVIEW response for `(id, hostname, internal port)` triples
    pub fn overview(hosts: &[(u32, &str, u16)]) -> Response {
        let mut rows = Vec::new();
        for (id, name, port) in hosts {
            rows.push(vec![json!(id), json!("HOSTNAME"), json!(name)]);
            rows.push(vec![json!(id), json!("IPADDRESS"), json!(format!("10.0.0.{}", id))]);
            rows.push(vec![json!(id), json!("INTERNALPORT"), json!(port.to_string())]);
            rows.push(vec![json!(id), json!("ADMINPORT"), json!("21211")]);
        }
        Response::success(vec![Table::new(&["HOST_ID", "KEY", "VALUE"], rows)])
    }

    /// Single-row response with a STATUS column
    pub fn status_row(status: i64) -> Response {
        Response::success(vec![Table::new(&["STATUS"], vec![vec![json!(status)]])])
    }

    /// Statistics response with one pending counter per row
    pub fn stats(column: &str, pending: &[i64]) -> Response {
        Response::success(vec![Table::new(
            &["HOSTNAME", column],
            pending.iter().map(|p| vec![json!("h"), json!(p)]).collect(),
        )])
    }
}
