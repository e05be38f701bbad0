//! Polling `@Statistics` until export and DR traffic has drained

use super::procedures;
use super::progress::{DrainKind, ProgressCallback, ProgressEvent, emit};
use crate::client::{CallError, Param, ProcedureCaller, Response};
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::debug;

/// Default time between drain polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Upper bound on a single `@Statistics` call
pub const STATISTICS_CALL_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DrainError {
    #[error("{kind} traffic did not drain before the deadline")]
    TimedOut { kind: DrainKind },

    #[error(transparent)]
    Call(#[from] CallError),

    #[error("@Statistics {selector} failed: {message}")]
    Query {
        selector: &'static str,
        message: String,
    },
}

/// Pending counter of every row in the statistics response.
///
/// No result table or no rows means nothing is configured, which counts as
/// drained. Null cells are skipped.
fn pending_rows(kind: DrainKind, response: &Response) -> Result<Vec<i64>, DrainError> {
    let query_error = |message: String| DrainError::Query {
        selector: kind.selector(),
        message,
    };

    if !response.is_success() {
        return Err(query_error(response.describe()));
    }
    let Some(table) = response.table(0).filter(|t| t.row_count() > 0) else {
        return Ok(Vec::new());
    };
    let column = kind.pending_column();
    if table.column_index(column).is_none() {
        return Err(query_error(format!("response has no {} column", column)));
    }

    let mut pending = Vec::with_capacity(table.row_count());
    for row in 0..table.row_count() {
        match table.value(row, column) {
            None | Some(serde_json::Value::Null) => {}
            Some(_) => {
                let value = table
                    .get_i64(row, column)
                    .ok_or_else(|| query_error(format!("non-numeric {} in row {}", column, row)))?;
                pending.push(value);
            }
        }
    }
    Ok(pending)
}

/// One statistics poll, bounded by `limit`.
///
/// A call that outlives `limit` is reported as a transport timeout so the
/// caller can tell a stalled statistics query from an expired deadline.
async fn poll_pending(
    caller: &dyn ProcedureCaller,
    kind: DrainKind,
    limit: Duration,
) -> Result<Vec<i64>, DrainError> {
    let params = [Param::from(kind.selector()), Param::Integer(0)];
    let response = tokio::time::timeout(limit, caller.call_procedure(procedures::STATISTICS, &params))
        .await
        .map_err(|_| CallError::Timeout {
            procedure: procedures::STATISTICS.to_string(),
        })??;
    pending_rows(kind, &response)
}

/// Per-call bound: the fixed limit, or half of what is left before the
/// deadline when that is shorter
fn call_limit(deadline: Instant) -> Duration {
    let remaining = deadline.saturating_duration_since(Instant::now());
    STATISTICS_CALL_TIMEOUT.min(remaining / 2)
}

/// Poll until every row reports zero pending work or `deadline` passes.
///
/// Each statistics call is bounded by [`call_limit`]; a stalled call comes
/// back as [`CallError::Timeout`] before the deadline passes.
pub async fn wait_for_drain(
    caller: &dyn ProcedureCaller,
    kind: DrainKind,
    deadline: Instant,
    interval: Duration,
    on_progress: &Option<ProgressCallback>,
) -> Result<(), DrainError> {
    let start = Instant::now();
    emit(on_progress, ProgressEvent::Started { kind });

    loop {
        if Instant::now() >= deadline {
            return Err(DrainError::TimedOut { kind });
        }

        let rows = poll_pending(caller, kind, call_limit(deadline)).await?;
        let pending = rows.iter().fold(0i64, |acc, v| acc.saturating_add(*v));
        let elapsed = start.elapsed();
        emit(
            on_progress,
            ProgressEvent::Polling {
                kind,
                pending,
                elapsed,
            },
        );

        if rows.iter().all(|v| *v == 0) {
            debug!(%kind, ?elapsed, "drained");
            emit(on_progress, ProgressEvent::Drained { kind, elapsed });
            return Ok(());
        }
        debug!(%kind, pending, "still draining");

        let next = (Instant::now() + interval).min(deadline);
        tokio::time::sleep_until(next).await;
    }
}
