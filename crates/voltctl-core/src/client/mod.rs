//! Procedure-call abstraction over the database's client interface
//!
//! The admin operations never touch a wire format directly. They call
//! system procedures through [`ProcedureCaller`] and open additional admin
//! connections through [`Connector`]. [`http`] provides an implementation on
//! top of the server's JSON procedure API.

pub mod http;

use crate::topology::Host;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub use http::{ClientSettings, DEFAULT_HTTP_PORT, JsonApiClient, JsonApiConnector};

/// Client response status codes as reported by the server
pub mod status {
    pub const SUCCESS: i8 = 1;
    pub const USER_ABORT: i8 = -1;
    pub const GRACEFUL_FAILURE: i8 = -2;
    pub const UNEXPECTED_FAILURE: i8 = -3;
    pub const CONNECTION_LOST: i8 = -4;
    pub const SERVER_UNAVAILABLE: i8 = -5;
    pub const CONNECTION_TIMEOUT: i8 = -6;
    pub const RESPONSE_UNKNOWN: i8 = -7;
    pub const TXN_RESTART: i8 = -8;
    pub const OPERATIONAL_FAILURE: i8 = -9;

    /// Human-readable name for a status code
    pub fn name(code: i8) -> &'static str {
        match code {
            SUCCESS => "SUCCESS",
            USER_ABORT => "USER_ABORT",
            GRACEFUL_FAILURE => "GRACEFUL_FAILURE",
            UNEXPECTED_FAILURE => "UNEXPECTED_FAILURE",
            CONNECTION_LOST => "CONNECTION_LOST",
            SERVER_UNAVAILABLE => "SERVER_UNAVAILABLE",
            CONNECTION_TIMEOUT => "CONNECTION_TIMEOUT",
            RESPONSE_UNKNOWN => "RESPONSE_UNKNOWN",
            TXN_RESTART => "TXN_RESTART",
            OPERATIONAL_FAILURE => "OPERATIONAL_FAILURE",
            _ => "UNKNOWN",
        }
    }
}

/// A typed procedure parameter
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Param {
    TinyInt(i8),
    SmallInt(i16),
    Integer(i32),
    BigInt(i64),
    String(String),
}

impl Param {
    /// Wire type name of this parameter
    pub fn type_name(&self) -> &'static str {
        match self {
            Param::TinyInt(_) => "TINYINT",
            Param::SmallInt(_) => "SMALLINT",
            Param::Integer(_) => "INTEGER",
            Param::BigInt(_) => "BIGINT",
            Param::String(_) => "STRING",
        }
    }

    pub fn as_json(&self) -> Value {
        match self {
            Param::TinyInt(v) => Value::from(*v),
            Param::SmallInt(v) => Value::from(*v),
            Param::Integer(v) => Value::from(*v),
            Param::BigInt(v) => Value::from(*v),
            Param::String(v) => Value::from(v.as_str()),
        }
    }
}

impl From<&str> for Param {
    fn from(value: &str) -> Self {
        Param::String(value.to_string())
    }
}

impl From<i32> for Param {
    fn from(value: i32) -> Self {
        Param::Integer(value)
    }
}

impl From<i64> for Param {
    fn from(value: i64) -> Self {
        Param::BigInt(value)
    }
}

/// Column description of a result table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    #[serde(rename = "type", default)]
    pub column_type: i32,
}

/// One result table of a procedure response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    #[serde(rename = "schema", default)]
    pub columns: Vec<Column>,
    #[serde(rename = "data", default)]
    pub rows: Vec<Vec<Value>>,
}

impl Table {
    pub fn new(columns: &[&str], rows: Vec<Vec<Value>>) -> Self {
        Self {
            columns: columns
                .iter()
                .map(|name| Column {
                    name: name.to_string(),
                    column_type: 0,
                })
                .collect(),
            rows,
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Index of a column, matched case-insensitively
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn value(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column_index(column)?;
        self.rows.get(row)?.get(idx)
    }

    /// Cell rendered as a string; numbers are formatted, null is `None`
    pub fn get_string(&self, row: usize, column: &str) -> Option<String> {
        match self.value(row, column)? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Cell as an integer; numeric strings are accepted
    pub fn get_i64(&self, row: usize, column: &str) -> Option<i64> {
        match self.value(row, column)? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

/// Response to a procedure call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub status: i8,
    #[serde(rename = "statusstring", default)]
    pub status_string: Option<String>,
    #[serde(rename = "results", default)]
    pub tables: Vec<Table>,
}

impl Response {
    pub fn success(tables: Vec<Table>) -> Self {
        Self {
            status: status::SUCCESS,
            status_string: None,
            tables,
        }
    }

    pub fn failure(code: i8, message: impl Into<String>) -> Self {
        Self {
            status: code,
            status_string: Some(message.into()),
            tables: Vec::new(),
        }
    }

    pub fn status(&self) -> i8 {
        self.status
    }

    pub fn is_success(&self) -> bool {
        self.status == status::SUCCESS
    }

    pub fn table(&self, index: usize) -> Option<&Table> {
        self.tables.get(index)
    }

    /// Value of the `STATUS` column in the first row of the first table.
    ///
    /// Admin procedures such as `@Pause` report their own result this way,
    /// separately from the response status.
    pub fn status_column(&self) -> Option<i64> {
        self.table(0)?.get_i64(0, "STATUS")
    }

    /// Status string, or the status code's name when the server sent none
    pub fn describe(&self) -> String {
        match &self.status_string {
            Some(s) if !s.is_empty() => s.clone(),
            _ => status::name(self.status).to_string(),
        }
    }
}

/// Failures of the call itself, as opposed to a non-success response
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CallError {
    #[error("connection to {endpoint} failed: {message}")]
    Connection { endpoint: String, message: String },

    #[error("connection lost while calling {procedure}: {message}")]
    ConnectionLost { procedure: String, message: String },

    #[error("call to {procedure} timed out")]
    Timeout { procedure: String },

    #[error("invalid response to {procedure}: {message}")]
    Protocol { procedure: String, message: String },

    #[error("authentication failed: {0}")]
    Authentication(String),
}

impl CallError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, CallError::Timeout { .. })
    }

    /// True when the server went away mid-call, which is the expected result
    /// of stopping or shutting down the node serving the connection.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, CallError::ConnectionLost { .. })
    }
}

/// Invokes system procedures on one connection
#[async_trait]
pub trait ProcedureCaller: Send + Sync {
    async fn call_procedure(&self, name: &str, params: &[Param]) -> Result<Response, CallError>;

    /// Where this caller is connected, for log and report messages
    fn endpoint(&self) -> String;
}

/// Opens admin connections to specific cluster members
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, host: &Host) -> Result<Box<dyn ProcedureCaller>, CallError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_table_accessors() {
        let table = Table::new(
            &["HOST_ID", "KEY", "VALUE"],
            vec![vec![json!(0), json!("HOSTNAME"), json!("db1")]],
        );
        assert_eq!(table.column_index("key"), Some(1));
        assert_eq!(table.get_string(0, "VALUE").as_deref(), Some("db1"));
        assert_eq!(table.get_string(0, "HOST_ID").as_deref(), Some("0"));
        assert_eq!(table.get_i64(0, "HOST_ID"), Some(0));
        assert_eq!(table.get_i64(0, "VALUE"), None);
        assert_eq!(table.get_string(1, "VALUE"), None);
        assert_eq!(table.get_string(0, "MISSING"), None);
    }

    #[test]
    fn test_status_column() {
        let ok = Response::success(vec![Table::new(&["STATUS"], vec![vec![json!(0)]])]);
        assert_eq!(ok.status_column(), Some(0));
        assert!(ok.is_success());

        let empty = Response::success(vec![]);
        assert_eq!(empty.status_column(), None);
    }

    #[test]
    fn test_describe_falls_back_to_status_name() {
        let resp = Response {
            status: status::GRACEFUL_FAILURE,
            status_string: None,
            tables: vec![],
        };
        assert_eq!(resp.describe(), "GRACEFUL_FAILURE");
        assert_eq!(
            Response::failure(status::USER_ABORT, "nope").describe(),
            "nope"
        );
    }

    #[test]
    fn test_response_deserializes_from_json_api() {
        let body = json!({
            "status": 1,
            "statusstring": null,
            "results": [{
                "status": -128,
                "schema": [{"name": "STATUS", "type": 6}],
                "data": [[0]]
            }]
        });
        let resp: Response = serde_json::from_value(body).unwrap();
        assert!(resp.is_success());
        assert_eq!(resp.status_column(), Some(0));
    }

    #[test]
    fn test_param_types() {
        assert_eq!(Param::from("OVERVIEW").type_name(), "STRING");
        assert_eq!(Param::from(3).type_name(), "INTEGER");
        assert_eq!(Param::Integer(7).as_json(), json!(7));
    }
}
