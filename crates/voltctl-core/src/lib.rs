//! # voltctl-core
//!
//! Cluster administration engine behind the `voltctl` CLI: stopping single
//! members, pausing and quiescing, resuming, and shutting down a cluster.
//!
//! The crate is split along the path a request takes:
//!
//! - [`address`] - parsing operator-supplied `host[:port]` lists
//! - [`client`] - the [`ProcedureCaller`](client::ProcedureCaller) and
//!   [`Connector`](client::Connector) seams plus a JSON API implementation
//! - [`topology`] - the cluster model built from `@SystemInformation`
//! - [`operations`] - the sequencers, each returning an
//!   [`OperationOutcome`](operations::OperationOutcome)
//! - [`config`] - connection profiles
//!
//! ## Example
//!
//! ```rust,ignore
//! use voltctl_core::client::{ClientSettings, JsonApiClient, JsonApiConnector};
//! use voltctl_core::address::parse_endpoints;
//! use voltctl_core::operations::{Interrupt, stop::{StopOptions, stop_node}};
//!
//! let hosts = parse_endpoints(&["db1,db2"], Some(8080), 1, None)?;
//! let caller = JsonApiClient::connect_any(&hosts, &ClientSettings::default()).await?;
//! let connector = JsonApiConnector::new(ClientSettings::default());
//!
//! let (_handle, interrupt) = Interrupt::new();
//! let outcome = stop_node(&caller, &connector, &StopOptions::new("db3"), &interrupt).await?;
//! println!("{:?}", outcome);
//! ```

pub mod address;
pub mod client;
pub mod config;
pub mod error;
pub mod operations;
pub mod topology;

// Re-export commonly used types
pub use address::{AddressError, Endpoint, parse_endpoints};
pub use client::{CallError, ProcedureCaller};
pub use error::{CoreError, ResolutionError, Result, UsageError};
pub use operations::{Interrupt, InterruptHandle, Operation, OperationOutcome, OutcomeStatus};
pub use topology::{Host, Topology};
