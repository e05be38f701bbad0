//! In-memory cluster topology built from `@SystemInformation OVERVIEW`
//!
//! The overview response is a list of `(host id, property, value)` rows. The
//! model replays those rows into one [`Host`] per id and answers the
//! selection queries the admin operations need: which member is the target
//! of an operation, and which other member is safe to talk to while the
//! target is being acted upon.

use crate::client::Table;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use thiserror::Error;
use tracing::trace;

/// A property value after name-based coercion
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Int(i64),
    Text(String),
}

impl PropertyValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            PropertyValue::Int(v) => Some(*v),
            PropertyValue::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            PropertyValue::Text(v) => Some(v),
            PropertyValue::Int(_) => None,
        }
    }
}

impl std::fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PropertyValue::Int(v) => write!(f, "{}", v),
            PropertyValue::Text(v) => write!(f, "{}", v),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TopologyError {
    #[error("invalid host id '{0}' in system information")]
    InvalidHostId(String),

    #[error("invalid value '{value}' for {property} of host {host_id}")]
    InvalidPort {
        host_id: u32,
        property: String,
        value: String,
    },

    #[error("system information response is missing column {0}")]
    MissingColumn(&'static str),
}

/// One cluster member
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Host {
    pub id: u32,
    pub hostname: Option<String>,
    pub ipaddress: Option<String>,
    pub internal_port: Option<u16>,
    pub admin_port: Option<u16>,
    pub admin_interface: Option<String>,
    pub external_interface: Option<String>,
    /// Every other property the server reported, keyed by lower-case name
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, PropertyValue>,
}

impl Host {
    pub fn new(id: u32) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }

    pub fn hostname(&self) -> &str {
        self.hostname.as_deref().unwrap_or("")
    }

    /// Hostname when known, otherwise the IP address
    pub fn display_name(&self) -> &str {
        match (&self.hostname, &self.ipaddress) {
            (Some(h), _) if !h.is_empty() => h,
            (_, Some(ip)) => ip,
            _ => "",
        }
    }

    /// Interface and port for an admin connection to this host.
    ///
    /// Uses the admin interface when the server reports one and falls back to
    /// the host's IP address otherwise.
    pub fn admin_endpoint(&self) -> crate::address::Endpoint {
        let host = self
            .admin_interface
            .as_deref()
            .filter(|s| !s.is_empty())
            .or(self.ipaddress.as_deref())
            .unwrap_or_else(|| self.hostname());
        crate::address::Endpoint::new(host, self.admin_port)
    }

    /// Look up any property by its (case-insensitive) name
    pub fn property(&self, name: &str) -> Option<PropertyValue> {
        let name = name.to_ascii_lowercase();
        let text = |v: &Option<String>| v.clone().map(PropertyValue::Text);
        let int = |v: Option<u16>| v.map(|p| PropertyValue::Int(p.into()));
        match name.as_str() {
            "hostname" => text(&self.hostname),
            "ipaddress" => text(&self.ipaddress),
            "internalport" => int(self.internal_port),
            "adminport" => int(self.admin_port),
            "admininterface" => text(&self.admin_interface),
            "externalinterface" => text(&self.external_interface),
            other => self.extra.get(other).cloned(),
        }
    }

    fn matches_address(&self, hostname: &str) -> bool {
        self.hostname.as_deref() == Some(hostname) || self.ipaddress.as_deref() == Some(hostname)
    }

    fn set(&mut self, name: String, raw: &str) -> Result<(), TopologyError> {
        if !name.ends_with("port") {
            let value = raw.to_string();
            match name.as_str() {
                "hostname" => self.hostname = Some(value),
                "ipaddress" => self.ipaddress = Some(value),
                "admininterface" => self.admin_interface = Some(value),
                "externalinterface" => self.external_interface = Some(value),
                _ => {
                    self.extra.insert(name, PropertyValue::Text(value));
                }
            }
            return Ok(());
        }

        let parsed = raw.trim().parse::<i64>();
        match name.as_str() {
            "internalport" | "adminport" => {
                let port = parsed
                    .ok()
                    .and_then(|v| u16::try_from(v).ok())
                    .ok_or_else(|| invalid_port(self.id, &name, raw))?;
                if name == "internalport" {
                    self.internal_port = Some(port);
                } else {
                    self.admin_port = Some(port);
                }
            }
            // Ports the model does not rely on are kept as reported when not numeric
            _ => {
                let value = match parsed {
                    Ok(v) => PropertyValue::Int(v),
                    Err(_) => PropertyValue::Text(raw.to_string()),
                };
                self.extra.insert(name, value);
            }
        }
        Ok(())
    }
}

fn invalid_port(host_id: u32, property: &str, value: &str) -> TopologyError {
    TopologyError::InvalidPort {
        host_id,
        property: property.to_string(),
        value: value.to_string(),
    }
}

/// Cluster members in the order the server first reported them
#[derive(Debug, Clone, Default, Serialize)]
pub struct Topology {
    hosts: Vec<Host>,
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a topology from an OVERVIEW table (`HOST_ID`, `KEY`, `VALUE`)
    pub fn from_overview(table: &Table) -> Result<Self, TopologyError> {
        let host_col = table
            .column_index("HOST_ID")
            .ok_or(TopologyError::MissingColumn("HOST_ID"))?;
        let key_col = table
            .column_index("KEY")
            .ok_or(TopologyError::MissingColumn("KEY"))?;
        let value_col = table
            .column_index("VALUE")
            .ok_or(TopologyError::MissingColumn("VALUE"))?;

        let cell = |row: &[serde_json::Value], idx: usize| match row.get(idx) {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(serde_json::Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        };

        let mut topology = Self::new();
        for row in &table.rows {
            topology.update(
                &cell(row, host_col),
                &cell(row, key_col),
                &cell(row, value_col),
            )?;
        }
        Ok(topology)
    }

    /// Record one property for one host, creating the host on first sight.
    ///
    /// Property names are lower-cased. Values of names ending in `port` are
    /// stored as integers; only the internal and admin ports must parse.
    /// Unknown names are kept, never rejected.
    pub fn update(
        &mut self,
        host_id_raw: &str,
        property_raw: &str,
        value_raw: &str,
    ) -> Result<(), TopologyError> {
        let id: u32 = host_id_raw
            .trim()
            .parse()
            .map_err(|_| TopologyError::InvalidHostId(host_id_raw.to_string()))?;
        let name = property_raw.trim().to_ascii_lowercase();
        trace!(host_id = id, property = %name, value = value_raw, "topology update");

        let idx = match self.hosts.iter().position(|h| h.id == id) {
            Some(idx) => idx,
            None => {
                self.hosts.push(Host::new(id));
                self.hosts.len() - 1
            }
        };
        self.hosts[idx].set(name, value_raw)
    }

    pub fn hosts(&self) -> impl Iterator<Item = &Host> {
        self.hosts.iter()
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    pub fn get_host_by_id(&self, id: u32) -> Option<&Host> {
        self.hosts.iter().find(|h| h.id == id)
    }

    /// First host whose hostname equals `hostname` exactly
    pub fn get_host(&self, hostname: &str) -> Option<&Host> {
        self.hosts
            .iter()
            .find(|h| h.hostname.as_deref() == Some(hostname))
    }

    /// A host whose hostname is not in `excluded`, if any
    pub fn get_connection_host(&self, excluded: &HashSet<&str>) -> Option<&Host> {
        self.hosts.iter().find(|h| !excluded.contains(h.hostname()))
    }

    /// Find the target host and a different host to connect through, in one pass.
    ///
    /// The target must match `hostname` (against hostname or IP address) and
    /// `port` (against the internal port); hosts sharing a name on loopback
    /// setups differ only by port. The connection host is the first host that
    /// is not the target. A single-member cluster yields `(Some(target), None)`.
    pub fn get_target_and_connection_host(
        &self,
        hostname: &str,
        port: u16,
    ) -> (Option<&Host>, Option<&Host>) {
        let mut target = None;
        let mut connection = None;
        for host in &self.hosts {
            if target.is_none() && host.matches_address(hostname) && host.internal_port == Some(port)
            {
                target = Some(host);
            } else if connection.is_none() {
                connection = Some(host);
            }
            if target.is_some() && connection.is_some() {
                break;
            }
        }
        (target, connection)
    }
}
