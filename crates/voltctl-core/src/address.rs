//! Parsing of `host[:port]` and `[ipv6]:port` address lists
//!
//! Operators hand the tool one or more comma-separated addresses. Each address
//! is either a bare hostname or IPv4 literal, optionally followed by `:PORT`,
//! or an IPv6 literal wrapped in square brackets, again optionally followed by
//! `:PORT`. An IPv6 literal without brackets cannot be told apart from a
//! `:PORT` suffix and is rejected rather than guessed at.
//!
//! # Example
//!
//! ```rust
//! use voltctl_core::address::parse_endpoints;
//!
//! let endpoints = parse_endpoints(&["db1:21212,[::1]"], Some(21211), 1, None).unwrap();
//! assert_eq!(endpoints[0].host, "db1");
//! assert_eq!(endpoints[0].port, Some(21212));
//! assert_eq!(endpoints[1].host, "::1");
//! assert_eq!(endpoints[1].port, Some(21211));
//! ```

use serde::Serialize;
use std::fmt;
use std::net::Ipv6Addr;
use std::str::FromStr;
use thiserror::Error;

/// A parsed network address
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Endpoint {
    /// Hostname, IPv4 literal, or IPv6 literal without brackets
    pub host: String,
    /// Port, filled from the caller's default when the address had none
    pub port: Option<u16>,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: Option<u16>) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// True when the host is an IPv6 literal
    pub fn is_ipv6(&self) -> bool {
        self.host.contains(':')
    }

    /// Host formatted for use in a URL authority (IPv6 gets its brackets back)
    pub fn url_host(&self) -> String {
        if self.is_ipv6() {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.port {
            Some(port) => write!(f, "{}:{}", self.url_host(), port),
            None => write!(f, "{}", self.url_host()),
        }
    }
}

impl FromStr for Endpoint {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_endpoint(s, None)
    }
}

/// Errors produced while parsing address strings
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("empty address")]
    Empty,

    #[error("missing host in address '{0}'")]
    MissingHost(String),

    #[error("missing port after ':' in address '{0}'")]
    MissingPort(String),

    #[error("invalid port '{port}' in address '{address}'")]
    InvalidPort { address: String, port: String },

    #[error(
        "ambiguous address '{0}': IPv6 addresses must be enclosed in brackets, e.g. [::1]:21212"
    )]
    AmbiguousIpv6(String),

    #[error("unterminated '[' in address '{0}'")]
    UnterminatedBracket(String),

    #[error("invalid IPv6 address '{host}' in '{address}'")]
    InvalidIpv6 { address: String, host: String },

    #[error("unexpected text after ']' in address '{0}'")]
    TrailingText(String),

    #[error("expected at least {min} address(es), got {actual}")]
    TooFew { min: usize, actual: usize },

    #[error("expected at most {max} address(es), got {actual}")]
    TooMany { max: usize, actual: usize },
}

/// Parse a list of address strings into endpoints.
///
/// Every element of `specs` may itself hold several comma-separated
/// addresses. Addresses without a port get `default_port`. The total number
/// of endpoints must fall within `[min_count, max_count]`, where a `max_count`
/// of `None` means unbounded.
pub fn parse_endpoints<S: AsRef<str>>(
    specs: &[S],
    default_port: Option<u16>,
    min_count: usize,
    max_count: Option<usize>,
) -> Result<Vec<Endpoint>, AddressError> {
    let mut endpoints = Vec::new();
    for spec in specs {
        for piece in spec.as_ref().split(',') {
            let piece = piece.trim();
            if piece.is_empty() {
                continue;
            }
            endpoints.push(parse_endpoint(piece, default_port)?);
        }
    }

    if endpoints.len() < min_count {
        return Err(AddressError::TooFew {
            min: min_count,
            actual: endpoints.len(),
        });
    }
    if let Some(max) = max_count
        && endpoints.len() > max
    {
        return Err(AddressError::TooMany {
            max,
            actual: endpoints.len(),
        });
    }

    Ok(endpoints)
}

/// Parse a single address.
pub fn parse_endpoint(address: &str, default_port: Option<u16>) -> Result<Endpoint, AddressError> {
    let address = address.trim();
    if address.is_empty() {
        return Err(AddressError::Empty);
    }

    let (host, port) = if let Some(rest) = address.strip_prefix('[') {
        let close = rest
            .find(']')
            .ok_or_else(|| AddressError::UnterminatedBracket(address.to_string()))?;
        let host = &rest[..close];
        if host.is_empty() {
            return Err(AddressError::MissingHost(address.to_string()));
        }
        if host.parse::<Ipv6Addr>().is_err() {
            return Err(AddressError::InvalidIpv6 {
                address: address.to_string(),
                host: host.to_string(),
            });
        }
        let port = match &rest[close + 1..] {
            "" => None,
            tail => match tail.strip_prefix(':') {
                Some(port) => Some(parse_port(address, port)?),
                None => return Err(AddressError::TrailingText(address.to_string())),
            },
        };
        (host, port)
    } else {
        match address.split_once(':') {
            None => (address, None),
            Some((_, rest)) if rest.contains(':') => {
                return Err(AddressError::AmbiguousIpv6(address.to_string()));
            }
            Some((host, port)) => {
                if host.is_empty() {
                    return Err(AddressError::MissingHost(address.to_string()));
                }
                (host, Some(parse_port(address, port)?))
            }
        }
    };

    Ok(Endpoint::new(host, port.or(default_port)))
}

fn parse_port(address: &str, port: &str) -> Result<u16, AddressError> {
    if port.is_empty() {
        return Err(AddressError::MissingPort(address.to_string()));
    }
    // u16::from_str accepts a leading '+', the grammar does not
    if !port.bytes().all(|b| b.is_ascii_digit()) {
        return Err(AddressError::InvalidPort {
            address: address.to_string(),
            port: port.to_string(),
        });
    }
    port.parse::<u16>().map_err(|_| AddressError::InvalidPort {
        address: address.to_string(),
        port: port.to_string(),
    })
}
