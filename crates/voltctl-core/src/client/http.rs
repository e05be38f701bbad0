//! [`ProcedureCaller`] over the server's JSON procedure API
//!
//! Every call is a `GET /api/1.0/` with the procedure name, a JSON array of
//! parameters and `admin=true`, answered by a JSON document carrying the
//! response status and result tables.

use super::{CallError, Connector, Param, ProcedureCaller, Response};
use crate::address::Endpoint;
use crate::topology::{Host, PropertyValue};
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, trace, warn};
use url::Url;

/// Port of the HTTP interface when the server does not report one
pub const DEFAULT_HTTP_PORT: u16 = 8080;

const API_PATH: &str = "/api/1.0/";
const PING: &str = "@Ping";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Credentials and transport options shared by every connection
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClientSettings {
    pub username: Option<String>,
    pub password: Option<String>,
    pub tls: bool,
    /// Accept any server certificate
    pub insecure: bool,
    /// Extra PEM root certificate
    pub ca_cert: Option<PathBuf>,
    /// Upper bound for a single request; graceful operations can legitimately
    /// block server-side for their whole timeout, so this is unset by default
    pub request_timeout: Option<Duration>,
}

impl ClientSettings {
    fn scheme(&self) -> &'static str {
        if self.tls { "https" } else { "http" }
    }

    fn build_http_client(&self, endpoint: &str) -> Result<reqwest::Client, CallError> {
        let setup_error = |message: String| CallError::Connection {
            endpoint: endpoint.to_string(),
            message,
        };

        let mut builder = reqwest::Client::builder()
            .user_agent(format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")))
            .connect_timeout(CONNECT_TIMEOUT);
        if let Some(timeout) = self.request_timeout {
            builder = builder.timeout(timeout);
        }
        if self.insecure {
            builder = builder.danger_accept_invalid_certs(true);
        }
        if let Some(path) = &self.ca_cert {
            let pem = std::fs::read(path)
                .map_err(|e| setup_error(format!("cannot read {}: {}", path.display(), e)))?;
            let cert = reqwest::Certificate::from_pem(&pem)
                .map_err(|e| setup_error(format!("invalid certificate {}: {}", path.display(), e)))?;
            builder = builder.add_root_certificate(cert);
        }
        builder.build().map_err(|e| setup_error(e.to_string()))
    }
}

/// One connection to one server's JSON API
#[derive(Clone)]
pub struct JsonApiClient {
    inner: reqwest::Client,
    base_url: Url,
    settings: ClientSettings,
}

impl JsonApiClient {
    /// Client for `endpoint`, using [`DEFAULT_HTTP_PORT`] when it has no port
    pub fn new(endpoint: &Endpoint, settings: ClientSettings) -> Result<Self, CallError> {
        let authority = Endpoint::new(
            endpoint.host.clone(),
            Some(endpoint.port.unwrap_or(DEFAULT_HTTP_PORT)),
        );
        let raw = format!("{}://{}", settings.scheme(), authority);
        let base_url = Url::parse(&raw).map_err(|e| CallError::Connection {
            endpoint: authority.to_string(),
            message: e.to_string(),
        })?;
        Self::with_base_url(base_url, settings)
    }

    pub fn with_base_url(base_url: Url, settings: ClientSettings) -> Result<Self, CallError> {
        let inner = settings.build_http_client(base_url.as_str())?;
        Ok(Self {
            inner,
            base_url,
            settings,
        })
    }

    /// Client for the first endpoint that answers a `@Ping` successfully.
    ///
    /// Endpoints are tried in order; a host that answers with a failure
    /// status is skipped like one that does not answer. When none succeeds,
    /// the error of the last attempt is returned.
    pub async fn connect_any(
        endpoints: &[Endpoint],
        settings: &ClientSettings,
    ) -> Result<Self, CallError> {
        let mut last_error = CallError::Connection {
            endpoint: String::new(),
            message: "no hosts given".to_string(),
        };
        for endpoint in endpoints {
            let client = Self::new(endpoint, settings.clone())?;
            match client.call_procedure(PING, &[]).await {
                Ok(resp) if resp.is_success() => {
                    debug!(endpoint = %client.endpoint(), "connected");
                    return Ok(client);
                }
                Ok(resp) => {
                    warn!(endpoint = %endpoint, status = resp.status(), "host refused ping");
                    last_error = CallError::Connection {
                        endpoint: client.endpoint(),
                        message: format!("{} returned {}", PING, resp.describe()),
                    };
                }
                // Wrong credentials will not get better on another host
                Err(err @ CallError::Authentication(_)) => return Err(err),
                Err(err) => {
                    warn!(endpoint = %endpoint, error = %err, "host did not answer");
                    last_error = err;
                }
            }
        }
        Err(last_error)
    }

    fn procedure_url(&self, name: &str, params: &[Param]) -> Result<Url, CallError> {
        let mut url = self.base_url.join(API_PATH).map_err(|e| CallError::Protocol {
            procedure: name.to_string(),
            message: e.to_string(),
        })?;
        let parameters = serde_json::Value::Array(params.iter().map(Param::as_json).collect());
        url.query_pairs_mut()
            .append_pair("Procedure", name)
            .append_pair("Parameters", &parameters.to_string())
            .append_pair("admin", "true");
        Ok(url)
    }

    fn classify(&self, name: &str, err: reqwest::Error) -> CallError {
        if err.is_timeout() {
            CallError::Timeout {
                procedure: name.to_string(),
            }
        } else if err.is_connect() {
            CallError::Connection {
                endpoint: self.endpoint(),
                message: err.to_string(),
            }
        } else if err.is_decode() {
            CallError::Protocol {
                procedure: name.to_string(),
                message: err.to_string(),
            }
        } else {
            CallError::ConnectionLost {
                procedure: name.to_string(),
                message: err.to_string(),
            }
        }
    }
}

#[async_trait]
impl ProcedureCaller for JsonApiClient {
    async fn call_procedure(&self, name: &str, params: &[Param]) -> Result<Response, CallError> {
        let url = self.procedure_url(name, params)?;
        debug!(endpoint = %self.endpoint(), procedure = name, "calling procedure");

        let mut request = self.inner.get(url);
        if let Some(user) = &self.settings.username {
            request = request.basic_auth(user, self.settings.password.as_ref());
        }

        let resp = request.send().await.map_err(|e| self.classify(name, e))?;
        let http_status = resp.status();
        let body = resp.text().await.map_err(|e| self.classify(name, e))?;
        trace!(procedure = name, %http_status, body = %body, "procedure response");

        if http_status == reqwest::StatusCode::UNAUTHORIZED
            || http_status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(CallError::Authentication(format!(
                "{} rejected the credentials ({})",
                self.endpoint(),
                http_status
            )));
        }

        // Procedure failures still come back as a JSON response body, so only
        // give up on the HTTP status when the body is not one
        serde_json::from_str::<Response>(&body).map_err(|e| CallError::Protocol {
            procedure: name.to_string(),
            message: if http_status.is_success() {
                e.to_string()
            } else {
                format!("HTTP {}: {}", http_status, body.trim())
            },
        })
    }

    fn endpoint(&self) -> String {
        match (self.base_url.host_str(), self.base_url.port_or_known_default()) {
            (Some(host), Some(port)) => format!("{}:{}", host, port),
            (Some(host), None) => host.to_string(),
            _ => self.base_url.to_string(),
        }
    }
}

/// Opens [`JsonApiClient`]s to specific cluster members
#[derive(Debug, Clone, Default)]
pub struct JsonApiConnector {
    settings: ClientSettings,
}

impl JsonApiConnector {
    pub fn new(settings: ClientSettings) -> Self {
        Self { settings }
    }

    /// HTTP endpoint a host serves its JSON API on
    pub fn http_endpoint(host: &Host) -> Endpoint {
        let interface = host
            .extra
            .get("httpinterface")
            .and_then(PropertyValue::as_text)
            .filter(|s| !s.is_empty())
            .or(host.ipaddress.as_deref())
            .unwrap_or_else(|| host.hostname());
        let port = host
            .extra
            .get("httpport")
            .and_then(PropertyValue::as_int)
            .and_then(|p| u16::try_from(p).ok())
            .unwrap_or(DEFAULT_HTTP_PORT);
        Endpoint::new(interface, Some(port))
    }
}

#[async_trait]
impl Connector for JsonApiConnector {
    async fn connect(&self, host: &Host) -> Result<Box<dyn ProcedureCaller>, CallError> {
        let endpoint = Self::http_endpoint(host);
        debug!(
            host_id = host.id,
            hostname = host.display_name(),
            admin = %host.admin_endpoint(),
            http = %endpoint,
            "opening connection"
        );
        Ok(Box::new(JsonApiClient::new(&endpoint, self.settings.clone())?))
    }
}

// Ensure that client is Send + Sync. Compiler will fail if it's not.
const _: () = {
    const fn assert_send<T: Send + Sync>() {}
    assert_send::<JsonApiClient>();
};
