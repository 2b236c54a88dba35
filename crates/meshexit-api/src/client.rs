//! HTTP client for the control-plane API.
//!
//! Uses hyper with tokio for async HTTP/1.1 and rustls for HTTPS. Every
//! request opens its own connection; operations here are rare (a handful of
//! calls per switch) so pooling buys nothing.
//!
//! Transport and status failures are mapped to [`ApiError`] at this boundary
//! so the switch core can reason about a fixed taxonomy instead of raw
//! hyper errors.

use crate::model::{Group, Peer, Route, RouteUpdate};
use async_trait::async_trait;
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use hyper::{Method, Request, StatusCode, Uri};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::{debug, warn};
use url::Url;

/// Control-plane API errors.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid API URL: {0}")]
    InvalidUrl(String),

    #[error("authentication failed (401): the access token was rejected")]
    Unauthorized,

    #[error("permission denied (403): the access token lacks admin/write rights")]
    PermissionDenied,

    #[error("not found (404): {0}")]
    NotFound(String),

    #[error("request rejected by the server (HTTP {status}): {detail}")]
    ValidationRejected { status: u16, detail: String },

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("control plane unreachable: {0}")]
    Unreachable(String),

    #[error("unexpected response (HTTP {status}): {body}")]
    Api { status: u16, body: String },

    #[error("malformed response body: {0}")]
    Json(#[from] serde_json::Error),
}

impl ApiError {
    /// Connection-level failures are the only ones a route change to the
    /// caller's own path can plausibly explain. Everything else is a
    /// genuine API error.
    pub fn is_disruption_candidate(&self) -> bool {
        matches!(self, ApiError::Timeout(_) | ApiError::Unreachable(_))
    }
}

/// Map a non-2xx status to the error taxonomy.
fn status_error(status: StatusCode, body: &str) -> ApiError {
    let detail = truncate_detail(body);
    match status.as_u16() {
        401 => ApiError::Unauthorized,
        403 => ApiError::PermissionDenied,
        404 => ApiError::NotFound(detail),
        400 | 422 => ApiError::ValidationRejected {
            status: status.as_u16(),
            detail,
        },
        other => ApiError::Api {
            status: other,
            body: detail,
        },
    }
}

fn truncate_detail(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.len() <= 200 {
        trimmed.to_string()
    } else {
        let mut cut = 200;
        while !trimmed.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}...", &trimmed[..cut])
    }
}

/// Operations the switch core requires from the control plane.
///
/// `ControlPlaneClient` is the HTTP implementation; tests drive the core
/// against an in-memory fake instead.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    async fn list_peers(&self) -> Result<Vec<Peer>, ApiError>;

    async fn list_groups(&self) -> Result<Vec<Group>, ApiError>;

    async fn list_routes(&self) -> Result<Vec<Route>, ApiError>;

    async fn create_group(&self, name: &str, peer_ids: &[String]) -> Result<Group, ApiError>;

    async fn update_group(
        &self,
        group_id: &str,
        name: &str,
        peer_ids: &[String],
    ) -> Result<Group, ApiError>;

    /// Full-object route replacement. The timeout is per call: route
    /// updates reconfigure the data plane and can be slow, and the switch
    /// engine needs different budgets for detach and attach.
    async fn update_route(
        &self,
        route_id: &str,
        update: &RouteUpdate,
        timeout: Duration,
    ) -> Result<Route, ApiError>;

    /// Lightweight reachability check. Any HTTP response counts as
    /// reachable, including 401/403; only transport failures are errors.
    async fn probe(&self) -> Result<(), ApiError>;
}

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Timeout for list and group calls.
    pub request_timeout: Duration,
    /// Timeout for the reachability probe.
    pub probe_timeout: Duration,
    /// User-Agent string.
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(60),
            probe_timeout: Duration::from_secs(5),
            user_agent: format!("meshexit/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

#[derive(Serialize)]
struct GroupPayload<'a> {
    name: &'a str,
    peers: &'a [String],
}

struct ClientInner {
    /// Base URL without a trailing slash.
    base: String,
    token: String,
    config: ClientConfig,
    tls: TlsConnector,
}

/// HTTP implementation of [`ControlPlane`].
///
/// Cheap to clone; the connectivity prober moves a clone into its worker
/// task.
#[derive(Clone)]
pub struct ControlPlaneClient {
    inner: Arc<ClientInner>,
}

impl ControlPlaneClient {
    /// Create a client for the given API base URL and bearer token.
    pub fn new(api_url: &str, access_token: &str) -> Result<Self, ApiError> {
        Self::with_config(api_url, access_token, ClientConfig::default())
    }

    pub fn with_config(
        api_url: &str,
        access_token: &str,
        config: ClientConfig,
    ) -> Result<Self, ApiError> {
        let url = Url::parse(api_url).map_err(|e| ApiError::InvalidUrl(e.to_string()))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ApiError::InvalidUrl(format!(
                "unsupported scheme '{}'",
                url.scheme()
            )));
        }
        if url.host_str().is_none() {
            return Err(ApiError::InvalidUrl("missing host".to_string()));
        }

        let mut roots = rustls::RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let tls_config = rustls::ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();

        Ok(Self {
            inner: Arc::new(ClientInner {
                base: url.as_str().trim_end_matches('/').to_string(),
                token: access_token.to_string(),
                config,
                tls: TlsConnector::from(Arc::new(tls_config)),
            }),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        Url::parse(&format!("{}{}", self.inner.base, path))
            .map_err(|e| ApiError::InvalidUrl(e.to_string()))
    }

    fn build_request(
        &self,
        method: Method,
        uri: &Uri,
        body: Option<Vec<u8>>,
    ) -> Result<Request<Full<Bytes>>, ApiError> {
        let payload = body.map(Bytes::from).unwrap_or_default();
        Request::builder()
            .method(method)
            .uri(uri)
            .header(AUTHORIZATION, format!("Bearer {}", self.inner.token))
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json")
            .header(USER_AGENT, &self.inner.config.user_agent)
            .body(Full::new(payload))
            .map_err(|e| ApiError::InvalidUrl(e.to_string()))
    }

    /// Open a connection, send one request and collect the response body.
    async fn exchange(
        &self,
        method: Method,
        url: &Url,
        body: Option<Vec<u8>>,
    ) -> Result<(StatusCode, Vec<u8>), ApiError> {
        let host = url
            .host_str()
            .ok_or_else(|| ApiError::InvalidUrl("missing host".to_string()))?
            .to_string();
        let is_https = url.scheme() == "https";
        let port = url
            .port_or_known_default()
            .unwrap_or(if is_https { 443 } else { 80 });
        let uri: Uri = url
            .as_str()
            .parse()
            .map_err(|e: hyper::http::uri::InvalidUri| ApiError::InvalidUrl(e.to_string()))?;

        let request = self.build_request(method, &uri, body)?;

        let stream = TcpStream::connect((host.as_str(), port))
            .await
            .map_err(|e| ApiError::Unreachable(e.to_string()))?;

        let response = if is_https {
            let server_name = rustls::pki_types::ServerName::try_from(host.clone())
                .map_err(|_| ApiError::InvalidUrl(format!("invalid TLS server name '{host}'")))?;
            let tls_stream = self
                .inner
                .tls
                .connect(server_name, stream)
                .await
                .map_err(|e| ApiError::Unreachable(e.to_string()))?;

            let io = hyper_util::rt::TokioIo::new(tls_stream);
            let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
                .await
                .map_err(|e| ApiError::Unreachable(e.to_string()))?;
            tokio::spawn(async move {
                if let Err(e) = conn.await {
                    warn!("connection task ended: {}", e);
                }
            });

            sender
                .send_request(request)
                .await
                .map_err(|e| ApiError::Unreachable(e.to_string()))?
        } else {
            let io = hyper_util::rt::TokioIo::new(stream);
            let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
                .await
                .map_err(|e| ApiError::Unreachable(e.to_string()))?;
            tokio::spawn(async move {
                if let Err(e) = conn.await {
                    warn!("connection task ended: {}", e);
                }
            });

            sender
                .send_request(request)
                .await
                .map_err(|e| ApiError::Unreachable(e.to_string()))?
        };

        let status = response.status();
        let collected = response
            .into_body()
            .collect()
            .await
            .map_err(|e| ApiError::Unreachable(e.to_string()))?;

        Ok((status, collected.to_bytes().to_vec()))
    }

    /// One request with a wall-clock timeout covering connect, send and
    /// body collection.
    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
        timeout: Duration,
    ) -> Result<(StatusCode, Vec<u8>), ApiError> {
        let url = self.endpoint(path)?;
        debug!("{} {} (timeout {:?})", method, url, timeout);

        match tokio::time::timeout(timeout, self.exchange(method, &url, body)).await {
            Ok(result) => result,
            Err(_) => Err(ApiError::Timeout(timeout)),
        }
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
        timeout: Duration,
    ) -> Result<T, ApiError> {
        let (status, bytes) = self.send(method, path, body, timeout).await?;
        if status.is_success() {
            Ok(serde_json::from_slice(&bytes)?)
        } else {
            Err(status_error(status, &String::from_utf8_lossy(&bytes)))
        }
    }
}

#[async_trait]
impl ControlPlane for ControlPlaneClient {
    async fn list_peers(&self) -> Result<Vec<Peer>, ApiError> {
        self.call(
            Method::GET,
            "/api/peers",
            None,
            self.inner.config.request_timeout,
        )
        .await
    }

    async fn list_groups(&self) -> Result<Vec<Group>, ApiError> {
        self.call(
            Method::GET,
            "/api/groups",
            None,
            self.inner.config.request_timeout,
        )
        .await
    }

    async fn list_routes(&self) -> Result<Vec<Route>, ApiError> {
        self.call(
            Method::GET,
            "/api/routes",
            None,
            self.inner.config.request_timeout,
        )
        .await
    }

    async fn create_group(&self, name: &str, peer_ids: &[String]) -> Result<Group, ApiError> {
        let payload = serde_json::to_vec(&GroupPayload {
            name,
            peers: peer_ids,
        })?;
        self.call(
            Method::POST,
            "/api/groups",
            Some(payload),
            self.inner.config.request_timeout,
        )
        .await
    }

    async fn update_group(
        &self,
        group_id: &str,
        name: &str,
        peer_ids: &[String],
    ) -> Result<Group, ApiError> {
        let payload = serde_json::to_vec(&GroupPayload {
            name,
            peers: peer_ids,
        })?;
        self.call(
            Method::PUT,
            &format!("/api/groups/{group_id}"),
            Some(payload),
            self.inner.config.request_timeout,
        )
        .await
    }

    async fn update_route(
        &self,
        route_id: &str,
        update: &RouteUpdate,
        timeout: Duration,
    ) -> Result<Route, ApiError> {
        let payload = serde_json::to_vec(update)?;
        self.call(
            Method::PUT,
            &format!("/api/routes/{route_id}"),
            Some(payload),
            timeout,
        )
        .await
    }

    async fn probe(&self) -> Result<(), ApiError> {
        // Status is deliberately ignored: an auth error still proves the
        // network path is up, which is all the prober asks.
        let (status, _) = self
            .send(
                Method::GET,
                "/api/peers",
                None,
                self.inner.config.probe_timeout,
            )
            .await?;
        debug!("probe answered with HTTP {}", status);
        Ok(())
    }
}
