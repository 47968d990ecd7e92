//! Outbound HTTP client construction.
//!
//! # Responsibilities
//! - Build the one client shared by every forwarded request
//! - Pin outbound connections to the bind address
//! - Apply dial, keep-alive, pool and total-request limits
//!
//! # Design Decisions
//! - Built once after startup; cloning shares the same connection pool
//! - Targets are `http::Uri`, sent exactly as composed (no dot-segment
//!   resolution)
//! - No automatic decompression: upstream bytes are relayed untouched

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::http::header::PROXY_AUTHORIZATION;
use axum::http::uri::Scheme;
use axum::http::{Request, Response};
use http_body_util::Full;
use hyper::body::Incoming;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::client::proxy::matcher::Matcher;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use thiserror::Error;
use tokio::time::Instant;

use crate::config::ClientConfig;
use crate::net::bind::BindAddress;
use crate::net::connector::UpstreamConnector;
use crate::net::tls::client_tls;

/// Why a dispatched request produced no upstream response.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("upstream did not answer within {0:?}")]
    Timeout(Duration),

    #[error("{}", chain(.0))]
    Client(#[from] hyper_util::client::legacy::Error),
}

/// Render an error and its sources on one line.
pub fn chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

/// Shared forwarding client.
#[derive(Clone)]
pub struct UpstreamClient {
    inner: Client<UpstreamConnector, Full<Bytes>>,
    proxies: Option<Arc<Matcher>>,
    request_timeout: Duration,
}

impl UpstreamClient {
    /// Deadline for a request starting now. It covers the response body too.
    pub fn deadline(&self) -> Instant {
        Instant::now() + self.request_timeout
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Send `request` and wait for the response head until `deadline`.
    pub async fn send(
        &self,
        mut request: Request<Full<Bytes>>,
        deadline: Instant,
    ) -> Result<Response<Incoming>, DispatchError> {
        self.authorize_forward_proxy(&mut request);

        tokio::time::timeout_at(deadline, self.inner.request(request))
            .await
            .map_err(|_| DispatchError::Timeout(self.request_timeout))?
            .map_err(DispatchError::from)
    }

    // Plain http through a proxy is not tunneled, so credentials ride on
    // the request itself.
    fn authorize_forward_proxy(&self, request: &mut Request<Full<Bytes>>) {
        if request.uri().scheme() != Some(&Scheme::HTTP) {
            return;
        }
        let Some(proxies) = &self.proxies else {
            return;
        };
        if let Some(auth) = proxies
            .intercept(request.uri())
            .and_then(|proxy| proxy.basic_auth().cloned())
        {
            request.headers_mut().insert(PROXY_AUTHORIZATION, auth);
        }
    }
}

/// Build the forwarding client.
///
/// Destinations whose address family differs from `bind` are dialed
/// without a local address; the connector races IPv4 and IPv6 candidates.
pub fn build_client(
    config: &ClientConfig,
    bind: &BindAddress,
) -> Result<UpstreamClient, rustls::Error> {
    let mut http = HttpConnector::new();
    http.enforce_http(false);
    http.set_local_address(Some(bind.ip()));
    http.set_connect_timeout(Some(config.connect_timeout()));
    http.set_keepalive(Some(config.keepalive()));
    http.set_nodelay(true);

    let proxies = config.use_env_proxy.then(|| Arc::new(Matcher::from_env()));
    let connector = UpstreamConnector::new(
        http,
        client_tls()?,
        proxies.clone(),
        config.tls_handshake_timeout(),
    );

    let inner = Client::builder(TokioExecutor::new())
        .pool_timer(TokioTimer::new())
        .pool_idle_timeout(config.idle_timeout())
        .pool_max_idle_per_host(config.max_idle_connections)
        .build(connector);

    tracing::debug!(
        bind_address = %bind,
        connect_timeout_secs = config.connect_timeout_secs,
        tls_handshake_timeout_secs = config.tls_handshake_timeout_secs,
        request_timeout_secs = config.request_timeout_secs,
        max_idle_connections = config.max_idle_connections,
        env_proxy = config.use_env_proxy,
        "Outbound client built"
    );

    Ok(UpstreamClient {
        inner,
        proxies,
        request_timeout: config.request_timeout(),
    })
}
