//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router: companion route plus catch-all forwarding
//! - Wire up middleware (tracing, body limit)
//! - Serve on the bound listener until shutdown
//! - Forward every request to the upstream and relay the answer

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, DefaultBodyLimit, State},
    http::{HeaderMap, Method, Uri},
    response::{IntoResponse, Response},
    routing::{any, get},
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::config::{CompanionConfig, ProxyConfig, UpstreamConfig};
use crate::http::request::{wildcard_segment, ProxiedRequest};
use crate::http::response::{relay, ProxyError};
use crate::net::UpstreamClient;

/// Path answered locally with the companion service address.
pub const COMPANION_PATH: &str = "/proxy";

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub client: UpstreamClient,
    pub upstream: Arc<UpstreamConfig>,
    pub companion: Arc<CompanionConfig>,
}

impl AppState {
    pub fn new(config: &ProxyConfig, client: UpstreamClient) -> Self {
        Self {
            client,
            upstream: Arc::new(config.upstream.clone()),
            companion: Arc::new(config.companion.clone()),
        }
    }
}

/// HTTP server for the forwarding proxy.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    /// Create a server forwarding through `client`, the one shared
    /// outbound client.
    pub fn new(config: &ProxyConfig, client: UpstreamClient) -> Self {
        let state = AppState::new(config, client);
        Self {
            router: build_router(state),
        }
    }

    /// Run the server, accepting connections on the given listener until
    /// `shutdown` fires. In-flight requests are drained before returning.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            "HTTP server starting"
        );

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Build the Axum router with all middleware layers.
///
/// Non-GET requests to the companion path are forwarded like any other.
pub fn build_router(state: AppState) -> Router {
    let body_limit = state.upstream.max_body_bytes;

    Router::new()
        .route(
            COMPANION_PATH,
            get(companion_handler).fallback(forward_handler),
        )
        .route("/{*path}", any(forward_handler))
        .route("/", any(forward_handler))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(DefaultBodyLimit::max(body_limit)),
        )
}

async fn companion_handler(State(state): State<AppState>) -> String {
    state.companion.address.clone()
}

/// Catch-all forwarding handler.
///
/// Builds the outbound request, dispatches it, relays the result and logs
/// one line per request.
async fn forward_handler(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let response = match body {
        Ok(body) => forward(&state, &method, &uri, &headers, body)
            .await
            .unwrap_or_else(|e| e.into_response()),
        Err(rejection) => rejection.into_response(),
    };

    tracing::info!(
        method = %method,
        path = %wildcard_segment(&uri),
        status = response.status().as_u16(),
        "returns"
    );

    response
}

async fn forward(
    state: &AppState,
    method: &Method,
    uri: &Uri,
    headers: &HeaderMap,
    body: Bytes,
) -> Result<Response, ProxyError> {
    let deadline = state.client.deadline();
    let request = ProxiedRequest::build(&state.upstream, method, uri, headers, body)?.into_http()?;
    let upstream = state.client.send(request, deadline).await?;
    Ok(relay(upstream, deadline))
}
