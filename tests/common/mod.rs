//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use anchor_proxy::config::ProxyConfig;
use anchor_proxy::net::build_client;
use anchor_proxy::{BindAddress, HttpServer, Shutdown};
use axum::body::{Body, Bytes};
use axum::extract::{ConnectInfo, Path};
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{AppendHeaders, IntoResponse, Response};
use axum::routing::{any, get};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

pub const STREAM_CHUNKS: usize = 64;
pub const STREAM_CHUNK_LEN: usize = 1024;

/// Serve `router` on an ephemeral loopback port, with peer addresses.
async fn serve(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await;
    });
    addr
}

/// Start a mock upstream.
///
/// - `/raw` echoes the request body bytes
/// - `/status/{code}` answers with that status, rate-limit headers and two cookies
/// - `/stream` sends `STREAM_CHUNKS` chunks of `STREAM_CHUNK_LEN` bytes
/// - `/slow` answers after three seconds
/// - anything else reports method, path, query, headers, body and peer IP as JSON
pub async fn start_upstream() -> SocketAddr {
    let router = Router::new()
        .route("/raw", any(raw))
        .route("/status/{code}", any(status))
        .route("/stream", get(stream))
        .route("/slow", get(slow))
        .fallback(echo);
    serve(router).await
}

async fn echo(
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let mut seen = serde_json::Map::new();
    for name in headers.keys() {
        let values: Vec<String> = headers
            .get_all(name)
            .iter()
            .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
            .collect();
        seen.insert(name.to_string(), json!(values));
    }

    (
        AppendHeaders([("x-upstream", "echo")]),
        Json(json!({
            "method": method.as_str(),
            "path": uri.path(),
            "query": uri.query(),
            "headers": seen,
            "body": String::from_utf8_lossy(&body),
            "peer_ip": peer.ip().to_string(),
        })),
    )
}

async fn raw(body: Bytes) -> Bytes {
    body
}

async fn status(Path(code): Path<u16>) -> impl IntoResponse {
    (
        StatusCode::from_u16(code).unwrap(),
        AppendHeaders([
            ("x-ratelimit-remaining", "0"),
            ("x-ratelimit-bucket", "d721dea6054f6322373d361f98e5c38b"),
            ("set-cookie", "a=1"),
            ("set-cookie", "b=2"),
        ]),
        "status body",
    )
}

async fn stream() -> Response {
    let chunks = (0..STREAM_CHUNKS)
        .map(|i| Ok::<_, std::io::Error>(Bytes::from(vec![i as u8; STREAM_CHUNK_LEN])));
    Body::from_stream(futures_util::stream::iter(chunks)).into_response()
}

async fn slow() -> &'static str {
    tokio::time::sleep(Duration::from_secs(3)).await;
    "late"
}

/// Start a metadata service answering every request with `status` and `body`.
pub async fn start_metadata(status: StatusCode, body: &'static str) -> SocketAddr {
    let router = Router::new().fallback(move || async move { (status, body) });
    serve(router).await
}

/// An address nothing listens on.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// Accepts connections and never writes a byte, so a TLS handshake stalls.
pub async fn start_silent() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });
    addr
}

/// Defaults pointed at `upstream`, with ambient proxies ignored.
pub fn test_config(upstream: SocketAddr) -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.upstream.origin = format!("http://{}/", upstream);
    config.client.use_env_proxy = false;
    config.metadata.use_env_proxy = false;
    config
}

pub fn loopback_bind() -> BindAddress {
    BindAddress::new(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

/// Run the real server on an ephemeral port.
pub async fn start_proxy(config: ProxyConfig, bind: BindAddress) -> (SocketAddr, Shutdown) {
    let client = build_client(&config.client, &bind).unwrap();
    let listener = anchor_proxy::net::listener::bind(&config.listener)
        .await
        .unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let server = HttpServer::new(&config, client);
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });

    (addr, shutdown)
}

/// Client that talks to the proxy directly.
pub fn test_client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

/// Send a GET with `target` written into the request line untouched and
/// decode the echo JSON. HTTP clients resolve dot segments themselves, so
/// this goes over a bare socket.
pub async fn raw_get_echo(proxy: SocketAddr, target: &str) -> Value {
    let mut stream = TcpStream::connect(proxy).await.unwrap();
    let request = format!("GET {target} HTTP/1.1\r\nHost: {proxy}\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut raw = Vec::new();
    stream.read_to_end(&mut raw).await.unwrap();
    let text = String::from_utf8(raw).unwrap();
    let (head, body) = text.split_once("\r\n\r\n").unwrap();

    assert!(head.starts_with("HTTP/1.1 200"), "unexpected response: {}", head);
    serde_json::from_str(body).unwrap()
}
