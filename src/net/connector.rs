//! Outbound connector for the forwarding client.
//!
//! # Responsibilities
//! - Dial every upstream connection from the bind address
//! - Route through an ambient proxy when one matches the destination
//! - Run the TLS handshake for https origins under its own deadline
//!
//! # Design Decisions
//! - https destinations behind a proxy are tunneled with `CONNECT`; plain
//!   http destinations are sent to the proxy in absolute form
//! - The TCP dial and the TLS handshake have separate timeouts

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::http::uri::Scheme;
use axum::http::Uri;
use hyper::rt::ReadBufCursor;
use hyper_util::client::legacy::connect::proxy::Tunnel;
use hyper_util::client::legacy::connect::{Connected, Connection, HttpConnector};
use hyper_util::client::proxy::matcher::Matcher;
use hyper_util::rt::TokioIo;
use rustls::pki_types::ServerName;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;
use tower::{Service, ServiceExt};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Why an upstream connection could not be established.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("dial failed")]
    Dial(#[source] BoxError),

    #[error("proxy tunnel failed")]
    Tunnel(#[source] BoxError),

    #[error("destination has no host: {0}")]
    MissingHost(Uri),

    #[error("'{0}' is not a valid TLS server name")]
    ServerName(String),

    #[error("TLS handshake failed")]
    Handshake(#[source] io::Error),

    #[error("TLS handshake timed out after {0:?}")]
    HandshakeTimeout(Duration),
}

/// Connector handed to the legacy hyper client.
#[derive(Clone)]
pub struct UpstreamConnector {
    http: HttpConnector,
    tls: TlsConnector,
    proxies: Option<Arc<Matcher>>,
    handshake_timeout: Duration,
}

impl UpstreamConnector {
    /// `http` must already carry the local address and dial settings.
    pub fn new(
        http: HttpConnector,
        tls: TlsConnector,
        proxies: Option<Arc<Matcher>>,
        handshake_timeout: Duration,
    ) -> Self {
        Self {
            http,
            tls,
            proxies,
            handshake_timeout,
        }
    }

    async fn connect(self, dst: Uri) -> Result<UpstreamStream, ConnectError> {
        let https = dst.scheme() == Some(&Scheme::HTTPS);
        let intercept = self.proxies.as_ref().and_then(|m| m.intercept(&dst));

        let (tcp, proxied) = match intercept {
            Some(proxy) if https => {
                let mut tunnel = Tunnel::new(proxy.uri().clone(), self.http.clone());
                if let Some(auth) = proxy.basic_auth() {
                    tunnel = tunnel.with_auth(auth.clone());
                }
                let io = tunnel
                    .oneshot(dst.clone())
                    .await
                    .map_err(|e| ConnectError::Tunnel(e.into()))?;
                (io.into_inner(), false)
            }
            Some(proxy) => (self.dial(proxy.uri().clone()).await?, true),
            None => (self.dial(dst.clone()).await?, false),
        };

        if !https {
            return Ok(UpstreamStream::new(Transport::Plain(tcp), proxied));
        }

        let host = dst
            .host()
            .ok_or_else(|| ConnectError::MissingHost(dst.clone()))?
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_string();
        let server_name =
            ServerName::try_from(host.clone()).map_err(|_| ConnectError::ServerName(host))?;

        let tls = tokio::time::timeout(self.handshake_timeout, self.tls.connect(server_name, tcp))
            .await
            .map_err(|_| ConnectError::HandshakeTimeout(self.handshake_timeout))?
            .map_err(ConnectError::Handshake)?;

        Ok(UpstreamStream::new(Transport::Tls(Box::new(tls)), false))
    }

    async fn dial(&self, dst: Uri) -> Result<TcpStream, ConnectError> {
        let io = self
            .http
            .clone()
            .oneshot(dst)
            .await
            .map_err(|e| ConnectError::Dial(e.into()))?;
        Ok(io.into_inner())
    }
}

impl Service<Uri> for UpstreamConnector {
    type Response = UpstreamStream;
    type Error = ConnectError;
    type Future = Pin<Box<dyn Future<Output = Result<UpstreamStream, ConnectError>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, dst: Uri) -> Self::Future {
        Box::pin(self.clone().connect(dst))
    }
}

enum Transport {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl AsyncRead for Transport {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Transport::Plain(stream) => Pin::new(stream).poll_read(cx, buf),
            Transport::Tls(stream) => Pin::new(stream.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Transport {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Transport::Plain(stream) => Pin::new(stream).poll_write(cx, buf),
            Transport::Tls(stream) => Pin::new(stream.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Transport::Plain(stream) => Pin::new(stream).poll_flush(cx),
            Transport::Tls(stream) => Pin::new(stream.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Transport::Plain(stream) => Pin::new(stream).poll_shutdown(cx),
            Transport::Tls(stream) => Pin::new(stream.as_mut()).poll_shutdown(cx),
        }
    }
}

/// One upstream connection, plain or TLS, as seen by hyper.
pub struct UpstreamStream {
    io: TokioIo<Transport>,
    proxied: bool,
}

impl UpstreamStream {
    fn new(transport: Transport, proxied: bool) -> Self {
        Self {
            io: TokioIo::new(transport),
            proxied,
        }
    }

    pub fn is_tls(&self) -> bool {
        matches!(self.io.inner(), Transport::Tls(_))
    }
}

impl hyper::rt::Read for UpstreamStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: ReadBufCursor<'_>,
    ) -> Poll<io::Result<()>> {
        hyper::rt::Read::poll_read(Pin::new(&mut self.get_mut().io), cx, buf)
    }
}

impl hyper::rt::Write for UpstreamStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        hyper::rt::Write::poll_write(Pin::new(&mut self.get_mut().io), cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        hyper::rt::Write::poll_flush(Pin::new(&mut self.get_mut().io), cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        hyper::rt::Write::poll_shutdown(Pin::new(&mut self.get_mut().io), cx)
    }
}

impl Connection for UpstreamStream {
    // A proxied plain-http connection makes hyper send absolute-form targets.
    fn connected(&self) -> Connected {
        Connected::new().proxy(self.proxied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::tls::client_tls;
    use tokio::net::TcpListener;

    fn connector(handshake_timeout: Duration) -> UpstreamConnector {
        let mut http = HttpConnector::new();
        http.enforce_http(false);
        UpstreamConnector::new(http, client_tls().unwrap(), None, handshake_timeout)
    }

    #[tokio::test]
    async fn plain_destination_is_not_wrapped_in_tls() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _held = listener.accept().await;
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let uri: Uri = format!("http://{}/", addr).parse().unwrap();
        let stream = connector(Duration::from_secs(1))
            .oneshot(uri)
            .await
            .unwrap();

        assert!(!stream.is_tls());
        assert!(!stream.connected().is_proxied());
    }

    #[tokio::test]
    async fn stalled_handshake_times_out() {
        // Accepts the dial and never answers the ClientHello.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _held = listener.accept().await;
            tokio::time::sleep(Duration::from_secs(10)).await;
        });

        let uri: Uri = format!("https://{}/", addr).parse().unwrap();
        let started = std::time::Instant::now();
        let err = connector(Duration::from_millis(200))
            .oneshot(uri)
            .await
            .err()
            .unwrap();

        assert!(matches!(err, ConnectError::HandshakeTimeout(_)), "unexpected error: {}", err);
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn refused_dial_is_reported() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let uri: Uri = format!("http://{}/", addr).parse().unwrap();
        let err = connector(Duration::from_secs(1)).oneshot(uri).await.err().unwrap();

        assert!(matches!(err, ConnectError::Dial(_)), "unexpected error: {}", err);
    }
}
