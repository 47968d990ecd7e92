//! Response handling and transformation.
//!
//! # Responsibilities
//! - Relay the upstream response to the caller unchanged
//! - Map forwarding failures to 502 Bad Gateway
//!
//! # Design Decisions
//! - Streaming responses avoid buffering the entire body
//! - Status and every header (all values) are copied as-is, no filtering
//! - Failure responses carry no body, only `X-Proxy-Error`
//! - The request deadline keeps running while the body streams

use axum::body::{Body, Bytes};
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use futures_util::{Stream, TryStreamExt};
use http_body_util::BodyExt;
use thiserror::Error;
use tokio::time::Instant;

use crate::net::DispatchError;

pub const X_PROXY_ERROR: HeaderName = HeaderName::from_static("x-proxy-error");

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Why a request could not be forwarded.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("invalid method: {0}")]
    Method(#[from] axum::http::method::InvalidMethod),

    #[error("invalid upstream url: {0}")]
    Uri(#[from] axum::http::uri::InvalidUri),

    #[error("invalid upstream request: {0}")]
    Request(#[from] axum::http::Error),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let mut response = StatusCode::BAD_GATEWAY.into_response();
        match HeaderValue::from_str(&self.to_string()) {
            Ok(value) => {
                response.headers_mut().insert(X_PROXY_ERROR, value);
            }
            Err(_) => tracing::debug!(error = %self, "Error text not representable as a header"),
        }
        response
    }
}

/// Hand the upstream response to the caller: same status, same headers,
/// body streamed chunk by chunk until `deadline`.
pub fn relay<B>(upstream: axum::http::Response<B>, deadline: Instant) -> Response
where
    B: hyper::body::Body<Data = Bytes> + Unpin + Send + 'static,
    B::Error: Into<BoxError>,
{
    let (parts, body) = upstream.into_parts();

    let stream = body_until(body, deadline).inspect_err(|e| {
        tracing::warn!(error = %e, "Upstream body aborted mid-stream");
    });

    let mut response = Response::new(Body::from_stream(stream));
    *response.status_mut() = parts.status;
    *response.headers_mut() = parts.headers;
    response
}

/// Data frames of `body`, ending in an error if `deadline` passes first.
/// Trailers are skipped.
fn body_until<B>(body: B, deadline: Instant) -> impl Stream<Item = Result<Bytes, BoxError>> + Send
where
    B: hyper::body::Body<Data = Bytes> + Unpin + Send + 'static,
    B::Error: Into<BoxError>,
{
    futures_util::stream::unfold(Some(body), move |state| async move {
        let mut body = state?;
        loop {
            let frame = match tokio::time::timeout_at(deadline, body.frame()).await {
                Err(elapsed) => return Some((Err(BoxError::from(elapsed)), None)),
                Ok(None) => return None,
                Ok(Some(Err(e))) => {
                    let error: BoxError = e.into();
                    return Some((Err(error), None));
                }
                Ok(Some(Ok(frame))) => frame,
            };
            if let Ok(data) = frame.into_data() {
                return Some((Ok(data), Some(body)));
            }
        }
    })
}
