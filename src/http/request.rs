//! Request handling and transformation.
//!
//! # Responsibilities
//! - Rewrite the inbound target onto the fixed upstream origin
//! - Apply the header allow-list (everything else is dropped)
//! - Carry the inbound body to the upstream byte-for-byte
//!
//! # Design Decisions
//! - The wildcard path is appended raw, still percent-encoded; nothing is
//!   normalized before composition
//! - The target is an `http::Uri`, so `.`/`..` segments reach the upstream
//!   as sent
//! - The query string is not part of the wildcard capture and is dropped
//! - A repeated allow-listed header contributes only its last value

use axum::body::Bytes;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use axum::http::uri::InvalidUri;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, Request, Uri};
use http_body_util::Full;

use crate::config::{UpstreamConfig, UserAgentPolicy};
use crate::http::response::ProxyError;

pub const X_AUDIT_LOG_REASON: HeaderName = HeaderName::from_static("x-audit-log-reason");

/// Inbound headers copied onto every outbound request when present.
pub const FORWARDED_HEADERS: [HeaderName; 3] = [X_AUDIT_LOG_REASON, AUTHORIZATION, CONTENT_TYPE];

/// The outbound request built for one inbound call.
#[derive(Debug)]
pub struct ProxiedRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ProxiedRequest {
    pub fn build(
        upstream: &UpstreamConfig,
        method: &Method,
        uri: &Uri,
        headers: &HeaderMap,
        body: Bytes,
    ) -> Result<Self, ProxyError> {
        Ok(Self {
            method: normalize_method(method)?,
            uri: target_uri(&upstream.origin, wildcard_segment(uri))?,
            headers: forwarded_headers(headers, &upstream.user_agent),
            body,
        })
    }

    /// Convert into the request handed to the shared client. `Host` and
    /// `Content-Length` are filled in by the client from the target and body.
    pub fn into_http(self) -> Result<Request<Full<Bytes>>, axum::http::Error> {
        let mut request = Request::builder()
            .method(self.method)
            .uri(self.uri)
            .body(Full::new(self.body))?;
        *request.headers_mut() = self.headers;
        Ok(request)
    }
}

/// The part of the path captured by the catch-all route: everything after
/// the leading `/`, exactly as received.
pub fn wildcard_segment(uri: &Uri) -> &str {
    let path = uri.path();
    path.strip_prefix('/').unwrap_or(path)
}

/// Origin plus segment, concatenated and parsed without any resolution.
pub fn target_uri(origin: &str, segment: &str) -> Result<Uri, InvalidUri> {
    format!("{origin}{segment}").parse()
}

/// Upper-case the method so `get` and `GET` reach the upstream the same way.
pub fn normalize_method(method: &Method) -> Result<Method, axum::http::method::InvalidMethod> {
    let name = method.as_str();
    if name.bytes().any(|b| b.is_ascii_lowercase()) {
        Method::from_bytes(name.to_ascii_uppercase().as_bytes())
    } else {
        Ok(method.clone())
    }
}

/// Select the inbound headers that survive the trip upstream.
pub fn forwarded_headers(inbound: &HeaderMap, user_agent: &UserAgentPolicy) -> HeaderMap {
    let mut outbound = HeaderMap::new();

    for name in FORWARDED_HEADERS {
        if let Some(value) = last_value(inbound, &name) {
            outbound.insert(name, value.clone());
        }
    }

    if let UserAgentPolicy::Append(suffix) = user_agent {
        if let Some(agent) = last_value(inbound, &USER_AGENT) {
            let mut value = agent.as_bytes().to_vec();
            value.extend_from_slice(suffix.as_bytes());
            match HeaderValue::from_bytes(&value) {
                Ok(value) => {
                    outbound.insert(USER_AGENT, value);
                }
                Err(_) => tracing::debug!("Dropping User-Agent that is invalid once suffixed"),
            }
        }
    }

    outbound
}

fn last_value<'a>(headers: &'a HeaderMap, name: &HeaderName) -> Option<&'a HeaderValue> {
    headers.get_all(name).iter().last()
}
