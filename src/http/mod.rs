//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, routing)
//!     → request.rs (rewrite target, filter headers, keep body)
//!     → shared client dispatch
//!     → response.rs (relay status/headers/stream, or 502)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::{ProxiedRequest, FORWARDED_HEADERS, X_AUDIT_LOG_REASON};
pub use response::{ProxyError, X_PROXY_ERROR};
pub use server::{AppState, HttpServer, COMPANION_PATH};
