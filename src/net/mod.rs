//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound:
//!     listener.rs (bind public port) → hand off to HTTP layer
//!
//! Outbound:
//!     metadata text → bind.rs (BindAddress)
//!     → connector.rs (dial from BindAddress, optional proxy hop, TLS via tls.rs)
//!     → client.rs (pooled hyper client shared by every forwarded request)
//! ```

pub mod bind;
pub mod client;
pub mod connector;
pub mod listener;
pub mod tls;

pub use bind::{BindAddress, BindAddressError};
pub use client::{build_client, DispatchError, UpstreamClient};
pub use connector::{ConnectError, UpstreamConnector};
pub use listener::ListenerError;
