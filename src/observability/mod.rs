//! Observability subsystem.
//!
//! Every subsystem logs through `tracing`; the only consumer is stdout.
//! The forwarding handler emits one event per request (method, path,
//! status) and `tower_http`'s trace layer adds request spans.

pub mod logging;

pub use logging::init_logging;
