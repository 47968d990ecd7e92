//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! --config file (TOML), or nothing
//!     → loader.rs (parse & deserialize, defaults for missing fields)
//!     → validation.rs (semantic checks)
//!     → ProxyConfig (validated, immutable)
//!     → handed to startup, client construction and the HTTP server
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; there is no reload
//! - All fields have defaults, so running without a file reproduces the
//!   fixed deployment
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, load_or_default, ConfigError};
pub use schema::{
    ClientConfig, CompanionConfig, ListenerConfig, MetadataConfig, ObservabilityConfig,
    ProxyConfig, UpstreamConfig, UserAgentPolicy,
};
pub use validation::ValidationError;
