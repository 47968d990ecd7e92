//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files, and
//! the defaults reproduce the fixed deployment: listener on port 65535,
//! upstream `https://discord.com/`, bind address from the DigitalOcean
//! metadata service.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the forwarding proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct ProxyConfig {
    /// Public listener configuration.
    pub listener: ListenerConfig,

    /// Upstream origin and forwarding policy.
    pub upstream: UpstreamConfig,

    /// Metadata service queried once at startup.
    pub metadata: MetadataConfig,

    /// Outbound HTTP client settings.
    pub client: ClientConfig,

    /// Informational companion route.
    pub companion: CompanionConfig,

    /// Logging settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:65535").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:65535".to_string(),
        }
    }
}

/// Where requests are forwarded and which parts of them survive the trip.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Absolute origin the wildcard path is appended to. Must end in `/`.
    pub origin: String,

    /// What happens to the inbound `User-Agent`.
    pub user_agent: UserAgentPolicy,

    /// Largest inbound body accepted for forwarding.
    pub max_body_bytes: usize,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            origin: "https://discord.com/".to_string(),
            user_agent: UserAgentPolicy::Drop,
            max_body_bytes: 4 * 1024 * 1024,
        }
    }
}

/// Handling of the inbound `User-Agent` header.
///
/// In TOML: `user_agent = "drop"` or `user_agent = { append = " (proxied)" }`.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UserAgentPolicy {
    /// Never forward `User-Agent`.
    #[default]
    Drop,
    /// Forward `User-Agent` with this suffix appended.
    Append(String),
}

/// Metadata service settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct MetadataConfig {
    /// URL returning the public IP as plain text.
    pub url: String,

    /// Ceiling for the single startup lookup, in seconds.
    pub timeout_secs: u64,

    /// Honor `HTTP_PROXY`/`NO_PROXY` for the lookup.
    pub use_env_proxy: bool,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            url: "http://169.254.169.254/metadata/v1/interfaces/public/0/anchor_ipv4/address"
                .to_string(),
            timeout_secs: 10,
            use_env_proxy: true,
        }
    }
}

impl MetadataConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Outbound client configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ClientConfig {
    /// TCP dial timeout for each new connection.
    pub connect_timeout_secs: u64,

    /// Ceiling on the TLS handshake that follows a dial to an https origin.
    pub tls_handshake_timeout_secs: u64,

    /// TCP keep-alive interval for outbound connections.
    pub keepalive_secs: u64,

    /// Idle connections kept for reuse.
    pub max_idle_connections: usize,

    /// How long an idle connection may sit in the pool.
    pub idle_timeout_secs: u64,

    /// Total time for one forwarded request, body included.
    pub request_timeout_secs: u64,

    /// Honor `HTTP_PROXY`/`HTTPS_PROXY`/`NO_PROXY` for forwarded requests.
    pub use_env_proxy: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 30,
            tls_handshake_timeout_secs: 10,
            keepalive_secs: 30,
            max_idle_connections: 100,
            idle_timeout_secs: 90,
            request_timeout_secs: 60,
            use_env_proxy: true,
        }
    }
}

impl ClientConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn tls_handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.tls_handshake_timeout_secs)
    }

    pub fn keepalive(&self) -> Duration {
        Duration::from_secs(self.keepalive_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Companion service advertised on `GET /proxy`.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct CompanionConfig {
    pub address: String,
}

impl Default for CompanionConfig {
    fn default() -> Self {
        Self {
            address: "http://127.0.0.1:3000".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Filter used when `RUST_LOG` is unset.
    pub log_filter: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_filter: "anchor_proxy=info,tower_http=info".to_string(),
        }
    }
}
