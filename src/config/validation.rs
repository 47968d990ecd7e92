//! Configuration validation.
//!
//! Serde handles the syntax; this checks that values are usable: addresses
//! parse, the upstream origin is an absolute http(s) URL ending in `/`, and
//! timeouts are non-zero. A User-Agent suffix must be usable as a header
//! value on its own. Returns all validation errors, not just the first.

use std::net::SocketAddr;

use axum::http::HeaderValue;
use thiserror::Error;
use url::Url;

use crate::config::schema::{ProxyConfig, UserAgentPolicy};

/// A single semantic problem in a loaded configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("listener.bind_address '{0}' is not a socket address")]
    BindAddress(String),

    #[error("upstream.origin '{0}' is not an absolute http(s) URL")]
    OriginUrl(String),

    #[error("upstream.origin '{0}' must end with '/'")]
    OriginTrailingSlash(String),

    #[error("upstream.user_agent suffix {0:?} is not a valid header value")]
    UserAgentSuffix(String),

    #[error("metadata.url '{0}' is not a valid URL")]
    MetadataUrl(String),

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("companion.address must not be empty")]
    CompanionAddress,
}

/// Check a configuration, collecting every problem found.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(
            config.listener.bind_address.clone(),
        ));
    }

    let origin = &config.upstream.origin;
    match Url::parse(origin) {
        Ok(url) if matches!(url.scheme(), "http" | "https") && url.has_host() => {
            if !origin.ends_with('/') {
                errors.push(ValidationError::OriginTrailingSlash(origin.clone()));
            }
        }
        _ => errors.push(ValidationError::OriginUrl(origin.clone())),
    }

    if let UserAgentPolicy::Append(suffix) = &config.upstream.user_agent {
        if HeaderValue::from_str(suffix).is_err() {
            errors.push(ValidationError::UserAgentSuffix(suffix.clone()));
        }
    }

    if Url::parse(&config.metadata.url).is_err() {
        errors.push(ValidationError::MetadataUrl(config.metadata.url.clone()));
    }

    let durations = [
        ("metadata.timeout_secs", config.metadata.timeout_secs),
        ("client.connect_timeout_secs", config.client.connect_timeout_secs),
        (
            "client.tls_handshake_timeout_secs",
            config.client.tls_handshake_timeout_secs,
        ),
        ("client.keepalive_secs", config.client.keepalive_secs),
        ("client.idle_timeout_secs", config.client.idle_timeout_secs),
        ("client.request_timeout_secs", config.client.request_timeout_secs),
    ];
    for (field, value) in durations {
        if value == 0 {
            errors.push(ValidationError::Zero(field));
        }
    }

    if config.upstream.max_body_bytes == 0 {
        errors.push(ValidationError::Zero("upstream.max_body_bytes"));
    }

    if config.companion.address.trim().is_empty() {
        errors.push(ValidationError::CompanionAddress);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert_eq!(validate_config(&ProxyConfig::default()), Ok(()));
    }

    #[test]
    fn collects_every_error() {
        let mut config = ProxyConfig::default();
        config.listener.bind_address = "not-an-addr".into();
        config.upstream.origin = "ftp://discord.com/".into();
        config.client.request_timeout_secs = 0;
        config.companion.address = "  ".into();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![
                ValidationError::BindAddress("not-an-addr".into()),
                ValidationError::OriginUrl("ftp://discord.com/".into()),
                ValidationError::Zero("client.request_timeout_secs"),
                ValidationError::CompanionAddress,
            ]
        );
    }

    #[test]
    fn origin_needs_trailing_slash() {
        let mut config = ProxyConfig::default();
        config.upstream.origin = "https://discord.com/api".into();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![ValidationError::OriginTrailingSlash(
                "https://discord.com/api".into()
            )]
        );
    }

    #[test]
    fn user_agent_suffix_must_be_a_header_value() {
        let mut config = ProxyConfig::default();
        config.upstream.user_agent = UserAgentPolicy::Append(" anchor\r\nX-Injected: 1".into());

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![ValidationError::UserAgentSuffix(
                " anchor\r\nX-Injected: 1".into()
            )]
        );

        config.upstream.user_agent = UserAgentPolicy::Append(" anchor-proxy/0.1".into());
        assert_eq!(validate_config(&config), Ok(()));
    }
}
