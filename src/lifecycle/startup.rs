//! Startup orchestration.
//!
//! # Responsibilities
//! - Ask the metadata service for the droplet's public anchor IP
//! - Turn it into the `BindAddress` the outbound client dials from
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal and no listener is bound
//! - Runs exactly once, before traffic is accepted
//! - The result is returned, never stored globally

use thiserror::Error;

use crate::config::MetadataConfig;
use crate::net::bind::{BindAddress, BindAddressError};

/// Why the bind address could not be resolved.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to build metadata client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("metadata request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("metadata service returned {status}")]
    Status { status: reqwest::StatusCode },

    #[error("failed to read metadata response: {0}")]
    Body(#[source] reqwest::Error),

    #[error("metadata service returned an unusable address: {0}")]
    Address(#[from] BindAddressError),
}

/// Query the metadata service once and parse its answer.
pub async fn resolve_bind_address(config: &MetadataConfig) -> Result<BindAddress, StartupError> {
    let mut builder = reqwest::Client::builder().timeout(config.timeout());
    if !config.use_env_proxy {
        builder = builder.no_proxy();
    }
    let client = builder.build().map_err(StartupError::Client)?;

    let response = client
        .get(&config.url)
        .send()
        .await
        .map_err(|source| StartupError::Request {
            url: config.url.clone(),
            source,
        })?;

    let status = response.status();
    if !status.is_success() {
        return Err(StartupError::Status { status });
    }

    let text = response.text().await.map_err(StartupError::Body)?;
    let bind: BindAddress = text.parse()?;

    tracing::info!(address = %bind.ip(), "Got IP from metadata service");

    Ok(bind)
}
