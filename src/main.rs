//! Anchor-IP forwarding proxy.
//!
//! Accepts any HTTP request on a public port and forwards it to a fixed
//! upstream origin, dialing out from the droplet's anchor IP.
//!
//! ```text
//!   client ──▶ :65535 ──▶ header allow-list ──▶ hyper client (bound to anchor IP) ──▶ upstream
//!   client ◀── status + headers + streamed body ◀─────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;

use anchor_proxy::config::load_or_default;
use anchor_proxy::http::HttpServer;
use anchor_proxy::lifecycle::{resolve_bind_address, signals, Shutdown};
use anchor_proxy::net::{build_client, listener};
use anchor_proxy::observability::init_logging;

#[derive(Parser)]
#[command(name = "anchor-proxy")]
#[command(about = "Forward HTTP requests to a fixed upstream from the droplet's anchor IP", long_about = None)]
struct Cli {
    /// Optional TOML config; built-in defaults apply without it.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = load_or_default(cli.config.as_deref())?;
    init_logging(&config.observability)?;

    tracing::info!(
        listener = %config.listener.bind_address,
        upstream = %config.upstream.origin,
        "anchor-proxy v0.1.0 starting"
    );

    let bind = resolve_bind_address(&config.metadata)
        .await
        .inspect_err(|e| tracing::error!(error = %e, "Could not resolve bind address"))?;

    let client = build_client(&config.client, &bind)?;
    let listener = listener::bind(&config.listener).await?;

    let shutdown = Shutdown::new();
    signals::spawn_signal_listener(&shutdown);

    let server = HttpServer::new(&config, client);
    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
