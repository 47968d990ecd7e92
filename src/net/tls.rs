//! Client-side TLS for https origins.

use std::sync::Arc;

use rustls::crypto::ring;
use rustls::{ClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;

/// ALPN offered to the upstream. Only HTTP/1.1 is spoken on forwarded
/// connections.
const ALPN_HTTP11: &[u8] = b"http/1.1";

/// Build the TLS connector shared by every outbound connection, trusting the
/// bundled webpki roots.
pub fn client_tls() -> Result<TlsConnector, rustls::Error> {
    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let mut config = ClientConfig::builder_with_provider(Arc::new(ring::default_provider()))
        .with_safe_default_protocol_versions()?
        .with_root_certificates(roots)
        .with_no_client_auth();
    config.alpn_protocols = vec![ALPN_HTTP11.to_vec()];

    Ok(TlsConnector::from(Arc::new(config)))
}
