//! Outbound source address.

use std::fmt;
use std::net::{AddrParseError, IpAddr, SocketAddr};
use std::str::FromStr;

use thiserror::Error;

/// Local address every outbound connection originates from.
///
/// Always carries port 0 so the OS picks an ephemeral port per dial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindAddress(SocketAddr);

impl BindAddress {
    pub fn new(ip: IpAddr) -> Self {
        Self(SocketAddr::new(ip, 0))
    }

    pub fn ip(&self) -> IpAddr {
        self.0.ip()
    }

    pub fn socket_addr(&self) -> SocketAddr {
        self.0
    }
}

/// The metadata service returned something that is not an IP literal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("'{input}' is not an IP address")]
pub struct BindAddressError {
    pub input: String,
    #[source]
    pub source: AddrParseError,
}

impl FromStr for BindAddress {
    type Err = BindAddressError;

    /// Parses the plain-text body of the metadata service. Surrounding
    /// whitespace (the usual trailing newline) is ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim();
        text.parse::<IpAddr>()
            .map(Self::new)
            .map_err(|source| BindAddressError {
                input: text.to_string(),
                source,
            })
    }
}

impl fmt::Display for BindAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
