//! Raw TCP reachability probe.
//!
//! Used after a failed connection sweep to tell "network unreachable" apart
//! from "credentials rejected". No protocol bytes are exchanged.

use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Timeout for each TCP connect attempt of the probe.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Result of a connectivity probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// A TCP connection was accepted at this address
    Reachable(SocketAddr),
    /// DNS resolution failed or returned no address
    Unresolvable(String),
    /// Every resolved address refused or timed out
    Unreachable(String),
}

impl ProbeOutcome {
    /// Whether the port accepted a TCP connection.
    pub fn is_reachable(&self) -> bool {
        matches!(self, Self::Reachable(_))
    }
}

impl std::fmt::Display for ProbeOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Reachable(addr) => write!(f, "reachable at {}", addr),
            Self::Unresolvable(reason) => write!(f, "DNS resolution failed: {}", reason),
            Self::Unreachable(reason) => write!(f, "port unreachable: {}", reason),
        }
    }
}

/// Opens a TCP connection to `host:port` and reports reachability.
///
/// Every resolved address is tried in turn; the first accepted connection
/// is closed immediately.
pub fn test_connectivity(host: &str, port: u16, timeout: Duration) -> ProbeOutcome {
    info!("Testing connectivity to {}:{}", host, port);

    let addresses: Vec<SocketAddr> = match (host, port).to_socket_addrs() {
        Ok(addresses) => addresses.collect(),
        Err(e) => {
            warn!("DNS resolution failed for {}: {}", host, e);
            return ProbeOutcome::Unresolvable(e.to_string());
        }
    };

    if addresses.is_empty() {
        warn!("DNS resolution for {} returned no addresses", host);
        return ProbeOutcome::Unresolvable(format!("no addresses for {}", host));
    }

    debug!("Resolved {} to {:?}", host, addresses);

    let mut last_error = String::new();
    for address in addresses {
        match TcpStream::connect_timeout(&address, timeout) {
            Ok(_stream) => {
                info!("Port {} reachable at {}", port, address);
                return ProbeOutcome::Reachable(address);
            }
            Err(e) => {
                debug!("TCP connect to {} failed: {}", address, e);
                last_error = format!("{}: {}", address, e);
            }
        }
    }

    warn!("Port {} unreachable on {}", port, host);
    ProbeOutcome::Unreachable(last_error)
}
