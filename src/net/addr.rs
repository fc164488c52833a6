//! Listen address normalization.
//!
//! # Responsibilities
//! - Parse `host:port`, bare hosts, `:port` and `unix://` addresses
//! - Classify addresses into `tcp4`, `tcp6` or `unix`
//! - Rewrite wildcard IPs to loopback when an address is used for dialing

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, ToSocketAddrs};
use std::path::PathBuf;
use thiserror::Error;

/// Error returned when an address cannot be normalized.
#[derive(Debug, Error)]
pub enum AddrError {
    #[error("empty address")]
    Empty,

    #[error("invalid port in {0:?}")]
    InvalidPort(String),

    #[error("unable to resolve {addr:?}: {reason}")]
    Resolve { addr: String, reason: String },
}

/// Network family a listener binds with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    Tcp4,
    Tcp6,
    Unix,
}

impl Family {
    pub fn as_str(&self) -> &'static str {
        match self {
            Family::Tcp4 => "tcp4",
            Family::Tcp6 => "tcp6",
            Family::Unix => "unix",
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resolved listen address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenAddress {
    Tcp(SocketAddr),
    Unix(PathBuf),
}

impl ListenAddress {
    /// Parse and normalize `addr`, adding `default_port` when none is given.
    pub fn parse(addr: &str, default_port: u16) -> Result<Self, AddrError> {
        let addr = addr.trim();
        if addr.is_empty() {
            return Err(AddrError::Empty);
        }

        if let Some(path) = addr
            .strip_prefix("unix://")
            .or_else(|| addr.strip_prefix("unix:"))
        {
            return Ok(ListenAddress::Unix(PathBuf::from(path)));
        }

        if let Ok(sock) = addr.parse::<SocketAddr>() {
            return Ok(ListenAddress::Tcp(sock));
        }

        // A bare IP literal, possibly bracketed.
        let unbracketed = addr.trim_start_matches('[').trim_end_matches(']');
        if let Ok(ip) = unbracketed.parse::<IpAddr>() {
            return Ok(ListenAddress::Tcp(SocketAddr::new(ip, default_port)));
        }

        // ":port" listens on all interfaces.
        if let Some(port) = addr.strip_prefix(':') {
            let port = port
                .parse::<u16>()
                .map_err(|_| AddrError::InvalidPort(addr.to_string()))?;
            return Ok(ListenAddress::Tcp(SocketAddr::new(
                IpAddr::V4(Ipv4Addr::UNSPECIFIED),
                port,
            )));
        }

        let (host, port) = match addr.rsplit_once(':') {
            Some((host, port)) => (
                host,
                port.parse::<u16>()
                    .map_err(|_| AddrError::InvalidPort(addr.to_string()))?,
            ),
            None => (addr, default_port),
        };

        let resolved = (host, port)
            .to_socket_addrs()
            .map_err(|e| AddrError::Resolve {
                addr: addr.to_string(),
                reason: e.to_string(),
            })?
            .next()
            .ok_or_else(|| AddrError::Resolve {
                addr: addr.to_string(),
                reason: "no addresses found".to_string(),
            })?;

        Ok(ListenAddress::Tcp(resolved))
    }

    /// The family used when binding this address. TCP addresses are split
    /// by IP version so the listener binds the intended interface.
    pub fn family(&self) -> Family {
        match self {
            ListenAddress::Tcp(sock) if sock.is_ipv4() => Family::Tcp4,
            ListenAddress::Tcp(_) => Family::Tcp6,
            ListenAddress::Unix(_) => Family::Unix,
        }
    }

    /// The address to dial when connecting to a service bound here.
    pub fn dial_target(&self) -> ListenAddress {
        match self {
            ListenAddress::Tcp(sock) if sock.ip().is_unspecified() => {
                let loopback = match sock.ip() {
                    IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::LOCALHOST),
                    IpAddr::V6(_) => IpAddr::V6(std::net::Ipv6Addr::LOCALHOST),
                };
                ListenAddress::Tcp(SocketAddr::new(loopback, sock.port()))
            }
            other => other.clone(),
        }
    }
}

impl fmt::Display for ListenAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListenAddress::Tcp(sock) => write!(f, "{}", sock),
            ListenAddress::Unix(path) => write!(f, "unix://{}", path.display()),
        }
    }
}

/// Rewrite a wildcard listen address into a dialable loopback address.
///
/// `0.0.0.0` becomes `127.0.0.1` and `[::]` becomes `[::1]`; everything else
/// is returned unchanged. A certificate issued for the loopback name would
/// not validate against the wildcard literal.
pub fn dial_address(listen_addr: &str) -> String {
    match listen_addr.trim().parse::<SocketAddr>() {
        Ok(sock) if sock.ip().is_unspecified() => {
            ListenAddress::Tcp(sock).dial_target().to_string()
        }
        _ => listen_addr.to_string(),
    }
}
