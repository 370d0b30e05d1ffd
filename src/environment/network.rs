//! Socket-backed environment and target validation

use super::{Environment, EnvironmentFactory, Protocol, Protocols, ScanOutcome, ScanResults};
use crate::error::{PortQueryError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::io::ErrorKind;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, TcpStream, ToSocketAddrs, UdpSocket};
use std::time::Duration;

/// `[scheme://][userinfo@]host[:port][/path]`
static TARGET_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?:[A-Za-z][A-Za-z0-9+.\-]*://)?(?:[^/?#@\s]*@)?(?P<host>[^/?#:@\s]+)(?::\d{1,5})?(?:[/?#]\S*)?$",
    )
    .expect("target pattern is valid")
});

/// RFC 1123 hostname
static HOSTNAME_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?:[A-Za-z0-9](?:[A-Za-z0-9\-]{0,61}[A-Za-z0-9])?\.)*[A-Za-z0-9](?:[A-Za-z0-9\-]{0,61}[A-Za-z0-9])?\.?$",
    )
    .expect("hostname pattern is valid")
});

const MAX_HOSTNAME_LEN: usize = 253;

/// Extract the host part of a table reference, if it names a valid target
///
/// Accepts IPv4 literals and DNS hostnames, either bare or wrapped in a URL.
pub fn extract_host(reference: &str) -> Option<&str> {
    let captures = TARGET_PATTERN.captures(reference)?;
    let host = captures.name("host")?.as_str();
    if is_valid_address(host) {
        Some(host)
    } else {
        None
    }
}

/// Whether `host` is an IPv4 literal or a well-formed hostname
pub fn is_valid_address(host: &str) -> bool {
    if host.is_empty() || host.len() > MAX_HOSTNAME_LEN {
        return false;
    }
    let numeric = host
        .trim_end_matches('.')
        .split('.')
        .all(|label| !label.is_empty() && label.bytes().all(|b| b.is_ascii_digit()));
    if numeric {
        return host.parse::<Ipv4Addr>().is_ok();
    }
    HOSTNAME_PATTERN.is_match(host)
}

// ============================================================================
// Network Environment
// ============================================================================

/// Environment that probes a real host with `std::net` sockets
#[derive(Debug, Clone)]
pub struct NetworkEnvironment {
    host: String,
    port: u16,
    timeout: Duration,
}

impl NetworkEnvironment {
    pub fn new(host: impl Into<String>, timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port: 0,
            timeout,
        }
    }

    fn resolve(&self) -> Result<SocketAddr> {
        let mut addrs = (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|e| self.scan_error(format!("cannot resolve {}: {}", self.host, e)))?;
        addrs
            .next()
            .ok_or_else(|| self.scan_error(format!("{} resolved to no addresses", self.host)))
    }

    fn scan_error(&self, message: String) -> PortQueryError {
        PortQueryError::Scan {
            port: self.port,
            message,
        }
    }

    fn probe_tcp(&self, addr: SocketAddr) -> ScanOutcome {
        match TcpStream::connect_timeout(&addr, self.timeout) {
            Ok(_) => ScanOutcome::Open,
            Err(e) if e.kind() == ErrorKind::ConnectionRefused => ScanOutcome::Rejected,
            Err(_) => ScanOutcome::Closed,
        }
    }

    fn probe_udp(&self, addr: SocketAddr) -> std::io::Result<ScanOutcome> {
        let local: SocketAddr = if addr.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(local)?;
        socket.connect(addr)?;
        socket.set_read_timeout(Some(self.timeout))?;

        if let Err(e) = socket.send(&[]) {
            return match e.kind() {
                ErrorKind::ConnectionRefused => Ok(ScanOutcome::Rejected),
                _ => Err(e),
            };
        }

        let mut buf = [0u8; 512];
        match socket.recv(&mut buf) {
            Ok(_) => Ok(ScanOutcome::Open),
            Err(e) => match e.kind() {
                ErrorKind::ConnectionRefused => Ok(ScanOutcome::Rejected),
                ErrorKind::WouldBlock | ErrorKind::TimedOut => Ok(ScanOutcome::Closed),
                _ => Err(e),
            },
        }
    }
}

impl Environment for NetworkEnvironment {
    fn current_port(&self) -> u16 {
        self.port
    }

    fn set_port(&mut self, port: u16) {
        self.port = port;
    }

    fn probe(&mut self, protocols: Protocols) -> Result<ScanResults> {
        let mut results = ScanResults::new();
        if protocols.is_empty() {
            return Ok(results);
        }

        let addr = self.resolve()?;
        for protocol in protocols.iter() {
            let outcome = match protocol {
                Protocol::Tcp => self.probe_tcp(addr),
                Protocol::Udp => self
                    .probe_udp(addr)
                    .map_err(|e| self.scan_error(format!("udp probe failed: {}", e)))?,
            };
            log::trace!("{}:{} {} -> {}", self.host, self.port, protocol, outcome);
            results.set(protocol, outcome);
        }
        Ok(results)
    }
}

/// Creates a [`NetworkEnvironment`] per job with a shared timeout
#[derive(Debug, Clone, Copy)]
pub struct NetworkEnvironmentFactory {
    timeout: Duration,
}

impl NetworkEnvironmentFactory {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl EnvironmentFactory for NetworkEnvironmentFactory {
    type Env = NetworkEnvironment;

    fn create(&self, target: &str) -> NetworkEnvironment {
        NetworkEnvironment::new(target, self.timeout)
    }
}
