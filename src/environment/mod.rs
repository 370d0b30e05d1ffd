//! Scan environment
//!
//! The environment is the only boundary the engine calls outward through: it
//! tracks the port a scan cycle is working on and performs the actual probe.
//! Everything the query layer needs to know about the network lives here as
//! plain value types.

mod network;


pub use network::*;

use crate::error::Result;
use serde::Serialize;
use std::fmt;
use std::ops::{BitOr, BitOrAssign};

// ============================================================================
// Protocols
// ============================================================================

/// A single probe protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Protocol {
    Tcp,
    Udp,
}

impl Protocol {
    /// Both protocols in probe order
    pub const ALL: [Protocol; 2] = [Protocol::Tcp, Protocol::Udp];

    #[inline]
    fn bit(self) -> u8 {
        match self {
            Protocol::Tcp => 0b01,
            Protocol::Udp => 0b10,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Protocol::Tcp => "TCP",
            Protocol::Udp => "UDP",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A set of protocols, one of NONE, TCP, UDP or TCP|UDP
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Protocols(u8);

impl Protocols {
    pub const NONE: Protocols = Protocols(0);
    pub const TCP: Protocols = Protocols(0b01);
    pub const UDP: Protocols = Protocols(0b10);
    pub const ALL: Protocols = Protocols(0b11);

    #[inline]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub fn contains(self, protocol: Protocol) -> bool {
        self.0 & protocol.bit() != 0
    }

    /// Iterate the members in probe order (TCP before UDP)
    pub fn iter(self) -> impl Iterator<Item = Protocol> {
        Protocol::ALL.into_iter().filter(move |p| self.contains(*p))
    }
}

impl From<Protocol> for Protocols {
    fn from(protocol: Protocol) -> Self {
        Protocols(protocol.bit())
    }
}

impl BitOr for Protocols {
    type Output = Protocols;

    fn bitor(self, rhs: Protocols) -> Protocols {
        Protocols(self.0 | rhs.0)
    }
}

impl BitOrAssign for Protocols {
    fn bitor_assign(&mut self, rhs: Protocols) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for Protocols {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("NONE");
        }
        let names: Vec<&str> = self.iter().map(Protocol::name).collect();
        f.write_str(&names.join("|"))
    }
}

// ============================================================================
// Scan Outcomes
// ============================================================================

/// Result of probing one protocol on one port
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ScanOutcome {
    /// Something accepted the probe
    Open,
    /// No answer before the timeout
    Closed,
    /// The host actively refused the probe
    Rejected,
}

impl ScanOutcome {
    pub fn name(self) -> &'static str {
        match self {
            ScanOutcome::Open => "OPEN",
            ScanOutcome::Closed => "CLOSED",
            ScanOutcome::Rejected => "REJECTED",
        }
    }
}

impl fmt::Display for ScanOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Live probe results for a single port, one slot per protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScanResults {
    tcp: Option<ScanOutcome>,
    udp: Option<ScanOutcome>,
}

impl ScanResults {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn get(&self, protocol: Protocol) -> Option<ScanOutcome> {
        match protocol {
            Protocol::Tcp => self.tcp,
            Protocol::Udp => self.udp,
        }
    }

    pub fn set(&mut self, protocol: Protocol, outcome: ScanOutcome) {
        match protocol {
            Protocol::Tcp => self.tcp = Some(outcome),
            Protocol::Udp => self.udp = Some(outcome),
        }
    }

    /// Builder-style [`ScanResults::set`]
    pub fn with(mut self, protocol: Protocol, outcome: ScanOutcome) -> Self {
        self.set(protocol, outcome);
        self
    }

    /// Protocols that have a recorded outcome
    pub fn probed(&self) -> Protocols {
        Protocol::ALL
            .into_iter()
            .filter(|p| self.get(*p).is_some())
            .fold(Protocols::NONE, |acc, p| acc | Protocols::from(p))
    }
}

// ============================================================================
// Environment Traits
// ============================================================================

/// Per-port scan state and the probe that resolves protocol columns
///
/// One environment is created per scan job, so implementations never see
/// two ports concurrently.
pub trait Environment {
    /// The port the current probe/evaluation cycle is operating on
    fn current_port(&self) -> u16;

    /// Select the port for the next cycle
    fn set_port(&mut self, port: u16);

    /// Probe the current port with each requested protocol
    ///
    /// May block up to the implementation's timeout per protocol.
    fn probe(&mut self, protocols: Protocols) -> Result<ScanResults>;
}

/// Builds a fresh [`Environment`] for each scan job
pub trait EnvironmentFactory: Send + Sync + 'static {
    type Env: Environment;

    /// Create an environment that probes `target`
    fn create(&self, target: &str) -> Self::Env;
}

impl<F, E> EnvironmentFactory for F
where
    F: Fn(&str) -> E + Send + Sync + 'static,
    E: Environment,
{
    type Env = E;

    fn create(&self, target: &str) -> E {
        self(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocols_union() {
        assert_eq!(Protocols::TCP | Protocols::UDP, Protocols::ALL);
        assert_eq!(Protocols::NONE | Protocols::TCP, Protocols::TCP);

        let mut set = Protocols::NONE;
        set |= Protocols::from(Protocol::Udp);
        assert!(set.contains(Protocol::Udp));
        assert!(!set.contains(Protocol::Tcp));
    }

    #[test]
    fn test_protocols_display() {
        assert_eq!(Protocols::NONE.to_string(), "NONE");
        assert_eq!(Protocols::ALL.to_string(), "TCP|UDP");
        assert_eq!(Protocols::UDP.to_string(), "UDP");
    }

    #[test]
    fn test_scan_results_slots() {
        let results = ScanResults::new().with(Protocol::Udp, ScanOutcome::Rejected);
        assert_eq!(results.get(Protocol::Tcp), None);
        assert_eq!(results.get(Protocol::Udp), Some(ScanOutcome::Rejected));
        assert_eq!(results.probed(), Protocols::UDP);
    }

    #[test]
    fn test_closure_factory() {
        struct Fixed(u16);
        impl Environment for Fixed {
            fn current_port(&self) -> u16 {
                self.0
            }
            fn set_port(&mut self, port: u16) {
                self.0 = port;
            }
            fn probe(&mut self, _protocols: Protocols) -> Result<ScanResults> {
                Ok(ScanResults::new())
            }
        }

        let factory = |_target: &str| Fixed(0);
        let mut env = factory.create("localhost");
        env.set_port(443);
        assert_eq!(env.current_port(), 443);
    }
}
