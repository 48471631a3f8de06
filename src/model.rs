//! Shared data model: endpoints, port sets, scan jobs, and verdicts.

use std::fmt;
use std::net::IpAddr;

use crate::error::{ErrorKind, ScanError};

/// The transport protocol a [`ScanJob`] probes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Tcp,
    Udp,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Tcp => write!(f, "tcp"),
            Protocol::Udp => write!(f, "udp"),
        }
    }
}

/// An IP address plus a port. Immutable after construction except for
/// `port`, which the engine mutates once per probe (SPEC_FULL.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoint {
    addr: IpAddr,
    port: u16,
}

impl Endpoint {
    pub fn new(addr: IpAddr, port: u16) -> Self {
        Self { addr, port }
    }

    pub fn addr(&self) -> IpAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn set_port(&mut self, port: u16) {
        self.port = port;
    }

    /// A copy of this endpoint with a different port — used by the engine
    /// to derive the per-send destination from `current_port` without a
    /// mutable `Endpoint` drifting out of sync with it (SPEC_FULL.md §9).
    pub fn with_port(&self, port: u16) -> Self {
        Self { addr: self.addr, port }
    }

    pub fn is_ipv4(&self) -> bool {
        self.addr.is_ipv4()
    }

    pub fn is_ipv6(&self) -> bool {
        self.addr.is_ipv6()
    }

    pub fn to_socket_addr(&self) -> std::net::SocketAddr {
        std::net::SocketAddr::new(self.addr, self.port)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.addr, self.port)
    }
}

/// A set of ports to scan: a contiguous inclusive range, an explicit
/// ordered list of distinct ports, or empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortSet {
    Range(u16, u16),
    List(Vec<u16>),
    Empty,
}

impl PortSet {
    /// Parse the CLI `<PORTS>` syntax: `lo-hi` is tried first, falling back
    /// to a comma-separated list of distinct ports (SPEC_FULL.md §6).
    pub fn parse(s: &str) -> Result<Self, ScanError> {
        let s = s.trim();
        if s.is_empty() {
            return Ok(PortSet::Empty);
        }

        if let Some((lo, hi)) = s.split_once('-') {
            if let (Ok(lo), Ok(hi)) = (lo.trim().parse::<u16>(), hi.trim().parse::<u16>()) {
                if lo >= hi {
                    return Err(ScanError::Argument(format!(
                        "port range {lo}-{hi} must have lo < hi"
                    )));
                }
                return Ok(PortSet::Range(lo, hi));
            }
        }

        let mut ports = Vec::new();
        for part in s.split(',') {
            let port: u16 = part.trim().parse().map_err(|_| {
                ScanError::Argument(format!("invalid port in list: {part:?}"))
            })?;
            if ports.contains(&port) {
                return Err(ScanError::Argument(format!("duplicate port {port}")));
            }
            ports.push(port);
        }
        Ok(PortSet::List(ports))
    }

    /// Render back to the CLI syntax accepted by [`PortSet::parse`].
    pub fn format(&self) -> String {
        match self {
            PortSet::Range(lo, hi) => format!("{lo}-{hi}"),
            PortSet::List(ports) => ports
                .iter()
                .map(u16::to_string)
                .collect::<Vec<_>>()
                .join(","),
            PortSet::Empty => String::new(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            PortSet::Range(lo, hi) => (*hi as usize - *lo as usize) + 1,
            PortSet::List(ports) => ports.len(),
            PortSet::Empty => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ports in probe order: ascending for a range, list order otherwise.
    pub fn iter(&self) -> Box<dyn Iterator<Item = u16> + '_> {
        match self {
            PortSet::Range(lo, hi) => Box::new(*lo..=*hi),
            PortSet::List(ports) => Box::new(ports.iter().copied()),
            PortSet::Empty => Box::new(std::iter::empty()),
        }
    }
}

/// A configured scan of one protocol against one destination over one
/// interface (SPEC_FULL.md §3).
#[derive(Debug, Clone)]
pub struct ScanJob {
    pub source: Endpoint,
    pub destination: Endpoint,
    pub interface: String,
    pub protocol: Protocol,
    pub wait_ms: u64,
    pub max_retransmissions: u32,
    pub rate_gap_ms: u64,
}

/// The per-port result this tool produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Open,
    Closed,
    Filtered,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Open => write!(f, "open"),
            Verdict::Closed => write!(f, "closed"),
            Verdict::Filtered => write!(f, "filtered"),
        }
    }
}

/// The result of processing one poll iteration inside `scan_port`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    Incomplete,
    Retransmit,
    Done(Verdict),
    Fatal(ErrorKind),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_round_trips() {
        let set = PortSet::parse("20-25").unwrap();
        assert_eq!(set, PortSet::Range(20, 25));
        assert_eq!(PortSet::parse(&set.format()).unwrap(), set);
        assert_eq!(set.len(), 6);
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![20, 21, 22, 23, 24, 25]);
    }

    #[test]
    fn list_round_trips() {
        let set = PortSet::parse("80,443,8080").unwrap();
        assert_eq!(set, PortSet::List(vec![80, 443, 8080]));
        assert_eq!(PortSet::parse(&set.format()).unwrap(), set);
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![80, 443, 8080]);
    }

    #[test]
    fn empty_round_trips() {
        let set = PortSet::parse("").unwrap();
        assert_eq!(set, PortSet::Empty);
        assert_eq!(PortSet::parse(&set.format()).unwrap(), set);
        assert_eq!(set.len(), 0);
    }

    #[test]
    fn range_lo_equals_hi_is_rejected() {
        assert!(PortSet::parse("22-22").is_err());
    }

    #[test]
    fn range_lo_greater_than_hi_is_rejected() {
        assert!(PortSet::parse("30-22").is_err());
    }

    #[test]
    fn list_with_duplicate_is_rejected() {
        assert!(PortSet::parse("22,80,22").is_err());
    }

    #[test]
    fn range_form_is_tried_before_list_form() {
        // A single hyphenated pair must parse as Range, not fail as a
        // one-element list containing a minus sign.
        let set = PortSet::parse("1-65535").unwrap();
        assert_eq!(set, PortSet::Range(1, 65535));
    }

    #[test]
    fn endpoint_mutates_port_in_place() {
        let mut ep = Endpoint::new("127.0.0.1".parse().unwrap(), 0);
        ep.set_port(443);
        assert_eq!(ep.port(), 443);
        assert_eq!(ep.to_string(), "127.0.0.1:443");
    }
}
