//! Command-line surface (SPEC_FULL.md §4.7, §6). An external collaborator
//! to the scanning core in spirit, but given concrete form here so the
//! crate is a complete, runnable binary.

use clap::Parser;

use crate::error::ScanError;
use crate::model::PortSet;

/// A Layer-4 SYN/ICMP port scanner.
#[derive(Debug, Parser)]
#[command(name = "synwatch", version, about, disable_help_flag = false)]
pub struct Args {
    /// Target host name or address.
    pub target: Option<String>,

    /// Interface to scan from. If omitted, interfaces are listed and the
    /// program exits 0 without scanning.
    #[arg(short = 'i', long = "interface")]
    pub interface: Option<String>,

    /// TCP port selector: `lo-hi` or a comma-separated list.
    #[arg(short = 't', long = "pt")]
    pub tcp_ports: Option<String>,

    /// UDP port selector: `lo-hi` or a comma-separated list.
    #[arg(short = 'u', long = "pu")]
    pub udp_ports: Option<String>,

    /// Per-port wait budget, in milliseconds.
    #[arg(short = 'w', long = "wait", default_value_t = 5000)]
    pub wait_ms: u64,

    /// Maximum retransmissions per port.
    #[arg(short = 'r', long = "retransmissions", default_value_t = 1)]
    pub retransmissions: u32,

    /// Inter-probe rate-limit gap, in milliseconds.
    #[arg(short = 'l', long = "ratelimit", default_value_t = 1000)]
    pub rate_limit_ms: u64,
}

impl Args {
    pub fn tcp_port_set(&self) -> Result<PortSet, ScanError> {
        match &self.tcp_ports {
            Some(spec) => PortSet::parse(spec),
            None => Ok(PortSet::Empty),
        }
    }

    pub fn udp_port_set(&self) -> Result<PortSet, ScanError> {
        match &self.udp_ports {
            Some(spec) => PortSet::parse(spec),
            None => Ok(PortSet::Empty),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_tcp_invocation() {
        let args = Args::parse_from(["synwatch", "-i", "eth0", "-t", "20-25", "example.com"]);
        assert_eq!(args.interface.as_deref(), Some("eth0"));
        assert_eq!(args.tcp_port_set().unwrap(), PortSet::Range(20, 25));
        assert_eq!(args.wait_ms, 5000);
        assert_eq!(args.retransmissions, 1);
        assert_eq!(args.rate_limit_ms, 1000);
    }

    #[test]
    fn interface_is_optional_for_listing() {
        let args = Args::parse_from(["synwatch"]);
        assert!(args.interface.is_none());
    }

    #[test]
    fn overrides_apply() {
        let args = Args::parse_from([
            "synwatch", "-i", "eth0", "-u", "53,123", "-w", "250", "-r", "3", "-l", "10", "host",
        ]);
        assert_eq!(args.udp_port_set().unwrap(), PortSet::List(vec![53, 123]));
        assert_eq!(args.wait_ms, 250);
        assert_eq!(args.retransmissions, 3);
        assert_eq!(args.rate_limit_ms, 10);
    }
}
