//! UDP probe builder and ICMP-unreachable-based response classifier
//! (SPEC_FULL.md §4.3, §4.4).

use std::net::IpAddr;

use crate::checksum::{transport_checksum_v4, transport_checksum_v6};
use crate::icmp::{quoted_udp_dest_port_v4, quoted_udp_dest_port_v6};
use crate::model::{Endpoint, ProbeOutcome, Verdict};
use crate::strategy::ScanStrategy;

const UDP_PROTOCOL_NUMBER: u8 = 17;
const UDP_HEADER_LEN: usize = 8;

/// An 8-byte UDP header with a zero-length payload.
#[derive(Debug, Clone, Copy)]
pub struct UdpDatagram {
    pub source_port: u16,
    pub dest_port: u16,
    pub checksum: u16,
}

impl UdpDatagram {
    pub fn to_bytes(&self) -> [u8; UDP_HEADER_LEN] {
        let mut bytes = [0u8; UDP_HEADER_LEN];
        bytes[0..2].copy_from_slice(&self.source_port.to_be_bytes());
        bytes[2..4].copy_from_slice(&self.dest_port.to_be_bytes());
        bytes[4..6].copy_from_slice(&(UDP_HEADER_LEN as u16).to_be_bytes());
        bytes[6..8].copy_from_slice(&self.checksum.to_be_bytes());
        bytes
    }
}

fn checksum(src: IpAddr, dst: IpAddr, segment: &[u8]) -> u16 {
    match (src, dst) {
        (IpAddr::V4(s), IpAddr::V4(d)) => transport_checksum_v4(s, d, UDP_PROTOCOL_NUMBER, segment),
        (IpAddr::V6(s), IpAddr::V6(d)) => transport_checksum_v6(s, d, UDP_PROTOCOL_NUMBER, segment),
        _ => unreachable!("source and destination endpoints must share an address family"),
    }
}

/// Build a zero-payload UDP datagram for `dest_port`, checksum filled in.
/// Always computed (never zero), so IPv4 and IPv6 share one code path
/// (SPEC_FULL.md §4.3).
pub fn build_probe(src: IpAddr, dst: IpAddr, source_port: u16, dest_port: u16) -> [u8; UDP_HEADER_LEN] {
    let mut datagram = UdpDatagram {
        source_port,
        dest_port,
        checksum: 0,
    };
    datagram.checksum = checksum(src, dst, &datagram.to_bytes());
    datagram.to_bytes()
}

/// Classify a received ICMP (v4) or ICMPv6 message against the port
/// currently under test (SPEC_FULL.md §4.4).
pub fn classify_icmp(is_v6: bool, payload: &[u8], current_port: u16) -> ProbeOutcome {
    let quoted_port = if is_v6 {
        quoted_udp_dest_port_v6(payload)
    } else {
        quoted_udp_dest_port_v4(payload)
    };

    match quoted_port {
        Some(port) if port == current_port => ProbeOutcome::Done(Verdict::Closed),
        _ => ProbeOutcome::Incomplete,
    }
}

/// The UDP `ScanStrategy`: sends an empty datagram, relies on an ICMP Port
/// Unreachable reply to declare `closed`, and — consistent with nmap's
/// convention — declares `open` once the retransmission budget is spent
/// with no ICMP reply observed.
pub struct UdpStrategy {
    source_port: u16,
}

impl UdpStrategy {
    pub fn new(source_port: u16) -> Self {
        Self { source_port }
    }
}

impl ScanStrategy for UdpStrategy {
    fn build(&mut self, source: &Endpoint, destination: &Endpoint) -> Vec<u8> {
        build_probe(
            source.addr(),
            destination.addr(),
            self.source_port,
            destination.port(),
        )
        .to_vec()
    }

    fn classify(&self, destination: &Endpoint, buf: &[u8]) -> ProbeOutcome {
        classify_icmp(destination.is_ipv6(), buf, destination.port())
    }

    fn on_timeout(&self) -> Verdict {
        Verdict::Open
    }

    fn receive_protocol_is_icmp(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn to_bytes_length_field_is_eight() {
        let datagram = UdpDatagram {
            source_port: 57489,
            dest_port: 53,
            checksum: 0,
        };
        let bytes = datagram.to_bytes();
        assert_eq!(u16::from_be_bytes([bytes[4], bytes[5]]), 8);
    }

    #[test]
    fn build_probe_checksum_validates() {
        let src = Ipv4Addr::new(127, 0, 0, 1);
        let dst = Ipv4Addr::new(127, 0, 0, 1);
        let probe = build_probe(src.into(), dst.into(), 57489, 53);
        assert!(crate::checksum::validates_v4(src, dst, UDP_PROTOCOL_NUMBER, &probe));
    }

    #[test]
    fn matching_quoted_port_means_closed() {
        let mut msg = vec![3u8, 3, 0, 0, 0, 0, 0, 0];
        msg.extend_from_slice(&[0u8; 20]); // quoted IPv4 header
        msg.extend_from_slice(&0xC350u16.to_be_bytes()); // quoted UDP src port
        msg.extend_from_slice(&54321u16.to_be_bytes()); // quoted UDP dst port
        msg.extend_from_slice(&8u16.to_be_bytes()); // quoted UDP length
        msg.extend_from_slice(&0u16.to_be_bytes()); // quoted UDP checksum

        let outcome = classify_icmp(false, &msg, 54321);
        assert_eq!(outcome, ProbeOutcome::Done(Verdict::Closed));
    }

    #[test]
    fn mismatched_quoted_port_is_incomplete() {
        let mut msg = vec![3u8, 3, 0, 0, 0, 0, 0, 0];
        msg.extend_from_slice(&[0u8; 20]);
        msg.extend_from_slice(&0xC350u16.to_be_bytes());
        msg.extend_from_slice(&11111u16.to_be_bytes());
        msg.extend_from_slice(&8u16.to_be_bytes());
        msg.extend_from_slice(&0u16.to_be_bytes());

        let outcome = classify_icmp(false, &msg, 54321);
        assert_eq!(outcome, ProbeOutcome::Incomplete);
    }

    #[test]
    fn truncated_icmp_payload_is_incomplete() {
        let mut msg = vec![3u8, 3, 0, 0, 0, 0, 0, 0];
        msg.extend_from_slice(&[0u8; 20]);
        msg.extend_from_slice(&0xC350u16.to_be_bytes());
        msg.extend_from_slice(&54321u16.to_be_bytes());
        // missing the quoted UDP length/checksum bytes: 32 bytes total

        let outcome = classify_icmp(false, &msg, 54321);
        assert_eq!(outcome, ProbeOutcome::Incomplete);
    }

    #[test]
    fn unrelated_icmp_type_is_incomplete() {
        let msg = vec![8u8, 0, 0, 0, 0, 0, 0, 0]; // echo request, irrelevant
        assert_eq!(classify_icmp(false, &msg, 54321), ProbeOutcome::Incomplete);
    }

    #[test]
    fn timeout_policy_is_open() {
        let strategy = UdpStrategy::new(57489);
        assert_eq!(strategy.on_timeout(), Verdict::Open);
    }
}
