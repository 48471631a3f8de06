//! TCP SYN probe builder and response classifier (SPEC_FULL.md §4.3, §4.4).

use std::fmt;
use std::net::IpAddr;

use bitflags::bitflags;

use crate::checksum::{transport_checksum_v4, transport_checksum_v6};
use crate::model::{Endpoint, ProbeOutcome, Verdict};
use crate::strategy::ScanStrategy;

const TCP_PROTOCOL_NUMBER: u8 = 6;
const TCP_HEADER_LEN: usize = 20;
const TCP_WINDOW: u16 = 0xFFFF;

bitflags! {
    #[repr(transparent)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TcpFlags: u8 {
        const UNINT = 0x00;
        const FIN = 0x01;
        const SYN = 0x02;
        const RST = 0x04;
        const PSH = 0x08;
        const ACK = 0x10;
        const URG = 0x20;
        const ECE = 0x40;
        const CWR = 0x80;
    }
}

impl fmt::Display for TcpFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = vec![];
        if self.contains(TcpFlags::FIN) {
            names.push("FIN");
        }
        if self.contains(TcpFlags::SYN) {
            names.push("SYN");
        }
        if self.contains(TcpFlags::RST) {
            names.push("RST");
        }
        if self.contains(TcpFlags::PSH) {
            names.push("PSH");
        }
        if self.contains(TcpFlags::ACK) {
            names.push("ACK");
        }
        if self.contains(TcpFlags::URG) {
            names.push("URG");
        }
        if self.contains(TcpFlags::ECE) {
            names.push("ECE");
        }
        if self.contains(TcpFlags::CWR) {
            names.push("CWR");
        }

        if names.is_empty() {
            write!(f, "UNINT")
        } else {
            write!(f, "{}", names.join("|"))
        }
    }
}

/// A 20-byte TCP segment with no options and no payload.
#[derive(Debug, Clone, Copy)]
pub struct TcpSegment {
    pub source_port: u16,
    pub dest_port: u16,
    pub seq_num: u32,
    pub ack_num: u32,
    pub flags: TcpFlags,
    pub window: u16,
    pub checksum: u16,
}

impl TcpSegment {
    pub fn to_bytes(&self) -> [u8; TCP_HEADER_LEN] {
        let mut bytes = [0u8; TCP_HEADER_LEN];
        bytes[0..2].copy_from_slice(&self.source_port.to_be_bytes());
        bytes[2..4].copy_from_slice(&self.dest_port.to_be_bytes());
        bytes[4..8].copy_from_slice(&self.seq_num.to_be_bytes());
        bytes[8..12].copy_from_slice(&self.ack_num.to_be_bytes());
        bytes[12] = 5 << 4; // data offset = 5, reserved = 0
        bytes[13] = self.flags.bits();
        bytes[14..16].copy_from_slice(&self.window.to_be_bytes());
        bytes[16..18].copy_from_slice(&self.checksum.to_be_bytes());
        bytes[18..20].copy_from_slice(&0u16.to_be_bytes()); // urgent pointer
        bytes
    }

    /// Parse a received segment. Returns `None` if `bytes` is shorter than
    /// a bare TCP header (SPEC_FULL.md §4.4, §8 boundary behavior).
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < TCP_HEADER_LEN {
            return None;
        }
        Some(Self {
            source_port: u16::from_be_bytes(bytes[0..2].try_into().unwrap()),
            dest_port: u16::from_be_bytes(bytes[2..4].try_into().unwrap()),
            seq_num: u32::from_be_bytes(bytes[4..8].try_into().unwrap()),
            ack_num: u32::from_be_bytes(bytes[8..12].try_into().unwrap()),
            flags: TcpFlags::from_bits_truncate(bytes[13]),
            window: u16::from_be_bytes(bytes[14..16].try_into().unwrap()),
            checksum: u16::from_be_bytes(bytes[16..18].try_into().unwrap()),
        })
    }
}

/// Interpret a received TCP segment's flags (SPEC_FULL.md §4.4). `expected_port`
/// is the current port under test; when `Some`, the classifier additionally
/// requires the response's source port to match, per the spec's recommended
/// tightening (DESIGN.md resolves this Open Question in favor of checking).
pub fn classify_tcp(bytes: &[u8], expected_port: Option<u16>) -> ProbeOutcome {
    let Some(segment) = TcpSegment::from_bytes(bytes) else {
        return ProbeOutcome::Incomplete;
    };

    if let Some(port) = expected_port {
        if segment.source_port != port {
            return ProbeOutcome::Incomplete;
        }
    }

    if segment.flags.contains(TcpFlags::RST) {
        ProbeOutcome::Done(Verdict::Closed)
    } else if segment.flags.contains(TcpFlags::SYN) && segment.flags.contains(TcpFlags::ACK) {
        ProbeOutcome::Done(Verdict::Open)
    } else {
        ProbeOutcome::Done(Verdict::Filtered)
    }
}

fn checksum(src: IpAddr, dst: IpAddr, segment: &[u8]) -> u16 {
    match (src, dst) {
        (IpAddr::V4(s), IpAddr::V4(d)) => transport_checksum_v4(s, d, TCP_PROTOCOL_NUMBER, segment),
        (IpAddr::V6(s), IpAddr::V6(d)) => transport_checksum_v6(s, d, TCP_PROTOCOL_NUMBER, segment),
        _ => unreachable!("source and destination endpoints must share an address family"),
    }
}

/// Build a SYN segment for `dest_port`, with the checksum field filled in.
pub fn build_syn(src: IpAddr, dst: IpAddr, source_port: u16, dest_port: u16, seq_num: u32) -> [u8; TCP_HEADER_LEN] {
    let mut segment = TcpSegment {
        source_port,
        dest_port,
        seq_num,
        ack_num: 0,
        flags: TcpFlags::SYN,
        window: TCP_WINDOW,
        checksum: 0,
    };
    segment.checksum = checksum(src, dst, &segment.to_bytes());
    segment.to_bytes()
}

/// The TCP `ScanStrategy`: sends SYN, classifies by RST/SYN+ACK/other, and
/// reports `filtered` once retransmissions are exhausted with no reply.
///
/// Owns the per-probe sequence counter that the original C source kept at
/// module scope (SPEC_FULL.md §9 "Global Mutable State").
pub struct TcpStrategy {
    source_port: u16,
    seq_counter: u32,
    verify_source_port: bool,
}

impl TcpStrategy {
    pub fn new(source_port: u16) -> Self {
        Self {
            source_port,
            seq_counter: 0,
            verify_source_port: true,
        }
    }
}

impl ScanStrategy for TcpStrategy {
    fn build(&mut self, source: &Endpoint, destination: &Endpoint) -> Vec<u8> {
        let seq = self.seq_counter;
        self.seq_counter = self.seq_counter.wrapping_add(1);
        build_syn(
            source.addr(),
            destination.addr(),
            self.source_port,
            destination.port(),
            seq,
        )
        .to_vec()
    }

    fn classify(&self, destination: &Endpoint, buf: &[u8]) -> ProbeOutcome {
        let expected = self.verify_source_port.then_some(destination.port());
        classify_tcp(buf, expected)
    }

    fn on_timeout(&self) -> Verdict {
        Verdict::Filtered
    }

    fn receive_protocol_is_icmp(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn sample() -> TcpSegment {
        TcpSegment {
            source_port: 57489,
            dest_port: 22,
            seq_num: 0,
            ack_num: 0,
            flags: TcpFlags::SYN,
            window: TCP_WINDOW,
            checksum: 0,
        }
    }

    #[test]
    fn to_bytes_matches_wire_layout() {
        let bytes = sample().to_bytes();
        assert_eq!(u16::from_be_bytes([bytes[0], bytes[1]]), 57489);
        assert_eq!(u16::from_be_bytes([bytes[2], bytes[3]]), 22);
        assert_eq!(bytes[12] >> 4, 5); // data offset
        assert_eq!(bytes[13], TcpFlags::SYN.bits());
        assert_eq!(u16::from_be_bytes([bytes[14], bytes[15]]), 0xFFFF);
    }

    #[test]
    fn round_trip_through_bytes() {
        let original = sample();
        let parsed = TcpSegment::from_bytes(&original.to_bytes()).unwrap();
        assert_eq!(parsed.source_port, original.source_port);
        assert_eq!(parsed.dest_port, original.dest_port);
        assert_eq!(parsed.flags, original.flags);
        assert_eq!(parsed.window, original.window);
    }

    #[test]
    fn short_segment_is_incomplete() {
        let outcome = classify_tcp(&[0u8; 19], None);
        assert_eq!(outcome, ProbeOutcome::Incomplete);
    }

    #[test]
    fn rst_means_closed() {
        let mut seg = sample();
        seg.flags = TcpFlags::RST;
        let outcome = classify_tcp(&seg.to_bytes(), None);
        assert_eq!(outcome, ProbeOutcome::Done(Verdict::Closed));
    }

    #[test]
    fn syn_ack_means_open() {
        let mut seg = sample();
        seg.flags = TcpFlags::SYN | TcpFlags::ACK;
        let outcome = classify_tcp(&seg.to_bytes(), None);
        assert_eq!(outcome, ProbeOutcome::Done(Verdict::Open));
    }

    #[test]
    fn anything_else_means_filtered() {
        let mut seg = sample();
        seg.flags = TcpFlags::PSH;
        let outcome = classify_tcp(&seg.to_bytes(), None);
        assert_eq!(outcome, ProbeOutcome::Done(Verdict::Filtered));
    }

    #[test]
    fn mismatched_source_port_is_ignored_when_checked() {
        let mut seg = sample();
        seg.flags = TcpFlags::RST;
        seg.source_port = 4444;
        let outcome = classify_tcp(&seg.to_bytes(), Some(22));
        assert_eq!(outcome, ProbeOutcome::Incomplete);
    }

    #[test]
    fn build_syn_checksum_validates() {
        let src = Ipv4Addr::new(127, 0, 0, 1);
        let dst = Ipv4Addr::new(127, 0, 0, 1);
        let packet = build_syn(src.into(), dst.into(), 57489, 22, 0);
        assert!(crate::checksum::validates_v4(src, dst, TCP_PROTOCOL_NUMBER, &packet));
    }

    #[test]
    fn strategy_increments_sequence_each_build() {
        let source = Endpoint::new("127.0.0.1".parse().unwrap(), 57489);
        let mut destination = Endpoint::new("127.0.0.1".parse().unwrap(), 22);
        let mut strategy = TcpStrategy::new(57489);

        let first = strategy.build(&source, &destination);
        destination.set_port(23);
        let second = strategy.build(&source, &destination);

        let first_seq = u32::from_be_bytes(first[4..8].try_into().unwrap());
        let second_seq = u32::from_be_bytes(second[4..8].try_into().unwrap());
        assert_eq!(second_seq, first_seq.wrapping_add(1));
    }
}
