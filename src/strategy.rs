//! Protocol polymorphism for the scanner engine (SPEC_FULL.md §4.6, §9).
//!
//! The engine in `engine.rs` is generic over `S: ScanStrategy` instead of
//! switching on a protocol enum at every step; TCP and UDP each supply their
//! own builder, classifier, and timeout policy.

use crate::model::{Endpoint, ProbeOutcome, Verdict};

pub trait ScanStrategy {
    /// Build the wire-ready segment addressed to `destination`'s current
    /// port. Mutates any per-probe counter the strategy owns (e.g. TCP's
    /// sequence number).
    fn build(&mut self, source: &Endpoint, destination: &Endpoint) -> Vec<u8>;

    /// Interpret one received buffer. For TCP this is the TCP segment
    /// itself; for UDP it is the ICMP/ICMPv6 message quoting our probe.
    fn classify(&self, destination: &Endpoint, buf: &[u8]) -> ProbeOutcome;

    /// Verdict to report once the retransmission budget is exhausted with
    /// no conclusive reply.
    fn on_timeout(&self) -> Verdict;

    /// Whether the *receive* socket should be opened against the ICMP
    /// family (UDP scanning) rather than the probed protocol itself (TCP
    /// scanning, which reads back TCP segments on a TCP raw socket).
    fn receive_protocol_is_icmp(&self) -> bool;
}
