//! The per-port scanner state machine (SPEC_FULL.md §4.5).
//!
//! `ProbeContext::scan_port` sends a probe, polls for a response within a
//! deadline, applies retransmissions, enforces inter-probe rate limiting,
//! and dispatches to the protocol's [`ScanStrategy`] to produce a single
//! [`Verdict`].

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use socket2::{Domain, Protocol};
use tracing::{debug, trace, warn};

use crate::error::ScanError;
use crate::model::{Endpoint, ProbeOutcome, Verdict};
use crate::raw_socket::{RawSocket, IPPROTO_ICMP, IPPROTO_ICMPV6, IPPROTO_TCP};
use crate::strategy::ScanStrategy;

/// 8 KiB is enough for any packet this scanner sends or receives
/// (SPEC_FULL.md §5 Resource Discipline).
const PACKET_BUF_LEN: usize = 1 << 13;

/// A cooperative shutdown signal, set by the CLI driver's signal handler
/// and polled between ports (SPEC_FULL.md §5 Cancellation & timeout).
#[derive(Clone, Default)]
pub struct ShutdownFlag(Arc<AtomicBool>);

impl ShutdownFlag {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A live scanner for one protocol against one destination over one
/// interface (SPEC_FULL.md §3).
pub struct ProbeContext<S: ScanStrategy> {
    source: Endpoint,
    destination: Endpoint,
    send_socket: RawSocket,
    recv_socket: RawSocket,
    strategy: S,
    current_port: u16,
    last_probe: Option<Instant>,
    rate_gap: Duration,
    max_retransmissions: u32,
}

impl<S: ScanStrategy> ProbeContext<S> {
    /// Open the send/receive raw sockets for this scan and wrap them with
    /// `strategy`. TCP reads back on IPPROTO_TCP; UDP reads back on
    /// IPPROTO_ICMP (v4) or IPPROTO_ICMPV6 (v6), never on IPPROTO_UDP
    /// (SPEC_FULL.md §3 invariants).
    pub fn new(
        interface: &str,
        source: Endpoint,
        destination: Endpoint,
        send_protocol: Protocol,
        rate_gap: Duration,
        max_retransmissions: u32,
        strategy: S,
    ) -> Result<Self, ScanError> {
        let domain = if destination.is_ipv6() { Domain::IPV6 } else { Domain::IPV4 };
        let recv_protocol = if strategy.receive_protocol_is_icmp() {
            if destination.is_ipv6() {
                Protocol::from(IPPROTO_ICMPV6)
            } else {
                Protocol::from(IPPROTO_ICMP)
            }
        } else {
            Protocol::from(IPPROTO_TCP)
        };

        let send_socket = RawSocket::open(
            interface,
            SocketAddr::new(source.addr(), 0),
            domain,
            send_protocol,
        )?;
        let recv_socket = RawSocket::open(
            interface,
            SocketAddr::new(source.addr(), 0),
            domain,
            recv_protocol,
        )?;

        Ok(Self {
            source,
            destination,
            send_socket,
            recv_socket,
            strategy,
            current_port: destination.port(),
            last_probe: None,
            rate_gap,
            max_retransmissions,
        })
    }

    fn destination(&self) -> Endpoint {
        self.destination.with_port(self.current_port)
    }

    async fn rate_limit(&mut self) {
        if let Some(last) = self.last_probe {
            let elapsed = last.elapsed();
            if elapsed < self.rate_gap {
                tokio::time::sleep(self.rate_gap - elapsed).await;
            }
        }
    }

    async fn send_probe(&mut self) -> Result<Vec<u8>, ScanError> {
        let destination = self.destination();
        let bytes = self.strategy.build(&self.source, &destination);
        self.send_socket.send_to(&bytes, destination.to_socket_addr()).await?;
        self.last_probe = Some(Instant::now());
        Ok(bytes)
    }

    /// Scan `target_port`, waiting up to `wait` per attempt. Returns
    /// `Ok(Some(verdict))` on a conclusive result, `Ok(None)` if the port
    /// was aborted cleanly (shutdown signal, foreign-packet-only poll
    /// error), or `Err` on a fatal send failure (SPEC_FULL.md §4.5).
    pub async fn scan_port(
        &mut self,
        target_port: u16,
        wait: Duration,
        shutdown: &ShutdownFlag,
    ) -> Result<Option<Verdict>, ScanError> {
        self.rate_limit().await;

        self.current_port = target_port;
        self.send_probe().await?;

        let mut retransmissions_used = 0u32;
        let mut deadline = Instant::now() + wait;
        let mut recv_buf = [0u8; PACKET_BUF_LEN];

        loop {
            if shutdown.is_set() {
                debug!(port = target_port, "shutdown requested, aborting in-flight port");
                return Ok(None);
            }

            let remaining = deadline.saturating_duration_since(Instant::now());

            match tokio::time::timeout(remaining, self.recv_socket.recv_from(&mut recv_buf)).await {
                Err(_elapsed) => {
                    if retransmissions_used < self.max_retransmissions {
                        trace!(port = target_port, attempt = retransmissions_used + 1, "retransmitting");
                        self.send_probe().await?;
                        deadline = Instant::now() + wait;
                        retransmissions_used += 1;
                        continue;
                    }
                    return Ok(Some(self.strategy.on_timeout()));
                }
                Ok(Err(e)) => {
                    warn!(port = target_port, error = %e, "receive error, aborting port");
                    return Ok(None);
                }
                Ok(Ok((len, source_addr))) => {
                    let destination = self.destination();
                    if source_addr.ip() != destination.addr() {
                        trace!(port = target_port, from = %source_addr, "discarding foreign packet");
                        continue;
                    }

                    let payload = strip_ip_header(&recv_buf[..len], destination.is_ipv4());
                    match self.strategy.classify(&destination, payload) {
                        ProbeOutcome::Incomplete => continue,
                        ProbeOutcome::Retransmit => {
                            self.send_probe().await?;
                            deadline = Instant::now() + wait;
                            continue;
                        }
                        ProbeOutcome::Done(verdict) => return Ok(Some(verdict)),
                        ProbeOutcome::Fatal(kind) => {
                            warn!(port = target_port, ?kind, "classifier reported a fatal condition");
                            return Ok(None);
                        }
                    }
                }
            }
        }
    }
}

/// Strip the outer IPv4 header (`IHL × 4` bytes) from a received buffer.
/// IPv6 raw sockets deliver the transport payload directly, so `buf` is
/// returned unchanged when `is_v4` is false (SPEC_FULL.md §4.5 step 6e).
fn strip_ip_header(buf: &[u8], is_v4: bool) -> &[u8] {
    if !is_v4 {
        return buf;
    }
    let Some(&first_byte) = buf.first() else {
        return buf;
    };
    let ihl = ((first_byte & 0x0F) as usize) * 4;
    if ihl > buf.len() {
        &[]
    } else {
        &buf[ihl..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_ip_header_removes_ihl_bytes() {
        let mut packet = vec![0x45u8]; // IHL = 5 -> 20 bytes
        packet.extend_from_slice(&[0u8; 19]);
        packet.extend_from_slice(b"payload");
        assert_eq!(strip_ip_header(&packet, true), b"payload");
    }

    #[test]
    fn strip_ip_header_is_noop_for_v6() {
        let packet = b"already-stripped".to_vec();
        assert_eq!(strip_ip_header(&packet, false), b"already-stripped");
    }

    #[test]
    fn strip_ip_header_handles_empty_buffer() {
        assert_eq!(strip_ip_header(&[], true), &[] as &[u8]);
    }

    #[test]
    fn shutdown_flag_starts_unset() {
        let flag = ShutdownFlag::new();
        assert!(!flag.is_set());
        flag.trigger();
        assert!(flag.is_set());
    }
}
