//! ICMP / ICMPv6 Destination-Unreachable parsing for the UDP classifier
//! (SPEC_FULL.md §4.4).

const ICMPV4_DEST_UNREACHABLE: u8 = 3;
const ICMPV4_PORT_UNREACHABLE: u8 = 3;
const ICMPV6_DEST_UNREACHABLE: u8 = 1;
const ICMPV6_PORT_UNREACHABLE: u8 = 4;

const ICMP_HEADER_LEN: usize = 8; // type(1) + code(1) + checksum(2) + unused(4)
const UDP_HEADER_LEN: usize = 8;
const IPV4_HEADER_LEN: usize = 20; // our probes' quoted IPv4 header carries no options
const IPV6_HEADER_LEN: usize = 40;

/// Destination port quoted in the offending UDP header embedded in an ICMP
/// Destination Unreachable / Port Unreachable message. `None` when the
/// message isn't Port Unreachable, or the quoted payload is too short to
/// contain a full quoted IPv4 header plus UDP header (SPEC_FULL.md §8
/// boundary behavior).
pub fn quoted_udp_dest_port_v4(icmp_payload: &[u8]) -> Option<u16> {
    if icmp_payload.len() < ICMP_HEADER_LEN {
        return None;
    }
    let icmp_type = icmp_payload[0];
    let icmp_code = icmp_payload[1];
    if icmp_type != ICMPV4_DEST_UNREACHABLE || icmp_code != ICMPV4_PORT_UNREACHABLE {
        return None;
    }

    // The quoted UDP header is the last 8 bytes of the ICMP payload: the
    // kernel delivers `icmp header + quoted IP header (20 bytes, no
    // options) + quoted UDP header (8 bytes, unpadded since our probes
    // carry none)`. Anything shorter means the quoted UDP header itself was
    // truncated, so the last 8 bytes aren't it.
    if icmp_payload.len() < ICMP_HEADER_LEN + IPV4_HEADER_LEN + UDP_HEADER_LEN {
        return None;
    }
    let udp = &icmp_payload[icmp_payload.len() - UDP_HEADER_LEN..];
    Some(u16::from_be_bytes([udp[2], udp[3]]))
}

/// Same as [`quoted_udp_dest_port_v4`] but for ICMPv6, where the quoted
/// inner IPv6 header has a fixed 40-byte length (no options), so the UDP
/// header is found immediately after `icmp header + 40`.
pub fn quoted_udp_dest_port_v6(icmpv6_payload: &[u8]) -> Option<u16> {
    if icmpv6_payload.len() < ICMP_HEADER_LEN {
        return None;
    }
    let icmp_type = icmpv6_payload[0];
    let icmp_code = icmpv6_payload[1];
    if icmp_type != ICMPV6_DEST_UNREACHABLE || icmp_code != ICMPV6_PORT_UNREACHABLE {
        return None;
    }

    let quoted_start = ICMP_HEADER_LEN + IPV6_HEADER_LEN;
    if icmpv6_payload.len() < quoted_start + UDP_HEADER_LEN {
        return None;
    }
    let udp = &icmpv6_payload[quoted_start..quoted_start + UDP_HEADER_LEN];
    Some(u16::from_be_bytes([udp[2], udp[3]]))
}
