//! Interface-bound, non-blocking raw sockets (SPEC_FULL.md §4.2).
//!
//! The kernel owns IP-header handling: this layer writes only the
//! transport header on send, and the kernel prepends the IP header (IPv4)
//! or delivers the transport payload directly (IPv6 ICMP raw sockets). See
//! `engine.rs` for the family-specific receive-side stripping this implies.

use std::io;
use std::mem::MaybeUninit;
use std::net::SocketAddr;

use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use tokio::io::unix::AsyncFd;

use crate::error::ScanError;

pub const IPPROTO_ICMP: i32 = 1;
pub const IPPROTO_TCP: i32 = 6;
pub const IPPROTO_UDP: i32 = 17;
pub const IPPROTO_ICMPV6: i32 = 58;

/// An open raw socket, bound to one interface, for one address family and
/// transport protocol. Releases its descriptor on drop.
pub struct RawSocket {
    inner: AsyncFd<Socket>,
}

impl RawSocket {
    /// Open a raw datagram socket for `domain`/`protocol`, set it
    /// non-blocking, and bind it to `interface`. Falls back to binding by
    /// `bind_addr` when `SO_BINDTODEVICE` isn't available on this platform,
    /// per SPEC_FULL.md §4.2.
    pub fn open(
        interface: &str,
        bind_addr: SocketAddr,
        domain: Domain,
        protocol: Protocol,
    ) -> Result<Self, ScanError> {
        let socket = Socket::new(domain, Type::RAW, Some(protocol)).map_err(ScanError::SocketOpen)?;
        socket.set_nonblocking(true).map_err(ScanError::SetNonblocking)?;
        bind_to_interface(&socket, interface, bind_addr)?;

        let inner = AsyncFd::new(socket).map_err(ScanError::SocketOpen)?;
        Ok(Self { inner })
    }

    /// Send `bytes` to `destination`. Non-blocking; retries internally
    /// while the socket reports itself not yet writable.
    pub async fn send_to(&self, bytes: &[u8], destination: SocketAddr) -> Result<usize, ScanError> {
        let dest = SockAddr::from(destination);
        loop {
            let mut guard = self.inner.writable().await.map_err(ScanError::Send)?;
            match guard.try_io(|socket| socket.get_ref().send_to(bytes, &dest)) {
                Ok(result) => return result.map_err(ScanError::Send),
                Err(_would_block) => continue,
            }
        }
    }

    /// Receive one datagram into `buf`. Non-blocking; the caller is
    /// expected to race this against a deadline with `tokio::time::timeout`
    /// (SPEC_FULL.md §4.5 step 6b).
    pub async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        loop {
            let mut guard = self.inner.readable().await?;
            let uninit: &mut [MaybeUninit<u8>] = unsafe {
                std::slice::from_raw_parts_mut(buf.as_mut_ptr().cast(), buf.len())
            };
            match guard.try_io(|socket| socket.get_ref().recv_from(uninit)) {
                Ok(Ok((len, addr))) => {
                    let source = addr
                        .as_socket()
                        .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "non-IP source address"))?;
                    return Ok((len, source));
                }
                Ok(Err(e)) => return Err(e),
                Err(_would_block) => continue,
            }
        }
    }
}

#[cfg(target_os = "linux")]
fn bind_to_interface(socket: &Socket, interface: &str, bind_addr: SocketAddr) -> Result<(), ScanError> {
    match socket.bind_device(Some(interface.as_bytes())) {
        Ok(()) => Ok(()),
        Err(_) => bind_by_address(socket, interface, bind_addr),
    }
}

#[cfg(not(target_os = "linux"))]
fn bind_to_interface(socket: &Socket, interface: &str, bind_addr: SocketAddr) -> Result<(), ScanError> {
    bind_by_address(socket, interface, bind_addr)
}

fn bind_by_address(socket: &Socket, interface: &str, bind_addr: SocketAddr) -> Result<(), ScanError> {
    socket
        .bind(&SockAddr::from(bind_addr))
        .map_err(|source| ScanError::BindInterface {
            interface: interface.to_string(),
            source,
        })
}
