//! Loopback address helpers.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};

/// A loopback UDP address whose port was free a moment ago.
///
/// # Panics
///
/// Panics if no ephemeral port can be bound.
pub fn free_loopback_addr() -> SocketAddr {
    let ephemeral = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0));
    match UdpSocket::bind(ephemeral).and_then(|socket| socket.local_addr()) {
        Ok(addr) => addr,
        Err(e) => panic!("no free loopback port: {e}"),
    }
}
