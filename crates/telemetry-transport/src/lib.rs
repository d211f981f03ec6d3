//! Transport channel between the flightlink capture agent and relay.
//!
//! The channel is best-effort and unordered: sends never block and never report
//! failure to the caller beyond a [`Delivery::Dropped`] hint, and receivers poll
//! with a short timeout so they never wait on a specific record.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use flightlink_telemetry_core::TelemetryData;

pub mod channel;
pub mod codec;
pub mod error;
pub mod udp;

pub use channel::{ChannelFrameReceiver, ChannelFrameSender, channel_transport};
pub use codec::{MAX_DATAGRAM_SIZE, decode, encode};
pub use error::TransportError;
pub use udp::{UdpFrameReceiver, UdpFrameSender};

pub const DEFAULT_PORT: u16 = 55280;

/// Outcome of a fire-and-forget send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    Dropped,
}

/// Producer side of the transport.
pub trait FrameSink: Send {
    fn send(&mut self, data: &TelemetryData) -> Delivery;
}

/// Consumer side of the transport.
pub trait FrameSource: Send {
    /// Wait up to `timeout` for one record. `Ok(None)` means nothing arrived.
    ///
    /// # Errors
    ///
    /// Transient errors concern a single record; anything else means the source
    /// must be recreated.
    fn poll(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>, TransportError>;
}

impl<T: FrameSink + ?Sized> FrameSink for Box<T> {
    fn send(&mut self, data: &TelemetryData) -> Delivery {
        (**self).send(data)
    }
}

impl<T: FrameSource + ?Sized> FrameSource for Box<T> {
    fn poll(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>, TransportError> {
        (**self).poll(timeout)
    }
}

/// Loopback endpoint shared by both sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub address: IpAddr,
    pub port: u16,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: DEFAULT_PORT,
        }
    }
}

impl TransportConfig {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port)
    }
}
