//! Loopback UDP implementation of the transport.

use std::io::ErrorKind;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::time::Duration;

use flightlink_telemetry_core::TelemetryData;
use tracing::{debug, info};

use crate::codec::{self, MAX_DATAGRAM_SIZE};
use crate::error::TransportError;
use crate::{Delivery, FrameSink, FrameSource};

const MIN_READ_TIMEOUT: Duration = Duration::from_millis(1);
const RECV_BUFFER_SIZE: usize = 65_536;

/// Sends one record per datagram to a fixed loopback address.
#[derive(Debug)]
pub struct UdpFrameSender {
    socket: UdpSocket,
    target: SocketAddr,
}

impl UdpFrameSender {
    /// Bind an ephemeral loopback port and connect it to `target`.
    ///
    /// # Errors
    ///
    /// Fails if the local socket cannot be bound or connected.
    pub fn connect(target: SocketAddr) -> Result<Self, TransportError> {
        let local = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0));
        let socket = UdpSocket::bind(local).map_err(|source| TransportError::Bind {
            addr: local,
            source,
        })?;
        socket.connect(target)?;
        debug!(%target, "Telemetry sender connected");
        Ok(Self { socket, target })
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }
}

impl FrameSink for UdpFrameSender {
    fn send(&mut self, data: &TelemetryData) -> Delivery {
        let bytes = match codec::encode(data) {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!("Dropping telemetry record: {e}");
                return Delivery::Dropped;
            }
        };
        match self.socket.send(&bytes) {
            Ok(_) => Delivery::Sent,
            Err(e) => {
                // Nobody listening yet, or the consumer restarted.
                debug!("Telemetry datagram not sent: {e}");
                Delivery::Dropped
            }
        }
    }
}

/// Receives records on a fixed loopback address.
#[derive(Debug)]
pub struct UdpFrameReceiver {
    socket: UdpSocket,
    buf: Vec<u8>,
}

impl UdpFrameReceiver {
    /// # Errors
    ///
    /// Returns [`TransportError::Bind`] if the address is unavailable.
    pub fn bind(addr: SocketAddr) -> Result<Self, TransportError> {
        let socket = UdpSocket::bind(addr).map_err(|source| TransportError::Bind { addr, source })?;
        info!("Telemetry receiver listening on {}", socket.local_addr()?);
        Ok(Self {
            socket,
            buf: vec![0u8; RECV_BUFFER_SIZE],
        })
    }

    /// # Errors
    ///
    /// Fails if the socket address cannot be queried.
    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        Ok(self.socket.local_addr()?)
    }
}

impl FrameSource for UdpFrameReceiver {
    fn poll(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>, TransportError> {
        self.socket
            .set_read_timeout(Some(timeout.max(MIN_READ_TIMEOUT)))?;
        match self.socket.recv(&mut self.buf) {
            Ok(len) if len > MAX_DATAGRAM_SIZE => Err(TransportError::Oversized {
                size: len,
                max: MAX_DATAGRAM_SIZE,
            }),
            Ok(len) => Ok(self.buf.get(..len).map(<[u8]>::to_vec)),
            Err(e)
                if matches!(
                    e.kind(),
                    ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::ConnectionReset
                ) =>
            {
                Ok(None)
            }
            Err(e) => Err(TransportError::Io(e)),
        }
    }
}
