//! In-process transport used when the capture agent runs embedded.
//!
//! Carries the same encoded records as the UDP transport and is just as lossy:
//! a full queue drops the newest record instead of blocking the producer.

use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TrySendError};
use flightlink_telemetry_core::TelemetryData;
use tracing::trace;

use crate::codec;
use crate::error::TransportError;
use crate::{Delivery, FrameSink, FrameSource};

/// Create a bounded in-process transport.
pub fn channel_transport(capacity: usize) -> (ChannelFrameSender, ChannelFrameReceiver) {
    let (tx, rx) = channel::bounded(capacity.max(1));
    (ChannelFrameSender { tx }, ChannelFrameReceiver { rx })
}

#[derive(Debug, Clone)]
pub struct ChannelFrameSender {
    tx: Sender<Vec<u8>>,
}

impl FrameSink for ChannelFrameSender {
    fn send(&mut self, data: &TelemetryData) -> Delivery {
        let Ok(bytes) = codec::encode(data) else {
            return Delivery::Dropped;
        };
        match self.tx.try_send(bytes) {
            Ok(()) => Delivery::Sent,
            Err(TrySendError::Full(_)) => {
                trace!("Telemetry channel full, dropping record");
                Delivery::Dropped
            }
            Err(TrySendError::Disconnected(_)) => Delivery::Dropped,
        }
    }
}

#[derive(Debug)]
pub struct ChannelFrameReceiver {
    rx: Receiver<Vec<u8>>,
}

impl FrameSource for ChannelFrameReceiver {
    fn poll(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>, TransportError> {
        match self.rx.recv_timeout(timeout) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(TransportError::Closed),
        }
    }
}
