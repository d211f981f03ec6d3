//! Wire format: one self-describing JSON record per datagram.
//!
//! Keys are the host-facing value names. Unknown keys are ignored and missing
//! keys decode as zero.

use flightlink_telemetry_core::TelemetryData;

use crate::error::TransportError;

/// Largest record accepted on either side. Records never fragment.
pub const MAX_DATAGRAM_SIZE: usize = 8192;

/// Serialize a value set into a single datagram payload.
///
/// # Errors
///
/// Fails if serialization fails or the record would not fit in one datagram.
pub fn encode(data: &TelemetryData) -> Result<Vec<u8>, TransportError> {
    let bytes = serde_json::to_vec(&data.sanitized()).map_err(TransportError::Encode)?;
    check_size(bytes.len())?;
    Ok(bytes)
}

/// Deserialize one datagram payload.
///
/// # Errors
///
/// Fails on oversized or malformed records. Both are transient.
pub fn decode(bytes: &[u8]) -> Result<TelemetryData, TransportError> {
    check_size(bytes.len())?;
    serde_json::from_slice(bytes).map_err(TransportError::Decode)
}

fn check_size(size: usize) -> Result<(), TransportError> {
    if size > MAX_DATAGRAM_SIZE {
        return Err(TransportError::Oversized {
            size,
            max: MAX_DATAGRAM_SIZE,
        });
    }
    Ok(())
}
