//! Core telemetry types shared by the flightlink capture agent and relay.
//!
//! This crate holds everything both ends of the transport must agree on, plus the
//! relay-side primitives that have no I/O of their own.
//!
//! ## Modules
//! - `schema` - Ordered native field declarations and their packed layout
//! - `frame` - Packed native frame decoding and encoding
//! - `contracts` - Derived value set (`TelemetryData`) and the current/previous snapshot
//! - `conversion` - Conversion profiles from raw to consumer units
//! - `accessor` - Named stored and computed value lookup
//! - `rate_limiter` - Emission throttling policy
//! - `connection` - Liveness tracking and the running/connected flags
//! - `shutdown` - Cooperative cancellation for worker threads

#![deny(static_mut_refs)]

use std::time::Instant;

pub mod accessor;
pub mod connection;
pub mod contracts;
pub mod conversion;
pub mod error;
pub mod frame;
pub mod rate_limiter;
pub mod schema;
pub mod shutdown;

pub use accessor::{ComputedField, ValueSource, value_names};
pub use connection::{
    ConnectionState, ConnectionStateEvent, ConnectionStateReceiver, ConnectionStateSender,
    ConnectionStatus, DEFAULT_LIVENESS_THRESHOLD_MS, LivenessConfig, LivenessTracker,
    StatusSnapshot,
};
pub use contracts::{TelemetryData, TelemetryField, TelemetrySnapshot};
pub use conversion::{ConversionProfile, ConversionSite};
pub use error::{SchemaError, TelemetryError};
pub use frame::{RawFrame, RawValue};
pub use rate_limiter::{RateLimiter, RateLimiterConfig, RateLimiterStats, ThrottleMode};
pub use schema::{
    AIRCRAFT_IDENTITY_FIELDS, FLIGHT_STATUS_FIELDS, FieldHandle, FieldSpec, FrameLayout,
    NativeField, Schema, SchemaBuilder, WireType,
};
pub use shutdown::{ShutdownToken, ShutdownTrigger, shutdown_pair};

/// Monotonic nanoseconds since the first call in this process.
pub fn telemetry_now_ns() -> u64 {
    static EPOCH: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();
    let epoch = EPOCH.get_or_init(Instant::now);
    Instant::now()
        .checked_duration_since(*epoch)
        .map(|d| d.as_nanos())
        .unwrap_or(0)
        .min(u64::MAX as u128) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_telemetry_now_is_monotonic() {
        let first = telemetry_now_ns();
        let second = telemetry_now_ns();
        assert!(second >= first);
    }
}
