//! Capture agent for flightlink.
//!
//! The agent owns the connection to the simulator live-data API, registers the
//! native schemas, turns every simulated frame into a [`TelemetryData`] and hands
//! it to a [`FrameSink`]. It runs either as the `flightlink-agent` process, publishing
//! over UDP, or embedded in the relay with an in-process channel.
//!
//! ## Modules
//! - `sim` - Simulator API seam and typed callback events
//! - `session` - Owned connection with ordered release of subscriptions
//! - `agent` - Connection state machine and frame forwarding
//! - `virtual_sim` - In-process simulator with replay and fault injection
//! - `recording` - Raw flight recordings
//!
//! [`TelemetryData`]: flightlink_telemetry_core::TelemetryData
//! [`FrameSink`]: flightlink_telemetry_transport::FrameSink

#![deny(static_mut_refs)]

pub mod agent;
pub mod error;
pub mod recording;
pub mod session;
pub mod sim;
pub mod virtual_sim;

pub use agent::{
    AIRCRAFT_IDENTITY_DEFINITION, AIRCRAFT_IDENTITY_REQUEST, APPLICATION_NAME, AgentExit,
    AgentOptions, AgentState, AgentStats, CaptureAgent, FLIGHT_STATUS_DEFINITION,
    FLIGHT_STATUS_REQUEST,
};
pub use error::AgentError;
pub use recording::{FlightRecorder, FlightRecording, RecordedFrame, RecordingMetadata};
pub use session::SimSession;
pub use sim::{
    DefinitionId, NotificationKind, RequestId, RequestPeriod, SimConnection, SimConnector,
    SimError, SimEvent, SimEventReceiver, SimEventSender,
};
pub use virtual_sim::{
    AircraftIdentity, FaultPlan, FlightSource, SimCall, SimSample, VIRTUAL_SIMULATOR_NAME,
    VirtualSimConfig, VirtualSimulator,
};
