//! Seam between the capture agent and the simulator live-data API.
//!
//! Native callbacks are not delivered into the agent directly. A connection pushes
//! typed [`SimEvent`]s into a bounded channel while it pumps messages, and the agent
//! state machine consumes them afterwards. Any binding to the real API, and the
//! in-repo [`crate::virtual_sim::VirtualSimulator`], implements the two traits here.

use crossbeam::channel::{Receiver, Sender};
use flightlink_telemetry_core::{FieldSpec, FrameLayout};
use std::fmt;
use thiserror::Error;

/// Identifies a registered data definition (one native struct layout).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DefinitionId(pub u32);

/// Identifies an outstanding data request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub u32);

impl fmt::Display for DefinitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "definition#{}", self.0)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "request#{}", self.0)
    }
}

/// Simulator notifications the agent subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    Opened,
    Quit,
    Exception,
    ObjectData,
}

impl NotificationKind {
    /// Subscription order used by the agent.
    pub const ALL: [NotificationKind; 4] = [
        NotificationKind::Opened,
        NotificationKind::Quit,
        NotificationKind::Exception,
        NotificationKind::ObjectData,
    ];
}

/// How often a request delivers data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestPeriod {
    Once,
    /// One delivery per simulated frame.
    SimFrame,
}

/// A native callback, as seen by the agent.
#[derive(Debug, Clone, PartialEq)]
pub enum SimEvent {
    Opened {
        application: String,
    },
    /// The simulator is shutting down.
    Quit,
    Exception {
        code: u32,
        description: String,
    },
    ObjectData {
        request: RequestId,
        definition: DefinitionId,
        payload: Vec<u8>,
    },
}

pub type SimEventSender = Sender<SimEvent>;
pub type SimEventReceiver = Receiver<SimEvent>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SimError {
    #[error("Simulator refused connection: {0}")]
    Refused(String),

    #[error("Simulator rejected layout of {definition}: {reason}")]
    LayoutRejected {
        definition: DefinitionId,
        reason: String,
    },

    #[error("Unknown {0}")]
    UnknownDefinition(DefinitionId),

    #[error("Simulator connection is closed")]
    Closed,

    #[error("Simulator message pump failed: {0}")]
    Dispatch(String),
}

/// Opens connections to the simulator.
pub trait SimConnector: Send {
    /// Open a connection that publishes its callbacks into `events`.
    ///
    /// # Errors
    ///
    /// Fails when the simulator is not running or refuses the client.
    fn open(
        &mut self,
        application: &str,
        events: SimEventSender,
    ) -> Result<Box<dyn SimConnection>, SimError>;
}

/// One open simulator connection.
///
/// Calls mirror the native API one to one. `close` releases the native handle
/// and must be safe to call more than once.
pub trait SimConnection: Send {
    /// # Errors
    ///
    /// Fails if the connection is closed.
    fn subscribe(&mut self, kind: NotificationKind) -> Result<(), SimError>;

    fn unsubscribe(&mut self, kind: NotificationKind);

    /// Append one native field to a definition. Order of calls is the struct layout.
    ///
    /// # Errors
    ///
    /// Fails if the connection is closed or the definition was already registered.
    fn add_to_definition(
        &mut self,
        definition: DefinitionId,
        field: &FieldSpec,
    ) -> Result<(), SimError>;

    /// Bind the fields added so far to a fixed-layout struct.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::LayoutRejected`] when `layout` disagrees with the
    /// fields that were added.
    fn register_struct(
        &mut self,
        definition: DefinitionId,
        layout: FrameLayout,
    ) -> Result<(), SimError>;

    /// # Errors
    ///
    /// Fails for definitions that were never registered.
    fn request_data(
        &mut self,
        request: RequestId,
        definition: DefinitionId,
        period: RequestPeriod,
    ) -> Result<(), SimError>;

    /// Pump pending native messages into the event channel.
    ///
    /// # Errors
    ///
    /// An error here is an exception surfacing through the message pump.
    fn dispatch(&mut self) -> Result<(), SimError>;

    fn close(&mut self);
}
