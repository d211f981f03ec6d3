//! Capture agent state machine.
//!
//! `Disconnected -> Connecting -> SchemaRegistered -> Streaming -> Closing -> Disconnected`.
//! Simulator callbacks arrive as [`SimEvent`]s on a bounded channel and are consumed
//! by [`CaptureAgent::tick`], so the machine runs without a real simulator.

use crossbeam::channel::{self, RecvTimeoutError};
use flightlink_telemetry_core::{ConversionProfile, RawFrame, Schema, ShutdownToken};
use flightlink_telemetry_transport::{Delivery, FrameSink};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, trace, warn};

use crate::error::AgentError;
use crate::recording::FlightRecorder;
use crate::session::SimSession;
use crate::sim::{
    DefinitionId, NotificationKind, RequestId, RequestPeriod, SimConnector, SimEvent,
    SimEventReceiver,
};

pub const APPLICATION_NAME: &str = "flightlink";

pub const FLIGHT_STATUS_DEFINITION: DefinitionId = DefinitionId(1);
pub const AIRCRAFT_IDENTITY_DEFINITION: DefinitionId = DefinitionId(2);
pub const FLIGHT_STATUS_REQUEST: RequestId = RequestId(1);
pub const AIRCRAFT_IDENTITY_REQUEST: RequestId = RequestId(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    #[default]
    Disconnected,
    Connecting,
    SchemaRegistered,
    Streaming,
    Closing,
}

#[derive(Debug, Clone)]
pub struct AgentOptions {
    pub application: String,
    /// `None` forwards raw simulator values for conversion on the relay side.
    pub profile: Option<ConversionProfile>,
    /// Longest wait for simulator events per tick.
    pub poll_timeout: Duration,
    pub reconnect_interval: Duration,
    /// Stop instead of reconnecting once the simulator is gone.
    pub exit_on_disconnect: bool,
    pub event_capacity: usize,
}

impl Default for AgentOptions {
    fn default() -> Self {
        Self {
            application: APPLICATION_NAME.to_string(),
            profile: Some(ConversionProfile::Motion),
            poll_timeout: Duration::from_millis(5),
            reconnect_interval: Duration::from_secs(1),
            exit_on_disconnect: false,
            event_capacity: 256,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct AgentStats {
    pub connections: u64,
    pub frames_received: u64,
    pub frames_forwarded: u64,
    /// Payloads that did not cast to the registered layout.
    pub frames_dropped: u64,
    /// Frames the transport could not deliver.
    pub sends_dropped: u64,
    pub disconnects: u64,
}

/// Why [`CaptureAgent::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentExit {
    Cancelled,
    Disconnected,
}

/// Single owner of the simulator session; forwards every frame to a [`FrameSink`].
pub struct CaptureAgent<C: SimConnector, S: FrameSink> {
    connector: C,
    sink: S,
    options: AgentOptions,
    flight_status: Schema,
    identity: Schema,
    state: AgentState,
    session: Option<SimSession>,
    events: Option<SimEventReceiver>,
    stats: AgentStats,
    recorder: Option<FlightRecorder>,
    aircraft_title: Option<String>,
}

impl<C: SimConnector, S: FrameSink> CaptureAgent<C, S> {
    /// # Errors
    ///
    /// Fails if a built-in schema no longer registers cleanly.
    pub fn new(connector: C, sink: S, options: AgentOptions) -> Result<Self, AgentError> {
        Ok(Self {
            connector,
            sink,
            options,
            flight_status: Schema::flight_status()?,
            identity: Schema::aircraft_identity()?,
            state: AgentState::Disconnected,
            session: None,
            events: None,
            stats: AgentStats::default(),
            recorder: None,
            aircraft_title: None,
        })
    }

    /// Record every raw flight frame while streaming.
    pub fn with_recorder(mut self, recorder: FlightRecorder) -> Self {
        self.recorder = Some(recorder);
        self
    }

    pub fn take_recorder(&mut self) -> Option<FlightRecorder> {
        self.recorder.take()
    }

    pub fn state(&self) -> AgentState {
        self.state
    }

    pub fn stats(&self) -> AgentStats {
        self.stats
    }

    pub fn aircraft_title(&self) -> Option<&str> {
        self.aircraft_title.as_deref()
    }

    pub fn schema(&self) -> &Schema {
        &self.flight_status
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn options(&self) -> &AgentOptions {
        &self.options
    }

    /// Advance the machine by one control-loop step.
    pub fn tick(&mut self) {
        match self.state {
            AgentState::Disconnected => {
                if let Err(e) = self.connect() {
                    warn!(error = %e, retryable = e.is_retryable(), "Simulator connection failed");
                }
            }
            AgentState::SchemaRegistered | AgentState::Streaming => self.pump(),
            AgentState::Connecting | AgentState::Closing => self.close(),
        }
    }

    /// Run until cancelled, reconnecting while the simulator is unavailable.
    pub fn run(&mut self, shutdown: &ShutdownToken) -> AgentExit {
        info!(application = %self.options.application, "Capture agent started");
        let exit = loop {
            if shutdown.is_cancelled() {
                break AgentExit::Cancelled;
            }
            self.tick();
            if self.state != AgentState::Disconnected {
                continue;
            }
            if self.options.exit_on_disconnect {
                break AgentExit::Disconnected;
            }
            if shutdown.sleep(self.options.reconnect_interval) {
                break AgentExit::Cancelled;
            }
        };
        self.close();
        info!(?exit, stats = ?self.stats, "Capture agent stopped");
        exit
    }

    /// Open, subscribe, register both schemas and issue the data requests.
    ///
    /// Any failure releases the half-open session and leaves the agent `Disconnected`.
    ///
    /// # Errors
    ///
    /// Returns the first simulator or schema error of the handshake.
    pub fn connect(&mut self) -> Result<(), AgentError> {
        self.close();
        self.state = AgentState::Connecting;
        match self.handshake() {
            Ok((session, events)) => {
                self.session = Some(session);
                self.events = Some(events);
                self.state = AgentState::SchemaRegistered;
                self.stats.connections = self.stats.connections.saturating_add(1);
                info!(
                    fields = self.flight_status.len(),
                    frame_size = self.flight_status.frame_size(),
                    "Simulator connected, streaming requested"
                );
                Ok(())
            }
            Err(e) => {
                self.state = AgentState::Disconnected;
                Err(e)
            }
        }
    }

    fn handshake(&mut self) -> Result<(SimSession, SimEventReceiver), AgentError> {
        let (events_tx, events_rx) = channel::bounded(self.options.event_capacity);
        let connection = self.connector.open(&self.options.application, events_tx)?;
        let mut session = SimSession::new(connection);

        for kind in NotificationKind::ALL {
            session.subscribe(kind)?;
        }

        let registrations = [
            (FLIGHT_STATUS_DEFINITION, &self.flight_status),
            (AIRCRAFT_IDENTITY_DEFINITION, &self.identity),
        ];
        let connection = session.connection()?;
        for (definition, schema) in registrations {
            for field in schema.fields() {
                connection.add_to_definition(definition, field)?;
            }
            connection.register_struct(definition, schema.layout())?;
            debug!(%definition, schema = schema.name(), "Definition registered");
        }

        connection.request_data(
            FLIGHT_STATUS_REQUEST,
            FLIGHT_STATUS_DEFINITION,
            RequestPeriod::SimFrame,
        )?;
        connection.request_data(
            AIRCRAFT_IDENTITY_REQUEST,
            AIRCRAFT_IDENTITY_DEFINITION,
            RequestPeriod::Once,
        )?;
        Ok((session, events_rx))
    }

    fn pump(&mut self) {
        let dispatched = match self.session.as_mut() {
            Some(session) => session.connection().and_then(|c| c.dispatch()),
            None => {
                self.close();
                return;
            }
        };
        if let Err(e) = dispatched {
            warn!(error = %e, "Simulator message pump failed, closing connection");
            self.close();
            return;
        }

        let Some(events) = self.events.clone() else {
            return;
        };
        match events.recv_timeout(self.options.poll_timeout) {
            Ok(event) => self.handle(event),
            Err(RecvTimeoutError::Timeout) => return,
            Err(RecvTimeoutError::Disconnected) => {
                self.close();
                return;
            }
        }
        while self.is_open() {
            match events.try_recv() {
                Ok(event) => self.handle(event),
                Err(_) => break,
            }
        }
    }

    fn is_open(&self) -> bool {
        self.session.as_ref().is_some_and(SimSession::is_open)
    }

    fn handle(&mut self, event: SimEvent) {
        match event {
            SimEvent::Opened { application } => {
                info!(simulator = %application, "Simulator connection opened");
            }
            SimEvent::Quit => {
                info!("Simulator is shutting down");
                self.close();
            }
            SimEvent::Exception { code, description } => {
                warn!(code, %description, "Simulator exception");
                self.close();
            }
            SimEvent::ObjectData {
                request, payload, ..
            } => match request {
                FLIGHT_STATUS_REQUEST => self.on_flight_frame(&payload),
                AIRCRAFT_IDENTITY_REQUEST => self.on_identity(&payload),
                other => trace!(request = %other, "Ignoring data for unknown request"),
            },
        }
    }

    fn on_flight_frame(&mut self, payload: &[u8]) {
        self.stats.frames_received = self.stats.frames_received.saturating_add(1);
        let frame = match RawFrame::decode(&self.flight_status, payload) {
            Ok(frame) => frame,
            Err(e) => {
                trace!(error = %e, "Dropping frame that does not match the registered layout");
                self.stats.frames_dropped = self.stats.frames_dropped.saturating_add(1);
                return;
            }
        };

        if self.state == AgentState::SchemaRegistered {
            self.state = AgentState::Streaming;
            debug!("First frame received, streaming");
        }
        if let Some(recorder) = self.recorder.as_mut() {
            recorder.record_frame(&frame);
        }

        let raw = frame.to_telemetry(&self.flight_status);
        let data = match self.options.profile {
            Some(profile) => profile.apply(&raw),
            None => raw,
        };
        match self.sink.send(&data) {
            Delivery::Sent => {
                self.stats.frames_forwarded = self.stats.frames_forwarded.saturating_add(1);
            }
            Delivery::Dropped => {
                self.stats.sends_dropped = self.stats.sends_dropped.saturating_add(1);
            }
        }
    }

    fn on_identity(&mut self, payload: &[u8]) {
        let frame = match RawFrame::decode(&self.identity, payload) {
            Ok(frame) => frame,
            Err(e) => {
                trace!(error = %e, "Dropping malformed aircraft identity");
                return;
            }
        };
        if let Some(title) = frame.text(&self.identity, "TITLE") {
            info!(
                aircraft = title,
                atc_type = frame.text(&self.identity, "ATC TYPE").unwrap_or_default(),
                atc_model = frame.text(&self.identity, "ATC MODEL").unwrap_or_default(),
                "Aircraft loaded"
            );
            if let Some(recorder) = self.recorder.as_mut() {
                recorder.set_aircraft(title);
            }
            self.aircraft_title = Some(title.to_string());
        }
    }

    /// Release the session. Closing an already-closed agent is a no-op.
    pub fn close(&mut self) {
        if self.state == AgentState::Disconnected && self.session.is_none() {
            return;
        }
        self.state = AgentState::Closing;
        if let Some(mut session) = self.session.take() {
            session.close();
            self.stats.disconnects = self.stats.disconnects.saturating_add(1);
        }
        self.events = None;
        self.state = AgentState::Disconnected;
        debug!("Capture agent disconnected");
    }
}

impl<C: SimConnector, S: FrameSink> Drop for CaptureAgent<C, S> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<C: SimConnector, S: FrameSink> std::fmt::Debug for CaptureAgent<C, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureAgent")
            .field("state", &self.state)
            .field("profile", &self.options.profile)
            .field("stats", &self.stats)
            .field("aircraft", &self.aircraft_title)
            .finish()
    }
}
