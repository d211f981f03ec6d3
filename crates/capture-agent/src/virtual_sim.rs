//! In-process stand-in for the simulator live-data API.
//!
//! The virtual simulator honours the same contract as the native API: it marshals
//! frames positionally from whatever definitions the client actually registered,
//! validates struct layouts at registration, delivers one frame per simulated frame,
//! and reports open/quit/exception notifications. Fault injection covers refused
//! opens, simulator shutdown, exception notifications and message pump failures.

use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};
use std::f32::consts::PI;
use std::sync::Arc;
use std::time::Instant;

use crossbeam::channel::TrySendError;
use flightlink_telemetry_core::{
    FieldSpec, FrameLayout, RawFrame, RawValue, Schema, SchemaBuilder, WireType,
};
use tracing::{debug, trace};

use crate::recording::FlightRecording;
use crate::sim::{
    DefinitionId, NotificationKind, RequestId, RequestPeriod, SimConnection, SimConnector,
    SimError, SimEvent, SimEventSender,
};

pub const VIRTUAL_SIMULATOR_NAME: &str = "Virtual Flight Simulator";

/// Native values of one simulated frame, by native field name.
pub type SimSample = BTreeMap<String, RawValue>;

/// Upper bound on frames emitted by a single dispatch after a stall.
const MAX_FRAMES_PER_DISPATCH: u64 = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AircraftIdentity {
    pub atc_type: String,
    pub atc_model: String,
    pub title: String,
}

impl Default for AircraftIdentity {
    fn default() -> Self {
        Self {
            atc_type: "Cessna".to_string(),
            atc_model: "C172".to_string(),
            title: "Cessna Skyhawk G1000".to_string(),
        }
    }
}

/// Where simulated frames come from.
#[derive(Debug, Clone, PartialEq)]
pub enum FlightSource {
    /// Endless gentle manoeuvring at cruise speed.
    Synthetic,
    /// A fixed sequence, played once or looped.
    Samples { samples: Vec<SimSample>, looped: bool },
}

impl FlightSource {
    /// Play `frames` of `schema` once, in order.
    pub fn frames(schema: &Schema, frames: &[RawFrame]) -> Self {
        let samples = frames
            .iter()
            .map(|frame| {
                schema
                    .fields()
                    .iter()
                    .zip(frame.values())
                    .map(|(field, value)| (field.native_name.clone(), value.clone()))
                    .collect()
            })
            .collect();
        FlightSource::Samples {
            samples,
            looped: false,
        }
    }

    /// Replay a recorded flight.
    pub fn replay(recording: &FlightRecording, looped: bool) -> Self {
        let samples = recording
            .frames
            .iter()
            .map(|frame| {
                recording
                    .fields
                    .iter()
                    .cloned()
                    .zip(frame.values.iter().cloned())
                    .collect()
            })
            .collect();
        FlightSource::Samples { samples, looped }
    }

    fn sample(&self, index: u64, frame_rate_hz: f32) -> Option<SimSample> {
        match self {
            FlightSource::Synthetic => Some(synthetic_sample(index as f32 / frame_rate_hz)),
            FlightSource::Samples { samples, looped } => {
                if samples.is_empty() {
                    return None;
                }
                let index = usize::try_from(index).ok()?;
                let index = if *looped { index % samples.len() } else { index };
                samples.get(index).cloned()
            }
        }
    }
}

fn synthetic_sample(t: f32) -> SimSample {
    let float = |name: &str, value: f32| (name.to_string(), RawValue::Float32(value));
    let pitch = 0.08 * (0.5 * t).sin();
    let bank = 0.3 * (0.2 * t).sin();
    let heading = (0.05 * t).rem_euclid(2.0 * PI);
    let airspeed = 120.0 + 5.0 * (0.1 * t).sin();

    [
        ("SIMULATION RATE".to_string(), RawValue::Int32(1)),
        float("ACCELERATION BODY X", 2.0 * (0.2 * t).cos()),
        float("ACCELERATION BODY Y", 1.5 * (0.5 * t).sin()),
        float("ACCELERATION BODY Z", 0.8 * (0.1 * t).cos()),
        float("ROTATION VELOCITY BODY X", 0.04 * (0.5 * t).cos()),
        float("ROTATION VELOCITY BODY Y", 0.05),
        float("ROTATION VELOCITY BODY Z", 0.06 * (0.2 * t).cos()),
        float("PLANE PITCH DEGREES", pitch),
        float("PLANE BANK DEGREES", bank),
        float("PLANE HEADING DEGREES TRUE", heading),
        float("PLANE HEADING DEGREES MAGNETIC", (heading - 0.05).rem_euclid(2.0 * PI)),
        float("GROUND ALTITUDE", 120.0),
        float("GROUND VELOCITY", airspeed - 2.0),
        float("AIRSPEED INDICATED", airspeed - 8.0),
        float("AIRSPEED TRUE", airspeed),
        float("VERTICAL SPEED", 300.0 * (0.5 * t).sin()),
        float("AMBIENT WIND VELOCITY", 10.0),
        float("AMBIENT WIND DIRECTION", 270.0),
        float("GENERAL ENG RPM:1", 2400.0 + 100.0 * (0.3 * t).sin()),
        float("INCIDENCE ALPHA", 0.05 + 0.02 * (0.5 * t).sin()),
        float("INCIDENCE BETA", 0.01 * (0.2 * t).sin()),
    ]
    .into_iter()
    .collect()
}

/// Faults the simulator injects, counted in simulated frames per connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FaultPlan {
    /// Refuse this many open attempts before accepting one.
    pub refuse_opens: u32,
    pub quit_after_frames: Option<u64>,
    pub exception_after_frames: Option<u64>,
    /// Fail the message pump itself instead of notifying.
    pub pump_failure_after_frames: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VirtualSimConfig {
    pub frame_rate_hz: f32,
    pub source: FlightSource,
    pub aircraft: AircraftIdentity,
    pub faults: FaultPlan,
}

impl Default for VirtualSimConfig {
    fn default() -> Self {
        Self {
            frame_rate_hz: 60.0,
            source: FlightSource::Synthetic,
            aircraft: AircraftIdentity::default(),
            faults: FaultPlan::default(),
        }
    }
}

/// Every API call the simulator received, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimCall {
    Open,
    Subscribe(NotificationKind),
    Unsubscribe(NotificationKind),
    AddToDefinition(DefinitionId, String),
    RegisterStruct(DefinitionId),
    RequestData(RequestId, DefinitionId, RequestPeriod),
    Close,
}

#[derive(Debug, Default)]
struct Shared {
    refusals_left: u32,
    journal: Vec<SimCall>,
    frames_emitted: u64,
}

/// Connector for the virtual simulator. Clones share one call journal.
#[derive(Debug, Clone)]
pub struct VirtualSimulator {
    config: Arc<VirtualSimConfig>,
    shared: Arc<Mutex<Shared>>,
}

impl Default for VirtualSimulator {
    fn default() -> Self {
        Self::new(VirtualSimConfig::default())
    }
}

impl VirtualSimulator {
    pub fn new(config: VirtualSimConfig) -> Self {
        let shared = Shared {
            refusals_left: config.faults.refuse_opens,
            ..Shared::default()
        };
        Self {
            config: Arc::new(config),
            shared: Arc::new(Mutex::new(shared)),
        }
    }

    pub fn config(&self) -> &VirtualSimConfig {
        &self.config
    }

    pub fn journal(&self) -> Vec<SimCall> {
        self.shared.lock().journal.clone()
    }

    /// Open attempts so far, accepted or refused.
    pub fn open_attempts(&self) -> usize {
        self.shared
            .lock()
            .journal
            .iter()
            .filter(|call| **call == SimCall::Open)
            .count()
    }

    /// Flight frames delivered across all connections.
    pub fn frames_emitted(&self) -> u64 {
        self.shared.lock().frames_emitted
    }
}

impl SimConnector for VirtualSimulator {
    fn open(
        &mut self,
        application: &str,
        events: SimEventSender,
    ) -> Result<Box<dyn SimConnection>, SimError> {
        {
            let mut shared = self.shared.lock();
            shared.journal.push(SimCall::Open);
            if shared.refusals_left > 0 {
                shared.refusals_left -= 1;
                return Err(SimError::Refused(format!(
                    "{VIRTUAL_SIMULATOR_NAME} is not running"
                )));
            }
        }
        debug!(application, "Virtual simulator accepted connection");
        Ok(Box::new(VirtualConnection::new(
            Arc::clone(&self.config),
            Arc::clone(&self.shared),
            events,
        )))
    }
}

#[derive(Debug, Clone, Copy)]
struct ActiveRequest {
    id: RequestId,
    definition: DefinitionId,
    period: RequestPeriod,
    delivered: bool,
}

struct VirtualConnection {
    config: Arc<VirtualSimConfig>,
    shared: Arc<Mutex<Shared>>,
    events: SimEventSender,
    subscriptions: HashSet<NotificationKind>,
    pending: BTreeMap<DefinitionId, SchemaBuilder>,
    registered: BTreeMap<DefinitionId, Schema>,
    requests: Vec<ActiveRequest>,
    opened_at: Instant,
    open_sent: bool,
    frames_emitted: u64,
    finished: bool,
    closed: bool,
}

impl VirtualConnection {
    fn new(
        config: Arc<VirtualSimConfig>,
        shared: Arc<Mutex<Shared>>,
        events: SimEventSender,
    ) -> Self {
        Self {
            config,
            shared,
            events,
            subscriptions: HashSet::new(),
            pending: BTreeMap::new(),
            registered: BTreeMap::new(),
            requests: Vec::new(),
            opened_at: Instant::now(),
            open_sent: false,
            frames_emitted: 0,
            finished: false,
            closed: false,
        }
    }

    fn log(&self, call: SimCall) {
        self.shared.lock().journal.push(call);
    }

    fn ensure_open(&self) -> Result<(), SimError> {
        if self.closed {
            Err(SimError::Closed)
        } else {
            Ok(())
        }
    }

    /// Deliver an event if the client subscribed to its kind.
    fn notify(&mut self, kind: NotificationKind, event: SimEvent) -> Result<(), SimError> {
        if !self.subscriptions.contains(&kind) {
            return Ok(());
        }
        match self.events.try_send(event) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                trace!("Virtual simulator event queue full, dropping event");
                Ok(())
            }
            Err(TrySendError::Disconnected(_)) => Err(SimError::Closed),
        }
    }

    fn identity_sample(&self) -> SimSample {
        let aircraft = &self.config.aircraft;
        [
            ("ATC TYPE", aircraft.atc_type.as_str()),
            ("ATC MODEL", aircraft.atc_model.as_str()),
            ("TITLE", aircraft.title.as_str()),
        ]
        .into_iter()
        .map(|(name, value)| (name.to_string(), RawValue::Text(value.to_string())))
        .collect()
    }

    fn marshal(&self, definition: DefinitionId, sample: &SimSample) -> Result<Vec<u8>, SimError> {
        let schema = self
            .registered
            .get(&definition)
            .ok_or(SimError::UnknownDefinition(definition))?;
        let values = schema
            .fields()
            .iter()
            .map(|field| match sample.get(&field.native_name) {
                Some(value) if value.fits(field.wire_type) => value.clone(),
                _ => default_value(field.wire_type),
            })
            .collect();
        RawFrame::from_values(schema, values)
            .and_then(|frame| frame.encode(schema))
            .map_err(|e| SimError::Dispatch(e.to_string()))
    }

    fn deliver(&mut self, period: RequestPeriod, sample: &SimSample) -> Result<(), SimError> {
        let due: Vec<ActiveRequest> = self
            .requests
            .iter()
            .filter(|r| r.period == period && !r.delivered)
            .copied()
            .collect();
        for request in due {
            let payload = self.marshal(request.definition, sample)?;
            self.notify(
                NotificationKind::ObjectData,
                SimEvent::ObjectData {
                    request: request.id,
                    definition: request.definition,
                    payload,
                },
            )?;
            if request.period == RequestPeriod::Once
                && let Some(active) = self.requests.iter_mut().find(|r| r.id == request.id)
            {
                active.delivered = true;
            }
        }
        Ok(())
    }

    fn frames_due(&self) -> u64 {
        let elapsed = self.opened_at.elapsed().as_secs_f32();
        let target = (elapsed * self.config.frame_rate_hz) as u64 + 1;
        target
            .saturating_sub(self.frames_emitted)
            .min(MAX_FRAMES_PER_DISPATCH)
    }

    fn reached(limit: Option<u64>, frames: u64) -> bool {
        limit.is_some_and(|n| frames >= n)
    }
}

impl SimConnection for VirtualConnection {
    fn subscribe(&mut self, kind: NotificationKind) -> Result<(), SimError> {
        self.ensure_open()?;
        self.log(SimCall::Subscribe(kind));
        self.subscriptions.insert(kind);
        Ok(())
    }

    fn unsubscribe(&mut self, kind: NotificationKind) {
        self.log(SimCall::Unsubscribe(kind));
        self.subscriptions.remove(&kind);
    }

    fn add_to_definition(
        &mut self,
        definition: DefinitionId,
        field: &FieldSpec,
    ) -> Result<(), SimError> {
        self.ensure_open()?;
        self.log(SimCall::AddToDefinition(definition, field.native_name.clone()));
        if self.registered.contains_key(&definition) {
            return Err(SimError::LayoutRejected {
                definition,
                reason: "definition is already bound to a struct".to_string(),
            });
        }
        let builder = self
            .pending
            .entry(definition)
            .or_insert_with(|| SchemaBuilder::new(definition.to_string()));
        let unit = field.unit.as_deref();
        let added = match field.binding {
            Some(binding) => {
                builder.register_bound(&field.native_name, unit, field.wire_type, binding)
            }
            None => builder.register(&field.native_name, unit, field.wire_type),
        };
        added.map(|_| ()).map_err(|e| SimError::LayoutRejected {
            definition,
            reason: e.to_string(),
        })
    }

    fn register_struct(
        &mut self,
        definition: DefinitionId,
        layout: FrameLayout,
    ) -> Result<(), SimError> {
        self.ensure_open()?;
        self.log(SimCall::RegisterStruct(definition));
        let mut builder = self
            .pending
            .remove(&definition)
            .ok_or(SimError::UnknownDefinition(definition))?;
        let schema = builder.finalize().map_err(|e| SimError::LayoutRejected {
            definition,
            reason: e.to_string(),
        })?;
        let actual = schema.layout();
        if actual != layout {
            return Err(SimError::LayoutRejected {
                definition,
                reason: format!(
                    "struct declares {} fields / {} bytes / {:08x}, \
                     definition has {} fields / {} bytes / {:08x}",
                    layout.field_count,
                    layout.frame_size,
                    layout.fingerprint,
                    actual.field_count,
                    actual.frame_size,
                    actual.fingerprint
                ),
            });
        }
        self.registered.insert(definition, schema);
        Ok(())
    }

    fn request_data(
        &mut self,
        request: RequestId,
        definition: DefinitionId,
        period: RequestPeriod,
    ) -> Result<(), SimError> {
        self.ensure_open()?;
        self.log(SimCall::RequestData(request, definition, period));
        if !self.registered.contains_key(&definition) {
            return Err(SimError::UnknownDefinition(definition));
        }
        self.requests.retain(|r| r.id != request);
        self.requests.push(ActiveRequest {
            id: request,
            definition,
            period,
            delivered: false,
        });
        Ok(())
    }

    fn dispatch(&mut self) -> Result<(), SimError> {
        self.ensure_open()?;

        if !self.open_sent {
            self.open_sent = true;
            self.notify(
                NotificationKind::Opened,
                SimEvent::Opened {
                    application: VIRTUAL_SIMULATOR_NAME.to_string(),
                },
            )?;
        }

        let identity = self.identity_sample();
        self.deliver(RequestPeriod::Once, &identity)?;

        if self.finished {
            return Ok(());
        }

        let faults = self.config.faults;
        for _ in 0..self.frames_due() {
            if Self::reached(faults.pump_failure_after_frames, self.frames_emitted) {
                self.finished = true;
                return Err(SimError::Dispatch(
                    "unhandled exception in message pump".to_string(),
                ));
            }
            if Self::reached(faults.exception_after_frames, self.frames_emitted) {
                self.finished = true;
                return self.notify(
                    NotificationKind::Exception,
                    SimEvent::Exception {
                        code: 1,
                        description: "SIMCONNECT_EXCEPTION_ERROR".to_string(),
                    },
                );
            }
            if Self::reached(faults.quit_after_frames, self.frames_emitted) {
                self.finished = true;
                return self.notify(NotificationKind::Quit, SimEvent::Quit);
            }

            let Some(sample) = self
                .config
                .source
                .sample(self.frames_emitted, self.config.frame_rate_hz)
            else {
                self.finished = true;
                return Ok(());
            };
            self.deliver(RequestPeriod::SimFrame, &sample)?;
            self.frames_emitted = self.frames_emitted.saturating_add(1);
            let mut shared = self.shared.lock();
            shared.frames_emitted = shared.frames_emitted.saturating_add(1);
        }
        Ok(())
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.log(SimCall::Close);
    }
}

fn default_value(wire_type: WireType) -> RawValue {
    match wire_type {
        WireType::Int32 => RawValue::Int32(0),
        WireType::Float32 => RawValue::Float32(0.0),
        WireType::String32 | WireType::String256 => RawValue::Text(String::new()),
    }
}
