//! Capture agent state machine against the virtual simulator.

use std::thread;
use std::time::{Duration, Instant};

use flightlink_capture_agent::{
    AgentExit, AgentOptions, AgentState, CaptureAgent, DefinitionId, FaultPlan, FlightRecorder,
    FlightSource, NotificationKind, RequestId, RequestPeriod, SimCall, SimConnection,
    SimConnector, SimError, SimEvent, SimEventSender, VirtualSimConfig, VirtualSimulator,
};
use flightlink_telemetry_core::{
    ConversionProfile, FieldSpec, FrameLayout, RawFrame, Schema, TelemetryData, shutdown_pair,
};
use flightlink_telemetry_transport::{
    ChannelFrameReceiver, FrameSink, FrameSource, channel_transport, decode,
};
use flightlink_test_helpers::prelude::*;

fn fast_sim(source: FlightSource, faults: FaultPlan) -> VirtualSimulator {
    VirtualSimulator::new(VirtualSimConfig {
        frame_rate_hz: 500.0,
        source,
        faults,
        ..VirtualSimConfig::default()
    })
}

fn tick_until<C: SimConnector, S: FrameSink>(
    agent: &mut CaptureAgent<C, S>,
    timeout: Duration,
    mut done: impl FnMut(&CaptureAgent<C, S>) -> bool,
) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        agent.tick();
        if done(agent) {
            return true;
        }
    }
    false
}

fn drain(
    source: &mut ChannelFrameReceiver,
) -> Result<Vec<TelemetryData>, Box<dyn std::error::Error>> {
    let mut out = Vec::new();
    while let Some(bytes) = source.poll(Duration::from_millis(1))? {
        out.push(decode(&bytes)?);
    }
    Ok(out)
}

#[test]
fn test_handshake_registers_before_requesting() -> TestResult {
    let sim = VirtualSimulator::default();
    let (sink, _source) = channel_transport(16);
    let mut agent = must(CaptureAgent::new(sim.clone(), sink, AgentOptions::default()));

    agent.tick();
    assert_eq!(agent.state(), AgentState::SchemaRegistered);

    let journal = sim.journal();
    let flight = Schema::flight_status()?;
    let identity = Schema::aircraft_identity()?;
    let mut expected = vec![SimCall::Open];
    expected.extend(NotificationKind::ALL.map(SimCall::Subscribe));
    expected.extend(
        flight
            .fields()
            .iter()
            .map(|f| SimCall::AddToDefinition(DefinitionId(1), f.native_name.clone())),
    );
    expected.push(SimCall::RegisterStruct(DefinitionId(1)));
    expected.extend(
        identity
            .fields()
            .iter()
            .map(|f| SimCall::AddToDefinition(DefinitionId(2), f.native_name.clone())),
    );
    expected.push(SimCall::RegisterStruct(DefinitionId(2)));
    expected.push(SimCall::RequestData(
        RequestId(1),
        DefinitionId(1),
        RequestPeriod::SimFrame,
    ));
    expected.push(SimCall::RequestData(
        RequestId(2),
        DefinitionId(2),
        RequestPeriod::Once,
    ));
    assert_eq!(journal, expected);
    Ok(())
}

#[test]
fn test_streams_rpm_ramp_in_order() -> TestResult {
    let schema = Schema::flight_status()?;
    let frames: Vec<RawFrame> = rpm_ramp().iter().map(FlightStatusFixture::frame).collect();
    let sim = fast_sim(FlightSource::frames(&schema, &frames), FaultPlan::default());
    let (sink, mut source) = channel_transport(64);
    let mut agent = must(CaptureAgent::new(sim, sink, AgentOptions::default()));

    let streamed = tick_until(&mut agent, Duration::from_secs(2), |a| {
        a.stats().frames_forwarded >= 10
    });
    assert!(streamed, "agent forwarded {:?}", agent.stats());
    assert_eq!(agent.state(), AgentState::Streaming);

    let received = drain(&mut source)?;
    assert_eq!(received.len(), 10);
    for (step, data) in received.iter().enumerate() {
        let expected = step as f32 * 10.0 / 100.0;
        assert!(
            (data.rpm - expected).abs() < 1e-6,
            "frame {step}: rpm {} != {expected}",
            data.rpm
        );
    }
    Ok(())
}

#[test]
fn test_raw_mode_forwards_unconverted_values() -> TestResult {
    let schema = Schema::flight_status()?;
    let fixture = FlightStatusFixture::level_flight();
    let sim = fast_sim(
        FlightSource::frames(&schema, &[fixture.frame()]),
        FaultPlan::default(),
    );
    let (sink, mut source) = channel_transport(8);
    let options = AgentOptions {
        profile: None,
        ..AgentOptions::default()
    };
    let mut agent = must(CaptureAgent::new(sim, sink, options));

    assert!(tick_until(&mut agent, Duration::from_secs(2), |a| {
        a.stats().frames_forwarded >= 1
    }));
    let received = drain(&mut source)?;
    let first = received.first().ok_or("no record")?;
    assert_eq!(*first, fixture.raw_telemetry());

    let converted = ConversionProfile::Motion.apply(first);
    assert!((converted.rpm - 24.0).abs() < 1e-4);
    Ok(())
}

#[test]
fn test_quit_closes_session_and_reconnects() -> TestResult {
    let sim = fast_sim(
        FlightSource::Synthetic,
        FaultPlan {
            quit_after_frames: Some(3),
            ..FaultPlan::default()
        },
    );
    let (sink, _source) = channel_transport(64);
    let mut agent = must(CaptureAgent::new(sim.clone(), sink, AgentOptions::default()));

    assert!(tick_until(&mut agent, Duration::from_secs(2), |a| {
        a.stats().disconnects >= 1
    }));
    assert_eq!(agent.state(), AgentState::Disconnected);
    assert_eq!(agent.stats().frames_forwarded, 3);

    let journal = sim.journal();
    let tail: Vec<&SimCall> = journal.iter().rev().take(5).collect();
    assert_eq!(tail.first(), Some(&&SimCall::Close));
    assert!(
        tail.iter()
            .skip(1)
            .all(|call| matches!(call, SimCall::Unsubscribe(_)))
    );

    agent.tick();
    assert_eq!(agent.state(), AgentState::SchemaRegistered);
    assert_eq!(sim.open_attempts(), 2);
    Ok(())
}

#[test]
fn test_exception_closes_session() {
    let sim = fast_sim(
        FlightSource::Synthetic,
        FaultPlan {
            exception_after_frames: Some(2),
            ..FaultPlan::default()
        },
    );
    let (sink, _source) = channel_transport(64);
    let mut agent = must(CaptureAgent::new(sim, sink, AgentOptions::default()));

    assert!(tick_until(&mut agent, Duration::from_secs(2), |a| {
        a.stats().disconnects >= 1
    }));
    assert_eq!(agent.state(), AgentState::Disconnected);
}

#[test]
fn test_pump_failure_closes_session() {
    let sim = fast_sim(
        FlightSource::Synthetic,
        FaultPlan {
            pump_failure_after_frames: Some(1),
            ..FaultPlan::default()
        },
    );
    let (sink, _source) = channel_transport(64);
    let mut agent = must(CaptureAgent::new(sim.clone(), sink, AgentOptions::default()));

    assert!(tick_until(&mut agent, Duration::from_secs(2), |a| {
        a.stats().disconnects >= 1
    }));
    assert_eq!(agent.state(), AgentState::Disconnected);
    assert_eq!(sim.journal().last(), Some(&SimCall::Close));
}

#[test]
fn test_identity_request_reports_aircraft() {
    let sim = fast_sim(FlightSource::Synthetic, FaultPlan::default());
    let title = sim.config().aircraft.title.clone();
    let (sink, _source) = channel_transport(64);
    let mut agent = must(CaptureAgent::new(sim, sink, AgentOptions::default()));

    assert!(tick_until(&mut agent, Duration::from_secs(2), |a| {
        a.aircraft_title().is_some()
    }));
    assert_eq!(agent.aircraft_title(), Some(title.as_str()));
}

#[test]
fn test_run_exits_when_simulator_unavailable() {
    let sim = fast_sim(
        FlightSource::Synthetic,
        FaultPlan {
            refuse_opens: u32::MAX,
            ..FaultPlan::default()
        },
    );
    let (sink, _source) = channel_transport(8);
    let options = AgentOptions {
        exit_on_disconnect: true,
        ..AgentOptions::default()
    };
    let mut agent = must(CaptureAgent::new(sim, sink, options));
    let (_trigger, token) = shutdown_pair();

    assert_eq!(agent.run(&token), AgentExit::Disconnected);
    assert_eq!(agent.stats().connections, 0);
}

#[test]
fn test_run_stops_on_cancel() {
    let sim = fast_sim(
        FlightSource::Synthetic,
        FaultPlan {
            refuse_opens: u32::MAX,
            ..FaultPlan::default()
        },
    );
    let (sink, _source) = channel_transport(8);
    let options = AgentOptions {
        reconnect_interval: Duration::from_secs(30),
        ..AgentOptions::default()
    };
    let (trigger, token) = shutdown_pair();

    let handle = thread::spawn(move || {
        let mut agent = must(CaptureAgent::new(sim, sink, options));
        agent.run(&token)
    });
    thread::sleep(Duration::from_millis(50));
    let started = Instant::now();
    trigger.cancel();

    let exit = match handle.join() {
        Ok(exit) => exit,
        Err(_) => panic!("agent thread panicked"),
    };
    assert_eq!(exit, AgentExit::Cancelled);
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[test]
fn test_recorder_captures_streamed_frames() -> TestResult {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("flight.json");
    let sim = fast_sim(FlightSource::Synthetic, FaultPlan::default());
    let (sink, _source) = channel_transport(64);
    let mut recorder = FlightRecorder::new(path.clone(), Schema::flight_status()?)?;
    recorder.start_recording("virtual".to_string());
    let mut agent =
        must(CaptureAgent::new(sim, sink, AgentOptions::default())).with_recorder(recorder);

    assert!(tick_until(&mut agent, Duration::from_secs(2), |a| {
        a.stats().frames_forwarded >= 5 && a.aircraft_title().is_some()
    }));
    let mut recorder = agent.take_recorder().ok_or("recorder missing")?;
    let recording = recorder.stop_recording(Some("pattern".to_string()))?;
    assert!(recording.metadata.frame_count >= 5);
    assert!(recording.metadata.aircraft.is_some());

    let replayed = FlightRecorder::load_recording(&path)?;
    assert_eq!(replayed.frames_for(&Schema::flight_status()?)?.len(), recording.frames.len());
    Ok(())
}

/// Connector that delivers a fixed event script on its first dispatch.
struct ScriptedConnector {
    script: Vec<SimEvent>,
}

struct ScriptedConnection {
    events: SimEventSender,
    script: Vec<SimEvent>,
}

impl SimConnector for ScriptedConnector {
    fn open(
        &mut self,
        _application: &str,
        events: SimEventSender,
    ) -> Result<Box<dyn SimConnection>, SimError> {
        Ok(Box::new(ScriptedConnection {
            events,
            script: std::mem::take(&mut self.script),
        }))
    }
}

impl SimConnection for ScriptedConnection {
    fn subscribe(&mut self, _: NotificationKind) -> Result<(), SimError> {
        Ok(())
    }
    fn unsubscribe(&mut self, _: NotificationKind) {}
    fn add_to_definition(&mut self, _: DefinitionId, _: &FieldSpec) -> Result<(), SimError> {
        Ok(())
    }
    fn register_struct(&mut self, _: DefinitionId, _: FrameLayout) -> Result<(), SimError> {
        Ok(())
    }
    fn request_data(
        &mut self,
        _: RequestId,
        _: DefinitionId,
        _: RequestPeriod,
    ) -> Result<(), SimError> {
        Ok(())
    }
    fn dispatch(&mut self) -> Result<(), SimError> {
        for event in self.script.drain(..) {
            if self.events.send(event).is_err() {
                return Err(SimError::Closed);
            }
        }
        Ok(())
    }
    fn close(&mut self) {}
}

#[test]
fn test_malformed_payload_is_dropped_silently() -> TestResult {
    let good = FlightStatusFixture::level_flight().bytes();
    let mut truncated = good.clone();
    truncated.truncate(good.len() / 2);
    let frame_event = |payload: Vec<u8>| SimEvent::ObjectData {
        request: RequestId(1),
        definition: DefinitionId(1),
        payload,
    };
    let connector = ScriptedConnector {
        script: vec![
            SimEvent::Opened {
                application: "scripted".to_string(),
            },
            frame_event(truncated),
            frame_event(good),
        ],
    };
    let (sink, mut source) = channel_transport(8);
    let mut agent = must(CaptureAgent::new(connector, sink, AgentOptions::default()));

    agent.tick();
    agent.tick();

    let stats = agent.stats();
    assert_eq!(stats.frames_received, 2);
    assert_eq!(stats.frames_dropped, 1);
    assert_eq!(stats.frames_forwarded, 1);
    assert_eq!(agent.state(), AgentState::Streaming);
    assert_eq!(drain(&mut source)?.len(), 1);
    Ok(())
}
