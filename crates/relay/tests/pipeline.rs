//! End-to-end relay behaviour over the embedded channel and loopback UDP.

use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam::channel::Receiver;
use flightlink_capture_agent::{FlightSource, VirtualSimConfig, VirtualSimulator};
use flightlink_relay::{
    ConversionConfig, DeploymentMode, RelayConfig, TelemetryProvider, TelemetryUpdate,
};
use flightlink_telemetry_core::{
    ConnectionState, ConversionProfile, ConversionSite, RawFrame, Schema, TelemetryData,
    TelemetryField,
};
use flightlink_telemetry_transport::{FrameSink, TransportConfig, UdpFrameSender};
use flightlink_test_helpers::prelude::*;

fn external_config(addr: SocketAddr) -> RelayConfig {
    RelayConfig {
        deployment: DeploymentMode::External,
        transport: TransportConfig {
            address: addr.ip(),
            port: addr.port(),
        },
        disable_rate_throttle: true,
        ..RelayConfig::default()
    }
}

fn collect(
    updates: &Receiver<TelemetryUpdate>,
    count: usize,
    timeout: Duration,
) -> Vec<TelemetryUpdate> {
    let deadline = Instant::now() + timeout;
    let mut out = Vec::new();
    while out.len() < count {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match updates.recv_timeout(remaining) {
            Ok(update) => out.push(update),
            Err(_) => break,
        }
    }
    out
}

fn rpm(value: f32) -> TelemetryData {
    TelemetryData::new().with(TelemetryField::Rpm, value)
}

fn run_embedded_ramp(site: ConversionSite) -> TestResult {
    init_test_tracing();
    let schema = Schema::flight_status()?;
    let frames: Vec<RawFrame> = rpm_ramp().iter().map(FlightStatusFixture::frame).collect();
    let simulator = VirtualSimulator::new(VirtualSimConfig {
        frame_rate_hz: 200.0,
        source: FlightSource::frames(&schema, &frames),
        ..VirtualSimConfig::default()
    });

    let mut provider = TelemetryProvider::new();
    provider.init(RelayConfig {
        deployment: DeploymentMode::Embedded,
        disable_rate_throttle: true,
        conversion: ConversionConfig {
            profile: ConversionProfile::Motion,
            site,
        },
        ..RelayConfig::default()
    })?;
    provider.use_simulator(simulator);
    let updates = provider.subscribe();
    provider.start()?;

    let received = collect(&updates, 10, Duration::from_secs(5));
    provider.stop();

    assert_eq!(received.len(), 10);
    for (step, update) in received.iter().enumerate() {
        let expected = step as f32 * 10.0 / 100.0;
        assert!(
            (update.current.rpm - expected).abs() < 1e-6,
            "update {step}: rpm {} != {expected}",
            update.current.rpm
        );
        assert_eq!(update.sequence, step as u64 + 1);
    }
    Ok(())
}

#[test]
fn test_embedded_rpm_ramp_converted_by_agent() -> TestResult {
    run_embedded_ramp(ConversionSite::Agent)
}

#[test]
fn test_embedded_rpm_ramp_converted_by_relay() -> TestResult {
    run_embedded_ramp(ConversionSite::Relay)
}

#[test]
fn test_dropped_datagram_does_not_desync() -> TestResult {
    let addr = free_loopback_addr();
    let mut provider = TelemetryProvider::new();
    provider.init(external_config(addr))?;
    let updates = provider.subscribe();
    provider.start()?;

    let mut sender = UdpFrameSender::connect(addr)?;
    sender.send(&rpm(1.0));
    let first = collect(&updates, 1, Duration::from_secs(2));

    // Frame 2 is lost; a corrupt datagram arrives in its place.
    let stray = UdpSocket::bind("127.0.0.1:0")?;
    stray.send_to(b"{\"Pitch\": not json", addr)?;
    sender.send(&rpm(3.0));
    let third = collect(&updates, 1, Duration::from_secs(2));

    let stats = provider.stats();
    provider.stop();

    let first = first.first().ok_or("frame 1 missing")?;
    let third = third.first().ok_or("frame 3 missing")?;
    assert_eq!(first.current.rpm, 1.0);
    assert_eq!(third.current.rpm, 3.0);
    assert_eq!(third.previous.rpm, 1.0);
    assert_eq!(third.sequence, 2);
    assert_eq!(stats.frames_dropped, 1);
    Ok(())
}

#[test]
fn test_liveness_timeout_clears_flags() -> TestResult {
    let addr = free_loopback_addr();
    let mut provider = TelemetryProvider::new();
    provider.init(external_config(addr))?;
    let states = provider.subscribe_state_changes();
    provider.start()?;

    let mut sender = UdpFrameSender::connect(addr)?;
    sender.send(&rpm(24.0));
    let sent_at = Instant::now();
    assert!(wait_for(Duration::from_secs(2), || provider.is_connected()));
    assert!(provider.is_running());

    assert!(wait_for(Duration::from_secs(3), || {
        !provider.is_connected() && !provider.is_running()
    }));
    assert!(sent_at.elapsed() >= Duration::from_millis(450));
    assert_eq!(provider.lookup("RPM")?, 24.0);

    let changes: Vec<ConnectionState> = states.try_iter().map(|e| e.new_state).collect();
    assert!(
        changes
            .windows(2)
            .any(|w| w == [ConnectionState::Connected, ConnectionState::Disconnected]),
        "state changes: {changes:?}"
    );
    assert!(provider.stats().disconnects >= 1);
    provider.stop();
    Ok(())
}

#[test]
fn test_fixed_rate_spacing() -> TestResult {
    let addr = free_loopback_addr();
    let mut provider = TelemetryProvider::new();
    provider.init(RelayConfig {
        telemetry_update_frequency: 20,
        auto_calculate_rate_limiter: false,
        disable_rate_throttle: false,
        ..external_config(addr)
    })?;
    let updates = provider.subscribe();
    provider.start()?;

    let flooding = Arc::new(AtomicBool::new(true));
    let flood = {
        let flooding = Arc::clone(&flooding);
        let mut sender = UdpFrameSender::connect(addr)?;
        thread::spawn(move || {
            let mut value = 0.0;
            while flooding.load(Ordering::Relaxed) {
                sender.send(&rpm(value));
                value += 1.0;
                thread::sleep(Duration::from_millis(5));
            }
        })
    };

    let window = Instant::now();
    let mut received = Vec::new();
    while window.elapsed() < Duration::from_secs(1) {
        if let Ok(update) = updates.recv_timeout(Duration::from_millis(100)) {
            received.push(update);
        }
    }
    flooding.store(false, Ordering::Relaxed);
    if flood.join().is_err() {
        panic!("sender thread panicked");
    }
    let stats = provider.stats();
    provider.stop();

    assert!(received.len() >= 10, "only {} updates", received.len());
    assert!(received.len() <= 21, "{} updates in one second", received.len());
    for pair in received.windows(2) {
        if let [a, b] = pair {
            let spacing = Duration::from_nanos(b.timestamp_ns.saturating_sub(a.timestamp_ns));
            assert!(spacing >= Duration::from_millis(48), "spacing {spacing:?}");
        }
    }
    assert!(stats.rate_limiter.throttled_count >= 10);
    Ok(())
}

#[test]
fn test_stop_interrupts_throttle_sleep() -> TestResult {
    let addr = free_loopback_addr();
    let mut provider = TelemetryProvider::new();
    provider.init(RelayConfig {
        telemetry_update_frequency: 1,
        auto_calculate_rate_limiter: false,
        disable_rate_throttle: false,
        ..external_config(addr)
    })?;
    let updates = provider.subscribe();
    provider.start()?;

    let mut sender = UdpFrameSender::connect(addr)?;
    sender.send(&rpm(5.0));
    assert_eq!(collect(&updates, 1, Duration::from_secs(2)).len(), 1);

    let stopping = Instant::now();
    provider.stop();
    assert!(stopping.elapsed() < Duration::from_millis(500));
    provider.stop();
    assert!(!provider.is_started());
    assert!(!provider.is_running());
    assert!(!provider.is_connected());

    provider.start()?;
    assert!(provider.is_started());
    provider.stop();
    Ok(())
}

#[test]
fn test_config_file_round_trip() -> TestResult {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("flightlink.yaml");
    std::fs::write(
        &path,
        "telemetry_update_frequency: 30\ndeployment: external\ntransport:\n  port: 0\n",
    )?;

    let config = RelayConfig::load(&path)?;
    assert_eq!(config.rate_limiter().fixed_interval_ms, 33);

    let mut provider = TelemetryProvider::new();
    provider.init(config)?;
    provider.start()?;
    provider.stop();
    Ok(())
}

#[cfg(unix)]
#[test]
fn test_supervised_agent_is_relaunched_after_exit() -> TestResult {
    let addr = free_loopback_addr();
    let mut config = RelayConfig {
        deployment: DeploymentMode::Supervised,
        error_cooldown_ms: 20,
        ..external_config(addr)
    };
    config.agent.program = "sh".into();
    config.agent.args = vec!["-c".to_string(), "exit 1".to_string()];

    let mut provider = TelemetryProvider::new();
    provider.init(config)?;
    provider.start()?;
    assert!(wait_for(Duration::from_secs(5), || {
        provider.stats().agent_launches >= 2
    }));
    provider.stop();
    assert!(!provider.is_running());
    Ok(())
}

#[test]
fn test_missing_agent_program_stops_the_relay() -> TestResult {
    let addr = free_loopback_addr();
    let mut config = RelayConfig {
        deployment: DeploymentMode::Supervised,
        error_cooldown_ms: 20,
        ..external_config(addr)
    };
    config.agent.program = "/nonexistent/flightlink-agent".into();

    let mut provider = TelemetryProvider::new();
    provider.init(config)?;
    let states = provider.subscribe_state_changes();
    provider.start()?;

    assert!(wait_for(Duration::from_secs(5), || !provider.is_started()));
    assert!(provider.has_failed());
    let failure = must_some(provider.failure(), "failure not recorded");
    assert!(failure.contains("/nonexistent/flightlink-agent"), "{failure}");

    thread::sleep(Duration::from_millis(100));
    let stats = provider.stats();
    assert_eq!(stats.errors, 1);
    assert_eq!(stats.agent_launches, 0);
    assert!(!provider.is_running());

    let event = states.recv_timeout(Duration::from_secs(1))?;
    assert_eq!(event.new_state, ConnectionState::Error);
    assert!(states.try_recv().is_err());

    // Starting again retries and fails the same way.
    provider.start()?;
    assert!(wait_for(Duration::from_secs(5), || !provider.is_started()));
    assert!(provider.has_failed());
    provider.stop();
    Ok(())
}
