//! flightlink-agent - out-of-process capture agent
//!
//! Connects to the simulator, registers the flight schemas and publishes one
//! record per simulated frame to the relay over loopback UDP.

#![deny(static_mut_refs)]
#![deny(unused_must_use)]
#![deny(clippy::unwrap_used)]

use anyhow::{Context, Result};
use clap::Parser;
use flightlink_capture_agent::{
    AgentExit, AgentOptions, CaptureAgent, FlightRecorder, FlightSource, VirtualSimConfig,
    VirtualSimulator,
};
use flightlink_telemetry_core::{ConversionProfile, Schema, shutdown_pair};
use flightlink_telemetry_transport::{DEFAULT_PORT, UdpFrameSender};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Exit code when the simulator went away and `--exit-on-disconnect` is set.
const EXIT_DISCONNECTED: u8 = 2;

#[derive(Parser)]
#[command(name = "flightlink-agent")]
#[command(about = "Capture flight simulator telemetry and publish it to the flightlink relay")]
#[command(version)]
struct Args {
    /// Relay address
    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST))]
    address: IpAddr,

    /// Relay port
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Forward raw simulator values; the relay converts them
    #[arg(long, conflicts_with = "profile")]
    raw: bool,

    /// Conversion profile applied before publishing
    #[arg(long, value_parser = parse_profile, default_value = "motion")]
    profile: ConversionProfile,

    /// Exit instead of reconnecting when the simulator is unavailable
    #[arg(long)]
    exit_on_disconnect: bool,

    /// Record raw frames to this file
    #[arg(long)]
    record: Option<PathBuf>,

    /// Replay a recorded flight instead of synthetic motion
    #[arg(long)]
    replay: Option<PathBuf>,

    /// Simulated frame rate
    #[arg(long, default_value_t = 60.0)]
    frame_rate: f32,

    /// Verbose logging
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn parse_profile(value: &str) -> Result<ConversionProfile, String> {
    match value {
        "motion" => Ok(ConversionProfile::Motion),
        "passthrough" => Ok(ConversionProfile::Passthrough),
        other => Err(format!(
            "unknown profile '{other}', expected 'motion' or 'passthrough'"
        )),
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    let log_level = match args.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("flightlink={log_level}").into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    match run(&args) {
        Ok(AgentExit::Cancelled) => ExitCode::SUCCESS,
        Ok(AgentExit::Disconnected) => ExitCode::from(EXIT_DISCONNECTED),
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<AgentExit> {
    let source = match &args.replay {
        Some(path) => {
            let recording = FlightRecorder::load_recording(path)
                .with_context(|| format!("Failed to load recording {}", path.display()))?;
            recording.frames_for(&Schema::flight_status()?)?;
            info!(frames = recording.frames.len(), path = %path.display(), "Replaying recording");
            FlightSource::replay(&recording, true)
        }
        None => FlightSource::Synthetic,
    };
    let simulator = VirtualSimulator::new(VirtualSimConfig {
        frame_rate_hz: args.frame_rate,
        source,
        ..VirtualSimConfig::default()
    });

    let target = SocketAddr::new(args.address, args.port);
    let sink = UdpFrameSender::connect(target)
        .with_context(|| format!("Failed to open UDP sender towards {target}"))?;

    let options = AgentOptions {
        profile: (!args.raw).then_some(args.profile),
        exit_on_disconnect: args.exit_on_disconnect,
        ..AgentOptions::default()
    };
    info!(%target, profile = ?options.profile, "Publishing telemetry");

    let mut agent = CaptureAgent::new(simulator, sink, options)?;
    if let Some(path) = &args.record {
        let mut recorder = FlightRecorder::new(path.clone(), Schema::flight_status()?)?;
        recorder.start_recording(flightlink_capture_agent::VIRTUAL_SIMULATOR_NAME.to_string());
        agent = agent.with_recorder(recorder);
    }

    let (trigger, token) = shutdown_pair();
    ctrlc::set_handler(move || trigger.cancel()).context("Failed to install Ctrl-C handler")?;

    let exit = agent.run(&token);

    if let Some(mut recorder) = agent.take_recorder() {
        match recorder.stop_recording(None) {
            Ok(recording) => info!(
                frames = recording.metadata.frame_count,
                path = %recorder.output_path().display(),
                "Recording saved"
            ),
            Err(e) => warn!(error = %e, "Failed to save recording"),
        }
    }
    Ok(exit)
}
