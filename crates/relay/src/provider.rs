//! Host-facing telemetry provider.
//!
//! Wraps the relay worker behind the host lifecycle: `init` once with a
//! configuration, then `start`/`stop` any number of times.

use crossbeam::channel::{self, Receiver};
use flightlink_capture_agent::{
    AgentOptions, FlightRecorder, FlightSource, VirtualSimConfig, VirtualSimulator,
};
use flightlink_supervisor::Supervisor;
use flightlink_telemetry_core::{
    ConnectionStateReceiver, Schema, ShutdownTrigger, StatusSnapshot, TelemetryError,
    TelemetrySnapshot, shutdown_pair, value_names,
};
use flightlink_telemetry_transport::{FrameSource, UdpFrameReceiver, channel_transport};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

use crate::config::{DeploymentMode, RelayConfig};
use crate::error::{ConfigError, RelayError};
use crate::launcher::{AgentLauncher, EmbeddedAgent};
use crate::worker::{RelayShared, RelayStats, RelayWorker, TelemetryUpdate, WorkerSettings};

pub const PROVIDER_NAME: &str = "msfs2020";

/// Capacity of each "telemetry updated" subscription.
pub const UPDATE_CHANNEL_CAPACITY: usize = 256;

/// Records buffered between an embedded agent and the relay.
const EMBEDDED_CHANNEL_CAPACITY: usize = 64;

struct WorkerHandle {
    trigger: ShutdownTrigger,
    handle: JoinHandle<()>,
}

pub struct TelemetryProvider {
    config: Option<RelayConfig>,
    simulator: Option<VirtualSimulator>,
    shared: Arc<RelayShared>,
    worker: Option<WorkerHandle>,
}

impl Default for TelemetryProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetryProvider {
    pub fn new() -> Self {
        Self {
            config: None,
            simulator: None,
            shared: Arc::new(RelayShared::default()),
            worker: None,
        }
    }

    pub fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    /// Validate and keep the configuration for subsequent starts.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for an invalid configuration.
    pub fn init(&mut self, config: RelayConfig) -> Result<(), RelayError> {
        config.validate()?;
        info!(provider = PROVIDER_NAME, version = env!("CARGO_PKG_VERSION"), "Initializing");
        debug!(
            telemetry_update_frequency = config.telemetry_update_frequency,
            auto_calculate_rate_limiter = config.auto_calculate_rate_limiter,
            fixed_interval_ms = config.rate_limiter().fixed_interval_ms,
            disable_rate_throttle = config.disable_rate_throttle,
            show_proxy_window = config.show_proxy_window,
            deployment = ?config.deployment,
            endpoint = %config.transport.socket_addr(),
            profile = %config.conversion.profile,
            site = ?config.conversion.site,
            "Provider configuration"
        );
        self.config = Some(config);
        Ok(())
    }

    /// Use `simulator` for the embedded deployment instead of building one from
    /// the configuration.
    pub fn use_simulator(&mut self, simulator: VirtualSimulator) {
        self.simulator = Some(simulator);
    }

    pub fn config(&self) -> Option<&RelayConfig> {
        self.config.as_ref()
    }

    /// Start the relay worker. Starting a started provider is a no-op.
    ///
    /// # Errors
    ///
    /// Fails if the provider was never initialized, the transport cannot be
    /// bound or the worker thread cannot be spawned.
    pub fn start(&mut self) -> Result<(), RelayError> {
        if self.is_started() {
            return Ok(());
        }
        // A worker that stopped on its own is reaped before starting over.
        self.stop();
        let config = self.config.clone().ok_or(RelayError::NotInitialized)?;
        debug!(provider = PROVIDER_NAME, "Starting");
        *self.shared.failure.lock() = None;

        let (source, launcher) = self.build_pipeline(&config)?;
        let settings = WorkerSettings {
            source_name: PROVIDER_NAME.to_string(),
            poll_interval: config.poll_interval(),
            error_cooldown: config.error_cooldown(),
            liveness: config.liveness(),
            rate: config.rate_limiter(),
            relay_profile: config.conversion.relay_profile(),
        };
        let worker = RelayWorker::new(source, launcher, Arc::clone(&self.shared), settings);

        let (trigger, token) = shutdown_pair();
        let handle = thread::Builder::new()
            .name("flightlink-relay".to_string())
            .spawn(move || worker.run(&token))
            .map_err(|source| RelayError::Thread {
                name: "flightlink-relay",
                source,
            })?;
        self.worker = Some(WorkerHandle { trigger, handle });
        Ok(())
    }

    fn build_pipeline(
        &self,
        config: &RelayConfig,
    ) -> Result<(Box<dyn FrameSource>, Option<Box<dyn AgentLauncher>>), RelayError> {
        match config.deployment {
            DeploymentMode::Supervised | DeploymentMode::External => {
                let receiver = UdpFrameReceiver::bind(config.transport.socket_addr())?;
                let launcher: Option<Box<dyn AgentLauncher>> =
                    (config.deployment == DeploymentMode::Supervised)
                        .then(|| Box::new(Supervisor::new(config.agent_command())) as _);
                Ok((Box::new(receiver), launcher))
            }
            DeploymentMode::Embedded => {
                let simulator = match &self.simulator {
                    Some(simulator) => simulator.clone(),
                    None => simulator_from_config(config)?,
                };
                let (sink, receiver) = channel_transport(EMBEDDED_CHANNEL_CAPACITY);
                let options = AgentOptions {
                    profile: config.conversion.agent_profile(),
                    ..AgentOptions::default()
                };
                let launcher = EmbeddedAgent::new(simulator, sink, options);
                Ok((Box::new(receiver), Some(Box::new(launcher))))
            }
        }
    }

    /// Stop the worker and release the transport and agent. Safe to call repeatedly.
    pub fn stop(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        debug!(provider = PROVIDER_NAME, "Stopping");
        worker.trigger.cancel();
        if worker.handle.join().is_err() {
            warn!(provider = PROVIDER_NAME, "Relay worker panicked");
            self.shared.status.set_down();
        }
    }

    /// Whether a worker is running. `false` after it stopped on a failure.
    pub fn is_started(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| !w.handle.is_finished())
    }

    /// Whether the worker stopped on its own after an unrecoverable error.
    ///
    /// `start` again once the cause (for instance the agent program) is fixed.
    pub fn has_failed(&self) -> bool {
        self.shared.failure.lock().is_some()
    }

    /// The error that stopped the worker, if any.
    pub fn failure(&self) -> Option<String> {
        self.shared.failure.lock().clone()
    }

    pub fn status(&self) -> StatusSnapshot {
        self.shared.status.snapshot()
    }

    pub fn is_running(&self) -> bool {
        self.shared.status.is_running()
    }

    pub fn is_connected(&self) -> bool {
        self.shared.status.is_connected()
    }

    /// The latest `current`/`previous` pair.
    pub fn latest(&self) -> TelemetrySnapshot {
        **self.shared.snapshot.load()
    }

    /// Every name [`TelemetryProvider::lookup`] accepts, stored fields first.
    pub fn value_list(&self) -> Vec<&'static str> {
        value_names()
    }

    /// # Errors
    ///
    /// Returns [`TelemetryError::UnknownField`] for names outside [`Self::value_list`].
    pub fn lookup(&self, name: &str) -> Result<f32, TelemetryError> {
        self.shared.snapshot.load().current.lookup(name)
    }

    /// Receive every subsequent "telemetry updated" notification.
    ///
    /// A subscriber that falls more than [`UPDATE_CHANNEL_CAPACITY`] updates
    /// behind misses updates instead of slowing the relay.
    pub fn subscribe(&self) -> Receiver<TelemetryUpdate> {
        let (tx, rx) = channel::bounded(UPDATE_CHANNEL_CAPACITY);
        self.shared.subscribers.lock().push(tx);
        rx
    }

    /// Receive every subsequent connection state change.
    pub fn subscribe_state_changes(&self) -> ConnectionStateReceiver {
        let (tx, rx) = channel::bounded(UPDATE_CHANNEL_CAPACITY);
        self.shared.pending_state_subscribers.lock().push(tx);
        rx
    }

    pub fn stats(&self) -> RelayStats {
        *self.shared.stats.lock()
    }
}

impl Drop for TelemetryProvider {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for TelemetryProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryProvider")
            .field("name", &PROVIDER_NAME)
            .field("deployment", &self.config.as_ref().map(|c| c.deployment))
            .field("started", &self.is_started())
            .field("status", &self.status())
            .field("failure", &self.failure())
            .finish()
    }
}

fn simulator_from_config(config: &RelayConfig) -> Result<VirtualSimulator, RelayError> {
    let source = match &config.simulator.replay {
        Some(path) => {
            let recording = FlightRecorder::load_recording(path).map_err(|e| {
                ConfigError::invalid(format!("simulator.replay {}: {e:#}", path.display()))
            })?;
            recording
                .frames_for(&Schema::flight_status()?)
                .map_err(|e| ConfigError::invalid(format!("simulator.replay: {e:#}")))?;
            FlightSource::replay(&recording, config.simulator.loop_replay)
        }
        None => FlightSource::Synthetic,
    };
    Ok(VirtualSimulator::new(VirtualSimConfig {
        frame_rate_hz: config.simulator.frame_rate_hz,
        source,
        ..VirtualSimConfig::default()
    }))
}
