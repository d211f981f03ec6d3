//! Relay control loop.
//!
//! One dedicated thread polls the transport, publishes every received value set,
//! throttles to the target rate and keeps the liveness flags current. Every wait
//! in the loop goes through the shutdown token, so `stop` returns after at most
//! one in-flight iteration.

use arc_swap::ArcSwap;
use crossbeam::channel::{Sender, TrySendError};
use flightlink_telemetry_core::{
    ConnectionStateSender, ConnectionStatus, ConversionProfile, LivenessConfig, LivenessTracker,
    RateLimiter, RateLimiterConfig, RateLimiterStats, ShutdownToken, TelemetryData,
    TelemetryError, TelemetrySnapshot, telemetry_now_ns,
};
use flightlink_telemetry_transport::{FrameSource, decode};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};

use crate::error::RelayError;
use crate::launcher::AgentLauncher;

/// One "telemetry updated" notification.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TelemetryUpdate {
    /// Starts at 1 for the first update after `start`.
    pub sequence: u64,
    pub timestamp_ns: u64,
    pub current: TelemetryData,
    pub previous: TelemetryData,
}

impl TelemetryUpdate {
    /// Stored or computed value of the new set.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::UnknownField`] for names that are neither.
    pub fn lookup(&self, name: &str) -> Result<f32, TelemetryError> {
        self.current.lookup(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct RelayStats {
    pub frames_received: u64,
    pub updates_published: u64,
    /// Records that failed to decode or did not fit a datagram.
    pub frames_dropped: u64,
    /// Liveness timeouts.
    pub disconnects: u64,
    pub errors: u64,
    pub agent_launches: u64,
    pub rate_limiter: RateLimiterStats,
}

/// State shared between the provider and its worker.
#[derive(Debug, Default)]
pub(crate) struct RelayShared {
    pub(crate) snapshot: ArcSwap<TelemetrySnapshot>,
    pub(crate) status: ConnectionStatus,
    pub(crate) subscribers: Mutex<Vec<Sender<TelemetryUpdate>>>,
    /// Handed to the liveness tracker on the next iteration.
    pub(crate) pending_state_subscribers: Mutex<Vec<ConnectionStateSender>>,
    pub(crate) stats: Mutex<RelayStats>,
    /// Set when the worker stopped on an error that retrying cannot fix.
    pub(crate) failure: Mutex<Option<String>>,
}

impl RelayShared {
    fn publish(&self, update: TelemetryUpdate) {
        self.subscribers
            .lock()
            .retain(|tx| match tx.try_send(update) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    trace!(sequence = update.sequence, "Subscriber lagging, update skipped");
                    true
                }
                Err(TrySendError::Disconnected(_)) => false,
            });
    }

    fn count(&self, f: impl FnOnce(&mut RelayStats)) {
        f(&mut self.stats.lock());
    }
}

#[derive(Debug, Clone)]
pub(crate) struct WorkerSettings {
    pub(crate) source_name: String,
    pub(crate) poll_interval: Duration,
    pub(crate) error_cooldown: Duration,
    pub(crate) liveness: LivenessConfig,
    pub(crate) rate: RateLimiterConfig,
    /// Applied to every received set when the agent forwards raw values.
    pub(crate) relay_profile: Option<ConversionProfile>,
}

pub(crate) struct RelayWorker {
    source: Box<dyn FrameSource>,
    launcher: Option<Box<dyn AgentLauncher>>,
    shared: Arc<RelayShared>,
    settings: WorkerSettings,
    liveness: LivenessTracker,
    limiter: RateLimiter,
    last_tick: Instant,
    sequence: u64,
}

impl RelayWorker {
    pub(crate) fn new(
        source: Box<dyn FrameSource>,
        launcher: Option<Box<dyn AgentLauncher>>,
        shared: Arc<RelayShared>,
        settings: WorkerSettings,
    ) -> Self {
        let now = Instant::now();
        Self {
            source,
            launcher,
            shared,
            liveness: LivenessTracker::new(settings.source_name.clone(), settings.liveness, now),
            limiter: RateLimiter::new(settings.rate),
            settings,
            last_tick: now,
            sequence: 0,
        }
    }

    pub(crate) fn run(mut self, shutdown: &ShutdownToken) {
        info!(
            source = %self.settings.source_name,
            mode = ?self.limiter.mode(),
            target_hz = self.settings.rate.target_frequency_hz,
            "Relay worker started"
        );

        while !shutdown.is_cancelled() {
            self.adopt_state_subscribers();
            if let Err(e) = self.iterate(shutdown) {
                if !e.is_transient() {
                    error!(error = %e, "Relay stopped on unrecoverable error");
                    self.shared.status.set_down();
                    self.shared.count(|s| s.errors = s.errors.saturating_add(1));
                    *self.shared.failure.lock() = Some(e.to_string());
                    self.shutdown_launcher();
                    self.liveness.mark_error(e.to_string());
                    return;
                }
                warn!(error = %e, "Relay iteration failed, cooling down");
                self.shared.status.set_down();
                self.liveness.mark_error(e.to_string());
                self.shared.count(|s| s.errors = s.errors.saturating_add(1));
                if shutdown.sleep(self.settings.error_cooldown) {
                    break;
                }
            }
        }

        self.shutdown_launcher();
        self.shared.status.set_down();
        self.liveness.mark_disconnected("Relay stopped");
        info!(sequence = self.sequence, "Relay worker stopped");
    }

    fn shutdown_launcher(&mut self) {
        if let Some(launcher) = self.launcher.as_mut() {
            launcher.shutdown();
        }
    }

    fn adopt_state_subscribers(&mut self) {
        let pending = std::mem::take(&mut *self.shared.pending_state_subscribers.lock());
        for sender in pending {
            self.liveness.add_subscriber(sender);
        }
    }

    fn iterate(&mut self, shutdown: &ShutdownToken) -> Result<(), RelayError> {
        if let Some(launcher) = self.launcher.as_mut()
            && !launcher.is_running()
            && launcher.ensure_started()?
        {
            self.shared
                .count(|s| s.agent_launches = s.agent_launches.saturating_add(1));
            self.liveness.mark_connecting();
        }

        let bytes = match self.source.poll(self.settings.poll_interval) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                self.on_idle(Instant::now());
                return Ok(());
            }
            Err(e) if e.is_transient() => {
                debug!(error = %e, "Dropping unusable datagram");
                self.shared
                    .count(|s| s.frames_dropped = s.frames_dropped.saturating_add(1));
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        let data = match decode(&bytes) {
            Ok(data) => data,
            Err(e) => {
                trace!(error = %e, "Dropping malformed telemetry record");
                self.shared
                    .count(|s| s.frames_dropped = s.frames_dropped.saturating_add(1));
                return Ok(());
            }
        };
        self.on_frame(data, shutdown);
        Ok(())
    }

    fn on_idle(&mut self, now: Instant) {
        if !self.liveness.is_timed_out(now) {
            return;
        }
        self.liveness.check(now);
        let status = self.shared.status.snapshot();
        if status.running || status.connected {
            info!(
                silence_ms = self.liveness.silence(now).as_millis() as u64,
                "Telemetry lost"
            );
            self.shared.status.set_down();
            self.shared
                .count(|s| s.disconnects = s.disconnects.saturating_add(1));
        }
    }

    fn on_frame(&mut self, data: TelemetryData, shutdown: &ShutdownToken) {
        let data = match self.settings.relay_profile {
            Some(profile) => profile.apply(&data),
            None => data.sanitized(),
        };

        self.liveness.record_frame(Instant::now());
        self.shared.status.set_healthy();

        let snapshot = self.shared.snapshot.load().advance(data);
        self.shared.snapshot.store(Arc::new(snapshot));
        self.sequence = self.sequence.saturating_add(1);
        self.shared.publish(TelemetryUpdate {
            sequence: self.sequence,
            timestamp_ns: telemetry_now_ns(),
            current: snapshot.current,
            previous: snapshot.previous,
        });

        if let Some(delay) = self.limiter.delay_after_frame(self.last_tick.elapsed()) {
            let started = Instant::now();
            shutdown.sleep(delay);
            self.limiter.record_throttle(started.elapsed());
        }
        self.last_tick = Instant::now();

        let limiter = self.limiter.stats();
        self.shared.count(|s| {
            s.frames_received = s.frames_received.saturating_add(1);
            s.updates_published = s.updates_published.saturating_add(1);
            s.rate_limiter = limiter;
        });
    }
}
