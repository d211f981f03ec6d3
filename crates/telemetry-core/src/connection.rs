//! Connection health of the relay pipeline.
//!
//! [`ConnectionStatus`] holds the two process-wide flags the host displays.
//! [`LivenessTracker`] decides when silence on the transport means the source is
//! gone and publishes every state change as a [`ConnectionStateEvent`].

use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

pub const DEFAULT_LIVENESS_THRESHOLD_MS: u64 = 500;

const EVENT_CHANNEL_CAPACITY: usize = 16;

pub type ConnectionStateReceiver = Receiver<ConnectionStateEvent>;
pub type ConnectionStateSender = Sender<ConnectionStateEvent>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    pub fn is_disconnected(&self) -> bool {
        matches!(self, ConnectionState::Disconnected | ConnectionState::Error)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionStateEvent {
    pub source: String,
    pub previous_state: ConnectionState,
    pub new_state: ConnectionState,
    pub timestamp_ns: u64,
    pub reason: Option<String>,
}

impl ConnectionStateEvent {
    pub fn new(
        source: impl Into<String>,
        previous_state: ConnectionState,
        new_state: ConnectionState,
        reason: Option<String>,
    ) -> Self {
        Self {
            source: source.into(),
            previous_state,
            new_state,
            timestamp_ns: crate::telemetry_now_ns(),
            reason,
        }
    }

    pub fn is_disconnection(&self) -> bool {
        self.previous_state.is_connected() && self.new_state.is_disconnected()
    }

    pub fn is_connection(&self) -> bool {
        !self.previous_state.is_connected() && self.new_state.is_connected()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LivenessConfig {
    pub threshold_ms: u64,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            threshold_ms: DEFAULT_LIVENESS_THRESHOLD_MS,
        }
    }
}

impl LivenessConfig {
    pub fn with_threshold(threshold_ms: u64) -> Self {
        Self { threshold_ms }
    }

    pub fn threshold(&self) -> Duration {
        Duration::from_millis(self.threshold_ms)
    }
}

/// Tracks time since the last good frame.
///
/// All methods take the current instant explicitly so the worker samples the
/// clock once per iteration.
#[derive(Debug)]
pub struct LivenessTracker {
    config: LivenessConfig,
    source: String,
    state: ConnectionState,
    started_at: Instant,
    last_frame_at: Option<Instant>,
    subscribers: Vec<ConnectionStateSender>,
}

impl LivenessTracker {
    pub fn new(source: impl Into<String>, config: LivenessConfig, now: Instant) -> Self {
        Self {
            config,
            source: source.into(),
            state: ConnectionState::Disconnected,
            started_at: now,
            last_frame_at: None,
            subscribers: Vec::new(),
        }
    }

    /// Receive every subsequent state change.
    pub fn subscribe(&mut self) -> ConnectionStateReceiver {
        let (tx, rx) = channel::bounded(EVENT_CHANNEL_CAPACITY);
        self.subscribers.push(tx);
        rx
    }

    pub fn add_subscriber(&mut self, sender: ConnectionStateSender) {
        self.subscribers.push(sender);
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn config(&self) -> &LivenessConfig {
        &self.config
    }

    pub fn mark_connecting(&mut self) {
        self.transition_to(ConnectionState::Connecting, Some("Connecting".to_string()));
    }

    pub fn record_frame(&mut self, now: Instant) {
        self.last_frame_at = Some(now);
        if self.state != ConnectionState::Connected {
            self.transition_to(
                ConnectionState::Connected,
                Some("Frame received".to_string()),
            );
        }
    }

    /// Silence since the last frame, or since the tracker was created.
    pub fn silence(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_frame_at.unwrap_or(self.started_at))
    }

    pub fn is_timed_out(&self, now: Instant) -> bool {
        self.silence(now) > self.config.threshold()
    }

    /// Downgrade to `Disconnected` when the threshold was exceeded.
    pub fn check(&mut self, now: Instant) -> ConnectionState {
        if !self.state.is_disconnected() && self.is_timed_out(now) {
            self.transition_to(
                ConnectionState::Disconnected,
                Some(format!("No frame received for {}ms", self.config.threshold_ms)),
            );
        }
        self.state
    }

    pub fn mark_error(&mut self, reason: impl Into<String>) {
        self.transition_to(ConnectionState::Error, Some(reason.into()));
    }

    pub fn mark_disconnected(&mut self, reason: impl Into<String>) {
        self.transition_to(ConnectionState::Disconnected, Some(reason.into()));
    }

    fn transition_to(&mut self, new_state: ConnectionState, reason: Option<String>) {
        if self.state == new_state {
            return;
        }

        let previous_state = self.state;
        self.state = new_state;
        tracing::debug!(
            source = %self.source,
            from = ?previous_state,
            to = ?new_state,
            reason = reason.as_deref().unwrap_or(""),
            "Connection state changed"
        );

        if self.subscribers.is_empty() {
            return;
        }
        let event =
            ConnectionStateEvent::new(self.source.clone(), previous_state, new_state, reason);
        self.subscribers
            .retain(|sender| match sender.try_send(event.clone()) {
                Ok(()) | Err(TrySendError::Full(_)) => true,
                Err(TrySendError::Disconnected(_)) => false,
            });
    }
}

/// The `running`/`connected` flag pair shared with the host.
#[derive(Debug, Default)]
pub struct ConnectionStatus {
    running: AtomicBool,
    connected: AtomicBool,
}

/// Point-in-time copy of [`ConnectionStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub running: bool,
    pub connected: bool,
}

impl ConnectionStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, running: bool, connected: bool) {
        self.running.store(running, Ordering::Release);
        self.connected.store(connected, Ordering::Release);
    }

    pub fn set_healthy(&self) {
        self.set(true, true);
    }

    pub fn set_down(&self) {
        self.set(false, false);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            running: self.is_running(),
            connected: self.is_connected(),
        }
    }
}
