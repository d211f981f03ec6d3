//! Keeping a capture agent alive next to the relay.

use flightlink_capture_agent::{
    AgentError, AgentExit, AgentOptions, CaptureAgent, VirtualSimulator,
};
use flightlink_supervisor::Supervisor;
use flightlink_telemetry_core::{ShutdownTrigger, shutdown_pair};
use flightlink_telemetry_transport::ChannelFrameSender;
use std::thread::{self, JoinHandle};
use tracing::{info, warn};

use crate::error::RelayError;

/// Starts the capture agent on demand. Polled once per relay iteration.
pub trait AgentLauncher: Send {
    /// Start the agent unless it is running. Returns `true` on a fresh start.
    ///
    /// # Errors
    ///
    /// Fails when the agent cannot be started. The relay cools down and retries
    /// transient failures and stops on the others.
    fn ensure_started(&mut self) -> Result<bool, RelayError>;

    fn is_running(&mut self) -> bool;

    /// Stop the agent. Safe to call more than once.
    fn shutdown(&mut self);
}

impl AgentLauncher for Supervisor {
    fn ensure_started(&mut self) -> Result<bool, RelayError> {
        Ok(Supervisor::ensure_started(self)?)
    }

    fn is_running(&mut self) -> bool {
        Supervisor::is_running(self)
    }

    fn shutdown(&mut self) {
        self.terminate();
    }
}

struct AgentThread {
    trigger: ShutdownTrigger,
    handle: JoinHandle<Result<AgentExit, AgentError>>,
}

/// Capture agent on a thread of the relay process, driving the virtual simulator.
pub struct EmbeddedAgent {
    simulator: VirtualSimulator,
    sink: ChannelFrameSender,
    options: AgentOptions,
    running: Option<AgentThread>,
    launches: u64,
}

impl EmbeddedAgent {
    /// The agent thread exits when the simulator goes away, so the relay restarts
    /// it exactly like a supervised process.
    pub fn new(
        simulator: VirtualSimulator,
        sink: ChannelFrameSender,
        options: AgentOptions,
    ) -> Self {
        Self {
            simulator,
            sink,
            options: AgentOptions {
                exit_on_disconnect: true,
                ..options
            },
            running: None,
            launches: 0,
        }
    }

    pub fn launches(&self) -> u64 {
        self.launches
    }

    fn reap(&mut self) {
        let Some(agent) = self.running.take() else {
            return;
        };
        agent.trigger.cancel();
        match agent.handle.join() {
            Ok(Ok(exit)) => info!(?exit, "Embedded capture agent stopped"),
            Ok(Err(e)) => warn!(error = %e, "Embedded capture agent failed to start"),
            Err(_) => warn!("Embedded capture agent panicked"),
        }
    }
}

impl AgentLauncher for EmbeddedAgent {
    fn ensure_started(&mut self) -> Result<bool, RelayError> {
        if self.is_running() {
            return Ok(false);
        }

        let (trigger, token) = shutdown_pair();
        let simulator = self.simulator.clone();
        let sink = self.sink.clone();
        let options = self.options.clone();
        let handle = thread::Builder::new()
            .name("flightlink-capture".to_string())
            .spawn(move || {
                let mut agent = CaptureAgent::new(simulator, sink, options)?;
                Ok(agent.run(&token))
            })
            .map_err(|source| RelayError::Thread {
                name: "flightlink-capture",
                source,
            })?;

        self.running = Some(AgentThread { trigger, handle });
        self.launches = self.launches.saturating_add(1);
        info!(launches = self.launches, "Embedded capture agent started");
        Ok(true)
    }

    fn is_running(&mut self) -> bool {
        match &self.running {
            Some(agent) if !agent.handle.is_finished() => true,
            Some(_) => {
                self.reap();
                false
            }
            None => false,
        }
    }

    fn shutdown(&mut self) {
        self.reap();
    }
}

impl Drop for EmbeddedAgent {
    fn drop(&mut self) {
        self.reap();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flightlink_capture_agent::{FaultPlan, VirtualSimConfig};
    use flightlink_telemetry_transport::channel_transport;
    use std::time::{Duration, Instant};

    #[test]
    fn test_embedded_agent_restarts_after_exit() -> Result<(), RelayError> {
        let simulator = VirtualSimulator::new(VirtualSimConfig {
            faults: FaultPlan {
                refuse_opens: 1,
                ..FaultPlan::default()
            },
            ..VirtualSimConfig::default()
        });
        let (sink, _source) = channel_transport(64);
        let mut launcher = EmbeddedAgent::new(simulator.clone(), sink, AgentOptions::default());

        assert!(launcher.ensure_started()?);
        let deadline = Instant::now() + Duration::from_secs(2);
        while launcher.is_running() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(!launcher.is_running());

        assert!(launcher.ensure_started()?);
        assert!(!launcher.ensure_started()?);
        assert_eq!(launcher.launches(), 2);

        launcher.shutdown();
        launcher.shutdown();
        assert!(!launcher.is_running());
        assert_eq!(simulator.open_attempts(), 2);
        Ok(())
    }
}
