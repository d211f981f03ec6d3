//! Relay configuration, loaded once before `start`.

use flightlink_supervisor::AgentCommand;
use flightlink_telemetry_core::{
    ConversionProfile, ConversionSite, DEFAULT_LIVENESS_THRESHOLD_MS, LivenessConfig,
    RateLimiterConfig,
};
use flightlink_telemetry_transport::TransportConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::error::ConfigError;

/// Where the capture agent runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentMode {
    /// Child process launched and watched by the relay.
    #[default]
    Supervised,
    /// Thread inside the relay process, connected by an in-process channel.
    Embedded,
    /// Started by someone else; the relay only listens.
    External,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionConfig {
    pub profile: ConversionProfile,
    pub site: ConversionSite,
}

impl ConversionConfig {
    /// Profile the capture agent applies before sending.
    pub fn agent_profile(&self) -> Option<ConversionProfile> {
        (self.site == ConversionSite::Agent).then_some(self.profile)
    }

    /// Profile the relay applies after receiving.
    pub fn relay_profile(&self) -> Option<ConversionProfile> {
        (self.site == ConversionSite::Relay).then_some(self.profile)
    }
}

/// Virtual simulator used by the embedded deployment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    pub frame_rate_hz: f32,
    /// Replay this recording instead of synthetic motion.
    pub replay: Option<PathBuf>,
    pub loop_replay: bool,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            frame_rate_hz: 60.0,
            replay: None,
            loop_replay: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub telemetry_update_frequency: u32,
    pub auto_calculate_rate_limiter: bool,
    pub disable_rate_throttle: bool,
    pub show_proxy_window: bool,
    /// Defaults to `1000 / telemetry_update_frequency`.
    pub fixed_interval_ms: Option<u64>,
    pub transport: TransportConfig,
    pub liveness_threshold_ms: u64,
    pub poll_interval_ms: u64,
    pub error_cooldown_ms: u64,
    pub deployment: DeploymentMode,
    pub agent: AgentCommand,
    pub conversion: ConversionConfig,
    pub simulator: SimulatorConfig,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            telemetry_update_frequency: 60,
            auto_calculate_rate_limiter: true,
            disable_rate_throttle: false,
            show_proxy_window: false,
            fixed_interval_ms: None,
            transport: TransportConfig::default(),
            liveness_threshold_ms: DEFAULT_LIVENESS_THRESHOLD_MS,
            poll_interval_ms: 2,
            error_cooldown_ms: 1000,
            deployment: DeploymentMode::default(),
            agent: AgentCommand::default(),
            conversion: ConversionConfig::default(),
            simulator: SimulatorConfig::default(),
        }
    }
}

impl RelayConfig {
    /// Read, parse and validate a YAML configuration file.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read, does not parse or does not validate.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_yaml_str(&text)?;
        debug!(path = %path.display(), "Configuration loaded");
        Ok(config)
    }

    /// Parse and validate YAML. Missing keys take their defaults.
    ///
    /// # Errors
    ///
    /// Fails on malformed YAML or an invalid value.
    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.telemetry_update_frequency == 0 {
            return Err(ConfigError::invalid(
                "telemetry_update_frequency must be greater than 0",
            ));
        }
        if self.fixed_interval_ms == Some(0) {
            return Err(ConfigError::invalid(
                "fixed_interval_ms must be greater than 0",
            ));
        }
        if self.liveness_threshold_ms == 0 {
            return Err(ConfigError::invalid(
                "liveness_threshold_ms must be greater than 0",
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::invalid(
                "poll_interval_ms must be greater than 0",
            ));
        }
        if !(self.simulator.frame_rate_hz.is_finite() && self.simulator.frame_rate_hz > 0.0) {
            return Err(ConfigError::invalid(
                "simulator.frame_rate_hz must be a positive number",
            ));
        }
        if self.deployment == DeploymentMode::Supervised
            && self.agent.program.as_os_str().is_empty()
        {
            return Err(ConfigError::invalid(
                "agent.program is required for supervised deployment",
            ));
        }
        Ok(())
    }

    pub fn rate_limiter(&self) -> RateLimiterConfig {
        let base = RateLimiterConfig::new(self.telemetry_update_frequency);
        RateLimiterConfig {
            auto_calculate: self.auto_calculate_rate_limiter,
            fixed_interval_ms: self.fixed_interval_ms.unwrap_or(base.fixed_interval_ms),
            throttle_disabled: self.disable_rate_throttle,
            ..base
        }
    }

    pub fn liveness(&self) -> LivenessConfig {
        LivenessConfig::with_threshold(self.liveness_threshold_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn error_cooldown(&self) -> Duration {
        Duration::from_millis(self.error_cooldown_ms)
    }

    /// Agent command line for the supervised deployment, pointed at our endpoint.
    pub fn agent_command(&self) -> AgentCommand {
        let mut command = self
            .agent
            .clone()
            .show_window(self.show_proxy_window)
            .arg("--address")
            .arg(self.transport.address.to_string())
            .arg("--port")
            .arg(self.transport.port.to_string());
        command = match self.conversion.agent_profile() {
            Some(profile) => command.arg("--profile").arg(profile.as_str()),
            None => command.arg("--raw"),
        };
        command
    }
}
