//! Configuration validation

use anyhow::Result;
use flightlink_relay::{DeploymentMode, RelayConfig};
use flightlink_telemetry_core::ThrottleMode;
use serde::Serialize;

use crate::commands::CheckConfigArgs;
use crate::error::CliError;
use crate::output;

/// Settings derived from a configuration, as the relay will apply them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigReport {
    pub deployment: DeploymentMode,
    pub endpoint: String,
    pub throttle: ThrottleMode,
    pub target_frequency_hz: u32,
    pub interval_ms: u64,
    pub liveness_threshold_ms: u64,
    /// Agent command line, present only for the supervised deployment.
    pub agent_command: Option<Vec<String>>,
}

impl ConfigReport {
    pub fn new(config: &RelayConfig) -> Self {
        let rate = config.rate_limiter();
        let agent_command = (config.deployment == DeploymentMode::Supervised).then(|| {
            let command = config.agent_command();
            std::iter::once(command.program.display().to_string())
                .chain(command.args)
                .collect()
        });
        Self {
            deployment: config.deployment,
            endpoint: config.transport.socket_addr().to_string(),
            throttle: rate.mode(),
            target_frequency_hz: rate.target_frequency_hz,
            interval_ms: match rate.mode() {
                ThrottleMode::Fixed => rate.fixed_interval_ms,
                ThrottleMode::Auto => rate.target_interval().as_millis() as u64,
                ThrottleMode::Disabled => 0,
            },
            liveness_threshold_ms: config.liveness_threshold_ms,
            agent_command,
        }
    }
}

pub fn execute(args: &CheckConfigArgs, json: bool) -> Result<()> {
    let config = RelayConfig::load(&args.path)
        .map_err(|e| CliError::InvalidConfiguration(e.to_string()))?;
    let report = ConfigReport::new(&config);
    output::print_config_report(&args.path, &report, json);
    if args.print {
        let yaml = serde_yaml::to_string(&config).map_err(CliError::from)?;
        println!("{yaml}");
    }
    Ok(())
}
