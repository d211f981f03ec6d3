//! Run the relay in the foreground and print updates

use anyhow::Result;
use flightlink_relay::{RelayConfig, TelemetryProvider};
use flightlink_telemetry_core::ValueSource;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{info, warn};

use crate::commands::RunArgs;
use crate::error::CliError;
use crate::output;

pub const DEFAULT_VALUES: [&str; 5] = ["Pitch", "Roll", "Yaw", "Speed", "RPM"];

/// How often queued updates are drained to stdout.
const DRAIN_INTERVAL: Duration = Duration::from_millis(10);

pub async fn execute(args: &RunArgs, json: bool) -> Result<()> {
    let config = load_config(args)?;
    let values = resolve_values(&args.values)?;

    let mut provider = TelemetryProvider::new();
    provider.init(config).map_err(CliError::from)?;
    let updates = provider.subscribe();
    let states = provider.subscribe_state_changes();
    provider.start().map_err(CliError::from)?;
    output::print_started(&provider, json);

    let deadline = args
        .duration
        .map(|secs| Instant::now() + Duration::from_secs(secs));
    let mut ticker = tokio::time::interval(DRAIN_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut seen: u64 = 0;
    'drain: loop {
        tokio::select! {
            signal = &mut ctrl_c => {
                match signal {
                    Ok(()) => info!("Interrupted"),
                    Err(e) => warn!(error = %e, "Ctrl-C handler unavailable"),
                }
                break;
            }
            _ = ticker.tick() => {}
        }

        for event in states.try_iter() {
            output::print_state_change(&event, json);
        }
        for update in updates.try_iter() {
            seen = seen.saturating_add(1);
            if seen % args.every == 0 {
                output::print_update(&update, &values, json);
            }
            if args.count.is_some_and(|count| seen >= count) {
                break 'drain;
            }
        }
        if provider.has_failed() || deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            break;
        }
    }

    // Joins the relay worker.
    let provider = tokio::task::spawn_blocking(move || {
        provider.stop();
        provider
    })
    .await?;
    output::print_run_summary(&provider.stats(), json);
    match provider.failure() {
        Some(failure) => Err(CliError::RelayUnavailable(failure).into()),
        None => Ok(()),
    }
}

fn load_config(args: &RunArgs) -> Result<RelayConfig, CliError> {
    let mut config = match &args.config {
        Some(path) => RelayConfig::load(path)
            .map_err(|e| CliError::InvalidConfiguration(e.to_string()))?,
        None => RelayConfig::default(),
    };
    if let Some(deployment) = args.deployment {
        config.deployment = deployment.into();
    }
    if let Some(port) = args.port {
        config.transport.port = port;
    }
    Ok(config)
}

/// Resolve every requested name up front so typos fail before the relay starts.
fn resolve_values(names: &[String]) -> Result<Vec<(String, ValueSource)>, CliError> {
    names
        .iter()
        .map(|name| {
            ValueSource::resolve(name)
                .ok()
                .map(|source| (name.clone(), source))
                .ok_or_else(|| CliError::UnknownValue(name.clone()))
        })
        .collect()
}
