//! Output formatting for CLI responses
//!
//! One-shot commands print a single pretty JSON document with `--json`; `run`
//! prints one compact JSON object per line so the stream can be piped.

use anyhow::Error;
use colored::*;
use flightlink_relay::{RelayStats, TelemetryProvider, TelemetryUpdate};
use flightlink_telemetry_core::{
    ConnectionState, ConnectionStateEvent, Schema, ThrottleMode, ValueSource,
};
use serde_json::{Map, Value, json};
use std::path::Path;

use crate::commands::config::ConfigReport;
use crate::commands::fields::FieldInfo;
use crate::error::CliError;

/// Print error in JSON format
pub fn print_error_json(error: &Error) {
    let error_json = json!({
        "success": false,
        "error": {
            "message": error.to_string(),
            "type": error_type_name(error),
        }
    });
    print_pretty(&error_json);
}

/// Print error in human-readable format
pub fn print_error_human(error: &Error) {
    eprintln!("{} {}", "Error:".red().bold(), error);
    for cause in error.chain().skip(1) {
        eprintln!("  {} {}", "Caused by:".yellow(), cause);
    }
}

fn error_type_name(error: &Error) -> &'static str {
    match error.downcast_ref::<CliError>() {
        Some(CliError::UnknownValue(_)) => "UnknownValue",
        Some(CliError::InvalidConfiguration(_)) => "InvalidConfiguration",
        Some(CliError::RelayUnavailable(_)) => "RelayUnavailable",
        Some(CliError::IoError(_)) => "IoError",
        Some(CliError::JsonError(_)) => "JsonError",
        Some(CliError::YamlError(_)) => "YamlError",
        None => "Error",
    }
}

fn print_pretty(value: &Value) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{}", s),
        Err(e) => eprintln!("Failed to format output as JSON: {}", e),
    }
}

fn print_line(value: &Value) {
    match serde_json::to_string(value) {
        Ok(s) => println!("{}", s),
        Err(e) => eprintln!("Failed to format output as JSON: {}", e),
    }
}

pub fn print_started(provider: &TelemetryProvider, json: bool) {
    let deployment = provider.config().map(|c| c.deployment);
    let endpoint = provider
        .config()
        .map(|c| c.transport.socket_addr().to_string());
    if json {
        print_line(&json!({
            "event": "started",
            "provider": provider.name(),
            "deployment": deployment,
            "endpoint": endpoint,
        }));
    } else {
        println!(
            "{} {} ({})",
            "Relay started:".bold(),
            provider.name(),
            deployment.map_or_else(String::new, |d| format!("{d:?}").to_lowercase())
        );
        if let Some(endpoint) = endpoint {
            println!("  Endpoint: {}", endpoint.dimmed());
        }
        println!("  Press Ctrl-C to stop");
    }
}

pub fn print_state_change(event: &ConnectionStateEvent, json: bool) {
    if json {
        match serde_json::to_value(event) {
            Ok(mut value) => {
                if let Some(object) = value.as_object_mut() {
                    object.insert("event".to_string(), json!("state"));
                }
                print_line(&value);
            }
            Err(e) => eprintln!("Failed to format state change as JSON: {}", e),
        }
        return;
    }

    let state = format!("{:?}", event.new_state);
    let state = match event.new_state {
        ConnectionState::Connected => state.green(),
        ConnectionState::Connecting => state.yellow(),
        ConnectionState::Disconnected | ConnectionState::Error => state.red(),
    };
    match &event.reason {
        Some(reason) => println!("{} {} ({})", "●".bold(), state, reason.dimmed()),
        None => println!("{} {}", "●".bold(), state),
    }
}

pub fn print_update(update: &TelemetryUpdate, values: &[(String, ValueSource)], json: bool) {
    if json {
        let mut selected = Map::new();
        for (name, source) in values {
            selected.insert(name.clone(), json!(source.read(&update.current)));
        }
        print_line(&json!({
            "event": "update",
            "sequence": update.sequence,
            "timestamp_ns": update.timestamp_ns,
            "values": selected,
        }));
        return;
    }

    let line = values
        .iter()
        .map(|(name, source)| format!("{} {:>9.3}", name.dimmed(), source.read(&update.current)))
        .collect::<Vec<_>>()
        .join("  ");
    println!("#{:<7} {}", update.sequence, line);
}

pub fn print_run_summary(stats: &RelayStats, json: bool) {
    if json {
        match serde_json::to_value(stats) {
            Ok(stats) => print_line(&json!({ "event": "stopped", "stats": stats })),
            Err(e) => eprintln!("Failed to format stats as JSON: {}", e),
        }
        return;
    }

    println!("{}", "Relay stopped".bold());
    println!("  Frames received:   {}", stats.frames_received);
    println!("  Updates published: {}", stats.updates_published);
    println!("  Frames dropped:    {}", stats.frames_dropped);
    println!("  Disconnects:       {}", stats.disconnects);
    println!("  Errors:            {}", stats.errors);
    println!("  Agent launches:    {}", stats.agent_launches);
    println!(
        "  Throttled:         {} frames, {:.1}s",
        stats.rate_limiter.throttled_count,
        stats.rate_limiter.throttled_time.as_secs_f64()
    );
}

pub fn print_fields(provider: &str, fields: &[FieldInfo], json: bool) {
    if json {
        print_pretty(&json!({
            "success": true,
            "provider": provider,
            "fields": fields,
        }));
        return;
    }

    println!("{} {}", "Values exposed by".bold(), provider.bold());
    for field in fields {
        let kind = if field.computed { "computed" } else { "stored" };
        println!("  {:<26} {:<8} {}", field.name, field.unit, kind.dimmed());
    }
}

pub fn print_schema(schema: &Schema, json: bool) {
    if json {
        print_pretty(&json!({
            "success": true,
            "schema": schema.name(),
            "frame_size": schema.frame_size(),
            "fingerprint": format!("{:08x}", schema.fingerprint()),
            "fields": schema.fields(),
        }));
        return;
    }

    println!(
        "{} {} ({} fields, {} bytes, fingerprint {:08x})",
        "Schema".bold(),
        schema.name().bold(),
        schema.len(),
        schema.frame_size(),
        schema.fingerprint()
    );
    println!(
        "  {:>3} {:>6}  {:<10} {:<32} {:<26} {}",
        "#", "offset", "type", "name", "unit", "value"
    );
    for field in schema.fields() {
        println!(
            "  {:>3} {:>6}  {:<10} {:<32} {:<26} {}",
            field.ordinal,
            field.offset,
            field.wire_type.as_str(),
            field.native_name,
            field.unit.as_deref().unwrap_or("-"),
            field.binding.map_or("-", |b| b.name())
        );
    }
}

pub fn print_config_report(path: &Path, report: &ConfigReport, json: bool) {
    if json {
        print_pretty(&json!({
            "success": true,
            "path": path.display().to_string(),
            "report": report,
        }));
        return;
    }

    println!("{} {}", "Configuration OK:".green().bold(), path.display());
    println!("  Deployment: {:?}", report.deployment);
    println!("  Endpoint:   {}", report.endpoint);
    match report.throttle {
        ThrottleMode::Disabled => println!("  Rate:       unthrottled"),
        ThrottleMode::Auto => println!(
            "  Rate:       {} Hz (frame budget {} ms)",
            report.target_frequency_hz, report.interval_ms
        ),
        ThrottleMode::Fixed => println!(
            "  Rate:       {} Hz (fixed sleep {} ms)",
            report.target_frequency_hz, report.interval_ms
        ),
    }
    println!("  Liveness:   {} ms", report.liveness_threshold_ms);
    if let Some(command) = &report.agent_command {
        println!("  Agent:      {}", command.join(" "));
    }
}
