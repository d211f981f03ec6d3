//! Integration tests for flightlinkctl
//!
//! Every command is exercised through the built binary, including exit codes.

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use std::time::Duration;
use tempfile::TempDir;

type TestResult = Result<(), Box<dyn std::error::Error>>;

fn flightlinkctl() -> Result<Command, Box<dyn std::error::Error>> {
    let mut cmd = Command::cargo_bin("flightlinkctl")?;
    cmd.env_remove("RUST_LOG").env_remove("FLIGHTLINK_CONFIG");
    Ok(cmd)
}

fn write_config(dir: &TempDir, yaml: &str) -> Result<std::path::PathBuf, std::io::Error> {
    let path = dir.path().join("flightlink.yaml");
    fs::write(&path, yaml)?;
    Ok(path)
}

fn stdout_json(output: &std::process::Output) -> Result<Value, serde_json::Error> {
    serde_json::from_slice(&output.stdout)
}

/// Value at a JSON pointer, `Null` when absent.
fn at<'a>(json: &'a Value, pointer: &str) -> &'a Value {
    json.pointer(pointer).unwrap_or(&Value::Null)
}

#[test]
fn test_cli_help() -> TestResult {
    flightlinkctl()?
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("flightlink relay"));
    Ok(())
}

#[test]
fn test_cli_version() -> TestResult {
    flightlinkctl()?
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("flightlinkctl"));
    Ok(())
}

#[test]
fn test_fields_human() -> TestResult {
    flightlinkctl()?
        .arg("fields")
        .assert()
        .success()
        .stdout(predicate::str::contains("msfs2020"))
        .stdout(predicate::str::contains("AngleOfSideslipEffective"));
    Ok(())
}

#[test]
fn test_fields_json_lists_stored_then_computed() -> TestResult {
    let output = flightlinkctl()?.args(["--json", "fields"]).output()?;
    assert!(output.status.success());
    let json = stdout_json(&output)?;
    let fields = json["fields"].as_array().ok_or("fields missing")?;
    assert_eq!(fields.len(), 17);
    assert_eq!(at(&json, "/fields/0/name"), "Pitch");
    assert_eq!(at(&json, "/fields/11/name"), "RPM");
    assert_eq!(at(&json, "/fields/16/name"), "SpeedKmh");
    assert_eq!(at(&json, "/fields/16/computed"), true);
    Ok(())
}

#[test]
fn test_schema_flight_status_json() -> TestResult {
    let output = flightlinkctl()?.args(["--json", "schema"]).output()?;
    assert!(output.status.success());
    let json = stdout_json(&output)?;
    let fields = json["fields"].as_array().ok_or("fields missing")?;
    assert_eq!(fields.len(), 21);
    assert_eq!(at(&json, "/fields/0/native_name"), "SIMULATION RATE");
    assert_eq!(at(&json, "/fields/0/wire_type"), "INT32");
    assert_eq!(at(&json, "/fields/18/binding"), "RPM");
    assert_eq!(json["frame_size"], 84);
    Ok(())
}

#[test]
fn test_schema_aircraft_identity_human() -> TestResult {
    flightlinkctl()?
        .args(["schema", "aircraft-identity"])
        .assert()
        .success()
        .stdout(predicate::str::contains("TITLE"))
        .stdout(predicate::str::contains("320 bytes"));
    Ok(())
}

#[test]
fn test_check_config_valid() -> TestResult {
    let dir = TempDir::new()?;
    let path = write_config(
        &dir,
        "telemetry_update_frequency: 20\n\
         auto_calculate_rate_limiter: false\n\
         deployment: external\n",
    )?;
    flightlinkctl()?
        .arg("check-config")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration OK"))
        .stdout(predicate::str::contains("fixed sleep 50 ms"));
    Ok(())
}

#[test]
fn test_check_config_prints_effective_yaml() -> TestResult {
    let dir = TempDir::new()?;
    let path = write_config(&dir, "transport:\n  port: 50002\n")?;
    flightlinkctl()?
        .args(["check-config", "--print"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("liveness_threshold_ms: 500"))
        .stdout(predicate::str::contains("--port 50002"));
    Ok(())
}

#[test]
fn test_check_config_zero_frequency_exit_code() -> TestResult {
    let dir = TempDir::new()?;
    let path = write_config(&dir, "telemetry_update_frequency: 0\n")?;
    flightlinkctl()?
        .arg("check-config")
        .arg(&path)
        .assert()
        .code(4)
        .stderr(predicate::str::contains("telemetry_update_frequency"));
    Ok(())
}

#[test]
fn test_check_config_missing_file_json_error() -> TestResult {
    let dir = TempDir::new()?;
    let output = flightlinkctl()?
        .args(["--json", "check-config"])
        .arg(dir.path().join("absent.yaml"))
        .output()?;
    assert_eq!(output.status.code(), Some(4));
    let json = stdout_json(&output)?;
    assert_eq!(json["success"], false);
    assert_eq!(json["error"]["type"], "InvalidConfiguration");
    Ok(())
}

#[test]
fn test_run_unknown_value_exit_code() -> TestResult {
    flightlinkctl()?
        .args(["run", "--deployment", "embedded", "--values", "Pitch,Altitude"])
        .timeout(Duration::from_secs(10))
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Altitude"));
    Ok(())
}

#[test]
fn test_run_missing_agent_program_exit_code() -> TestResult {
    let dir = TempDir::new()?;
    let path = write_config(
        &dir,
        "deployment: supervised\nagent:\n  program: /nonexistent/flightlink-agent\n",
    )?;
    flightlinkctl()?
        .args(["run", "--port", "0", "--config"])
        .arg(&path)
        .timeout(Duration::from_secs(10))
        .assert()
        .code(5)
        .stderr(predicate::str::contains("/nonexistent/flightlink-agent"));
    Ok(())
}

#[test]
fn test_run_embedded_streams_updates() -> TestResult {
    let output = flightlinkctl()?
        .args([
            "--json",
            "run",
            "--deployment",
            "embedded",
            "--count",
            "5",
            "--duration",
            "20",
            "--values",
            "RPM,SpeedKmh",
        ])
        .timeout(Duration::from_secs(30))
        .output()?;
    assert!(output.status.success());

    let lines: Vec<Value> = String::from_utf8(output.stdout)?
        .lines()
        .map(serde_json::from_str)
        .collect::<Result<_, _>>()?;
    let updates: Vec<&Value> = lines.iter().filter(|l| l["event"] == "update").collect();
    assert_eq!(updates.len(), 5);

    let sequences: Vec<u64> = updates
        .iter()
        .filter_map(|u| u["sequence"].as_u64())
        .collect();
    assert_eq!(sequences, [1, 2, 3, 4, 5]);
    for update in &updates {
        let rpm = update["values"]["RPM"].as_f64().ok_or("RPM missing")?;
        assert!(rpm > 10.0 && rpm < 40.0, "rpm {rpm}");
    }

    assert_eq!(lines.first().map(|l| &l["event"]), Some(&Value::from("started")));
    assert_eq!(lines.last().map(|l| &l["event"]), Some(&Value::from("stopped")));
    Ok(())
}
