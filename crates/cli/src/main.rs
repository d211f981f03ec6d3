//! flightlinkctl - flightlink relay host
//!
//! Runs the telemetry relay in the foreground and inspects what it exposes:
//! the value list, the native frame schemas and relay configuration files.

#![deny(static_mut_refs)]
#![deny(unused_must_use)]
#![deny(clippy::unwrap_used)]

mod commands;
mod error;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::commands::{CheckConfigArgs, RunArgs, SchemaKind};
use crate::error::CliError;

#[derive(Parser)]
#[command(name = "flightlinkctl")]
#[command(about = "flightlink telemetry relay host")]
#[command(version)]
#[command(long_about = "
flightlinkctl hosts the flightlink relay, which turns flight simulator frames
into named motion values (Pitch, Roll, Yaw, Surge, RPM, ...) at a fixed rate.

`run` starts the relay and prints updates until Ctrl-C. The other commands
inspect the value list, the native frame schemas and configuration files.
Use --json flag for machine-readable output suitable for scripting.
")]
struct Cli {
    /// Output format (human-readable or JSON)
    #[arg(
        long,
        global = true,
        help = "Output in JSON format for machine parsing"
    )]
    json: bool,

    /// Verbose logging
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the relay and print telemetry updates until Ctrl-C
    Run(RunArgs),

    /// List every value name the relay exposes
    Fields,

    /// Print a native frame schema
    Schema {
        /// Definition to print
        #[arg(value_enum, default_value_t = SchemaKind::FlightStatus)]
        definition: SchemaKind,
    },

    /// Validate a relay configuration file
    CheckConfig(CheckConfigArgs),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    // Logs go to stderr so `--json` output on stdout stays parseable.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("flightlink={}", log_level).into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    match execute_command(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if cli.json {
                output::print_error_json(&e);
            } else {
                output::print_error_human(&e);
            }
            ExitCode::from(e.downcast_ref::<CliError>().map_or(1, CliError::exit_code))
        }
    }
}

async fn execute_command(cli: &Cli) -> Result<()> {
    match &cli.command {
        Commands::Run(args) => commands::run::execute(args, cli.json).await,
        Commands::Fields => commands::fields::execute(cli.json),
        Commands::Schema { definition } => commands::schema::execute(*definition, cli.json),
        Commands::CheckConfig(args) => commands::config::execute(args, cli.json),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::DeploymentArg;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn parse_run_defaults() -> TestResult {
        let cli = Cli::try_parse_from(["flightlinkctl", "run"])?;
        assert!(!cli.json);
        assert_eq!(cli.verbose, 0);
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.every, 1);
                assert!(args.count.is_none());
                assert_eq!(args.values, ["Pitch", "Roll", "Yaw", "Speed", "RPM"]);
            }
            _ => panic!("expected run"),
        }
        Ok(())
    }

    #[test]
    fn parse_run_overrides() -> TestResult {
        let cli = Cli::try_parse_from([
            "flightlinkctl",
            "--json",
            "-vv",
            "run",
            "--deployment",
            "embedded",
            "--count",
            "5",
            "--values",
            "Surge,SpeedKmh",
        ])?;
        assert!(cli.json);
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.deployment, Some(DeploymentArg::Embedded));
                assert_eq!(args.count, Some(5));
                assert_eq!(args.values, ["Surge", "SpeedKmh"]);
            }
            _ => panic!("expected run"),
        }
        Ok(())
    }

    #[test]
    fn parse_every_rejects_zero() {
        assert!(Cli::try_parse_from(["flightlinkctl", "run", "--every", "0"]).is_err());
    }

    #[test]
    fn parse_schema_kind() -> TestResult {
        let cli = Cli::try_parse_from(["flightlinkctl", "schema", "aircraft-identity"])?;
        assert!(matches!(
            cli.command,
            Commands::Schema {
                definition: SchemaKind::AircraftIdentity
            }
        ));
        Ok(())
    }

    #[test]
    fn parse_check_config_requires_path() {
        assert!(Cli::try_parse_from(["flightlinkctl", "check-config"]).is_err());
    }
}
