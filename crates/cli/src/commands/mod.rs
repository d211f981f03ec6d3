//! Command implementations for flightlinkctl

pub mod config;
pub mod fields;
pub mod run;
pub mod schema;

use clap::{Args, ValueEnum};
use flightlink_relay::DeploymentMode;
use flightlink_telemetry_core::{Schema, SchemaError};
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Relay configuration file (YAML)
    #[arg(short, long, env = "FLIGHTLINK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Override the configured deployment mode
    #[arg(long, value_enum)]
    pub deployment: Option<DeploymentArg>,

    /// Override the configured listen port
    #[arg(long)]
    pub port: Option<u16>,

    /// Stop after this many updates
    #[arg(long)]
    pub count: Option<u64>,

    /// Stop after this many seconds
    #[arg(long)]
    pub duration: Option<u64>,

    /// Print every Nth update
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u64).range(1..))]
    pub every: u64,

    /// Comma-separated value names to print
    #[arg(long, value_delimiter = ',', default_values_t = run::DEFAULT_VALUES.map(String::from))]
    pub values: Vec<String>,
}

#[derive(Args, Debug)]
pub struct CheckConfigArgs {
    /// Configuration file to validate
    pub path: PathBuf,

    /// Print the effective configuration as YAML
    #[arg(long)]
    pub print: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum DeploymentArg {
    Supervised,
    Embedded,
    External,
}

impl From<DeploymentArg> for DeploymentMode {
    fn from(arg: DeploymentArg) -> Self {
        match arg {
            DeploymentArg::Supervised => DeploymentMode::Supervised,
            DeploymentArg::Embedded => DeploymentMode::Embedded,
            DeploymentArg::External => DeploymentMode::External,
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum SchemaKind {
    #[default]
    FlightStatus,
    AircraftIdentity,
}

impl SchemaKind {
    pub fn schema(self) -> Result<Schema, SchemaError> {
        match self {
            SchemaKind::FlightStatus => Schema::flight_status(),
            SchemaKind::AircraftIdentity => Schema::aircraft_identity(),
        }
    }
}
