//! Relay consumer for flightlink.
//!
//! The relay receives value sets from the capture agent, optionally converts them,
//! throttles emission to the configured rate, tracks liveness and republishes
//! every set as a [`TelemetryUpdate`]. [`TelemetryProvider`] is the host surface:
//! `init`, `start`, `stop`, `value_list`, `lookup` and update subscriptions.
//!
//! ```rust,ignore
//! use flightlink_relay::{RelayConfig, TelemetryProvider};
//!
//! let mut provider = TelemetryProvider::new();
//! provider.init(RelayConfig::load("flightlink.yaml")?)?;
//! let updates = provider.subscribe();
//! provider.start()?;
//! for update in updates.iter() {
//!     println!("pitch {:.1}", update.lookup("Pitch")?);
//! }
//! ```

#![deny(static_mut_refs)]

pub mod config;
pub mod error;
pub mod launcher;
pub mod provider;
mod worker;

pub use config::{ConversionConfig, DeploymentMode, RelayConfig, SimulatorConfig};
pub use error::{ConfigError, RelayError};
pub use launcher::{AgentLauncher, EmbeddedAgent};
pub use provider::{PROVIDER_NAME, TelemetryProvider, UPDATE_CHANNEL_CAPACITY};
pub use worker::{RelayStats, TelemetryUpdate};
