//! Supervisor for the out-of-process flightlink capture agent.
//!
//! The supervisor launches the agent as a child process, forwards its standard
//! streams into `tracing`, reaps it when it exits and kills it on shutdown.

#![deny(static_mut_refs)]

pub mod error;
pub mod supervisor;

pub use error::SupervisorError;
pub use supervisor::{AgentCommand, Supervisor};
