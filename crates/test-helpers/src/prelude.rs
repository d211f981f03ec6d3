//! Convenience re-exports for common test utilities.

pub use crate::fixtures::{FlightStatusFixture, rpm_ramp};
pub use crate::must::{must, must_some, must_with};
pub use crate::net::free_loopback_addr;
pub use crate::{init_test_tracing, wait_for};

pub type TestResult = Result<(), Box<dyn std::error::Error>>;
