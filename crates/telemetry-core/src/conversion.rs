//! Conversion profiles from raw simulator units to consumer units.
//!
//! A profile is a pure function set over [`TelemetryData`]. The same profile runs
//! either inside the capture agent or inside the relay, depending on
//! [`ConversionSite`], so both deployment modes share one pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::contracts::{TelemetryData, TelemetryField};

/// Standard gravity in feet per second squared.
pub const STANDARD_GRAVITY_FPS2: f32 = 32.174_05;

/// Raw engine RPM is divided by this before it reaches consumers.
pub const RPM_SCALE: f32 = 100.0;

/// How raw values are turned into derived values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversionProfile {
    /// Degrees, g, knots and scaled RPM for motion platforms.
    #[default]
    Motion,
    /// Raw simulator units, unchanged.
    Passthrough,
}

impl ConversionProfile {
    pub const fn as_str(self) -> &'static str {
        match self {
            ConversionProfile::Motion => "motion",
            ConversionProfile::Passthrough => "passthrough",
        }
    }

    /// Apply the profile to a raw value set.
    ///
    /// The result never contains NaN or infinities.
    pub fn apply(self, raw: &TelemetryData) -> TelemetryData {
        match self {
            ConversionProfile::Passthrough => raw.sanitized(),
            ConversionProfile::Motion => {
                TelemetryData::from_fn(|field| motion_value(field, raw.get(field))).sanitized()
            }
        }
    }
}

impl fmt::Display for ConversionProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the conversion profile runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversionSite {
    /// The agent sends derived values; the relay only deserializes.
    #[default]
    Agent,
    /// The agent forwards raw values; the relay converts.
    Relay,
}

fn motion_value(field: TelemetryField, raw: f32) -> f32 {
    if !raw.is_finite() {
        return 0.0;
    }
    match field {
        TelemetryField::Pitch | TelemetryField::Roll => {
            reflect_angle(wrap_degrees(radians_to_degrees(raw)))
        }
        TelemetryField::Yaw => wrap_degrees(radians_to_degrees(raw)),
        TelemetryField::Heave | TelemetryField::Sway | TelemetryField::Surge => fps2_to_g(raw),
        TelemetryField::RollSpeed
        | TelemetryField::YawSpeed
        | TelemetryField::PitchSpeed
        | TelemetryField::AngleOfAttack
        | TelemetryField::AngleOfSideslip => radians_to_degrees(raw),
        TelemetryField::Speed | TelemetryField::AirSpeedTrue => raw,
        TelemetryField::Rpm => (raw / RPM_SCALE).max(0.0),
    }
}

pub fn radians_to_degrees(radians: f32) -> f32 {
    radians.to_degrees()
}

/// Wrap an angle into `(-180, 180]`.
pub fn wrap_degrees(degrees: f32) -> f32 {
    let wrapped = (degrees + 180.0).rem_euclid(360.0) - 180.0;
    if wrapped <= -180.0 { wrapped + 360.0 } else { wrapped }
}

/// Fold an angle in `(-180, 180]` into `[-90, 90]` by reflecting about ±90.
///
/// 135 maps to 45 and -135 maps to -45.
pub fn reflect_angle(degrees: f32) -> f32 {
    if degrees > 90.0 {
        180.0 - degrees
    } else if degrees < -90.0 {
        -180.0 - degrees
    } else {
        degrees
    }
}

pub fn fps2_to_g(fps2: f32) -> f32 {
    fps2 / STANDARD_GRAVITY_FPS2
}
