//! Named value lookup over a derived value set.
//!
//! Stored fields are resolved first, then computed fields. Anything else is a
//! caller error.

use std::fmt;

use crate::contracts::{TelemetryData, TelemetryField};
use crate::error::TelemetryError;

/// True airspeed at which effective incidence angles reach full weight.
pub const EFFECTIVE_ANGLE_REFERENCE_KT: f32 = 60.0;

const KNOTS_TO_KMH: f32 = 1.852;

/// Values derived on demand from stored fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComputedField {
    /// Angle of attack weighted by airspeed, so ground-roll noise fades out.
    AngleOfAttackEffective,
    AngleOfSideslipEffective,
    /// Ground speed in km/h.
    SpeedKmh,
}

impl ComputedField {
    pub const ALL: [ComputedField; 3] = [
        ComputedField::AngleOfAttackEffective,
        ComputedField::AngleOfSideslipEffective,
        ComputedField::SpeedKmh,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            ComputedField::AngleOfAttackEffective => "AngleOfAttackEffective",
            ComputedField::AngleOfSideslipEffective => "AngleOfSideslipEffective",
            ComputedField::SpeedKmh => "SpeedKmh",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|field| field.name() == name)
    }

    pub fn compute(self, data: &TelemetryData) -> f32 {
        match self {
            ComputedField::AngleOfAttackEffective => {
                data.angle_of_attack * airspeed_weight(data.air_speed_true)
            }
            ComputedField::AngleOfSideslipEffective => {
                data.angle_of_sideslip * airspeed_weight(data.air_speed_true)
            }
            ComputedField::SpeedKmh => data.speed * KNOTS_TO_KMH,
        }
    }
}

impl fmt::Display for ComputedField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn airspeed_weight(air_speed_true_kt: f32) -> f32 {
    let weight = air_speed_true_kt / EFFECTIVE_ANGLE_REFERENCE_KT;
    if weight.is_finite() {
        weight.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// A resolved value name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueSource {
    Stored(TelemetryField),
    Computed(ComputedField),
}

impl ValueSource {
    /// Resolve a name, stored fields taking precedence.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::UnknownField`] when the name matches neither kind.
    pub fn resolve(name: &str) -> Result<Self, TelemetryError> {
        if let Some(field) = TelemetryField::from_name(name) {
            return Ok(ValueSource::Stored(field));
        }
        ComputedField::from_name(name)
            .map(ValueSource::Computed)
            .ok_or_else(|| TelemetryError::unknown_field(name))
    }

    pub fn read(self, data: &TelemetryData) -> f32 {
        match self {
            ValueSource::Stored(field) => data.get(field),
            ValueSource::Computed(field) => field.compute(data),
        }
    }
}

impl TelemetryData {
    /// Look up a stored or computed value by name.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::UnknownField`] for names that are neither.
    pub fn lookup(&self, name: &str) -> Result<f32, TelemetryError> {
        ValueSource::resolve(name).map(|source| source.read(self))
    }
}

/// Every value name a consumer may query: stored fields, then computed ones.
pub fn value_names() -> Vec<&'static str> {
    TelemetryField::ALL
        .iter()
        .map(|field| field.name())
        .chain(ComputedField::ALL.iter().map(|field| field.name()))
        .collect()
}
