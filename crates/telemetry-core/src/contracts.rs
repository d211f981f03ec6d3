//! Derived telemetry value set shared by the capture agent and the relay.
//!
//! [`TelemetryData`] is the record that crosses the transport channel. Its serialized
//! form uses the host-facing value names (`Pitch`, `RPM`, ...); unknown keys are
//! ignored and missing keys default to zero so both ends can evolve independently.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Named telemetry values exposed to downstream consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TelemetryField {
    Pitch,
    Yaw,
    Roll,
    Heave,
    Sway,
    Surge,
    Speed,
    RollSpeed,
    YawSpeed,
    PitchSpeed,
    AirSpeedTrue,
    #[serde(rename = "RPM")]
    Rpm,
    AngleOfAttack,
    AngleOfSideslip,
}

impl TelemetryField {
    /// Every stored field, in value-list order.
    pub const ALL: [TelemetryField; 14] = [
        TelemetryField::Pitch,
        TelemetryField::Yaw,
        TelemetryField::Roll,
        TelemetryField::Heave,
        TelemetryField::Sway,
        TelemetryField::Surge,
        TelemetryField::Speed,
        TelemetryField::RollSpeed,
        TelemetryField::YawSpeed,
        TelemetryField::PitchSpeed,
        TelemetryField::AirSpeedTrue,
        TelemetryField::Rpm,
        TelemetryField::AngleOfAttack,
        TelemetryField::AngleOfSideslip,
    ];

    /// Host-facing value name.
    pub const fn name(self) -> &'static str {
        match self {
            TelemetryField::Pitch => "Pitch",
            TelemetryField::Yaw => "Yaw",
            TelemetryField::Roll => "Roll",
            TelemetryField::Heave => "Heave",
            TelemetryField::Sway => "Sway",
            TelemetryField::Surge => "Surge",
            TelemetryField::Speed => "Speed",
            TelemetryField::RollSpeed => "RollSpeed",
            TelemetryField::YawSpeed => "YawSpeed",
            TelemetryField::PitchSpeed => "PitchSpeed",
            TelemetryField::AirSpeedTrue => "AirSpeedTrue",
            TelemetryField::Rpm => "RPM",
            TelemetryField::AngleOfAttack => "AngleOfAttack",
            TelemetryField::AngleOfSideslip => "AngleOfSideslip",
        }
    }

    /// Resolve a host-facing value name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|field| field.name() == name)
    }

    /// Unit of the value after the `motion` conversion profile.
    pub const fn unit(self) -> &'static str {
        match self {
            TelemetryField::Pitch
            | TelemetryField::Yaw
            | TelemetryField::Roll
            | TelemetryField::AngleOfAttack
            | TelemetryField::AngleOfSideslip => "deg",
            TelemetryField::Heave | TelemetryField::Sway | TelemetryField::Surge => "g",
            TelemetryField::RollSpeed | TelemetryField::YawSpeed | TelemetryField::PitchSpeed => {
                "deg/s"
            }
            TelemetryField::Speed | TelemetryField::AirSpeedTrue => "kt",
            TelemetryField::Rpm => "rpm/100",
        }
    }
}

impl fmt::Display for TelemetryField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One derived value set. Immutable once built; a new one is produced per frame.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct TelemetryData {
    pub pitch: f32,
    pub yaw: f32,
    pub roll: f32,
    pub heave: f32,
    pub sway: f32,
    pub surge: f32,
    pub speed: f32,
    pub roll_speed: f32,
    pub yaw_speed: f32,
    pub pitch_speed: f32,
    pub air_speed_true: f32,
    #[serde(rename = "RPM")]
    pub rpm: f32,
    pub angle_of_attack: f32,
    pub angle_of_sideslip: f32,
}

impl TelemetryData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a stored field.
    pub fn get(&self, field: TelemetryField) -> f32 {
        match field {
            TelemetryField::Pitch => self.pitch,
            TelemetryField::Yaw => self.yaw,
            TelemetryField::Roll => self.roll,
            TelemetryField::Heave => self.heave,
            TelemetryField::Sway => self.sway,
            TelemetryField::Surge => self.surge,
            TelemetryField::Speed => self.speed,
            TelemetryField::RollSpeed => self.roll_speed,
            TelemetryField::YawSpeed => self.yaw_speed,
            TelemetryField::PitchSpeed => self.pitch_speed,
            TelemetryField::AirSpeedTrue => self.air_speed_true,
            TelemetryField::Rpm => self.rpm,
            TelemetryField::AngleOfAttack => self.angle_of_attack,
            TelemetryField::AngleOfSideslip => self.angle_of_sideslip,
        }
    }

    fn slot(&mut self, field: TelemetryField) -> &mut f32 {
        match field {
            TelemetryField::Pitch => &mut self.pitch,
            TelemetryField::Yaw => &mut self.yaw,
            TelemetryField::Roll => &mut self.roll,
            TelemetryField::Heave => &mut self.heave,
            TelemetryField::Sway => &mut self.sway,
            TelemetryField::Surge => &mut self.surge,
            TelemetryField::Speed => &mut self.speed,
            TelemetryField::RollSpeed => &mut self.roll_speed,
            TelemetryField::YawSpeed => &mut self.yaw_speed,
            TelemetryField::PitchSpeed => &mut self.pitch_speed,
            TelemetryField::AirSpeedTrue => &mut self.air_speed_true,
            TelemetryField::Rpm => &mut self.rpm,
            TelemetryField::AngleOfAttack => &mut self.angle_of_attack,
            TelemetryField::AngleOfSideslip => &mut self.angle_of_sideslip,
        }
    }

    /// Builder-style setter used while a value set is being assembled.
    #[must_use]
    pub fn with(mut self, field: TelemetryField, value: f32) -> Self {
        *self.slot(field) = value;
        self
    }

    /// Build a value set by applying `f` to every field.
    pub fn from_fn(mut f: impl FnMut(TelemetryField) -> f32) -> Self {
        let mut data = Self::default();
        for field in TelemetryField::ALL {
            *data.slot(field) = f(field);
        }
        data
    }

    /// Copy with every non-finite value replaced by zero.
    ///
    /// The wire format cannot carry NaN or infinities.
    #[must_use]
    pub fn sanitized(self) -> Self {
        Self::from_fn(|field| {
            let value = self.get(field);
            if value.is_finite() { value } else { 0.0 }
        })
    }

    /// Iterate `(field, value)` pairs in value-list order.
    pub fn iter(&self) -> impl Iterator<Item = (TelemetryField, f32)> + '_ {
        TelemetryField::ALL
            .into_iter()
            .map(move |field| (field, self.get(field)))
    }
}

/// The `current`/`previous` pair held by the relay.
///
/// Published behind an atomic pointer swap, so readers always see both values
/// from the same update.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TelemetrySnapshot {
    pub current: TelemetryData,
    pub previous: TelemetryData,
}

impl TelemetrySnapshot {
    /// Snapshot that results from receiving `next` after this one.
    #[must_use]
    pub fn advance(&self, next: TelemetryData) -> Self {
        Self {
            current: next,
            previous: self.current,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn test_field_names_round_trip() {
        for field in TelemetryField::ALL {
            assert_eq!(TelemetryField::from_name(field.name()), Some(field));
        }
        assert_eq!(TelemetryField::from_name("Rpm"), None);
        assert_eq!(TelemetryField::from_name("RPM"), Some(TelemetryField::Rpm));
    }

    #[test]
    fn test_serialized_names_match_value_names() -> TestResult {
        let data = TelemetryData::from_fn(|_| 1.5);
        let json = serde_json::to_value(data)?;
        let object = json.as_object().ok_or("expected a JSON object")?;
        assert_eq!(object.len(), TelemetryField::ALL.len());
        for field in TelemetryField::ALL {
            assert!(object.contains_key(field.name()), "missing {field}");
        }
        Ok(())
    }

    #[test]
    fn test_missing_fields_default_and_unknown_ignored() -> TestResult {
        let data: TelemetryData =
            serde_json::from_str(r#"{"Pitch": 12.5, "RPM": 42.0, "Altitude": 3000.0}"#)?;
        assert_eq!(data.pitch, 12.5);
        assert_eq!(data.rpm, 42.0);
        assert_eq!(data.roll, 0.0);
        assert_eq!(data.angle_of_sideslip, 0.0);
        Ok(())
    }

    #[test]
    fn test_sanitized_replaces_non_finite() {
        let data = TelemetryData::new()
            .with(TelemetryField::Pitch, f32::NAN)
            .with(TelemetryField::Roll, f32::INFINITY)
            .with(TelemetryField::Speed, 120.0)
            .sanitized();
        assert_eq!(data.pitch, 0.0);
        assert_eq!(data.roll, 0.0);
        assert_eq!(data.speed, 120.0);
    }

    #[test]
    fn test_snapshot_advance() {
        let first = TelemetryData::new().with(TelemetryField::Rpm, 10.0);
        let second = TelemetryData::new().with(TelemetryField::Rpm, 20.0);
        let snapshot = TelemetrySnapshot::default().advance(first).advance(second);
        assert_eq!(snapshot.current.rpm, 20.0);
        assert_eq!(snapshot.previous.rpm, 10.0);
    }
}
