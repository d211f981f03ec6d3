//! Schema registry for native simulator fields.
//!
//! The simulator API returns data positionally: the order in which fields are
//! registered is the byte layout of every frame it delivers. A [`Schema`] is the
//! single source of truth for that layout. The capture agent registers exactly its
//! entries in ordinal order, hands the resulting [`FrameLayout`] to the simulator for
//! validation, and decodes frames against the packed offsets computed here.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use crate::contracts::TelemetryField;
use crate::error::SchemaError;

/// Primitive types the simulator can marshal into a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WireType {
    Int32,
    Float32,
    /// Fixed 32 byte, NUL padded ANSI string.
    String32,
    /// Fixed 256 byte, NUL padded ANSI string.
    String256,
}

impl WireType {
    /// Packed size of the value in a frame.
    pub const fn size(self) -> usize {
        match self {
            WireType::Int32 | WireType::Float32 => 4,
            WireType::String32 => 32,
            WireType::String256 => 256,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            WireType::Int32 => "INT32",
            WireType::Float32 => "FLOAT32",
            WireType::String32 => "STRING32",
            WireType::String256 => "STRING256",
        }
    }

    pub const fn is_text(self) -> bool {
        matches!(self, WireType::String32 | WireType::String256)
    }
}

impl fmt::Display for WireType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordinal position of a registered field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldHandle(usize);

impl FieldHandle {
    pub fn ordinal(self) -> usize {
        self.0
    }
}

/// One schema entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldSpec {
    pub native_name: String,
    pub unit: Option<String>,
    pub wire_type: WireType,
    pub ordinal: usize,
    /// Byte offset inside the packed frame.
    pub offset: usize,
    /// Derived value this native field feeds, if any.
    pub binding: Option<TelemetryField>,
}

/// Layout summary handed to the simulator when the frame struct is registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameLayout {
    pub field_count: usize,
    pub frame_size: usize,
    pub fingerprint: u32,
}

/// Declarative schema entry, registered through [`SchemaBuilder::register_entry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeField {
    pub native_name: &'static str,
    pub unit: Option<&'static str>,
    pub wire_type: WireType,
    pub binding: Option<TelemetryField>,
}

impl NativeField {
    pub const fn new(
        native_name: &'static str,
        unit: Option<&'static str>,
        wire_type: WireType,
    ) -> Self {
        Self {
            native_name,
            unit,
            wire_type,
            binding: None,
        }
    }

    /// Float field captured but not forwarded.
    pub const fn float(native_name: &'static str, unit: &'static str) -> Self {
        Self::new(native_name, Some(unit), WireType::Float32)
    }

    /// Float field feeding the derived value `binding`.
    pub const fn bound(
        native_name: &'static str,
        unit: &'static str,
        binding: TelemetryField,
    ) -> Self {
        Self {
            binding: Some(binding),
            ..Self::float(native_name, unit)
        }
    }
}

/// Per-frame flight dynamics, in marshalling order.
pub const FLIGHT_STATUS_FIELDS: &[NativeField] = &[
    NativeField::new("SIMULATION RATE", Some("number"), WireType::Int32),
    NativeField::bound("ACCELERATION BODY X", FPS2, TelemetryField::Sway),
    NativeField::bound("ACCELERATION BODY Y", FPS2, TelemetryField::Heave),
    NativeField::bound("ACCELERATION BODY Z", FPS2, TelemetryField::Surge),
    NativeField::bound("ROTATION VELOCITY BODY X", RAD_S, TelemetryField::PitchSpeed),
    NativeField::bound("ROTATION VELOCITY BODY Y", RAD_S, TelemetryField::YawSpeed),
    NativeField::bound("ROTATION VELOCITY BODY Z", RAD_S, TelemetryField::RollSpeed),
    NativeField::bound("PLANE PITCH DEGREES", "Radians", TelemetryField::Pitch),
    NativeField::bound("PLANE BANK DEGREES", "Radians", TelemetryField::Roll),
    NativeField::bound("PLANE HEADING DEGREES TRUE", "Radians", TelemetryField::Yaw),
    NativeField::float("PLANE HEADING DEGREES MAGNETIC", "Radians"),
    NativeField::float("GROUND ALTITUDE", "Meters"),
    NativeField::bound("GROUND VELOCITY", "Knots", TelemetryField::Speed),
    NativeField::float("AIRSPEED INDICATED", "Knots"),
    NativeField::bound("AIRSPEED TRUE", "Knots", TelemetryField::AirSpeedTrue),
    NativeField::float("VERTICAL SPEED", "Feet per minute"),
    NativeField::float("AMBIENT WIND VELOCITY", "Feet per second"),
    NativeField::float("AMBIENT WIND DIRECTION", "Degrees"),
    NativeField::bound("GENERAL ENG RPM:1", "Rpm", TelemetryField::Rpm),
    NativeField::bound("INCIDENCE ALPHA", "Radians", TelemetryField::AngleOfAttack),
    NativeField::bound("INCIDENCE BETA", "Radians", TelemetryField::AngleOfSideslip),
];

/// One-shot aircraft identification strings.
pub const AIRCRAFT_IDENTITY_FIELDS: &[NativeField] = &[
    NativeField::new("ATC TYPE", None, WireType::String32),
    NativeField::new("ATC MODEL", None, WireType::String32),
    NativeField::new("TITLE", None, WireType::String256),
];

const FPS2: &str = "Feet per second squared";
const RAD_S: &str = "Radians per second";

/// Incrementally declares the fields of a schema.
///
/// Fields must be registered in the order the simulator will marshal them;
/// `finalize` may be called exactly once.
#[derive(Debug)]
pub struct SchemaBuilder {
    name: String,
    fields: Vec<FieldSpec>,
    next_offset: usize,
    finalized: bool,
}

impl SchemaBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            next_offset: 0,
            finalized: false,
        }
    }

    /// Register a native field that is captured but not forwarded.
    ///
    /// # Errors
    ///
    /// Fails if the builder is finalized or the native name is already registered.
    pub fn register(
        &mut self,
        native_name: &str,
        unit: Option<&str>,
        wire_type: WireType,
    ) -> Result<FieldHandle, SchemaError> {
        self.push(native_name, unit, wire_type, None)
    }

    /// Register a native field that feeds the derived value `binding`.
    ///
    /// # Errors
    ///
    /// Fails if the builder is finalized, the native name is already registered,
    /// or another field already feeds `binding`.
    pub fn register_bound(
        &mut self,
        native_name: &str,
        unit: Option<&str>,
        wire_type: WireType,
        binding: TelemetryField,
    ) -> Result<FieldHandle, SchemaError> {
        if self.fields.iter().any(|f| f.binding == Some(binding)) {
            return Err(SchemaError::DuplicateBinding {
                schema: self.name.clone(),
                field: binding.name(),
            });
        }
        self.push(native_name, unit, wire_type, Some(binding))
    }

    /// Register a declarative entry, bound or not.
    ///
    /// # Errors
    ///
    /// Same as [`SchemaBuilder::register`] and [`SchemaBuilder::register_bound`].
    pub fn register_entry(&mut self, entry: &NativeField) -> Result<FieldHandle, SchemaError> {
        match entry.binding {
            Some(binding) => {
                self.register_bound(entry.native_name, entry.unit, entry.wire_type, binding)
            }
            None => self.register(entry.native_name, entry.unit, entry.wire_type),
        }
    }

    fn push(
        &mut self,
        native_name: &str,
        unit: Option<&str>,
        wire_type: WireType,
        binding: Option<TelemetryField>,
    ) -> Result<FieldHandle, SchemaError> {
        if self.finalized {
            return Err(SchemaError::AlreadyFinalized {
                schema: self.name.clone(),
            });
        }
        if self.fields.iter().any(|f| f.native_name == native_name) {
            return Err(SchemaError::DuplicateField {
                schema: self.name.clone(),
                field: native_name.to_string(),
            });
        }

        let handle = FieldHandle(self.fields.len());
        self.fields.push(FieldSpec {
            native_name: native_name.to_string(),
            unit: unit.map(str::to_string),
            wire_type,
            ordinal: handle.0,
            offset: self.next_offset,
            binding,
        });
        self.next_offset = self.next_offset.saturating_add(wire_type.size());
        Ok(handle)
    }

    /// Freeze the registered fields into a [`Schema`].
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::AlreadyFinalized`] on a second call and
    /// [`SchemaError::Empty`] if nothing was registered.
    pub fn finalize(&mut self) -> Result<Schema, SchemaError> {
        if self.finalized {
            return Err(SchemaError::AlreadyFinalized {
                schema: self.name.clone(),
            });
        }
        if self.fields.is_empty() {
            return Err(SchemaError::Empty {
                schema: self.name.clone(),
            });
        }
        self.finalized = true;
        Ok(Schema::from_fields(
            self.name.clone(),
            std::mem::take(&mut self.fields),
        ))
    }
}

/// Immutable, ordered declaration of native fields and their packed layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    name: String,
    fields: Vec<FieldSpec>,
    frame_size: usize,
    fingerprint: u32,
}

impl Schema {
    fn from_fields(name: String, fields: Vec<FieldSpec>) -> Self {
        let frame_size = fields.iter().map(|f| f.wire_type.size()).sum();
        let mut hasher = crc32fast::Hasher::new();
        for field in &fields {
            hasher.update(field.native_name.as_bytes());
            hasher.update(&[0]);
            hasher.update(field.wire_type.as_str().as_bytes());
            hasher.update(&[0]);
            hasher.update(field.unit.as_deref().unwrap_or("").as_bytes());
            hasher.update(&[0xff]);
        }
        Self {
            name,
            fields,
            frame_size,
            fingerprint: hasher.finalize(),
        }
    }

    /// Register `entries` in order on a fresh builder and finalize it.
    ///
    /// # Errors
    ///
    /// Fails on duplicate names or bindings, or when `entries` is empty.
    pub fn from_entries(name: &str, entries: &[NativeField]) -> Result<Self, SchemaError> {
        let mut builder = SchemaBuilder::new(name);
        for entry in entries {
            builder.register_entry(entry)?;
        }
        builder.finalize()
    }

    /// Per-frame flight dynamics used to drive a motion platform.
    ///
    /// # Errors
    ///
    /// Only if [`FLIGHT_STATUS_FIELDS`] stops being a valid registration sequence.
    pub fn flight_status() -> Result<Self, SchemaError> {
        Self::from_entries("flight_status", FLIGHT_STATUS_FIELDS)
    }

    /// One-shot aircraft identification strings.
    ///
    /// # Errors
    ///
    /// Only if [`AIRCRAFT_IDENTITY_FIELDS`] stops being a valid registration sequence.
    pub fn aircraft_identity() -> Result<Self, SchemaError> {
        Self::from_entries("aircraft_identity", AIRCRAFT_IDENTITY_FIELDS)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fields in ordinal order.
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Size of one packed frame in bytes.
    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// CRC32 over names, wire types and units in ordinal order.
    pub fn fingerprint(&self) -> u32 {
        self.fingerprint
    }

    pub fn layout(&self) -> FrameLayout {
        FrameLayout {
            field_count: self.fields.len(),
            frame_size: self.frame_size,
            fingerprint: self.fingerprint,
        }
    }

    pub fn field(&self, handle: FieldHandle) -> Option<&FieldSpec> {
        self.fields.get(handle.0)
    }

    /// Look up an entry by native name.
    pub fn find(&self, native_name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.native_name == native_name)
    }

    /// Entry feeding the given derived value.
    pub fn binding_for(&self, field: TelemetryField) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.binding == Some(field))
    }

    /// Derived values this schema can populate.
    pub fn bound_fields(&self) -> HashSet<TelemetryField> {
        self.fields.iter().filter_map(|f| f.binding).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn test_builder_assigns_ordinals_and_offsets() -> TestResult {
        let mut builder = SchemaBuilder::new("test");
        let rate = builder.register("SIMULATION RATE", Some("number"), WireType::Int32)?;
        let title = builder.register("TITLE", None, WireType::String256)?;
        let pitch = builder.register_bound(
            "PLANE PITCH DEGREES",
            Some("Radians"),
            WireType::Float32,
            TelemetryField::Pitch,
        )?;
        let schema = builder.finalize()?;

        assert_eq!(rate.ordinal(), 0);
        assert_eq!(title.ordinal(), 1);
        assert_eq!(pitch.ordinal(), 2);
        assert_eq!(schema.field(title).map(|f| f.offset), Some(4));
        assert_eq!(schema.field(pitch).map(|f| f.offset), Some(260));
        assert_eq!(schema.frame_size(), 264);
        assert_eq!(
            schema.binding_for(TelemetryField::Pitch).map(|f| f.ordinal),
            Some(2)
        );
        Ok(())
    }

    #[test]
    fn test_finalize_twice_fails() -> TestResult {
        let mut builder = SchemaBuilder::new("test");
        builder.register("GROUND VELOCITY", Some("Knots"), WireType::Float32)?;
        builder.finalize()?;

        assert!(matches!(
            builder.finalize(),
            Err(SchemaError::AlreadyFinalized { .. })
        ));
        assert!(matches!(
            builder.register("AIRSPEED TRUE", Some("Knots"), WireType::Float32),
            Err(SchemaError::AlreadyFinalized { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_empty_schema_rejected() {
        let mut builder = SchemaBuilder::new("empty");
        assert!(matches!(builder.finalize(), Err(SchemaError::Empty { .. })));
    }

    #[test]
    fn test_duplicates_rejected() -> TestResult {
        let mut builder = SchemaBuilder::new("dup");
        let speed = NativeField::bound("GROUND VELOCITY", "Knots", TelemetryField::Speed);
        builder.register_entry(&speed)?;
        assert!(matches!(
            builder.register("GROUND VELOCITY", Some("Knots"), WireType::Float32),
            Err(SchemaError::DuplicateField { .. })
        ));
        let rebound = NativeField::bound("AIRSPEED TRUE", "Knots", TelemetryField::Speed);
        assert!(matches!(
            builder.register_entry(&rebound),
            Err(SchemaError::DuplicateBinding { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_builtin_schemas_follow_their_tables() -> TestResult {
        for (schema, table) in [
            (Schema::flight_status()?, FLIGHT_STATUS_FIELDS),
            (Schema::aircraft_identity()?, AIRCRAFT_IDENTITY_FIELDS),
        ] {
            assert_eq!(schema.len(), table.len());
            for (spec, entry) in schema.fields().iter().zip(table) {
                assert_eq!(spec.native_name, entry.native_name);
                assert_eq!(spec.unit.as_deref(), entry.unit);
                assert_eq!(spec.wire_type, entry.wire_type);
                assert_eq!(spec.binding, entry.binding);
            }
        }
        Ok(())
    }

    #[test]
    fn test_from_entries_is_the_builder_path() -> TestResult {
        let mut builder = SchemaBuilder::new("flight_status");
        for entry in FLIGHT_STATUS_FIELDS {
            builder.register_entry(entry)?;
        }
        assert_eq!(builder.finalize()?, Schema::flight_status()?);

        let doubled = [FLIGHT_STATUS_FIELDS, FLIGHT_STATUS_FIELDS].concat();
        assert!(matches!(
            Schema::from_entries("doubled", &doubled),
            Err(SchemaError::DuplicateField { .. })
        ));
        assert!(matches!(
            Schema::from_entries("empty", &[]),
            Err(SchemaError::Empty { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_flight_status_binds_every_derived_value() -> TestResult {
        let schema = Schema::flight_status()?;
        assert_eq!(schema.len(), 21);
        assert_eq!(schema.frame_size(), 84);
        assert_eq!(schema.bound_fields().len(), TelemetryField::ALL.len());
        assert_eq!(
            schema.fields().first().map(|f| f.wire_type),
            Some(WireType::Int32)
        );
        Ok(())
    }

    #[test]
    fn test_fingerprint_tracks_order() -> TestResult {
        let mut a = SchemaBuilder::new("a");
        a.register("X", None, WireType::Float32)?;
        a.register("Y", None, WireType::Float32)?;
        let mut b = SchemaBuilder::new("b");
        b.register("Y", None, WireType::Float32)?;
        b.register("X", None, WireType::Float32)?;

        let a = a.finalize()?;
        let b = b.finalize()?;
        assert_eq!(a.frame_size(), b.frame_size());
        assert_ne!(a.fingerprint(), b.fingerprint());
        Ok(())
    }
}
