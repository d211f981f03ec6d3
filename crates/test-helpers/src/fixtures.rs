//! Raw frame and value set fixtures.

use flightlink_telemetry_core::{
    RawFrame, RawValue, Schema, TelemetryData, TelemetryField, WireType,
};

/// Builds `flight_status` frames one bound field at a time.
#[derive(Debug, Clone)]
pub struct FlightStatusFixture {
    schema: Schema,
    values: Vec<RawValue>,
}

impl Default for FlightStatusFixture {
    fn default() -> Self {
        Self::level_flight()
    }
}

impl FlightStatusFixture {
    /// All zeros except a simulation rate of 1.
    pub fn zeroed() -> Self {
        let schema = crate::must(Schema::flight_status());
        let values = schema
            .fields()
            .iter()
            .map(|field| match field.wire_type {
                WireType::Int32 => RawValue::Int32(1),
                WireType::Float32 => RawValue::Float32(0.0),
                WireType::String32 | WireType::String256 => RawValue::Text(String::new()),
            })
            .collect();
        Self { schema, values }
    }

    /// Cruise at 120 kt, wings level, 2400 rpm.
    pub fn level_flight() -> Self {
        Self::zeroed()
            .with(TelemetryField::Speed, 118.0)
            .with(TelemetryField::AirSpeedTrue, 120.0)
            .with(TelemetryField::Rpm, 2400.0)
            .with(TelemetryField::AngleOfAttack, 0.05)
    }

    /// Set the native field bound to `field` to a raw value.
    #[must_use]
    pub fn with(mut self, field: TelemetryField, raw: f32) -> Self {
        if let Some(spec) = self.schema.binding_for(field) {
            let ordinal = spec.ordinal;
            if let Some(slot) = self.values.get_mut(ordinal) {
                *slot = RawValue::Float32(raw);
            }
        }
        self
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn values(&self) -> Vec<RawValue> {
        self.values.clone()
    }

    /// # Panics
    ///
    /// Never for values built by this fixture.
    pub fn frame(&self) -> RawFrame {
        match RawFrame::from_values(&self.schema, self.values.clone()) {
            Ok(frame) => frame,
            Err(e) => panic!("fixture produced an invalid frame: {e}"),
        }
    }

    /// Packed bytes as the simulator would deliver them.
    ///
    /// # Panics
    ///
    /// Never for values built by this fixture.
    pub fn bytes(&self) -> Vec<u8> {
        match self.frame().encode(&self.schema) {
            Ok(bytes) => bytes,
            Err(e) => panic!("fixture failed to encode: {e}"),
        }
    }

    /// Unconverted value set, as forwarded in raw mode.
    pub fn raw_telemetry(&self) -> TelemetryData {
        self.frame().to_telemetry(&self.schema)
    }
}

/// Ten frames with raw RPM 0, 10, ..., 90.
pub fn rpm_ramp() -> Vec<FlightStatusFixture> {
    (0..10u8)
        .map(|step| FlightStatusFixture::zeroed().with(TelemetryField::Rpm, f32::from(step) * 10.0))
        .collect()
}
