//! Packed native frames.
//!
//! A raw frame is the fixed-layout struct the simulator hands back for one tick.
//! Fields are packed in ordinal order with no padding, numbers little-endian,
//! strings NUL-padded to their fixed width.

use serde::{Deserialize, Serialize};

use crate::contracts::TelemetryData;
use crate::error::SchemaError;
use crate::schema::{FieldSpec, Schema, WireType};

/// One decoded native value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Int32(i32),
    Float32(f32),
    Text(String),
}

impl RawValue {
    /// Numeric view of the value. Text has none.
    pub fn as_f32(&self) -> Option<f32> {
        match self {
            RawValue::Int32(v) => Some(*v as f32),
            RawValue::Float32(v) => Some(*v),
            RawValue::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            RawValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Whether the value can be marshalled as `wire_type`.
    pub fn fits(&self, wire_type: WireType) -> bool {
        matches!(
            (self, wire_type),
            (RawValue::Int32(_), WireType::Int32)
                | (RawValue::Float32(_), WireType::Float32)
                | (RawValue::Text(_), WireType::String32 | WireType::String256)
        )
    }
}

/// Values of one simulator tick, in schema ordinal order.
#[derive(Debug, Clone, PartialEq)]
pub struct RawFrame {
    values: Vec<RawValue>,
}

impl RawFrame {
    /// Decode a packed payload against `schema`.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::LayoutMismatch`] when the payload is not exactly
    /// `schema.frame_size()` bytes.
    pub fn decode(schema: &Schema, bytes: &[u8]) -> Result<Self, SchemaError> {
        let mismatch = || SchemaError::LayoutMismatch {
            schema: schema.name().to_string(),
            expected: schema.frame_size(),
            actual: bytes.len(),
        };
        if bytes.len() != schema.frame_size() {
            return Err(mismatch());
        }

        let mut values = Vec::with_capacity(schema.len());
        for field in schema.fields() {
            let end = field.offset + field.wire_type.size();
            let slot = bytes.get(field.offset..end).ok_or_else(mismatch)?;
            values.push(decode_value(field.wire_type, slot).ok_or_else(mismatch)?);
        }
        Ok(Self { values })
    }

    /// Build a frame from values already in ordinal order.
    ///
    /// # Errors
    ///
    /// Fails when the count or any value type disagrees with `schema`.
    pub fn from_values(schema: &Schema, values: Vec<RawValue>) -> Result<Self, SchemaError> {
        if values.len() != schema.len() {
            return Err(SchemaError::ValueCount {
                schema: schema.name().to_string(),
                expected: schema.len(),
                actual: values.len(),
            });
        }
        for (field, value) in schema.fields().iter().zip(&values) {
            if !value.fits(field.wire_type) {
                return Err(SchemaError::WireTypeMismatch {
                    field: field.native_name.clone(),
                    expected: field.wire_type,
                });
            }
        }
        Ok(Self { values })
    }

    /// Pack the frame into the layout described by `schema`.
    ///
    /// Strings longer than their slot are truncated so that a terminating NUL
    /// always fits.
    ///
    /// # Errors
    ///
    /// Fails when the frame was not built for `schema`.
    pub fn encode(&self, schema: &Schema) -> Result<Vec<u8>, SchemaError> {
        let checked = Self::from_values(schema, self.values.clone())?;
        let mut out = Vec::with_capacity(schema.frame_size());
        for (field, value) in schema.fields().iter().zip(&checked.values) {
            encode_value(field, value, &mut out);
        }
        Ok(out)
    }

    pub fn values(&self) -> &[RawValue] {
        &self.values
    }

    pub fn value(&self, ordinal: usize) -> Option<&RawValue> {
        self.values.get(ordinal)
    }

    /// Text value of the named native field.
    pub fn text<'a>(&'a self, schema: &Schema, native_name: &str) -> Option<&'a str> {
        schema
            .find(native_name)
            .and_then(|field| self.value(field.ordinal))
            .and_then(RawValue::as_text)
    }

    /// Map bound native fields positionally onto a value set, unconverted.
    ///
    /// Unbound fields are ignored; derived values without a bound field stay zero.
    pub fn to_telemetry(&self, schema: &Schema) -> TelemetryData {
        schema
            .fields()
            .iter()
            .filter_map(|field| {
                let binding = field.binding?;
                let value = self.value(field.ordinal)?.as_f32()?;
                Some((binding, value))
            })
            .fold(TelemetryData::new(), |data, (field, value)| {
                data.with(field, value)
            })
            .sanitized()
    }
}

fn decode_value(wire_type: WireType, slot: &[u8]) -> Option<RawValue> {
    match wire_type {
        WireType::Int32 => {
            let raw: [u8; 4] = slot.try_into().ok()?;
            Some(RawValue::Int32(i32::from_le_bytes(raw)))
        }
        WireType::Float32 => {
            let raw: [u8; 4] = slot.try_into().ok()?;
            Some(RawValue::Float32(f32::from_le_bytes(raw)))
        }
        WireType::String32 | WireType::String256 => {
            let end = slot.iter().position(|b| *b == 0).unwrap_or(slot.len());
            let text = slot.get(..end)?;
            Some(RawValue::Text(String::from_utf8_lossy(text).into_owned()))
        }
    }
}

fn encode_value(field: &FieldSpec, value: &RawValue, out: &mut Vec<u8>) {
    match value {
        RawValue::Int32(v) => out.extend_from_slice(&v.to_le_bytes()),
        RawValue::Float32(v) => out.extend_from_slice(&v.to_le_bytes()),
        RawValue::Text(s) => {
            let width = field.wire_type.size();
            let bytes = s.as_bytes();
            let take = bytes.len().min(width.saturating_sub(1));
            out.extend_from_slice(bytes.get(..take).unwrap_or_default());
            out.resize(out.len() + (width - take), 0);
        }
    }
}
