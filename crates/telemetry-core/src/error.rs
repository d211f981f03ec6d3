//! Error types for schema handling and telemetry value access.

use thiserror::Error;

use crate::schema::WireType;

/// Errors raised while building a schema or marshalling frames against it.
///
/// Everything except [`SchemaError::LayoutMismatch`] indicates a defect in the
/// code that declares or uses the schema and must not be retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// `finalize` (or `register`) was called on a builder that was already finalized.
    #[error("Schema '{schema}' has already been finalized")]
    AlreadyFinalized {
        /// Schema name.
        schema: String,
    },

    /// A schema must declare at least one field.
    #[error("Schema '{schema}' declares no fields")]
    Empty {
        /// Schema name.
        schema: String,
    },

    /// The same native field was registered twice.
    #[error("Schema '{schema}' already contains native field '{field}'")]
    DuplicateField {
        /// Schema name.
        schema: String,
        /// Native field name.
        field: String,
    },

    /// Two native fields were bound to the same derived value.
    #[error("Schema '{schema}' binds '{field}' more than once")]
    DuplicateBinding {
        /// Schema name.
        schema: String,
        /// Derived field name.
        field: &'static str,
    },

    /// A frame payload does not have the size the schema layout requires.
    #[error("Frame for schema '{schema}' has {actual} bytes, layout requires {expected}")]
    LayoutMismatch {
        /// Schema name.
        schema: String,
        /// Packed frame size of the schema.
        expected: usize,
        /// Size of the payload received.
        actual: usize,
    },

    /// A value handed to the encoder does not match the field's wire type.
    #[error("Value for '{field}' does not match wire type {expected}")]
    WireTypeMismatch {
        /// Native field name.
        field: String,
        /// Wire type declared by the schema.
        expected: WireType,
    },

    /// The encoder received a different number of values than the schema declares.
    #[error("Expected {expected} values for schema '{schema}', got {actual}")]
    ValueCount {
        /// Schema name.
        schema: String,
        /// Number of declared fields.
        expected: usize,
        /// Number of values supplied.
        actual: usize,
    },
}

impl SchemaError {
    /// Whether the error describes a payload that is merely not ready yet
    /// (and can be dropped) rather than a contract violation.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, SchemaError::LayoutMismatch { .. })
    }
}

/// Errors surfaced to telemetry consumers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TelemetryError {
    /// The requested name is neither a stored nor a computed telemetry value.
    #[error("Unknown telemetry value: {0}")]
    UnknownField(String),

    /// Schema or frame marshalling failure.
    #[error(transparent)]
    Schema(#[from] SchemaError),
}

impl TelemetryError {
    /// Create an unknown field error.
    #[must_use]
    pub fn unknown_field(name: impl Into<String>) -> Self {
        Self::UnknownField(name.into())
    }
}
