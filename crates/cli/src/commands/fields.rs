//! Value list command

use anyhow::Result;
use flightlink_relay::PROVIDER_NAME;
use flightlink_telemetry_core::{ComputedField, TelemetryField};
use serde::Serialize;

use crate::output;

/// One entry of the relay's value list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldInfo {
    pub name: &'static str,
    pub unit: &'static str,
    pub computed: bool,
}

pub fn execute(json: bool) -> Result<()> {
    output::print_fields(PROVIDER_NAME, &field_list(), json);
    Ok(())
}

/// Stored fields first, then computed ones, matching the provider's value list.
pub fn field_list() -> Vec<FieldInfo> {
    let stored = TelemetryField::ALL.iter().map(|field| FieldInfo {
        name: field.name(),
        unit: field.unit(),
        computed: false,
    });
    let computed = ComputedField::ALL.iter().map(|field| FieldInfo {
        name: field.name(),
        unit: computed_unit(*field),
        computed: true,
    });
    stored.chain(computed).collect()
}

fn computed_unit(field: ComputedField) -> &'static str {
    match field {
        ComputedField::AngleOfAttackEffective | ComputedField::AngleOfSideslipEffective => {
            TelemetryField::AngleOfAttack.unit()
        }
        ComputedField::SpeedKmh => "km/h",
    }
}
