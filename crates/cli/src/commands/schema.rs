//! Native schema listing

use anyhow::Result;

use crate::commands::SchemaKind;
use crate::output;

pub fn execute(kind: SchemaKind, json: bool) -> Result<()> {
    output::print_schema(&kind.schema()?, json);
    Ok(())
}
