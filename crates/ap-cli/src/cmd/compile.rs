use std::path::Path;

use anyhow::{Context, Result};
use serde_json::Value;

use crate::output::print_json;

/// Print the ERMrest schema document compiled from a Table Schema file.
pub fn run(config_path: Option<&Path>, file: &Path, schema_name: Option<&str>) -> Result<()> {
    let config = super::load_config(config_path)?;
    let schema_name = schema_name.unwrap_or(&config.schema_name);

    let data = std::fs::read(file).with_context(|| format!("cannot read {}", file.display()))?;
    let raw: Value = serde_json::from_slice(&data)
        .with_context(|| format!("{} is not valid JSON", file.display()))?;
    let compiled = ap_core::schema::compile_value(&raw, schema_name)?;
    tracing::debug!(tables = compiled.tables.len(), "schema compiled");

    print_json(&compiled.to_ermrest())
}
