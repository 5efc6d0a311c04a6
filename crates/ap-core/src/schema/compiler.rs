use std::collections::{BTreeSet, HashSet};

use serde_json::Value;

use super::tableschema::{TableDef, TableSchemaDescription};
use super::{CatalogSchema, ColumnSpec, ColumnType, ForeignKeySpec, KeySpec, TableSpec};
use crate::error::{ApError, Result};

/// Parse a raw JSON description, then [`compile`] it.
pub fn compile_value(raw: &Value, schema_name: &str) -> Result<CatalogSchema> {
    let description: TableSchemaDescription = serde_json::from_value(raw.clone())
        .map_err(|e| ApError::InvalidRequest(format!("invalid table schema description: {e}")))?;
    compile(&description, schema_name)
}

pub fn compile(description: &TableSchemaDescription, schema_name: &str) -> Result<CatalogSchema> {
    let mut seen = HashSet::new();
    let mut tables = Vec::with_capacity(description.resources.len());
    for tdef in &description.resources {
        if tdef.name.trim().is_empty() {
            return Err(ApError::InvalidRequest("table name must not be empty".into()));
        }
        if !seen.insert(tdef.name.as_str()) {
            return Err(ApError::InvalidRequest(format!(
                "table '{}' is defined more than once",
                tdef.name
            )));
        }
        tables.push(compile_table(tdef)?);
    }
    Ok(CatalogSchema {
        schema_name: schema_name.to_string(),
        tables,
    })
}

fn compile_table(tdef: &TableDef) -> Result<TableSpec> {
    let tname = tdef.name.as_str();

    let mut columns = Vec::with_capacity(tdef.fields.len());
    for field in &tdef.fields {
        if columns.iter().any(|c: &ColumnSpec| c.name == field.name) {
            return Err(ApError::InvalidRequest(format!(
                "table '{tname}' defines field '{}' more than once",
                field.name
            )));
        }
        let column_type = ColumnType::from_literal(&field.field_type)
            .ok_or_else(|| ApError::UnsupportedType(field.field_type.clone()))?;
        columns.push(ColumnSpec {
            name: field.name.clone(),
            column_type,
            nullok: !field.is_required(),
            comment: field.description.clone(),
        });
    }
    let has_column = |name: &str| columns.iter().any(|c| c.name == name);
    let check_columns = |cols: &[String], what: &str| -> Result<()> {
        if cols.is_empty() {
            return Err(ApError::InvalidRequest(format!(
                "table '{tname}' has an empty {what}"
            )));
        }
        match cols.iter().find(|c| !has_column(c.as_str())) {
            Some(missing) => Err(ApError::InvalidRequest(format!(
                "table '{tname}' {what} names unknown field '{missing}'"
            ))),
            None => Ok(()),
        }
    };

    // Keys: primary key first, then one per unique field whose field set is
    // not registered yet. Identity is the set of fields, not their order.
    let mut keys: Vec<KeySpec> = Vec::new();
    let mut registered: Vec<BTreeSet<String>> = Vec::new();
    let mut add_key = |cols: Vec<String>| {
        let set: BTreeSet<String> = cols.iter().cloned().collect();
        if registered.contains(&set) {
            return;
        }
        registered.push(set);
        keys.push(KeySpec {
            constraint_name: format!("{tname}_{}_key", cols.join("_")),
            columns: cols,
        });
    };
    if let Some(pk) = &tdef.primary_key {
        let pk = pk.to_vec();
        check_columns(&pk, "primary key")?;
        add_key(pk);
    }
    for field in tdef.fields.iter().filter(|f| f.is_unique()) {
        add_key(vec![field.name.clone()]);
    }

    let mut foreign_keys = Vec::with_capacity(tdef.foreign_keys.len());
    for fkdef in &tdef.foreign_keys {
        let local = fkdef.fields.to_vec();
        let referenced_columns = fkdef.reference.fields.to_vec();
        check_columns(&local, "foreign key")?;
        if local.len() != referenced_columns.len() {
            return Err(ApError::InvalidRequest(format!(
                "table '{tname}' foreign key ({}) references {} field(s) but declares {}",
                local.join(", "),
                referenced_columns.len(),
                local.len()
            )));
        }
        let referenced_table = if fkdef.reference.resource.is_empty() {
            tname.to_string()
        } else {
            fkdef.reference.resource.clone()
        };
        foreign_keys.push(ForeignKeySpec {
            constraint_name: format!("{tname}_{}_fkey", local.join("_")),
            columns: local,
            referenced_table,
            referenced_columns,
        });
    }

    Ok(TableSpec {
        name: tname.to_string(),
        comment: tdef.description.clone(),
        columns,
        keys,
        foreign_keys,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
