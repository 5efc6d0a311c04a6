use serde_json::Value;

use super::{ActionExecutor, StepError, Target};
use crate::action::{ActionBody, ActionDetails};
use crate::catalog::recordset_link;
use crate::error::ApError;
use crate::{fetch, io, schema};

/// Download a bag, compile its Table Schema, and load it into a catalog.
///
/// Staged data is removed only on success so a failed ingest can be
/// inspected.
pub(super) fn run(
    ex: &ActionExecutor,
    action_id: &str,
    body: &ActionBody,
    target: &Target,
) -> Result<ActionDetails, StepError> {
    let credential = ex.credential(&target.server)?;
    let url = body.data_url.as_deref().unwrap_or_default();
    let staging = ex.staging_dir(action_id);

    tracing::debug!(url, "downloading dataset");
    let bag = fetch::stage_dataset(ex.deps.source.as_ref(), url, &staging).map_err(|source| {
        StepError::Download {
            url: url.to_string(),
            source,
        }
    })?;

    let schema_path = fetch::locate_schema_file(&bag).map_err(StepError::SchemaFile)?;
    let raw: Value = std::fs::read(&schema_path)
        .map_err(ApError::from)
        .and_then(|bytes| serde_json::from_slice(&bytes).map_err(ApError::from))
        .map_err(StepError::SchemaFile)?;
    let compiled =
        schema::compile_value(&raw, &ex.config.schema_name).map_err(StepError::SchemaFile)?;
    let Some(first_table) = compiled.tables.first().map(|t| t.name.clone()) else {
        return Err(StepError::SchemaFile(ApError::InvalidRequest(format!(
            "{} defines no tables",
            schema_path.display()
        ))));
    };

    let catalog = ex.deps.catalog.as_ref();
    let server = target.server.as_str();
    let catalog_id = match target.catalog_id {
        Some(id) => id,
        None => catalog
            .create_catalog(server, &credential)
            .map_err(StepError::Ingest)?,
    };
    catalog
        .apply_schema(server, &credential, catalog_id, &compiled.to_ermrest())
        .map_err(StepError::Ingest)?;
    let acls = body
        .catalog_acls
        .as_ref()
        .unwrap_or(&ex.config.default_acls);
    catalog
        .apply_acls(server, &credential, catalog_id, acls)
        .map_err(StepError::Ingest)?;
    tracing::info!(catalog_id, tables = compiled.tables.len(), "catalog populated");

    if let Err(e) = io::remove_dir_if_exists(&staging) {
        tracing::warn!(error = %e, staging = %staging.display(), "could not remove staged data");
    }

    Ok(ActionDetails::succeeded(
        "Catalog ingest successful",
        catalog_id,
        recordset_link(server, catalog_id, &compiled.schema_name, &first_table),
    ))
}
