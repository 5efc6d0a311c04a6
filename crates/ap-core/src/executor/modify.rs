use super::{ActionExecutor, StepError, Target};
use crate::action::{ActionBody, ActionDetails};
use crate::catalog::catalog_link;
use crate::error::ApError;

/// Apply the requested ACLs to an existing catalog.
pub(super) fn run(
    ex: &ActionExecutor,
    body: &ActionBody,
    target: &Target,
) -> Result<ActionDetails, StepError> {
    let catalog_id = target.catalog_id.ok_or_else(|| {
        StepError::Setup(ApError::InvalidRequest("modify requires a catalog_id".into()))
    })?;
    let credential = ex.credential(&target.server)?;
    let acls = body.catalog_acls.clone().unwrap_or_default();

    ex.deps
        .catalog
        .apply_acls(&target.server, &credential, catalog_id, &acls)
        .map_err(StepError::Modify)?;
    tracing::info!(catalog_id, acls = acls.len(), "catalog acls updated");

    Ok(ActionDetails::succeeded(
        "Catalog ACLs updated",
        catalog_id,
        catalog_link(&target.server, catalog_id),
    ))
}
