use restore_driver::RestoreInvocation;

use super::{ActionExecutor, StepError, Target};
use crate::action::{ActionBody, ActionDetails};
use crate::catalog::catalog_link;
use crate::io;

/// File name of the downloaded backup inside the Action's staging directory.
pub const BACKUP_ARTIFACT: &str = "backup.zip";

pub(super) fn run(
    ex: &ActionExecutor,
    action_id: &str,
    body: &ActionBody,
    target: &Target,
) -> Result<ActionDetails, StepError> {
    let credential = ex.credential(&target.server)?;
    let url = body.data_url.as_deref().unwrap_or_default();
    let staging = ex.staging_dir(action_id);
    let artifact = staging.join(BACKUP_ARTIFACT);

    tracing::debug!(url, "downloading backup");
    ex.deps
        .source
        .download(url, &artifact)
        .map_err(|source| StepError::Download {
            url: url.to_string(),
            source,
        })?;

    let invocation = RestoreInvocation {
        credential,
        catalog_id: target.catalog_id,
        server: target.server.clone(),
        artifact,
    };
    let catalog_id = ex.deps.restore.restore(&invocation)?;
    tracing::info!(catalog_id, "catalog restored");

    if let Err(e) = io::remove_dir_if_exists(&staging) {
        tracing::warn!(error = %e, staging = %staging.display(), "could not remove backup");
    }

    Ok(ActionDetails::succeeded(
        "Catalog restore successful",
        catalog_id,
        catalog_link(&target.server, catalog_id),
    ))
}
