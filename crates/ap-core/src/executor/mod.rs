//! Runs one Job to completion.
//!
//! Every path through [`ActionExecutor::run`] ends in exactly one call to
//! `ActionLifecycle::complete`. Step failures are typed [`StepError`]s and
//! become the FAILED details; a failing terminal write goes to the
//! [`DiagnosticSink`] and the Action stays ACTIVE.

mod ingest;
mod modify;
mod restore;

use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use restore_driver::{RestoreError, RestoreInvocation, RestoreTool};
use thiserror::Error;

use crate::action::{ActionBody, ActionDetails, Operation};
use crate::catalog::{CatalogBackend, ErmrestClient};
use crate::config::ServiceConfig;
use crate::credentials::{CredentialProvider, EnvCredentials};
use crate::diagnostics::{DiagnosticSink, FileSink};
use crate::error::ApError;
use crate::fetch::{DatasetSource, HttpSource};
use crate::lifecycle::{ActionLifecycle, Job, Outcome};

// ---------------------------------------------------------------------------
// StepError
// ---------------------------------------------------------------------------

/// Failure of one stage of a Job; the Display text is what callers see in
/// the FAILED details.
#[derive(Debug, Error)]
pub enum StepError {
    #[error("Error in action setup: {0}")]
    Setup(#[source] ApError),

    #[error("Unable to obtain catalog credential: {0}")]
    Credential(#[source] ApError),

    #[error("Unable to download URL '{url}': {source}")]
    Download {
        url: String,
        #[source]
        source: ApError,
    },

    #[error("Could not process TableSchema file: {0}")]
    SchemaFile(#[source] ApError),

    #[error("Error ingesting into catalog: {0}")]
    Ingest(#[source] ApError),

    #[error("Error restoring catalog: {0}")]
    Restore(#[from] RestoreError),

    #[error("Error modifying catalog: {0}")]
    Modify(#[source] ApError),

    #[error("Internal error while executing action: {0}")]
    Panicked(String),
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

// ---------------------------------------------------------------------------
// Restore runner
// ---------------------------------------------------------------------------

/// Seam over the external restore tool.
pub trait RestoreRunner: Send + Sync {
    fn restore(&self, invocation: &RestoreInvocation) -> restore_driver::Result<i64>;
}

/// Locates the named program on each run, so the service can start before
/// the tool is installed.
pub struct RestoreCommand {
    program: String,
}

impl RestoreCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl RestoreRunner for RestoreCommand {
    fn restore(&self, invocation: &RestoreInvocation) -> restore_driver::Result<i64> {
        let tool = RestoreTool::locate(&self.program)?;
        restore_driver::restore(&tool, invocation)
    }
}

// ---------------------------------------------------------------------------
// ActionExecutor
// ---------------------------------------------------------------------------

/// External collaborators an executor talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub catalog: Arc<dyn CatalogBackend>,
    pub credentials: Arc<dyn CredentialProvider>,
    pub source: Arc<dyn DatasetSource>,
    pub restore: Arc<dyn RestoreRunner>,
    pub diagnostics: Arc<dyn DiagnosticSink>,
}

impl Collaborators {
    /// The production set: ERMrest over HTTPS, an env-var credential, HTTP
    /// downloads, the configured restore tool, and the diagnostic log file.
    pub fn from_config(config: &ServiceConfig) -> Self {
        Self {
            catalog: Arc::new(ErmrestClient::new(Duration::from_secs(120))),
            credentials: Arc::new(EnvCredentials::new(config.catalog_token_env.clone())),
            source: Arc::new(HttpSource::new(Duration::from_secs(3600))),
            restore: Arc::new(RestoreCommand::new(config.restore_tool.clone())),
            diagnostics: Arc::new(FileSink::new(config.diagnostic_log.clone())),
        }
    }
}

/// Catalog and server an operation acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Target {
    pub server: String,
    pub catalog_id: Option<i64>,
}

#[derive(Clone)]
pub struct ActionExecutor {
    lifecycle: ActionLifecycle,
    config: Arc<ServiceConfig>,
    deps: Collaborators,
}

impl ActionExecutor {
    pub fn new(lifecycle: ActionLifecycle, config: Arc<ServiceConfig>, deps: Collaborators) -> Self {
        Self {
            lifecycle,
            config,
            deps,
        }
    }

    /// Execute `job` and write its terminal status. Blocks on network and
    /// subprocess I/O; never returns an error.
    pub fn run(&self, job: Job) {
        let Job { lease, body } = job;
        let action_id = lease.action_id().to_string();
        let span = tracing::info_span!(
            "action",
            action_id = %action_id,
            operation = body.operation.as_str()
        );
        let _enter = span.enter();

        // A panicking step must still end in a terminal write while the lease is held.
        let result = panic::catch_unwind(AssertUnwindSafe(|| self.execute(&action_id, &body)))
            .unwrap_or_else(|payload| Err(StepError::Panicked(panic_message(payload.as_ref()))));
        let outcome = match result {
            Ok(details) => Outcome::Succeeded(details),
            Err(e) => {
                tracing::warn!(error = %e, "action failed");
                Outcome::Failed(e.to_string())
            }
        };
        let prior = match &outcome {
            Outcome::Failed(error) => Some(error.clone()),
            Outcome::Succeeded(_) => None,
        };
        if let Err(e) = self.lifecycle.complete(lease, outcome) {
            self.deps
                .diagnostics
                .record(&action_id, &e.to_string(), prior.as_deref());
        }
    }

    /// Record an Action whose execution unit was lost before it could write a
    /// terminal status.
    pub fn record_lost(&self, action_id: &str, error: &str) {
        self.deps.diagnostics.record(action_id, error, None);
    }

    fn execute(&self, action_id: &str, body: &ActionBody) -> Result<ActionDetails, StepError> {
        let target = resolve_target(&self.config, body).map_err(StepError::Setup)?;
        match body.operation {
            Operation::Ingest => ingest::run(self, action_id, body, &target),
            Operation::Restore => restore::run(self, action_id, body, &target),
            Operation::Modify => modify::run(self, body, &target),
        }
    }

    fn staging_dir(&self, action_id: &str) -> PathBuf {
        self.config.data_dir.join(action_id)
    }

    fn credential(&self, server: &str) -> Result<String, StepError> {
        self.deps
            .credentials
            .credential_for(server)
            .map_err(StepError::Credential)
    }
}

/// Resolve a known-catalog alias or numeric id, and the server to use.
pub(crate) fn resolve_target(config: &ServiceConfig, body: &ActionBody) -> Result<Target, ApError> {
    let requested_server = body.server.as_deref().map(str::trim).filter(|s| !s.is_empty());
    let Some(raw) = body.catalog_id.as_deref().map(str::trim) else {
        return Ok(Target {
            server: requested_server.unwrap_or(&config.default_server).to_string(),
            catalog_id: None,
        });
    };
    if let Ok(id) = raw.parse::<i64>() {
        return Ok(Target {
            server: requested_server.unwrap_or(&config.default_server).to_string(),
            catalog_id: Some(id),
        });
    }
    let known = config
        .known_catalogs
        .get(raw)
        .ok_or_else(|| ApError::InvalidRequest(format!("unknown catalog '{raw}'")))?;
    if let Some(server) = requested_server {
        if server != known.server {
            return Err(ApError::InvalidRequest(format!(
                "catalog '{raw}' is on server '{}', not '{server}'",
                known.server
            )));
        }
    }
    Ok(Target {
        server: known.server.clone(),
        catalog_id: Some(known.catalog_id),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
