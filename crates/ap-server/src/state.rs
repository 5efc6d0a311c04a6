use std::sync::Arc;

use ap_core::store::ActionDb;
use ap_core::{io, ActionExecutor, ActionLifecycle, Collaborators, ServiceConfig};

use crate::auth::{IdentityProvider, TokenTable};
use crate::pool::WorkerPool;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServiceConfig>,
    pub lifecycle: ActionLifecycle,
    pub pool: WorkerPool,
    pub identities: Arc<dyn IdentityProvider>,
}

impl AppState {
    pub fn new(
        config: Arc<ServiceConfig>,
        lifecycle: ActionLifecycle,
        executor: ActionExecutor,
        identities: Arc<dyn IdentityProvider>,
    ) -> Self {
        let pool = WorkerPool::new(executor, config.max_workers);
        Self {
            config,
            lifecycle,
            pool,
            identities,
        }
    }

    /// Wire the production collaborators described by `config`.
    ///
    /// Prepares the data directory, opens the status database and builds the
    /// token table.
    pub fn from_config(config: Arc<ServiceConfig>) -> ap_core::Result<Self> {
        if config.clean_data_dir_on_start {
            io::reset_dir(&config.data_dir)?;
        } else {
            io::ensure_dir(&config.data_dir)?;
        }
        let store = Arc::new(ActionDb::open(&config.store_path)?);
        let lifecycle = ActionLifecycle::new(store, config.lifecycle_policy());
        let executor = ActionExecutor::new(
            lifecycle.clone(),
            config.clone(),
            Collaborators::from_config(&config),
        );
        let identities: Arc<dyn IdentityProvider> = Arc::new(TokenTable::from_config(&config.auth)?);
        tracing::info!(
            store = %config.store_path.display(),
            data_dir = %config.data_dir.display(),
            max_workers = config.max_workers,
            "action provider state ready"
        );
        Ok(Self::new(config, lifecycle, executor, identities))
    }
}
