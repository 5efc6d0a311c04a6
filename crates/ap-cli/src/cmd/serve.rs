use std::path::Path;
use std::sync::Arc;

use anyhow::Result;

pub fn run(config_path: Option<&Path>, listen: Option<String>) -> Result<()> {
    let mut config = super::load_config(config_path)?;
    if let Some(listen) = listen {
        config.listen = listen;
    }
    if config.auth.tokens.is_empty() {
        tracing::warn!("no auth tokens configured; every request will be rejected");
    }

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(ap_server::serve(Arc::new(config)))
}
