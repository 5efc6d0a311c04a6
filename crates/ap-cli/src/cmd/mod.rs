pub mod compile;
pub mod config;
pub mod serve;

use std::path::Path;

use anyhow::{Context, Result};
use ap_core::ServiceConfig;

/// Load and validate the service configuration, or fall back to defaults.
pub fn load_config(path: Option<&Path>) -> Result<ServiceConfig> {
    match path {
        Some(path) => ServiceConfig::load(path)
            .with_context(|| format!("cannot load config from {}", path.display())),
        None => {
            let config = ServiceConfig::default();
            config.validate()?;
            Ok(config)
        }
    }
}
