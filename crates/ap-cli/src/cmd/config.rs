use std::path::Path;

use anyhow::Result;

use crate::output::print_yaml;

/// Validate the configuration and print it with defaults filled in.
/// Bearer tokens are masked.
pub fn run(config_path: Option<&Path>) -> Result<()> {
    let mut config = super::load_config(config_path)?;
    config.auth.tokens = config
        .auth
        .tokens
        .into_iter()
        .enumerate()
        .map(|(i, (_, identities))| (format!("<token {}>", i + 1), identities))
        .collect();
    print_yaml(&config)
}
