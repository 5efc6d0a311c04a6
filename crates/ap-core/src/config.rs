use crate::action::CatalogAcls;
use crate::error::{ApError, Result};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// ProviderConfig
// ---------------------------------------------------------------------------

/// How the service describes itself on `GET /` and who may use it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default)]
    pub subtitle: String,
    #[serde(default = "default_all_authenticated")]
    pub visible_to: Vec<String>,
    #[serde(default = "default_all_authenticated")]
    pub runnable_by: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_contact: Option<String>,
}

fn default_title() -> String {
    "Catalog Ingest Action Provider".to_string()
}

fn default_all_authenticated() -> Vec<String> {
    vec![crate::auth::ALL_AUTHENTICATED_USERS.to_string()]
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            title: default_title(),
            subtitle: String::new(),
            visible_to: default_all_authenticated(),
            runnable_by: default_all_authenticated(),
            admin_contact: None,
        }
    }
}

// ---------------------------------------------------------------------------
// AuthConfig
// ---------------------------------------------------------------------------

/// Static bearer-token table: token → identities, primary identity first.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub tokens: BTreeMap<String, Vec<String>>,
}

// ---------------------------------------------------------------------------
// KnownCatalog
// ---------------------------------------------------------------------------

/// A catalog alias callers may use in place of a numeric id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnownCatalog {
    pub catalog_id: i64,
    pub server: String,
}

// ---------------------------------------------------------------------------
// ServiceConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_diagnostic_log")]
    pub diagnostic_log: PathBuf,
    #[serde(default = "default_clean_data_dir")]
    pub clean_data_dir_on_start: bool,
    #[serde(default = "default_server")]
    pub default_server: String,
    #[serde(default = "default_schema_name")]
    pub schema_name: String,
    #[serde(
        default = "default_release_after",
        with = "crate::duration::iso8601"
    )]
    pub default_release_after: Duration,
    #[serde(
        default = "default_estimated_runtime",
        with = "crate::duration::iso8601"
    )]
    pub estimated_runtime: Duration,
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    #[serde(default = "default_restore_tool")]
    pub restore_tool: String,
    #[serde(default = "default_token_env")]
    pub catalog_token_env: String,
    #[serde(default = "default_acls")]
    pub default_acls: CatalogAcls,
    #[serde(default)]
    pub known_catalogs: BTreeMap<String, KnownCatalog>,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

fn default_listen() -> String {
    "127.0.0.1:5000".to_string()
}

fn default_store_path() -> PathBuf {
    PathBuf::from("state/status.redb")
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("state/data")
}

fn default_diagnostic_log() -> PathBuf {
    PathBuf::from("state/ERROR.log")
}

fn default_clean_data_dir() -> bool {
    true
}

fn default_server() -> String {
    "demo.derivacloud.org".to_string()
}

fn default_schema_name() -> String {
    "CFDE".to_string()
}

fn default_release_after() -> Duration {
    Duration::days(30)
}

fn default_estimated_runtime() -> Duration {
    Duration::days(1)
}

fn default_max_workers() -> usize {
    4
}

fn default_restore_tool() -> String {
    "deriva-restore-cli".to_string()
}

fn default_token_env() -> String {
    "CATALOG_AP_TOKEN".to_string()
}

fn default_acls() -> CatalogAcls {
    let mut acls = CatalogAcls::new();
    acls.insert("owner".into(), Vec::new());
    acls.insert("select".into(), Vec::new());
    acls
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            store_path: default_store_path(),
            data_dir: default_data_dir(),
            diagnostic_log: default_diagnostic_log(),
            clean_data_dir_on_start: default_clean_data_dir(),
            default_server: default_server(),
            schema_name: default_schema_name(),
            default_release_after: default_release_after(),
            estimated_runtime: default_estimated_runtime(),
            max_workers: default_max_workers(),
            restore_tool: default_restore_tool(),
            catalog_token_env: default_token_env(),
            default_acls: default_acls(),
            known_catalogs: BTreeMap::new(),
            provider: ProviderConfig::default(),
            auth: AuthConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Load from a YAML file. Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Self::from_yaml(&data)
    }

    pub fn from_yaml(data: &str) -> Result<Self> {
        let config: ServiceConfig = serde_yaml::from_str(data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_workers == 0 {
            return Err(ApError::InvalidRequest(
                "config: max_workers must be at least 1".into(),
            ));
        }
        if self.schema_name.trim().is_empty() {
            return Err(ApError::InvalidRequest(
                "config: schema_name must not be empty".into(),
            ));
        }
        if self.default_release_after < Duration::zero() {
            return Err(ApError::InvalidRequest(
                "config: default_release_after must not be negative".into(),
            ));
        }
        for (token, identities) in &self.auth.tokens {
            if identities.is_empty() {
                return Err(ApError::InvalidRequest(format!(
                    "config: token '{}…' maps to no identities",
                    token.chars().take(4).collect::<String>()
                )));
            }
        }
        for (alias, known) in &self.known_catalogs {
            if known.server.trim().is_empty() {
                return Err(ApError::InvalidRequest(format!(
                    "config: known catalog '{alias}' has no server"
                )));
            }
        }
        Ok(())
    }

    pub fn lifecycle_policy(&self) -> crate::lifecycle::LifecyclePolicy {
        crate::lifecycle::LifecyclePolicy {
            default_release_after: self.default_release_after,
            estimated_runtime: self.estimated_runtime,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
