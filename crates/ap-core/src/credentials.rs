//! Catalog credentials.

use crate::error::{ApError, Result};

/// Source of the bearer credential used against a catalog server.
pub trait CredentialProvider: Send + Sync {
    fn credential_for(&self, server: &str) -> Result<String>;
}

/// Reads one token from an environment variable at call time, so a rotated
/// token is picked up without a restart.
#[derive(Debug, Clone)]
pub struct EnvCredentials {
    var: String,
}

impl EnvCredentials {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl CredentialProvider for EnvCredentials {
    fn credential_for(&self, server: &str) -> Result<String> {
        match std::env::var(&self.var) {
            Ok(token) if !token.trim().is_empty() => Ok(token.trim().to_string()),
            _ => Err(ApError::Service(format!(
                "no credential for {server}: environment variable {} is not set",
                self.var
            ))),
        }
    }
}

/// Fixed credential, for tests and single-tenant deployments.
#[derive(Debug, Clone)]
pub struct StaticCredential(pub String);

impl CredentialProvider for StaticCredential {
    fn credential_for(&self, _server: &str) -> Result<String> {
        Ok(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_variable_is_a_service_error() {
        let creds = EnvCredentials::new("CATALOG_AP_TEST_TOKEN_THAT_IS_NEVER_SET");
        let err = creds.credential_for("example.org").unwrap_err();
        assert!(matches!(err, ApError::Service(_)));
    }

    #[test]
    fn present_variable_is_trimmed() {
        std::env::set_var("CATALOG_AP_TEST_TOKEN_PRESENT", " abc \n");
        let creds = EnvCredentials::new("CATALOG_AP_TEST_TOKEN_PRESENT");
        assert_eq!(creds.credential_for("example.org").unwrap(), "abc");
    }
}
