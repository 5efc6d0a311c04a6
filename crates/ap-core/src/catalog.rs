//! Catalog backend: creating catalogs, posting schemas, setting ACLs.
//!
//! [`ErmrestClient`] speaks the ERMrest HTTP API with a bearer credential.
//! Every non-2xx response surfaces as `ApError::Service`.

use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder, Response};
use serde_json::{json, Value};

use crate::action::{catalog_id_from_value, CatalogAcls};
use crate::error::{ApError, Result};

pub trait CatalogBackend: Send + Sync {
    /// Provision an empty catalog and return its numeric id.
    fn create_catalog(&self, server: &str, credential: &str) -> Result<i64>;

    /// Post a compiled schema document (see `CatalogSchema::to_ermrest`).
    fn apply_schema(&self, server: &str, credential: &str, catalog_id: i64, schema: &Value)
        -> Result<()>;

    /// Replace one named ACL on the catalog.
    fn set_acl(
        &self,
        server: &str,
        credential: &str,
        catalog_id: i64,
        name: &str,
        principals: &[String],
    ) -> Result<()>;

    fn apply_acls(&self, server: &str, credential: &str, catalog_id: i64, acls: &CatalogAcls)
        -> Result<()> {
        for (name, principals) in acls {
            self.set_acl(server, credential, catalog_id, name, principals)?;
        }
        Ok(())
    }
}

/// Browsable link to a table of a catalog.
pub fn recordset_link(server: &str, catalog_id: i64, schema_name: &str, table: &str) -> String {
    format!("https://{server}/chaise/recordset/#{catalog_id}/{schema_name}:{table}")
}

/// Link to the catalog itself, when no particular table is of interest.
pub fn catalog_link(server: &str, catalog_id: i64) -> String {
    format!("https://{server}/ermrest/catalog/{catalog_id}")
}

// ---------------------------------------------------------------------------
// ErmrestClient
// ---------------------------------------------------------------------------

/// Blocking ERMrest client.
///
/// The underlying HTTP client is built per call: a blocking client must not
/// be created or dropped on an async runtime thread, and this type is shared
/// with the server state.
pub struct ErmrestClient {
    timeout: Duration,
    scheme: &'static str,
}

impl ErmrestClient {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            scheme: "https",
        }
    }

    /// Talk plain HTTP; for local backends and tests.
    pub fn insecure(mut self) -> Self {
        self.scheme = "http";
        self
    }

    fn url(&self, server: &str, path: &str) -> String {
        format!("{}://{server}/ermrest/{path}", self.scheme)
    }

    fn http(&self) -> Result<Client> {
        Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| ApError::Service(format!("cannot build HTTP client: {e}")))
    }

    fn send(&self, what: &str, req: RequestBuilder) -> Result<Response> {
        let resp = req
            .send()
            .map_err(|e| ApError::Service(format!("{what}: {e}")))?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().unwrap_or_default();
        Err(ApError::Service(format!(
            "{what}: catalog server returned {status}: {}",
            body.trim()
        )))
    }
}

impl CatalogBackend for ErmrestClient {
    fn create_catalog(&self, server: &str, credential: &str) -> Result<i64> {
        let resp = self.send(
            "create catalog",
            self.http()?
                .post(self.url(server, "catalog"))
                .bearer_auth(credential),
        )?;
        let body: Value = resp
            .json()
            .map_err(|e| ApError::Service(format!("create catalog: unreadable response: {e}")))?;
        let id = catalog_id_from_value(&body["id"]).ok_or_else(|| {
            ApError::Service(format!("create catalog: response has no catalog id: {body}"))
        })?;
        tracing::info!(server, catalog_id = id, "catalog created");
        Ok(id)
    }

    fn apply_schema(&self, server: &str, credential: &str, catalog_id: i64, schema: &Value)
        -> Result<()> {
        self.send(
            "apply schema",
            self.http()?
                .post(self.url(server, &format!("catalog/{catalog_id}/schema")))
                .bearer_auth(credential)
                .json(schema),
        )?;
        tracing::debug!(server, catalog_id, "schema applied");
        Ok(())
    }

    fn set_acl(
        &self,
        server: &str,
        credential: &str,
        catalog_id: i64,
        name: &str,
        principals: &[String],
    ) -> Result<()> {
        self.send(
            "set acl",
            self.http()?
                .put(self.url(server, &format!("catalog/{catalog_id}/acl/{name}")))
                .bearer_auth(credential)
                .json(&json!(principals)),
        )?;
        tracing::debug!(server, catalog_id, acl = name, "acl set");
        Ok(())
    }
}
