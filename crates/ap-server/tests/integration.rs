use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ap_core::catalog::CatalogBackend;
use ap_core::credentials::StaticCredential;
use ap_core::diagnostics::FileSink;
use ap_core::executor::RestoreCommand;
use ap_core::fetch::HttpSource;
use ap_core::store::ActionDb;
use ap_core::{ActionExecutor, ActionLifecycle, Collaborators, ServiceConfig};
use ap_server::auth::{IdentityProvider, TokenTable};
use ap_server::{build_router, AppState};
use axum::http::StatusCode;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const ALICE: &str = "alice-token";
const BOB: &str = "bob-token";

/// Catalog backend whose ACL writes block until the gate is opened, so a
/// test can observe an Action while it is still ACTIVE.
struct GatedCatalog {
    open: AtomicBool,
    acls: Mutex<Vec<(i64, String, Vec<String>)>>,
}

impl GatedCatalog {
    fn new(open: bool) -> Self {
        Self {
            open: AtomicBool::new(open),
            acls: Mutex::new(Vec::new()),
        }
    }

    fn open(&self) {
        self.open.store(true, Ordering::SeqCst);
    }
}

impl CatalogBackend for GatedCatalog {
    fn create_catalog(&self, _server: &str, _credential: &str) -> ap_core::Result<i64> {
        Ok(7)
    }

    fn apply_schema(
        &self,
        _server: &str,
        _credential: &str,
        _catalog_id: i64,
        _schema: &Value,
    ) -> ap_core::Result<()> {
        Ok(())
    }

    fn set_acl(
        &self,
        _server: &str,
        _credential: &str,
        catalog_id: i64,
        name: &str,
        principals: &[String],
    ) -> ap_core::Result<()> {
        while !self.open.load(Ordering::SeqCst) {
            std::thread::sleep(Duration::from_millis(10));
        }
        self.acls
            .lock()
            .unwrap()
            .push((catalog_id, name.to_string(), principals.to_vec()));
        Ok(())
    }
}

struct TestApp {
    router: axum::Router,
    state: AppState,
    catalog: Arc<GatedCatalog>,
    dir: TempDir,
}

/// Build the full router over a temp redb store and in-process collaborators.
fn test_app(gate_open: bool, configure: impl FnOnce(&mut ServiceConfig)) -> TestApp {
    let dir = TempDir::new().unwrap();
    let mut config = ServiceConfig::default();
    config.store_path = dir.path().join("status.redb");
    config.data_dir = dir.path().join("data");
    config.diagnostic_log = dir.path().join("ERROR.log");
    config
        .auth
        .tokens
        .insert(ALICE.into(), vec!["urn:id:alice".into(), "urn:group:lab".into()]);
    config.auth.tokens.insert(BOB.into(), vec!["urn:id:bob".into()]);
    configure(&mut config);
    let config = Arc::new(config);

    let store = Arc::new(ActionDb::open(&config.store_path).unwrap());
    let lifecycle = ActionLifecycle::new(store, config.lifecycle_policy());
    let catalog = Arc::new(GatedCatalog::new(gate_open));
    let deps = Collaborators {
        catalog: catalog.clone(),
        credentials: Arc::new(StaticCredential("catalog-token".into())),
        source: Arc::new(HttpSource::new(Duration::from_secs(5))),
        restore: Arc::new(RestoreCommand::new("catalog-ap-test-no-such-restore-tool")),
        diagnostics: Arc::new(FileSink::new(config.diagnostic_log.clone())),
    };
    let executor = ActionExecutor::new(lifecycle.clone(), config.clone(), deps);
    let identities: Arc<dyn IdentityProvider> =
        Arc::new(TokenTable::from_config(&config.auth).unwrap());
    let state = AppState::new(config, lifecycle, executor, identities);

    TestApp {
        router: build_router(state.clone()),
        state,
        catalog,
        dir,
    }
}

async fn send(app: axum::Router, req: axum::http::Request<axum::body::Body>) -> (StatusCode, Value) {
    let response = app.oneshot(req).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

/// Send an authenticated GET via `oneshot` and return (status, parsed JSON body).
async fn get(app: axum::Router, uri: &str, token: &str) -> (StatusCode, Value) {
    let req = axum::http::Request::builder()
        .uri(uri)
        .header("authorization", format!("Bearer {token}"))
        .body(axum::body::Body::empty())
        .unwrap();
    send(app, req).await
}

/// Send an authenticated POST with a JSON body and return (status, parsed JSON body).
async fn post_json(app: axum::Router, uri: &str, token: &str, body: Value) -> (StatusCode, Value) {
    let req = axum::http::Request::builder()
        .method("POST")
        .uri(uri)
        .header("authorization", format!("Bearer {token}"))
        .header("content-type", "application/json")
        .body(axum::body::Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap();
    send(app, req).await
}

async fn post(app: axum::Router, uri: &str, token: &str) -> (StatusCode, Value) {
    post_json(app, uri, token, Value::Null).await
}

fn modify_request(request_id: &str) -> Value {
    json!({
        "request_id": request_id,
        "body": {
            "operation": "modify",
            "catalog_id": "5",
            "catalog_acls": { "owner": ["urn:id:alice"] }
        }
    })
}

// ---------------------------------------------------------------------------
// Meta
// ---------------------------------------------------------------------------

#[tokio::test]
async fn ping_needs_no_token() {
    let app = test_app(true, |_| {});
    let req = axum::http::Request::builder()
        .uri("/ping")
        .body(axum::body::Body::empty())
        .unwrap();
    let (status, body) = send(app.router, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
}

#[tokio::test]
async fn missing_token_is_401() {
    let app = test_app(true, |_| {});
    let req = axum::http::Request::builder()
        .uri("/some-action/status")
        .body(axum::body::Body::empty())
        .unwrap();
    let (status, body) = send(app.router, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthorized");

    let (status, _) = get(test_app(true, |_| {}).router, "/", "stolen-token").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn description_is_visible_to_all_authenticated_users() {
    let app = test_app(true, |c| c.provider.title = "Test Provider".into());
    let (status, body) = get(app.router, "/", BOB).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["title"], "Test Provider");
    assert_eq!(body["synchronous"], false);
    assert_eq!(body["types"], json!(["Action"]));
    assert!(body["input_schema"]["properties"]["operation"].is_object());
}

#[tokio::test]
async fn description_hidden_from_outsiders() {
    let app = test_app(true, |c| c.provider.visible_to = vec!["urn:group:lab".into()]);
    let (status, _) = get(app.router.clone(), "/", ALICE).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = get(app.router, "/", BOB).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(body["error"].as_str().unwrap().contains("urn:id:bob"));
}

// ---------------------------------------------------------------------------
// Run / status
// ---------------------------------------------------------------------------

#[tokio::test]
async fn run_modify_then_status_succeeds() {
    let app = test_app(true, |_| {});
    let (status, action) = post_json(app.router.clone(), "/run", ALICE, modify_request("r1")).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(action["status"], "ACTIVE");
    assert_eq!(action["creator_id"], "urn:id:alice");
    let action_id = action["action_id"].as_str().unwrap().to_string();

    app.state.pool.drain().await;
    assert_eq!(app.state.pool.in_flight().await, 0);

    let (status, action) = get(app.router, &format!("/{action_id}/status"), ALICE).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(action["status"], "SUCCEEDED");
    assert_eq!(action["details"]["catalog_id"], 5);
    assert_eq!(
        app.catalog.acls.lock().unwrap().as_slice(),
        &[(5, "owner".to_string(), vec!["urn:id:alice".to_string()])]
    );
}

#[tokio::test]
async fn replay_returns_the_original_action() {
    let app = test_app(true, |_| {});
    let (first_status, first) = post_json(app.router.clone(), "/run", ALICE, modify_request("r1")).await;
    assert_eq!(first_status, StatusCode::ACCEPTED);

    // The body of a replay is not looked at.
    let replay = json!({ "request_id": "r1", "body": { "operation": "nonsense" } });
    let (status, second) = post_json(app.router, "/run", ALICE, replay).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["action_id"], first["action_id"]);
    app.state.pool.drain().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_duplicate_runs_create_one_action() {
    let app = test_app(true, |_| {});
    let (a, b) = tokio::join!(
        post_json(app.router.clone(), "/run", ALICE, modify_request("r1")),
        post_json(app.router.clone(), "/run", ALICE, modify_request("r1")),
    );
    let mut statuses = vec![a.0, b.0];
    statuses.sort();
    assert_eq!(statuses, vec![StatusCode::OK, StatusCode::ACCEPTED]);
    assert_eq!(a.1["action_id"], b.1["action_id"]);

    app.state.pool.drain().await;
    assert_eq!(app.catalog.acls.lock().unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn abandoned_run_request_still_executes() {
    let app = test_app(true, |_| {});
    // The client gives up almost immediately; whatever was stored must still run.
    let _ = tokio::time::timeout(
        Duration::from_micros(50),
        post_json(app.router.clone(), "/run", ALICE, modify_request("r-abandoned")),
    )
    .await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let (status, action) =
        post_json(app.router.clone(), "/run", ALICE, modify_request("r-abandoned")).await;
    assert!(
        status == StatusCode::OK || status == StatusCode::ACCEPTED,
        "{status} {action}"
    );
    let action_id = action["action_id"].as_str().unwrap().to_string();

    let mut last = Value::Null;
    for _ in 0..250 {
        app.state.pool.drain().await;
        let (_, current) = get(app.router.clone(), &format!("/{action_id}/status"), ALICE).await;
        if current["status"] == "SUCCEEDED" {
            last = current;
            break;
        }
        last = current;
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(last["status"], "SUCCEEDED", "{last}");
    assert_eq!(app.catalog.acls.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn run_restricted_by_runnable_by() {
    let app = test_app(true, |c| c.provider.runnable_by = vec!["urn:id:alice".into()]);
    let (status, _) = post_json(app.router, "/run", BOB, modify_request("r1")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn malformed_run_requests_are_400() {
    let app = test_app(true, |_| {});
    let (status, body) = post_json(app.router.clone(), "/run", ALICE, json!({ "body": {} })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let no_acls = json!({
        "request_id": "r2",
        "body": { "operation": "modify", "catalog_id": 5 }
    });
    let (status, _) = post_json(app.router.clone(), "/run", ALICE, no_acls).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let unknown_field = json!({
        "request_id": "r3",
        "body": { "operation": "ingest", "data_url": "https://h/x.tar", "colour": "blue" }
    });
    let (status, _) = post_json(app.router, "/run", ALICE, unknown_field).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn status_requires_monitor_rights() {
    let app = test_app(true, |_| {});
    let (_, action) = post_json(app.router.clone(), "/run", ALICE, modify_request("r1")).await;
    let action_id = action["action_id"].as_str().unwrap().to_string();
    app.state.pool.drain().await;

    let (status, _) = get(app.router.clone(), &format!("/{action_id}/status"), BOB).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = get(app.router, "/no-such-action/status", ALICE).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn monitor_by_override_grants_status() {
    let app = test_app(true, |_| {});
    let mut request = modify_request("r1");
    request["monitor_by"] = json!(["urn:id:bob"]);
    let (_, action) = post_json(app.router.clone(), "/run", ALICE, request).await;
    let action_id = action["action_id"].as_str().unwrap().to_string();
    app.state.pool.drain().await;

    let (status, action) = get(app.router, &format!("/{action_id}/status"), BOB).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(action["status"], "SUCCEEDED");
}

// ---------------------------------------------------------------------------
// Failures reported through status
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unreachable_dataset_fails_the_action() {
    let app = test_app(true, |_| {});
    let request = json!({
        "request_id": "r1",
        "body": { "operation": "ingest", "data_url": "ftp://example.org/bag.tar" }
    });
    let (status, action) = post_json(app.router.clone(), "/run", ALICE, request).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let action_id = action["action_id"].as_str().unwrap().to_string();
    app.state.pool.drain().await;

    let (_, action) = get(app.router, &format!("/{action_id}/status"), ALICE).await;
    assert_eq!(action["status"], "FAILED");
    let error = action["details"]["error"].as_str().unwrap();
    assert!(error.contains("Unable to download URL"), "{error}");
}

#[tokio::test]
async fn missing_restore_tool_fails_the_action() {
    let app = test_app(true, |_| {});
    let backup = app.dir.path().join("backup.zip");
    std::fs::write(&backup, b"not really a zip").unwrap();
    let request = json!({
        "request_id": "r1",
        "body": { "operation": "restore", "data_url": format!("file://{}", backup.display()) }
    });
    let (_, action) = post_json(app.router.clone(), "/run", ALICE, request).await;
    let action_id = action["action_id"].as_str().unwrap().to_string();
    app.state.pool.drain().await;

    let (_, action) = get(app.router, &format!("/{action_id}/status"), ALICE).await;
    assert_eq!(action["status"], "FAILED");
    let error = action["details"]["error"].as_str().unwrap();
    assert!(error.contains("Error restoring catalog"), "{error}");
}

// ---------------------------------------------------------------------------
// Cancel / release
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn release_follows_the_state_machine() {
    let app = test_app(false, |_| {});
    let (status, action) = post_json(app.router.clone(), "/run", ALICE, modify_request("r1")).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let action_id = action["action_id"].as_str().unwrap().to_string();

    // Still running: release is refused, cancel is accepted and changes nothing.
    let (status, _) = post(app.router.clone(), &format!("/{action_id}/release"), ALICE).await;
    assert_eq!(status, StatusCode::CONFLICT);
    let (status, action) = post(app.router.clone(), &format!("/{action_id}/cancel"), ALICE).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(action["status"], "ACTIVE");
    let (status, _) = post(app.router.clone(), &format!("/{action_id}/cancel"), BOB).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    app.catalog.open();
    app.state.pool.drain().await;

    let (status, action) = post(app.router.clone(), &format!("/{action_id}/cancel"), ALICE).await;
    assert_eq!(status, StatusCode::CONFLICT, "{action}");

    let (status, action) = post(app.router.clone(), &format!("/{action_id}/release"), ALICE).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(action["status"], "SUCCEEDED");

    let (status, _) = get(app.router.clone(), &format!("/{action_id}/status"), ALICE).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = post(app.router, &format!("/{action_id}/release"), ALICE).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn released_request_id_can_be_reused() {
    let app = test_app(true, |_| {});
    let (_, first) = post_json(app.router.clone(), "/run", ALICE, modify_request("r1")).await;
    let first_id = first["action_id"].as_str().unwrap().to_string();
    app.state.pool.drain().await;
    let (status, _) = post(app.router.clone(), &format!("/{first_id}/release"), ALICE).await;
    assert_eq!(status, StatusCode::OK);

    let (status, second) = post_json(app.router, "/run", ALICE, modify_request("r1")).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_ne!(second["action_id"], first["action_id"]);
    app.state.pool.drain().await;
}
