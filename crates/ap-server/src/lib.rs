pub mod auth;
pub mod error;
pub mod pool;
pub mod routes;
pub mod state;

use std::sync::Arc;

use ap_core::ServiceConfig;
use axum::routing::{get, post};
use axum::{middleware, Router};
use tower_http::trace::TraceLayer;

pub use state::AppState;

/// Build the axum Router with all routes and middleware.
/// Used by `serve()` and available for integration testing.
pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/", get(routes::meta::describe))
        .route("/run", post(routes::actions::run))
        .route("/{action_id}/status", get(routes::actions::status))
        .route("/{action_id}/cancel", post(routes::actions::cancel))
        .route("/{action_id}/release", post(routes::actions::release))
        .route_layer(middleware::from_fn_with_state(
            app_state.identities.clone(),
            auth::auth_middleware,
        ))
        // Liveness stays outside authentication.
        .route("/ping", get(routes::meta::ping))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

/// Start the action provider on `config.listen`.
pub async fn serve(config: Arc<ServiceConfig>) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(&config.listen).await?;
    serve_on(config, listener).await
}

/// Start the action provider on a pre-bound listener.
///
/// Stops accepting requests on Ctrl-C, then waits for in-flight Actions to
/// reach a terminal status before returning.
pub async fn serve_on(
    config: Arc<ServiceConfig>,
    listener: tokio::net::TcpListener,
) -> anyhow::Result<()> {
    let app_state = AppState::from_config(config)?;
    let pool = app_state.pool.clone();
    let app = build_router(app_state);

    tracing::info!(addr = %listener.local_addr()?, "action provider listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    pool.drain().await;
    tracing::info!("action provider stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "cannot listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
