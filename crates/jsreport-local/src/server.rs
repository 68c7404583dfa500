//! Axum server setup and router construction.

use std::net::SocketAddr;

use axum::Router;
use axum::middleware;
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::api::{self, AppState};

/// Build the full axum router.
///
/// Routes:
/// - `POST /api/report`
/// - `GET /api/recipe`, `GET /api/engine`, `GET /api/version`
///
/// All of them sit behind the Basic-auth gate.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/report", post(api::post_report))
        .route("/api/recipe", get(api::get_recipes))
        .route("/api/engine", get(api::get_engines))
        .route("/api/version", get(api::get_version))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            api::require_auth,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind `bind_addr` and serve `router` on a Tokio task until `shutdown`
/// fires. Returns the bound address and the task handle.
pub async fn start_server(
    router: Router,
    bind_addr: SocketAddr,
    shutdown: oneshot::Receiver<()>,
) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
    let listener = TcpListener::bind(bind_addr).await?;
    let addr = listener.local_addr()?;
    info!("jsreport-local listening on http://{addr}");

    let handle = tokio::spawn(async move {
        let result = axum::serve(listener, router)
            .with_graceful_shutdown(async {
                // A dropped sender counts as a shutdown request too.
                let _ = shutdown.await;
            })
            .await;
        if let Err(e) = result {
            error!("server error: {e}");
        }
    });

    Ok((addr, handle))
}
