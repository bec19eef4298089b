//! The minimal operator surface this core exposes: a liveness probe, in
//! the same `axum`-based shape as this stack's other long-running
//! binaries.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use reqwest::StatusCode;

use crate::app::App;

pub(crate) async fn launch(app: App, bind: SocketAddr) -> Result<()> {
    let app = Arc::new(app);
    let router = Router::new()
        .route("/healthz", get(healthz))
        .with_state(app);

    tracing::info!(%bind, "launching operator surface");
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("binding {bind}"))?;
    axum::serve(listener, router.into_make_service())
        .await
        .context("operator surface server exited")
}

async fn healthz(State(_app): State<Arc<App>>) -> impl IntoResponse {
    StatusCode::OK
}
