use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::control::{dispatch, ControlMessage, ControlResponse};
use crate::errors::FlowTapResult;
use crate::metrics;
use crate::session::SessionController;

use super::state::ControlState;

pub fn build_control_router(state: ControlState) -> Router {
    Router::new()
        .route("/control", post(control_handler))
        .route("/healthz", get(|| async { "ok" }))
        .layer(cors_layer())
        .with_state(state)
}

/// Host the control surface on `addr` until `cancel` fires.
pub async fn serve_control(
    addr: SocketAddr,
    controller: Arc<SessionController>,
    cancel: CancellationToken,
) -> FlowTapResult<()> {
    let listener = TcpListener::bind(addr).await?;
    let local = listener.local_addr()?;
    info!(target: "flowtap::server", addr = %local, "control surface listening");
    let app = build_control_router(ControlState::new(controller));
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?;
    info!(target: "flowtap::server", "control surface stopped");
    Ok(())
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
}

async fn control_handler(State(state): State<ControlState>, body: Bytes) -> impl IntoResponse {
    let message: ControlMessage = match serde_json::from_slice(&body) {
        Ok(message) => message,
        Err(err) => {
            warn!(target: "flowtap::server", %err, "undecodable control message");
            metrics::record_control("UNKNOWN", false);
            return (
                StatusCode::BAD_REQUEST,
                Json(ControlResponse::error(format!("invalid control message: {err}"))),
            );
        }
    };

    match dispatch(state.controller(), message).await {
        Ok(response) => (StatusCode::OK, Json(response)),
        Err(err) => (StatusCode::CONFLICT, Json(ControlResponse::error(err.to_string()))),
    }
}
