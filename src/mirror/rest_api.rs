use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use color_eyre::{eyre::eyre, Result};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::mirror_bridge::{EntityState, MirrorBridge};
use super::service::{ServiceCall, ServiceError};

type ApiResponse = (StatusCode, Json<Value>);

pub fn router(bridge: Arc<MirrorBridge>) -> Router {
    Router::new()
        .route("/api/states/{entity_id}", get(get_state))
        .route("/api/services/{domain}/{service}", post(call_service))
        .with_state(bridge)
}

pub async fn serve(bridge: Arc<MirrorBridge>, bind: &str, cancel: CancellationToken) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .map_err(|e| eyre!("Failed to bind state API to {}: {}", bind, e))?;
    info!("State API listening on {}", bind);

    axum::serve(listener, router(bridge))
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await
        .map_err(|e| eyre!("State API failed: {}", e))?;
    info!("State API stopped");
    Ok(())
}

async fn get_state(
    State(bridge): State<Arc<MirrorBridge>>,
    Path(entity_id): Path<String>,
) -> Result<Json<EntityState>, StatusCode> {
    let state = bridge.state();
    if state.entity_id == entity_id {
        Ok(Json(state))
    } else {
        Err(StatusCode::NOT_FOUND)
    }
}

async fn call_service(
    State(bridge): State<Arc<MirrorBridge>>,
    Path((domain, service)): Path<(String, String)>,
    Json(data): Json<Value>,
) -> ApiResponse {
    let call = ServiceCall {
        domain,
        service,
        data,
    };
    match bridge.call_service(&call) {
        Ok(()) => (StatusCode::OK, Json(json!({ "published": true }))),
        Err(e) => {
            warn!("Service call {}.{} failed: {}", call.domain, call.service, e);
            let status = match &e {
                ServiceError::UnknownService { .. } => StatusCode::NOT_FOUND,
                ServiceError::MissingField(_) | ServiceError::InvalidField { .. } => {
                    StatusCode::BAD_REQUEST
                }
                ServiceError::Publish(_) => StatusCode::BAD_GATEWAY,
            };
            (status, Json(json!({ "error": e.to_string() })))
        }
    }
}
