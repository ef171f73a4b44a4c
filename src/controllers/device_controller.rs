use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};

use crate::adapter::SharedStatus;
use crate::errors::SinkError;
use crate::models::device::{AdapterStatus, DeviceSummary, UnitState};
use crate::shared_state::DeviceStore;

/// State shared by all API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub store: DeviceStore,
    pub status: SharedStatus,
}

fn sink_error(e: SinkError) -> axum::response::Response {
    let code = match e {
        SinkError::UnitNotFound { .. } => StatusCode::NOT_FOUND,
        SinkError::Poisoned => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (code, Json(serde_json::json!({ "error": e.to_string() }))).into_response()
}

/// GET /api/devices
/// List all devices and their units
#[utoipa::path(
    get,
    path = "/api/devices",
    responses(
        (status = 200, description = "All devices with their units", body = Vec<DeviceSummary>),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn list_devices(State(state): State<ApiState>) -> impl IntoResponse {
    match state.store.get_all() {
        Ok(devices) => Json(devices).into_response(),
        Err(e) => sink_error(e),
    }
}

/// GET /api/devices/{id}/units/{unit}
/// Get one unit with its forecast history
#[utoipa::path(
    get,
    path = "/api/devices/{id}/units/{unit}",
    params(
        ("id" = String, Path, description = "Device ID"),
        ("unit" = u8, Path, description = "Unit number")
    ),
    responses(
        (status = 200, description = "Unit state", body = UnitState),
        (status = 404, description = "Unit not found")
    )
)]
pub async fn get_unit(
    Path((id, unit)): Path<(String, u8)>,
    State(state): State<ApiState>,
) -> impl IntoResponse {
    match state.store.get_unit(&id, unit) {
        Ok(u) => (StatusCode::OK, Json(u)).into_response(),
        Err(e) => sink_error(e),
    }
}

/// GET /api/status
/// Adapter and poll scheduler state
#[utoipa::path(
    get,
    path = "/api/status",
    responses(
        (status = 200, description = "Adapter status", body = AdapterStatus),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn get_status(State(state): State<ApiState>) -> impl IntoResponse {
    match state.status.read() {
        Ok(s) => Json(s.clone()).into_response(),
        Err(_) => sink_error(SinkError::Poisoned),
    }
}
