use axum::{routing::get, Router};
use crate::controllers::device_controller::{get_status, get_unit, list_devices, ApiState};

/// Build the `/api/*` sub-router.
pub fn api_routes(state: ApiState) -> Router {
    Router::new()
        .route("/devices",                   get(list_devices))
        .route("/devices/{id}/units/{unit}", get(get_unit))
        .route("/status",                    get(get_status))
        .with_state(state)
}
