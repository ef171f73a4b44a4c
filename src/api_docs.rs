use utoipa::OpenApi;
use crate::controllers::device_controller;
use crate::models::{device, forecast};

#[derive(OpenApi)]
#[openapi(
    paths(
        device_controller::list_devices,
        device_controller::get_unit,
        device_controller::get_status
    ),
    components(
        schemas(
            device::DeviceSummary,
            device::UnitState,
            device::AdapterStatus,
            forecast::Location,
            forecast::PanelConfig
        )
    ),
    tags(
        (name = "ned-solar-forecast", description = "NED solar forecast adapter")
    )
)]
pub struct ApiDoc;
