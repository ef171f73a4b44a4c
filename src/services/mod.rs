pub mod correction_service;
pub mod forecast_service;
pub mod mqtt_service;
pub mod poll_scheduler;
pub mod solar_algorithm;
