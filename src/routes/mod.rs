pub mod device_routes;
