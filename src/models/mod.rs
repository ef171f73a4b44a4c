pub mod device;
pub mod forecast;
