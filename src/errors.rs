use thiserror::Error;

/// Problems found while loading or validating `config.json`.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("missing required parameter: {0}")]
    Missing(&'static str),

    #[error("parameter {name} out of range: {value}")]
    OutOfRange { name: &'static str, value: f64 },

    #[error("unknown location code: {0}")]
    UnknownLocation(String),

    #[error("malformed host location '{0}', expected 'lat;lon'")]
    HostLocation(String),

    #[error("unknown timezone: {0}")]
    Timezone(String),
}

/// Failures of a single forecast request. None of these are retried here.
#[derive(Error, Debug)]
pub enum ForecastError {
    #[error("HTTP request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("forecast API returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("forecast API rejected the token")]
    Unauthorized,

    #[error("malformed forecast payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("no API token configured")]
    NoToken,
}

/// Reason a single raw point was skipped by the correction pipeline.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PointError {
    #[error("malformed timestamp '{0}'")]
    Timestamp(String),

    #[error("solar geometry produced a non-finite value at {0}")]
    Geometry(String),

    #[error("capacity {0} is not a finite number")]
    Capacity(f64),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SinkError {
    #[error("unit {unit} of device '{device}' does not exist")]
    UnitNotFound { device: String, unit: u8 },

    #[error("device store lock poisoned")]
    Poisoned,
}

pub type ConfigResult<T> = Result<T, ConfigError>;
pub type ForecastResult<T> = Result<T, ForecastError>;
pub type SinkResult<T> = Result<T, SinkError>;
