use chrono_tz::Tz;
use serde::Deserialize;
use tracing::debug;

use crate::errors::{ConfigError, ConfigResult};
use crate::models::forecast::{Location, PanelConfig};

fn default_base_url() -> String { "https://api.ned.nl".to_string() }
fn default_timeout_secs() -> u64 { 30 }
fn default_location() -> String { "0".to_string() }
fn default_timezone() -> String { "Europe/Amsterdam".to_string() }
fn default_tick_interval_secs() -> u64 { 60 }
fn default_device_id() -> String { "SolarForecast".to_string() }
fn default_port() -> u16 { 8080 }
fn default_mqtt_port() -> u16 { 1883 }
fn default_topic_prefix() -> String { "ned-solar".to_string() }

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub panel: PanelConfig,
    #[serde(default)]
    pub api: ApiConfig,
    /// "0".."12" for a predefined point, or "host"
    #[serde(default = "default_location")]
    pub location: String,
    /// Host supplied "lat;lon", used when `location` is "host"
    #[serde(default)]
    pub host_location: Option<String>,
    #[serde(default)]
    pub debug_level: DebugLevel,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,
    #[serde(default = "default_device_id")]
    pub device_id: String,
    /// Drop forecast slots that already started before the current hour
    #[serde(default)]
    pub only_future: bool,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub mqtt: MqttConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            token: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl ApiConfig {
    /// The token, if one is configured and non-blank.
    pub fn token(&self) -> ConfigResult<&str> {
        match self.token.as_deref().map(str::trim) {
            Some(t) if !t.is_empty() => Ok(t),
            _ => Err(ConfigError::Missing("api.token")),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DebugLevel {
    #[default]
    Quiet,
    Verbose,
    Debug,
}

impl DebugLevel {
    /// Default `tracing` filter for this level.
    pub fn filter(&self) -> &'static str {
        match self {
            DebugLevel::Quiet => "info",
            DebugLevel::Verbose => "info,ned_solar_forecast=debug",
            DebugLevel::Debug => "info,ned_solar_forecast=trace",
        }
    }

    /// Only the debug level enables the accelerated polling path.
    pub fn accelerated_polling(&self) -> bool {
        matches!(self, DebugLevel::Debug)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: default_port() }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct MqttConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub broker_host: String,
    #[serde(default = "default_mqtt_port")]
    pub broker_port: u16,
    #[serde(default)]
    pub client_id: String,
    #[serde(default = "default_topic_prefix")]
    pub topic_prefix: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl MqttConfig {
    /// The mirror runs only when enabled and a broker is configured.
    pub fn is_active(&self) -> bool {
        self.enabled && !self.broker_host.trim().is_empty()
    }
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            broker_host: String::new(),
            broker_port: default_mqtt_port(),
            client_id: String::new(),
            topic_prefix: default_topic_prefix(),
            username: None,
            password: None,
        }
    }
}

/// Settings still honoured when the rest of the file is unusable.
#[derive(Debug, Deserialize, Default)]
struct OuterSettings {
    #[serde(default)]
    debug_level: DebugLevel,
    #[serde(default)]
    server: ServerConfig,
    #[serde(default)]
    mqtt: MqttConfig,
}

impl Config {
    /// Reads `path`. Only an unreadable file is an error; a bad parameter is
    /// handed back next to a fallback configuration.
    pub fn load(path: &str) -> ConfigResult<(Self, Option<ConfigError>)> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_string(),
            source,
        })?;
        Ok(Self::from_json_or_degrade(&content))
    }

    pub fn from_json_or_degrade(content: &str) -> (Self, Option<ConfigError>) {
        match Self::from_json(content) {
            Ok(config) => (config, None),
            Err(e) => (Self::fallback(content), Some(e)),
        }
    }

    /// Keeps whatever still parses. A well-typed but invalid file is kept as
    /// is; otherwise only the outer settings survive.
    fn fallback(content: &str) -> Self {
        if let Ok(config) = serde_json::from_str::<Config>(content) {
            return config;
        }
        let outer = serde_json::from_str::<OuterSettings>(content).unwrap_or_default();
        Config {
            panel: PanelConfig { declination: 0.0, azimuth: 0.0, peak_power_kw: 0.0 },
            api: ApiConfig::default(),
            location: default_location(),
            host_location: None,
            debug_level: outer.debug_level,
            timezone: default_timezone(),
            tick_interval_secs: default_tick_interval_secs(),
            device_id: default_device_id(),
            only_future: false,
            server: outer.server,
            mqtt: outer.mqtt,
        }
    }

    pub fn from_json(content: &str) -> ConfigResult<Self> {
        let config: Config = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks everything that must hold before the adapter may start.
    /// A missing token is not checked here: it only degrades the adapter.
    pub fn validate(&self) -> ConfigResult<()> {
        let p = &self.panel;
        if !(0.0..=90.0).contains(&p.declination) {
            return Err(ConfigError::OutOfRange { name: "panel.declination", value: p.declination });
        }
        if !(-180.0..=180.0).contains(&p.azimuth) {
            return Err(ConfigError::OutOfRange { name: "panel.azimuth", value: p.azimuth });
        }
        if !p.peak_power_kw.is_finite() || p.peak_power_kw <= 0.0 {
            return Err(ConfigError::OutOfRange { name: "panel.peak_power_kw", value: p.peak_power_kw });
        }
        self.resolve_location()?;
        self.tz()?;
        Ok(())
    }

    pub fn resolve_location(&self) -> ConfigResult<Location> {
        let code = self.location.trim();
        if code.eq_ignore_ascii_case("host") {
            let raw = self
                .host_location
                .as_deref()
                .ok_or(ConfigError::Missing("host_location"))?;
            return parse_host_location(raw);
        }
        code.parse::<u8>()
            .ok()
            .and_then(Location::known)
            .ok_or_else(|| ConfigError::UnknownLocation(code.to_string()))
    }

    pub fn tz(&self) -> ConfigResult<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|_| ConfigError::Timezone(self.timezone.clone()))
    }

    /// Writes the effective configuration to the debug log, token masked.
    pub fn dump_to_log(&self) {
        debug!("[CONFIG] panel: {:?}", self.panel);
        debug!(
            "[CONFIG] api: base_url={} token={} timeout={}s",
            self.api.base_url,
            if self.api.token().is_ok() { "***" } else { "<none>" },
            self.api.timeout_secs
        );
        debug!(
            "[CONFIG] location={} host_location={:?} timezone={}",
            self.location, self.host_location, self.timezone
        );
        debug!(
            "[CONFIG] debug_level={:?} tick={}s device_id={} only_future={}",
            self.debug_level, self.tick_interval_secs, self.device_id, self.only_future
        );
        debug!("[CONFIG] server.port={} mqtt.enabled={}", self.server.port, self.mqtt.enabled);
    }
}

/// Parses the host's "lat;lon" location setting. The host location keeps
/// the national NED point since the API has no finer granularity.
fn parse_host_location(raw: &str) -> ConfigResult<Location> {
    let bad = || ConfigError::HostLocation(raw.to_string());
    let (lat, lon) = raw.split_once(';').ok_or_else(bad)?;
    let latitude: f64 = lat.trim().parse().map_err(|_| bad())?;
    let longitude: f64 = lon.trim().parse().map_err(|_| bad())?;
    if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
        return Err(bad());
    }
    Ok(Location {
        name: "Host".to_string(),
        point: 0,
        latitude,
        longitude,
    })
}
