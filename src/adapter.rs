use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::errors::{ConfigError, ForecastError, ForecastResult};
use crate::models::device::{AdapterStatus, DeviceUpdate, WriteOutcome};
use crate::models::forecast::{Location, PanelConfig};
use crate::services::correction_service;
use crate::services::forecast_service::ForecastClient;
use crate::services::poll_scheduler::PollScheduler;
use crate::shared_state::DeviceSink;

/// Unit holding the hourly forecast and the day totals.
pub const FORECAST_UNIT: u8 = 1;

pub type SharedStatus = Arc<RwLock<AdapterStatus>>;

/// What one fetch/correct/write cycle did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub fetched: usize,
    pub written: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub sink_errors: usize,
}

/// The forecast adapter: owns the site, the panels, the poll state, the API
/// client and the sink, and is driven by `tick` at a fixed cadence.
pub struct ForecastAdapter<S: DeviceSink> {
    location: Location,
    panel: PanelConfig,
    tz: Tz,
    device_id: String,
    only_future: bool,
    /// None in degraded mode
    client: Option<ForecastClient>,
    scheduler: PollScheduler,
    sink: S,
    status: SharedStatus,
}

impl<S: DeviceSink> ForecastAdapter<S> {
    /// Builds the adapter. An invalid configuration does not fail: the
    /// adapter comes up degraded and never calls the API.
    pub fn new(config: &Config, sink: S) -> Self {
        Self::build(config, config.validate().err(), sink)
    }

    /// Builds a degraded adapter for a configuration that could not be
    /// loaded as a whole. `config` only supplies the outer settings.
    pub fn degraded(config: &Config, reason: ConfigError, sink: S) -> Self {
        Self::build(config, Some(reason), sink)
    }

    fn build(config: &Config, problem: Option<ConfigError>, sink: S) -> Self {
        let location = config.resolve_location().unwrap_or_else(|_| Location::national());
        let tz = config.tz().unwrap_or(chrono_tz::Europe::Amsterdam);
        let debug_mode = config.debug_level.accelerated_polling();

        let mut last_error = None;
        let client = match problem {
            Some(e) => {
                error!("[ADAPTER] invalid configuration: {} - running without forecast updates", e);
                last_error = Some(e.to_string());
                None
            }
            None => match config.api.token() {
                Ok(token) => {
                    match ForecastClient::new(&config.api.base_url, token, Duration::from_secs(config.api.timeout_secs)) {
                        Ok(c) => Some(c),
                        Err(e) => {
                            error!("[ADAPTER] cannot build HTTP client: {} - running without forecast updates", e);
                            last_error = Some(e.to_string());
                            None
                        }
                    }
                }
                Err(e) => {
                    error!("[ADAPTER] {} - running without forecast updates", e);
                    last_error = Some(e.to_string());
                    None
                }
            },
        };

        info!(
            "[ADAPTER] location {} ({:.2}, {:.2}), panel dec={} az={} kwp={}",
            location.name, location.latitude, location.longitude,
            config.panel.declination, config.panel.azimuth, config.panel.peak_power_kw
        );

        let status = Arc::new(RwLock::new(AdapterStatus {
            location: location.clone(),
            panel: config.panel,
            debug_mode,
            degraded: client.is_none(),
            polled_today: false,
            last_poll: None,
            last_written: 0,
            last_skipped: 0,
            last_error,
        }));

        Self {
            location,
            panel: config.panel,
            tz,
            device_id: config.device_id.clone(),
            only_future: config.only_future,
            client,
            scheduler: PollScheduler::new(debug_mode),
            sink,
            status,
        }
    }

    pub fn status_handle(&self) -> SharedStatus {
        self.status.clone()
    }

    #[cfg(test)]
    pub fn scheduler(&self) -> &PollScheduler {
        &self.scheduler
    }

    /// Creates the forecast unit when missing and runs one immediate cycle.
    pub async fn on_start(&mut self, now: DateTime<Utc>) -> Option<CycleReport> {
        let name = format!("{} - 24h forecast", self.device_id);
        match self.sink.ensure_unit(&self.device_id, FORECAST_UNIT, &name) {
            Ok(true) => info!("[ADAPTER] created unit '{}'", name),
            Ok(false) => {}
            Err(e) => error!("[ADAPTER] cannot create forecast unit: {}", e),
        }

        if self.client.is_none() {
            return None;
        }
        self.scheduler.mark_polled(now);
        let outcome = self.poll(now).await;
        self.record(&outcome);
        outcome.ok()
    }

    /// One scheduling step. Returns the cycle report when a poll ran and
    /// succeeded.
    pub async fn tick(&mut self, now: DateTime<Utc>) -> Option<CycleReport> {
        let local = now.with_timezone(&self.tz);
        if !self.scheduler.tick(&local) {
            self.sync_schedule_status();
            return None;
        }
        if self.client.is_none() {
            debug!("[ADAPTER] poll due but adapter is degraded");
            self.sync_schedule_status();
            return None;
        }

        info!("[ADAPTER] time to update devices");
        let outcome = self.poll(now).await;
        if outcome.is_err() {
            self.scheduler.poll_failed();
        }
        self.record(&outcome);
        outcome.ok()
    }

    /// Fetch, correct and write. Failures of single points or single writes
    /// are counted, only a failed fetch fails the cycle.
    pub async fn poll(&self, now: DateTime<Utc>) -> ForecastResult<CycleReport> {
        let client = self.client.as_ref().ok_or(ForecastError::NoToken)?;
        let today = now.with_timezone(&self.tz).date_naive();

        if let Ok((_, current)) = self.sink.current(&self.device_id, FORECAST_UNIT) {
            debug!("[ADAPTER] unit {} currently holds '{}'", FORECAST_UNIT, current);
        }

        let raw = client.fetch_forecast(&self.location, today).await?;
        let mut report = CycleReport { fetched: raw.len(), ..CycleReport::default() };
        if raw.is_empty() {
            return Ok(report);
        }

        let corrected = correction_service::correct(&raw, &self.location, &self.panel);
        report.skipped = corrected.skipped.len();
        // Day totals cover the whole returned window, past hours included.
        let totals = correction_service::daily_totals(&corrected.estimates, &self.tz);
        let mut estimates = corrected.estimates;
        if self.only_future {
            correction_service::retain_upcoming(&mut estimates, now);
        }

        let values = estimates
            .iter()
            .map(|e| e.s_value())
            .chain(totals.iter().map(|t| t.s_value()));

        for s_value in values {
            let update = DeviceUpdate::new(&self.device_id, FORECAST_UNIT, 0, s_value);
            match self.sink.update(&update) {
                Ok(WriteOutcome::Written) => report.written += 1,
                Ok(WriteOutcome::Unchanged) => report.unchanged += 1,
                Err(e) => {
                    warn!("[ADAPTER] write dropped: {}", e);
                    report.sink_errors += 1;
                }
            }
        }

        info!(
            "[ADAPTER] cycle done: fetched={} written={} unchanged={} skipped={} sink_errors={}",
            report.fetched, report.written, report.unchanged, report.skipped, report.sink_errors
        );
        Ok(report)
    }

    fn record(&self, outcome: &ForecastResult<CycleReport>) {
        let Ok(mut status) = self.status.write() else {
            return;
        };
        status.polled_today = self.scheduler.polled_today();
        status.last_poll = self.scheduler.last_poll();
        match outcome {
            Ok(r) => {
                status.last_written = r.written;
                status.last_skipped = r.skipped;
                status.last_error = None;
            }
            Err(e) => {
                warn!("[ADAPTER] cycle skipped: {}", e);
                status.last_error = Some(e.to_string());
            }
        }
    }

    fn sync_schedule_status(&self) {
        if let Ok(mut status) = self.status.write() {
            status.polled_today = self.scheduler.polled_today();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared_state::DeviceStore;
    use chrono::TimeZone;
    use mockito::{Matcher, Server, ServerGuard};
    use serde_json::json;

    fn config(base_url: &str, token: Option<&str>) -> Config {
        let mut c = Config::from_json(
            r#"{ "panel": { "declination": 45, "azimuth": 0, "peak_power_kw": 4.8 } }"#,
        )
        .unwrap();
        c.api.base_url = base_url.to_string();
        c.api.token = token.map(str::to_string);
        c
    }

    async fn serve(server: &mut ServerGuard, body: serde_json::Value) -> mockito::Mock {
        server
            .mock("GET", "/v1/utilizations")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body.to_string())
            .create_async()
            .await
    }

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[tokio::test]
    async fn test_startup_writes_hours_and_day_totals() {
        let mut server = Server::new_async().await;
        let _m = serve(
            &mut server,
            json!([
                { "validfrom": "2025-06-22T09:00:00+00:00", "capacity": 40.0 },
                { "validfrom": "2025-06-22T11:00:00+00:00", "capacity": 50.0 }
            ]),
        )
        .await;

        let store = DeviceStore::new();
        let mut adapter = ForecastAdapter::new(&config(&server.url(), Some("tok")), store.clone());
        let report = adapter.on_start(utc(2025, 6, 21, 8, 0, 0)).await.unwrap();

        assert_eq!(report.fetched, 2);
        assert_eq!(report.written, 3);
        let unit = store.get_unit("SolarForecast", FORECAST_UNIT).unwrap();
        assert_eq!(unit.name, "SolarForecast - 24h forecast");
        assert_eq!(unit.history.len(), 3);
        assert!(unit.s_value.starts_with("-1;"));
        assert!(unit.s_value.ends_with(";2025-06-22"));
        let noon = &unit.history["2025-06-22T11:00:00+00:00"];
        assert_eq!(noon.split(';').count(), 3);
        assert!(!adapter.scheduler().polled_today());
    }

    #[tokio::test]
    async fn test_evening_tick_polls_once() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/v1/utilizations")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(json!([{ "validfrom": "2025-06-22T10:00:00+00:00", "capacity": 20.0 }]).to_string())
            .expect(1)
            .create_async()
            .await;

        let store = DeviceStore::new();
        store.ensure_unit("SolarForecast", FORECAST_UNIT, "f").unwrap();
        let mut adapter = ForecastAdapter::new(&config(&server.url(), Some("tok")), store);

        // 22:00 and 22:01 in Amsterdam (CEST)
        assert!(adapter.tick(utc(2025, 6, 21, 20, 0, 0)).await.is_some());
        assert!(adapter.tick(utc(2025, 6, 21, 20, 1, 0)).await.is_none());
        assert!(adapter.scheduler().polled_today());
        mock.assert_async().await;

        let status = adapter.status_handle();
        assert!(status.read().unwrap().polled_today);
    }

    #[tokio::test]
    async fn test_empty_reply_writes_nothing() {
        let mut server = Server::new_async().await;
        let _m = serve(&mut server, json!([])).await;

        let store = DeviceStore::new();
        store.ensure_unit("SolarForecast", FORECAST_UNIT, "f").unwrap();
        let adapter = ForecastAdapter::new(&config(&server.url(), Some("tok")), store.clone());
        let report = adapter.poll(utc(2025, 6, 21, 20, 0, 0)).await.unwrap();

        assert_eq!(report, CycleReport::default());
        assert!(store.get_unit("SolarForecast", FORECAST_UNIT).unwrap().history.is_empty());
    }

    #[tokio::test]
    async fn test_bad_timestamp_only_costs_that_record() {
        let mut server = Server::new_async().await;
        let _m = serve(
            &mut server,
            json!([
                { "validfrom": "2025-06-22T09:00:00+00:00", "capacity": 40.0 },
                { "validfrom": "not-a-date", "capacity": 40.0 },
                { "validfrom": "2025-06-22T10:00:00+00:00", "capacity": 40.0 }
            ]),
        )
        .await;

        let store = DeviceStore::new();
        store.ensure_unit("SolarForecast", FORECAST_UNIT, "f").unwrap();
        let adapter = ForecastAdapter::new(&config(&server.url(), Some("tok")), store.clone());
        let report = adapter.poll(utc(2025, 6, 21, 20, 0, 0)).await.unwrap();

        assert_eq!(report.skipped, 1);
        // two hours plus one day total
        assert_eq!(report.written, 3);
        let unit = store.get_unit("SolarForecast", FORECAST_UNIT).unwrap();
        assert!(unit.history.contains_key("2025-06-22T09:00:00+00:00"));
        assert!(unit.history.contains_key("2025-06-22T10:00:00+00:00"));
    }

    #[tokio::test]
    async fn test_failed_fetch_retried_on_next_tick() {
        let mut server = Server::new_async().await;
        let failing = server
            .mock("GET", "/v1/utilizations")
            .match_query(Matcher::Any)
            .with_status(500)
            .expect(1)
            .create_async()
            .await;

        let store = DeviceStore::new();
        store.ensure_unit("SolarForecast", FORECAST_UNIT, "f").unwrap();
        let mut adapter = ForecastAdapter::new(&config(&server.url(), Some("tok")), store);

        assert!(adapter.tick(utc(2025, 6, 21, 20, 0, 0)).await.is_none());
        assert!(!adapter.scheduler().polled_today());
        failing.assert_async().await;
        failing.remove_async().await;

        let _ok = serve(&mut server, json!([])).await;
        assert!(adapter.tick(utc(2025, 6, 21, 20, 1, 0)).await.is_some());
        assert!(adapter.scheduler().polled_today());
        assert!(adapter.status_handle().read().unwrap().last_error.is_none());
    }

    #[tokio::test]
    async fn test_missing_unit_reported_per_write() {
        let mut server = Server::new_async().await;
        let _m = serve(
            &mut server,
            json!([{ "validfrom": "2025-06-22T10:00:00+00:00", "capacity": 40.0 }]),
        )
        .await;

        let store = DeviceStore::new();
        let adapter = ForecastAdapter::new(&config(&server.url(), Some("tok")), store.clone());
        let report = adapter.poll(utc(2025, 6, 21, 20, 0, 0)).await.unwrap();

        assert_eq!(report.written, 0);
        assert_eq!(report.sink_errors, 2);
        assert!(store.get_all().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_degraded_without_token() {
        let store = DeviceStore::new();
        let mut adapter = ForecastAdapter::new(&config("http://127.0.0.1:9", None), store.clone());
        assert!(adapter.status_handle().read().unwrap().degraded);

        assert!(adapter.on_start(utc(2025, 6, 21, 8, 0, 0)).await.is_none());
        assert!(store.get_unit("SolarForecast", FORECAST_UNIT).is_ok());
        assert!(adapter.tick(utc(2025, 6, 21, 20, 0, 0)).await.is_none());
        assert!(matches!(
            adapter.poll(utc(2025, 6, 21, 20, 0, 0)).await,
            Err(ForecastError::NoToken)
        ));
    }

    #[tokio::test]
    async fn test_only_future_drops_past_hours() {
        let mut server = Server::new_async().await;
        let _m = serve(
            &mut server,
            json!([
                { "validfrom": "2025-06-21T06:00:00+00:00", "capacity": 40.0 },
                { "validfrom": "2025-06-21T12:00:00+00:00", "capacity": 40.0 }
            ]),
        )
        .await;

        let store = DeviceStore::new();
        store.ensure_unit("SolarForecast", FORECAST_UNIT, "f").unwrap();
        let mut cfg = config(&server.url(), Some("tok"));
        cfg.only_future = true;
        let adapter = ForecastAdapter::new(&cfg, store.clone());
        adapter.poll(utc(2025, 6, 21, 9, 30, 0)).await.unwrap();

        let unit = store.get_unit("SolarForecast", FORECAST_UNIT).unwrap();
        assert!(!unit.history.contains_key("2025-06-21T06:00:00+00:00"));
        assert!(unit.history.contains_key("2025-06-21T12:00:00+00:00"));
    }

    #[tokio::test]
    async fn test_badly_typed_record_does_not_lose_batch() {
        let mut server = Server::new_async().await;
        let _m = serve(
            &mut server,
            json!([
                { "validfrom": "2025-06-22T09:00:00+00:00", "capacity": 40.0 },
                { "capacity": "n/a" },
                { "validfrom": "2025-06-22T10:00:00+00:00", "capacity": 40.0 }
            ]),
        )
        .await;

        let store = DeviceStore::new();
        store.ensure_unit("SolarForecast", FORECAST_UNIT, "f").unwrap();
        let adapter = ForecastAdapter::new(&config(&server.url(), Some("tok")), store.clone());
        let report = adapter.poll(utc(2025, 6, 21, 20, 0, 0)).await.unwrap();

        assert_eq!(report.fetched, 2);
        assert_eq!(report.written, 3);
    }

    #[tokio::test]
    async fn test_only_future_keeps_day_total_of_whole_day() {
        let mut server = Server::new_async().await;
        let _m = serve(
            &mut server,
            json!([
                { "validfrom": "2025-06-21T06:00:00+00:00", "capacity": 40.0 },
                { "validfrom": "2025-06-21T12:00:00+00:00", "capacity": 50.0 },
                { "validfrom": "2025-06-21T20:00:00+00:00", "capacity": 0.0 }
            ]),
        )
        .await;

        let store = DeviceStore::new();
        let mut cfg = config(&server.url(), Some("tok"));
        cfg.only_future = true;
        let mut adapter = ForecastAdapter::new(&cfg, store.clone());

        adapter.on_start(utc(2025, 6, 21, 8, 0, 0)).await.unwrap();
        let before = store.get_unit("SolarForecast", FORECAST_UNIT).unwrap().history["2025-06-21"].clone();
        assert_ne!(before, "-1;0.000;2025-06-21");

        // 22:00 in Amsterdam, only the 20:00Z slot is still upcoming
        adapter.tick(utc(2025, 6, 21, 20, 0, 0)).await.unwrap();
        let after = store.get_unit("SolarForecast", FORECAST_UNIT).unwrap().history["2025-06-21"].clone();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_unusable_config_runs_degraded() {
        let (cfg, problem) = Config::from_json_or_degrade(
            r#"{ "panel": { "declination": 45, "azimuth": 0 }, "api": { "token": "tok" } }"#,
        );
        let store = DeviceStore::new();
        let mut adapter = ForecastAdapter::degraded(&cfg, problem.unwrap(), store.clone());

        {
            let status = adapter.status_handle();
            let status = status.read().unwrap();
            assert!(status.degraded);
            assert!(status.last_error.as_deref().unwrap().starts_with("invalid config JSON"));
            assert_eq!(status.location.name, "Nederland");
        }
        assert!(adapter.on_start(utc(2025, 6, 21, 8, 0, 0)).await.is_none());
        assert!(adapter.tick(utc(2025, 6, 21, 20, 0, 0)).await.is_none());
        assert!(store.get_unit("SolarForecast", FORECAST_UNIT).unwrap().history.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_value_degrades_new_adapter() {
        let mut cfg = config("http://127.0.0.1:9", Some("tok"));
        cfg.timezone = "Mars/Olympus".to_string();
        let adapter = ForecastAdapter::new(&cfg, DeviceStore::new());
        let status = adapter.status_handle();
        assert!(status.read().unwrap().degraded);
        assert_eq!(status.read().unwrap().last_error.as_deref(), Some("unknown timezone: Mars/Olympus"));
    }
}
