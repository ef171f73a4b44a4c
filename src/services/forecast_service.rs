use std::time::Duration;

use chrono::{NaiveDate, TimeDelta};
use reqwest::{Client, StatusCode};
use tracing::{debug, error, trace, warn};

use crate::errors::{ForecastError, ForecastResult};
use crate::models::forecast::{Location, RawUtilizationPoint, UtilizationRecord, UtilizationResponse};

// NED query codes
const TYPE_SOLAR: u8 = 2;
const GRANULARITY_HOUR: u8 = 5;
const GRANULARITY_TZ_LOCAL: u8 = 1;
const CLASSIFICATION_FORECAST: u8 = 1;
const ACTIVITY_PROVIDING: u8 = 1;

/// Client for the NED `/v1/utilizations` endpoint.
#[derive(Clone, Debug)]
pub struct ForecastClient {
    base_url: String,
    token: String,
    client: Client,
}

impl ForecastClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>, timeout: Duration) -> ForecastResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            client,
        })
    }

    /// Query parameters for the half-open window [today, today + 2 days).
    fn query(location: &Location, today: NaiveDate) -> Vec<(&'static str, String)> {
        let until = today + TimeDelta::days(2);
        vec![
            ("point", location.point.to_string()),
            ("type", TYPE_SOLAR.to_string()),
            ("granularity", GRANULARITY_HOUR.to_string()),
            ("granularitytimezone", GRANULARITY_TZ_LOCAL.to_string()),
            ("classification", CLASSIFICATION_FORECAST.to_string()),
            ("activity", ACTIVITY_PROVIDING.to_string()),
            ("validfrom[after]", today.format("%Y-%m-%d").to_string()),
            ("validfrom[strictly_before]", until.format("%Y-%m-%d").to_string()),
        ]
    }

    /// Fetches the solar utilization forecast for `location`, starting at
    /// the local date `today`. Records missing a timestamp or capacity are
    /// skipped; an empty reply yields an empty vector.
    pub async fn fetch_forecast(&self, location: &Location, today: NaiveDate) -> ForecastResult<Vec<RawUtilizationPoint>> {
        let url = format!("{}/v1/utilizations", self.base_url);
        debug!("[NED] GET {} point={} from={}", url, location.point, today);

        let response = self
            .client
            .get(&url)
            .header("X-AUTH-TOKEN", &self.token)
            .header("accept", "application/json")
            .query(&Self::query(location, today))
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            error!("[NED] token rejected ({})", status);
            return Err(ForecastError::Unauthorized);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("[NED] status {}: {}", status, body);
            return Err(ForecastError::Status { status: status.as_u16(), body });
        }

        let body = response.text().await?;
        #[cfg(feature = "verbose_log")]
        trace!("[NED] raw payload: {}", body);

        let records = serde_json::from_str::<UtilizationResponse>(&body)?.into_records();
        let total = records.len();

        let points: Vec<RawUtilizationPoint> = records
            .into_iter()
            .enumerate()
            .filter_map(|(i, value)| {
                let record = match serde_json::from_value::<UtilizationRecord>(value) {
                    Ok(r) => r,
                    Err(e) => {
                        warn!("[NED] skipping malformed record {}: {}", i, e);
                        return None;
                    }
                };
                match (record.validfrom, record.capacity) {
                    (Some(valid_from), Some(capacity_percent)) => Some(RawUtilizationPoint { valid_from, capacity_percent }),
                    (valid_from, capacity) => {
                        warn!("[NED] skipping record {}: validfrom={:?} capacity={:?}", i, valid_from, capacity);
                        None
                    }
                }
            })
            .collect();

        if points.is_empty() {
            warn!("[NED] empty reply from API");
        } else {
            trace!("[NED] {} of {} records usable", points.len(), total);
        }
        Ok(points)
    }
}
