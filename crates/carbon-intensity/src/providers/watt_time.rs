//! WattTime client.
//!
//! Logs in with basic auth to obtain a bearer token, then queries the
//! real-time index for a balancing authority. The index yields a relative
//! measurement (percent of the recent range) and, when the account exposes
//! it, an absolute marginal emissions rate in lbs/MWh. Both are valid for
//! the reported update frequency.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info};

use carbon_state::BoxFuture;

use crate::credentials::{CredentialSource, require};
use crate::error::{ConfigError, ProviderError};
use crate::provider::{Measurement, MetricType, Provider};

pub const API_USER_VAR: &str = "WATT_TIME_API_USER";
pub const API_PASSWORD_VAR: &str = "WATT_TIME_API_PASSWORD";
pub const DEFAULT_API_URL: &str = "https://api2.watttime.org/v2";

/// Update frequency assumed when the index omits `freq`.
const DEFAULT_FREQ_SECS: i64 = 300;

#[derive(Debug, Clone)]
pub struct WattTimeConfig {
    pub api_user: String,
    pub api_password: String,
    pub api_url: String,
    pub timeout: Duration,
}

impl WattTimeConfig {
    pub fn from_source(
        source: &dyn CredentialSource,
        timeout: Duration,
    ) -> Result<Self, ConfigError> {
        let api_user = require(source, API_USER_VAR)?;
        let api_password = require(source, API_PASSWORD_VAR)?;
        Ok(Self {
            api_user,
            api_password,
            api_url: DEFAULT_API_URL.to_string(),
            timeout,
        })
    }
}

pub struct WattTime {
    client: reqwest::Client,
    config: WattTimeConfig,
    token: Mutex<Option<String>>,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    token: String,
}

#[derive(Debug, Deserialize)]
struct IndexResponse {
    ba: Option<String>,
    freq: Option<serde_json::Value>,
    percent: Option<serde_json::Value>,
    moer: Option<serde_json::Value>,
    point_time: DateTime<Utc>,
}

impl WattTime {
    pub fn new(config: WattTimeConfig) -> Result<Self, ConfigError> {
        let mut config = config;
        config.api_url = config.api_url.trim_end_matches('/').to_string();
        Ok(Self {
            client: super::build_client(config.timeout)?,
            config,
            token: Mutex::new(None),
        })
    }

    async fn token(&self) -> Result<String, ProviderError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            return Ok(token.clone());
        }

        let response = self
            .client
            .get(format!("{}/login", self.config.api_url))
            .basic_auth(&self.config.api_user, Some(&self.config.api_password))
            .send()
            .await
            .map_err(|e| ProviderError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Auth(format!("login returned status {status}")));
        }

        let login: LoginResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Decode(e.to_string()))?;
        info!(user = %self.config.api_user, "logged in to watttime");
        *cached = Some(login.token.clone());
        Ok(login.token)
    }

    async fn index(&self, location: &str) -> Result<Vec<Measurement>, ProviderError> {
        let token = self.token().await?;
        debug!(location, "querying watttime index");

        let response = self
            .client
            .get(format!("{}/index", self.config.api_url))
            .query(&[("ba", location)])
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| ProviderError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let err = super::status_error(status, location);
            if matches!(err, ProviderError::Auth(_)) {
                // Token expired or revoked; log in again next time.
                *self.token.lock().await = None;
            }
            return Err(err);
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| ProviderError::Request(e.to_string()))?;
        parse_index(location, &body)
    }
}

impl Provider for WattTime {
    fn carbon_intensity<'a>(
        &'a self,
        location: &'a str,
    ) -> BoxFuture<'a, Result<Vec<Measurement>, ProviderError>> {
        Box::pin(self.index(location))
    }
}

/// WattTime sends numbers either as JSON numbers or as strings.
fn number(value: Option<&serde_json::Value>) -> Option<f64> {
    match value? {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Decode an `index` body into a relative measurement followed by an
/// absolute one when `moer` is present.
pub(crate) fn parse_index(location: &str, body: &[u8]) -> Result<Vec<Measurement>, ProviderError> {
    let index: IndexResponse =
        serde_json::from_slice(body).map_err(|e| ProviderError::Decode(e.to_string()))?;

    let freq_secs = number(index.freq.as_ref())
        .map(|f| f as i64)
        .filter(|f| *f > 0)
        .unwrap_or(DEFAULT_FREQ_SECS);
    let valid_from = index.point_time;
    let valid_to = valid_from + TimeDelta::seconds(freq_secs);
    let location = index.ba.unwrap_or_else(|| location.to_string());

    let mut measurements = Vec::with_capacity(2);
    if let Some(percent) = number(index.percent.as_ref()) {
        measurements.push(Measurement {
            location: location.clone(),
            value: percent,
            units: "percent".to_string(),
            valid_from,
            valid_to,
            metric_type: MetricType::Relative,
        });
    }
    if let Some(moer) = number(index.moer.as_ref()) {
        measurements.push(Measurement {
            location,
            value: moer,
            units: "lbs/MWh".to_string(),
            valid_from,
            valid_to,
            metric_type: MetricType::Absolute,
        });
    }
    Ok(measurements)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn parses_string_encoded_index() {
        let body = br#"{
            "freq": "300",
            "ba": "CAISO_NORTH",
            "percent": "53",
            "moer": "850.743982",
            "point_time": "2024-05-01T14:55:00.00Z"
        }"#;

        let measurements = parse_index("CAISO_NORTH", body).unwrap();
        assert_eq!(measurements.len(), 2);

        assert_eq!(measurements[0].metric_type, MetricType::Relative);
        assert_eq!(measurements[0].value, 53.0);
        assert_eq!(measurements[0].units, "percent");

        assert_eq!(measurements[1].metric_type, MetricType::Absolute);
        assert!((measurements[1].value - 850.743982).abs() < 1e-9);
        assert_eq!(measurements[1].units, "lbs/MWh");
        assert_eq!(
            measurements[1].valid_to - measurements[1].valid_from,
            TimeDelta::seconds(300)
        );
    }

    #[test]
    fn relative_only_index() {
        let body = br#"{"ba": "PJM", "percent": 12, "point_time": "2024-05-01T14:55:00Z"}"#;
        let measurements = parse_index("PJM", body).unwrap();
        assert_eq!(measurements.len(), 1);
        assert_eq!(measurements[0].metric_type, MetricType::Relative);
        assert_eq!(
            measurements[0].valid_to - measurements[0].valid_from,
            TimeDelta::seconds(DEFAULT_FREQ_SECS)
        );
    }

    #[test]
    fn empty_index_yields_nothing() {
        let body = br#"{"ba": "PJM", "point_time": "2024-05-01T14:55:00Z"}"#;
        assert!(parse_index("PJM", body).unwrap().is_empty());
    }

    #[test]
    fn config_requires_user_and_password() {
        let mut source = HashMap::new();
        source.insert(API_USER_VAR.to_string(), "alice".to_string());
        let err = WattTimeConfig::from_source(&source, Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, ConfigError::MissingCredential(k) if k == API_PASSWORD_VAR));

        source.insert(API_PASSWORD_VAR.to_string(), "hunter2".to_string());
        let config = WattTimeConfig::from_source(&source, Duration::from_secs(1)).unwrap();
        assert_eq!(config.api_url, DEFAULT_API_URL);
    }
}
