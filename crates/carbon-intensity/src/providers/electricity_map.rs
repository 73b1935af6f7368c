//! Electricity Maps client.
//!
//! Calls `GET {api_url}/carbon-intensity/latest?zone={location}` with the
//! `auth-token` header and maps the response to one absolute measurement in
//! gCO2e/kWh, valid for one hour from its `datetime`.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Deserialize;
use tracing::debug;

use carbon_state::BoxFuture;

use crate::credentials::{CredentialSource, require};
use crate::error::{ConfigError, ProviderError};
use crate::provider::{Measurement, MetricType, Provider};

pub const API_URL_VAR: &str = "ELECTRICITY_MAP_API_URL";
pub const API_TOKEN_VAR: &str = "ELECTRICITY_MAP_API_TOKEN";

const UNITS: &str = "gCO2e/kWh";

#[derive(Debug, Clone)]
pub struct ElectricityMapConfig {
    pub api_url: String,
    pub token: String,
    pub timeout: Duration,
}

impl ElectricityMapConfig {
    /// Resolve the API URL then the token. The first missing one is reported.
    pub fn from_source(
        source: &dyn CredentialSource,
        timeout: Duration,
    ) -> Result<Self, ConfigError> {
        let api_url = require(source, API_URL_VAR)?;
        let token = require(source, API_TOKEN_VAR)?;
        Ok(Self {
            api_url,
            token,
            timeout,
        })
    }
}

pub struct ElectricityMap {
    client: reqwest::Client,
    api_url: String,
    token: String,
}

impl ElectricityMap {
    pub fn new(config: ElectricityMapConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            client: super::build_client(config.timeout)?,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            token: config.token,
        })
    }

    async fn latest(&self, location: &str) -> Result<Vec<Measurement>, ProviderError> {
        let url = format!("{}/carbon-intensity/latest", self.api_url);
        debug!(%url, location, "querying electricity maps");

        let response = self
            .client
            .get(&url)
            .query(&[("zone", location)])
            .header("auth-token", &self.token)
            .send()
            .await
            .map_err(|e| ProviderError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(super::status_error(status, location));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| ProviderError::Request(e.to_string()))?;
        parse_latest(location, &body)
    }
}

impl Provider for ElectricityMap {
    fn carbon_intensity<'a>(
        &'a self,
        location: &'a str,
    ) -> BoxFuture<'a, Result<Vec<Measurement>, ProviderError>> {
        Box::pin(self.latest(location))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LatestResponse {
    #[serde(default)]
    zone: Option<String>,
    carbon_intensity: Option<f64>,
    datetime: DateTime<Utc>,
}

/// Decode a `carbon-intensity/latest` body. A missing intensity yields no
/// measurements.
pub(crate) fn parse_latest(location: &str, body: &[u8]) -> Result<Vec<Measurement>, ProviderError> {
    let latest: LatestResponse =
        serde_json::from_slice(body).map_err(|e| ProviderError::Decode(e.to_string()))?;

    let Some(value) = latest.carbon_intensity else {
        return Ok(Vec::new());
    };

    Ok(vec![Measurement {
        location: latest.zone.unwrap_or_else(|| location.to_string()),
        value,
        units: UNITS.to_string(),
        valid_from: latest.datetime,
        valid_to: latest.datetime + TimeDelta::hours(1),
        metric_type: MetricType::Absolute,
    }])
}
