//! The provider seam: anything that can report carbon intensity for a
//! location code.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use carbon_state::BoxFuture;

use crate::error::ProviderError;

/// Provider name for Electricity Maps.
pub const ELECTRICITY_MAP: &str = "electricitymap";

/// Provider name for WattTime.
pub const WATT_TIME: &str = "watttime";

/// Whether a measurement is an absolute emission rate or a relative index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricType {
    Absolute,
    Relative,
}

/// One raw measurement returned by a provider.
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    pub location: String,
    pub value: f64,
    pub units: String,
    pub valid_from: DateTime<Utc>,
    pub valid_to: DateTime<Utc>,
    pub metric_type: MetricType,
}

/// External carbon intensity data source.
///
/// Implementations return [`ProviderError::NoData`] when the upstream
/// signals it has nothing for the location; any other error is treated as a
/// hard failure by the fetcher.
pub trait Provider: Send + Sync {
    fn carbon_intensity<'a>(
        &'a self,
        location: &'a str,
    ) -> BoxFuture<'a, Result<Vec<Measurement>, ProviderError>>;
}
