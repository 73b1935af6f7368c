//! HTTP clients for the supported carbon intensity providers.

pub mod electricity_map;
pub mod watt_time;

pub use electricity_map::{ElectricityMap, ElectricityMapConfig};
pub use watt_time::{WattTime, WattTimeConfig};

use reqwest::StatusCode;

use crate::error::{ConfigError, ProviderError};

pub(crate) fn build_client(timeout: std::time::Duration) -> Result<reqwest::Client, ConfigError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("carbond/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| ConfigError::Client(e.to_string()))
}

/// Map a non-success status to a provider error. Credentials rejected by
/// the upstream are hard failures; anything else means "no data".
pub(crate) fn status_error(status: StatusCode, location: &str) -> ProviderError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            ProviderError::Auth(format!("status {status} for location {location}"))
        }
        _ => ProviderError::NoData(format!("status {status} for location {location}")),
    }
}
