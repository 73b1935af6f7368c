//! Cached carbon intensity lookup for cluster locations.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use carbon_state::{BoxFuture, ClusterCarbonIntensity, IntensityReading};

use crate::cache::IntensityCache;
use crate::credentials::{CredentialSource, EnvCredentials};
use crate::error::{ConfigError, FetchError, FetchResult, ProviderError};
use crate::provider::{ELECTRICITY_MAP, Measurement, MetricType, Provider, WATT_TIME};
use crate::providers::{ElectricityMap, ElectricityMapConfig, WattTime, WattTimeConfig};

/// Source of "now" for cache expiry.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Resolve a cluster's location to its current carbon intensity.
pub trait IntensityFetcher: Send + Sync {
    /// A location the provider has no data for resolves to an invalid
    /// reading, not an error.
    fn fetch<'a>(
        &'a self,
        cluster_name: &'a str,
        location: &'a str,
    ) -> BoxFuture<'a, FetchResult<ClusterCarbonIntensity>>;

    /// Name of the configured provider.
    fn provider(&self) -> &str;
}

/// Provider-backed fetcher with a shared per-location cache.
pub struct GridIntensityFetcher {
    cache: IntensityCache,
    provider: Box<dyn Provider>,
    provider_name: String,
    clock: Clock,
    inflight: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl GridIntensityFetcher {
    /// Build a fetcher for `provider_name` with credentials from the process
    /// environment.
    pub fn from_env(provider_name: &str, timeout: Duration) -> Result<Self, ConfigError> {
        Self::from_source(provider_name, &EnvCredentials, timeout)
    }

    /// Build a fetcher for `provider_name`. The name is checked before any
    /// credential is looked up.
    pub fn from_source(
        provider_name: &str,
        source: &dyn CredentialSource,
        timeout: Duration,
    ) -> Result<Self, ConfigError> {
        let provider: Box<dyn Provider> = match provider_name {
            ELECTRICITY_MAP => Box::new(ElectricityMap::new(ElectricityMapConfig::from_source(
                source, timeout,
            )?)?),
            WATT_TIME => Box::new(WattTime::new(WattTimeConfig::from_source(
                source, timeout,
            )?)?),
            other => return Err(ConfigError::UnsupportedProvider(other.to_string())),
        };
        info!(provider = provider_name, "carbon intensity provider configured");
        Ok(Self::with_provider(provider_name, provider))
    }

    pub fn with_provider(provider_name: &str, provider: Box<dyn Provider>) -> Self {
        Self {
            cache: IntensityCache::new(),
            provider,
            provider_name: provider_name.to_string(),
            clock: Arc::new(Utc::now),
            inflight: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn cache(&self) -> &IntensityCache {
        &self.cache
    }

    fn location_lock(&self, location: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut inflight = self.inflight.lock().unwrap_or_else(|e| e.into_inner());
        inflight
            .entry(location.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    async fn resolve(&self, location: &str) -> FetchResult<IntensityReading> {
        if let Some(reading) = self.cache.get(location, (self.clock)()) {
            return Ok(reading);
        }

        let lock = self.location_lock(location);
        let _guard = lock.lock().await;

        // Filled by a concurrent caller while we waited.
        if let Some(reading) = self.cache.get(location, (self.clock)()) {
            return Ok(reading);
        }

        let reading = match self.provider.carbon_intensity(location).await {
            Ok(measurements) => select_reading(location, measurements),
            Err(ProviderError::NoData(reason)) => {
                info!(location, %reason, "provider has no data for location");
                IntensityReading::invalid(location)
            }
            Err(source) => {
                warn!(
                    location,
                    provider = %self.provider_name,
                    error = %source,
                    "provider request failed"
                );
                return Err(FetchError {
                    provider: self.provider_name.clone(),
                    location: location.to_string(),
                    source,
                });
            }
        };

        let now = (self.clock)();
        let ttl = reading.valid_to.signed_duration_since(now);
        if self.cache.put(location, reading.clone(), ttl, now) {
            debug!(location, ttl_secs = ttl.num_seconds(), "cached intensity reading");
        }
        let (hits, misses, expirations) = self.cache.stats();
        debug!(
            cache_entries = self.cache.len(),
            cache_hits = hits,
            cache_misses = misses,
            cache_expirations = expirations,
            "intensity cache stats"
        );
        Ok(reading)
    }
}

impl IntensityFetcher for GridIntensityFetcher {
    fn fetch<'a>(
        &'a self,
        cluster_name: &'a str,
        location: &'a str,
    ) -> BoxFuture<'a, FetchResult<ClusterCarbonIntensity>> {
        Box::pin(async move {
            let reading = self.resolve(location).await?;
            Ok(ClusterCarbonIntensity {
                cluster_name: cluster_name.to_string(),
                reading,
            })
        })
    }

    fn provider(&self) -> &str {
        &self.provider_name
    }
}

/// Collapse provider measurements into one reading.
///
/// No measurements means no data. With several, the first absolute one wins,
/// falling back to the first overall.
pub fn select_reading(location: &str, measurements: Vec<Measurement>) -> IntensityReading {
    let chosen = measurements
        .iter()
        .find(|m| m.metric_type == MetricType::Absolute)
        .or_else(|| measurements.first());

    match chosen {
        Some(m) => IntensityReading {
            is_valid: true,
            location: location.to_string(),
            units: m.units.clone(),
            valid_from: m.valid_from,
            valid_to: m.valid_to,
            value: m.value,
        },
        None => IntensityReading::invalid(location),
    }
}
