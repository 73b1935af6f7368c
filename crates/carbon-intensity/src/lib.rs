//! carbon-intensity: resolves grid locations to carbon intensity readings.
//!
//! # Architecture
//!
//! ```text
//! GridIntensityFetcher (implements IntensityFetcher)
//!   ├── IntensityCache    ← TTL = reading.valid_to - now, no touch-on-hit
//!   ├── per-location lock ← concurrent misses share one provider call
//!   └── Box<dyn Provider>
//!         ├── ElectricityMap  (ELECTRICITY_MAP_API_URL, ELECTRICITY_MAP_API_TOKEN)
//!         └── WattTime        (WATT_TIME_API_USER, WATT_TIME_API_PASSWORD)
//! ```
//!
//! A provider that has no data for a location is not an error: the fetcher
//! returns an invalid reading and the ranking engine leaves that cluster out.
//! Everything else the provider reports propagates as [`FetchError`].

pub mod cache;
pub mod credentials;
pub mod error;
pub mod fetcher;
pub mod provider;
pub mod providers;

pub use cache::IntensityCache;
pub use credentials::{CredentialSource, EnvCredentials};
pub use error::{ConfigError, FetchError, FetchResult, ProviderError};
pub use fetcher::{Clock, GridIntensityFetcher, IntensityFetcher, select_reading};
pub use provider::{ELECTRICITY_MAP, Measurement, MetricType, Provider, WATT_TIME};
