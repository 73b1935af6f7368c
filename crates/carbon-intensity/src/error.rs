//! Error types for providers and the intensity fetcher.

use thiserror::Error;

/// Deployment-configuration errors raised while building a fetcher.
///
/// These are never retried: the operator cannot recover without a config
/// change.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("provider name {0} not supported")]
    UnsupportedProvider(String),

    #[error("env var {0} must be set")]
    MissingCredential(String),

    #[error("failed to build http client: {0}")]
    Client(String),
}

/// Failures reported by a carbon intensity provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The provider answered but has no data for the location.
    #[error("no data available: {0}")]
    NoData(String),

    #[error("request failed: {0}")]
    Request(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("malformed response: {0}")]
    Decode(String),
}

/// A provider failure other than "no data", tagged with its location.
#[derive(Debug, Error)]
#[error("provider {provider} failed for location {location}: {source}")]
pub struct FetchError {
    pub provider: String,
    pub location: String,
    #[source]
    pub source: ProviderError,
}

pub type FetchResult<T> = Result<T, FetchError>;
