//! Named credential lookup for provider construction.

use std::collections::HashMap;

use crate::error::ConfigError;

/// Where provider credentials come from.
pub trait CredentialSource {
    fn lookup(&self, key: &str) -> Option<String>;
}

/// Reads credentials from process environment variables.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvCredentials;

impl CredentialSource for EnvCredentials {
    fn lookup(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl CredentialSource for HashMap<String, String> {
    fn lookup(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

/// Look up a required credential. Empty values count as missing.
pub(crate) fn require(source: &dyn CredentialSource, key: &str) -> Result<String, ConfigError> {
    match source.lookup(key) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(ConfigError::MissingCredential(key.to_string())),
    }
}
