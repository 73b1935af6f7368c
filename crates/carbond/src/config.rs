//! carbond.toml configuration parser.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Daemon configuration. Every field is optional in the file.
///
/// Provider credentials are never read from here; they come from the
/// environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub provider: String,
    pub data_dir: PathBuf,
    pub listen: SocketAddr,
    pub requeue_interval: String,
    pub cycle_timeout: String,
    pub provider_timeout: String,
    pub log_format: LogFormat,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            provider: "electricitymap".to_string(),
            data_dir: PathBuf::from("/var/lib/carbonaware"),
            listen: SocketAddr::from(([0, 0, 0, 0], 8080)),
            requeue_interval: "5m".to_string(),
            cycle_timeout: "60s".to_string(),
            provider_timeout: "10s".to_string(),
            log_format: LogFormat::Text,
        }
    }
}

impl DaemonConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: DaemonConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every duration parses and is non-zero.
    pub fn validate(&self) -> anyhow::Result<()> {
        for (field, value) in [
            ("requeue_interval", &self.requeue_interval),
            ("cycle_timeout", &self.cycle_timeout),
            ("provider_timeout", &self.provider_timeout),
        ] {
            let parsed = parse_duration(value).with_context(|| format!("field {field}"))?;
            if parsed.is_zero() {
                bail!("field {field} must be greater than zero");
            }
        }
        Ok(())
    }

    pub fn requeue_interval(&self) -> anyhow::Result<Duration> {
        parse_duration(&self.requeue_interval)
    }

    pub fn cycle_timeout(&self) -> anyhow::Result<Duration> {
        parse_duration(&self.cycle_timeout)
    }

    pub fn provider_timeout(&self) -> anyhow::Result<Duration> {
        parse_duration(&self.provider_timeout)
    }

    pub fn db_path(&self) -> PathBuf {
        db_path(&self.data_dir)
    }
}

/// Location of the state database inside a data directory.
pub fn db_path(data_dir: &Path) -> PathBuf {
    data_dir.join("carbonaware.redb")
}

/// Parse a duration string like "500ms", "30s", "5m" or "1h". A bare number
/// is seconds.
pub fn parse_duration(s: &str) -> anyhow::Result<Duration> {
    let s = s.trim();
    let (number, unit) = match s.find(|c: char| !c.is_ascii_digit()) {
        Some(idx) => s.split_at(idx),
        None => (s, "s"),
    };
    let n: u64 = number
        .parse()
        .with_context(|| format!("invalid duration {s:?}"))?;

    match unit {
        "ms" => Ok(Duration::from_millis(n)),
        "s" => Ok(Duration::from_secs(n)),
        "m" => Ok(Duration::from_secs(n.saturating_mul(60))),
        "h" => Ok(Duration::from_secs(n.saturating_mul(3600))),
        other => bail!("invalid duration unit {other:?} in {s:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_config() {
        let toml_str = r#"
provider = "watttime"
data_dir = "/tmp/carbon"
listen = "127.0.0.1:9090"
requeue_interval = "2m"
cycle_timeout = "45s"
provider_timeout = "5s"
log_format = "json"
"#;
        let config = DaemonConfig::from_toml_str(toml_str).unwrap();
        assert_eq!(config.provider, "watttime");
        assert_eq!(config.listen.port(), 9090);
        assert_eq!(config.requeue_interval().unwrap(), Duration::from_secs(120));
        assert_eq!(config.cycle_timeout().unwrap(), Duration::from_secs(45));
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.db_path(), PathBuf::from("/tmp/carbon/carbonaware.redb"));
    }

    #[test]
    fn empty_config_uses_defaults() {
        let config = DaemonConfig::from_toml_str("").unwrap();
        assert_eq!(config.provider, "electricitymap");
        assert_eq!(config.requeue_interval().unwrap(), Duration::from_secs(300));
        assert_eq!(config.provider_timeout().unwrap(), Duration::from_secs(10));
        assert_eq!(config.log_format, LogFormat::Text);
    }

    #[test]
    fn rejects_bad_durations() {
        assert!(DaemonConfig::from_toml_str("cycle_timeout = \"soon\"").is_err());
        assert!(DaemonConfig::from_toml_str("requeue_interval = \"0s\"").is_err());
        assert!(DaemonConfig::from_toml_str("provider_timeout = \"3d\"").is_err());
    }

    #[test]
    fn parse_duration_forms() {
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_duration(" 90 ").unwrap(), Duration::from_secs(90));
        assert!(parse_duration("").is_err());
        assert!(parse_duration("m").is_err());
    }
}
