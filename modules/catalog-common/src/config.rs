use std::env;
use std::time::Duration;

use tracing::info;

use crate::error::ReconcileError;

pub const DEFAULT_REGISTRY_BASE_URL: &str = "https://halal.muis.gov.sg/halal/establishments";
pub const DEFAULT_REGISTRY_SEARCH_URL: &str = "https://halal.muis.gov.sg/api/halal/establishments";
pub const DEFAULT_PROBE_USER_AGENT: &str =
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15";

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Postgres
    pub database_url: String,

    // Certification registry
    pub registry_base_url: String,
    pub registry_search_url: String,
    pub registry_timeout: Duration,
    pub certification_delay: Duration,

    // Social liveness
    pub probe_timeout: Duration,
    pub probe_user_agent: String,
    pub liveness_delay: Duration,

    // Scheduling
    pub certification_cron: String,
    pub liveness_cron: String,
    pub schedule_timezone: String,

    /// Flush proposals every N during a scan. `None` commits once at the end.
    pub commit_batch_size: Option<usize>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ReconcileError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ReconcileError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let commit_batch_size = match get("COMMIT_BATCH_SIZE") {
            Some(raw) => match parse_number::<usize>("COMMIT_BATCH_SIZE", &raw)? {
                0 => None,
                n => Some(n),
            },
            None => None,
        };

        Ok(Self {
            database_url: get("DATABASE_URL").ok_or_else(|| {
                ReconcileError::Config("DATABASE_URL environment variable is required".into())
            })?,
            registry_base_url: or("REGISTRY_BASE_URL", DEFAULT_REGISTRY_BASE_URL),
            registry_search_url: or("REGISTRY_SEARCH_URL", DEFAULT_REGISTRY_SEARCH_URL),
            registry_timeout: Duration::from_secs(parse_number(
                "REGISTRY_TIMEOUT_SECS",
                &or("REGISTRY_TIMEOUT_SECS", "30"),
            )?),
            certification_delay: Duration::from_millis(parse_number(
                "CERTIFICATION_DELAY_MS",
                &or("CERTIFICATION_DELAY_MS", "500"),
            )?),
            probe_timeout: Duration::from_secs(parse_number(
                "PROBE_TIMEOUT_SECS",
                &or("PROBE_TIMEOUT_SECS", "20"),
            )?),
            probe_user_agent: or("PROBE_USER_AGENT", DEFAULT_PROBE_USER_AGENT),
            liveness_delay: Duration::from_millis(parse_number(
                "LIVENESS_DELAY_MS",
                &or("LIVENESS_DELAY_MS", "150"),
            )?),
            certification_cron: or("CERTIFICATION_CRON", "0 3 * * *"),
            liveness_cron: or("LIVENESS_CRON", "0 4 1 * *"),
            schedule_timezone: or("SCHEDULE_TIMEZONE", "Asia/Singapore"),
            commit_batch_size,
        })
    }

    /// Log the effective configuration with the database URL masked.
    pub fn log_redacted(&self) {
        info!(
            database_url = "<redacted>",
            registry_base_url = %self.registry_base_url,
            registry_search_url = %self.registry_search_url,
            registry_timeout_secs = self.registry_timeout.as_secs(),
            certification_delay_ms = self.certification_delay.as_millis() as u64,
            probe_timeout_secs = self.probe_timeout.as_secs(),
            liveness_delay_ms = self.liveness_delay.as_millis() as u64,
            certification_cron = %self.certification_cron,
            liveness_cron = %self.liveness_cron,
            schedule_timezone = %self.schedule_timezone,
            commit_batch_size = ?self.commit_batch_size,
            "Loaded configuration"
        );
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, ReconcileError> {
    raw.trim()
        .parse()
        .map_err(|_| ReconcileError::Config(format!("{key} must be a non-negative integer, got {raw:?}")))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_only_database_url_is_set() {
        let config = Config::from_lookup(lookup(&[("DATABASE_URL", "postgres://localhost/catalog")])).unwrap();
        assert_eq!(config.certification_delay, Duration::from_millis(500));
        assert_eq!(config.liveness_delay, Duration::from_millis(150));
        assert_eq!(config.registry_timeout, Duration::from_secs(30));
        assert_eq!(config.certification_cron, "0 3 * * *");
        assert_eq!(config.liveness_cron, "0 4 1 * *");
        assert_eq!(config.schedule_timezone, "Asia/Singapore");
        assert_eq!(config.commit_batch_size, None);
    }

    #[test]
    fn missing_database_url_is_a_config_error() {
        let err = Config::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, ReconcileError::Config(_)));
    }

    #[test]
    fn invalid_numbers_are_reported_not_panicked() {
        let err = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/catalog"),
            ("CERTIFICATION_DELAY_MS", "fast"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("CERTIFICATION_DELAY_MS"));
    }

    #[test]
    fn zero_batch_size_means_single_commit() {
        let config = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/catalog"),
            ("COMMIT_BATCH_SIZE", "0"),
        ]))
        .unwrap();
        assert_eq!(config.commit_batch_size, None);

        let config = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/catalog"),
            ("COMMIT_BATCH_SIZE", "25"),
        ]))
        .unwrap();
        assert_eq!(config.commit_batch_size, Some(25));
    }
}
