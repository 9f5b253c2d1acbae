use secrecy::Secret;
use serde::Deserialize;
use std::time::Duration;

use crate::registry::{FallbackPolicy, RegistryConfig};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: Secret<String>,
    pub host: String,
    pub port: u16,

    // Shared key for the revocation admin endpoints
    pub admin_api_key: Secret<String>,

    // Revocation registry
    pub warm_start_timeout_secs: u64,
    pub fallback_timeout_secs: u64,
    pub write_timeout_secs: u64,
    pub cleanup_interval_secs: u64,
    pub fallback_policy: FallbackPolicy,

    // Cron expression (with seconds) for purging expired rows
    pub purge_schedule: String,
}

impl Config {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        // Load .env file if it exists (for local development)
        let _ = dotenvy::dotenv();

        let config = config::Config::builder()
            .add_source(config::Environment::default().separator("__"))
            .build()?;

        let defaults = RegistryConfig::default();

        let fallback_policy: FallbackPolicy = match config.get::<String>("fallback_policy") {
            Ok(value) => value.parse().map_err(config::ConfigError::Message)?,
            Err(_) => defaults.fallback_policy,
        };

        Ok(Self {
            database_url: Secret::new(config.get("database_url")?),
            host: config.get("host").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: config.get("port")?,

            admin_api_key: Secret::new(config.get("admin_api_key")?),

            warm_start_timeout_secs: config
                .get("warm_start_timeout_secs")
                .unwrap_or(defaults.warm_start_timeout.as_secs()),
            fallback_timeout_secs: config
                .get("fallback_timeout_secs")
                .unwrap_or(defaults.fallback_timeout.as_secs()),
            write_timeout_secs: config
                .get("write_timeout_secs")
                .unwrap_or(defaults.write_timeout.as_secs()),
            cleanup_interval_secs: config
                .get("cleanup_interval_secs")
                .unwrap_or(defaults.cleanup_interval.as_secs()),
            fallback_policy,

            purge_schedule: config
                .get("purge_schedule")
                .unwrap_or_else(|_| "0 */10 * * * *".to_string()),
        })
    }

    pub fn registry(&self) -> RegistryConfig {
        RegistryConfig {
            warm_start_timeout: Duration::from_secs(self.warm_start_timeout_secs),
            fallback_timeout: Duration::from_secs(self.fallback_timeout_secs),
            write_timeout: Duration::from_secs(self.write_timeout_secs),
            cleanup_interval: Duration::from_secs(self.cleanup_interval_secs.max(1)),
            fallback_policy: self.fallback_policy,
        }
    }
}
