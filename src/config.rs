use std::{str::FromStr, time::Duration};

use crate::error::ConfigError;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    /// Stand-in for the image generation round trip.
    pub generation_delay: Duration,
    /// Stand-in for the catalog query round trip.
    pub recommendation_delay: Duration,
    pub audit_log_capacity: usize,
    /// Largest decoded photo accepted by the outfit endpoint.
    pub max_upload_bytes: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            generation_delay: Duration::from_millis(4000),
            recommendation_delay: Duration::from_millis(3000),
            audit_log_capacity: 1000,
            max_upload_bytes: 20 * 1024 * 1024,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            port: parse_var(&lookup, "PORT")?.unwrap_or(defaults.port),
            generation_delay: parse_var(&lookup, "GENERATION_DELAY_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.generation_delay),
            recommendation_delay: parse_var(&lookup, "RECOMMENDATION_DELAY_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.recommendation_delay),
            audit_log_capacity: parse_var(&lookup, "AUDIT_LOG_CAPACITY")?.unwrap_or(defaults.audit_log_capacity),
            max_upload_bytes: parse_var(&lookup, "MAX_UPLOAD_BYTES")?.unwrap_or(defaults.max_upload_bytes),
        })
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, name: &'static str) -> Result<Option<T>, ConfigError> {
    match lookup(name) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { name, value }),
    }
}
