use std::time::Duration;

use config::{Config as ConfigLoader, ConfigError, Environment, File};
use serde::Deserialize;

/// Closed configuration for the ingestion engine, recognizing exactly the
/// environment variables documented in the specification (section 6). Every
/// option is a typed field with a default rather than a loose string map.
#[derive(Clone, Deserialize, Debug, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    pub max_concurrent_jobs: u32,
    pub job_timeout_ms: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub heartbeat_interval_ms: u64,
    pub heartbeat_timeout_ms: u64,
    pub progress_timeout_ms: u64,
    pub cleanup_interval_ms: u64,

    pub context_embeddings_enabled: bool,
    pub context_model: String,
    pub context_batch_size: u32,
    pub context_max_tokens: u32,
    pub context_temperature: f32,

    pub max_file_size: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 3,
            job_timeout_ms: 7_200_000,
            max_retries: 3,
            retry_delay_ms: 30_000,
            heartbeat_interval_ms: 30_000,
            heartbeat_timeout_ms: 300_000,
            progress_timeout_ms: 600_000,
            cleanup_interval_ms: 180_000,

            context_embeddings_enabled: true,
            context_model: "context-default".to_string(),
            context_batch_size: 5,
            context_max_tokens: 150,
            context_temperature: 0.2,

            max_file_size: 100 * 1024 * 1024,
        }
    }
}

impl EngineConfig {
    #[must_use]
    pub fn job_timeout(&self) -> Duration {
        Duration::from_millis(self.job_timeout_ms)
    }

    #[must_use]
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    #[must_use]
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    #[must_use]
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }

    #[must_use]
    pub fn progress_timeout(&self) -> Duration {
        Duration::from_millis(self.progress_timeout_ms)
    }

    #[must_use]
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_millis(self.cleanup_interval_ms)
    }

    #[must_use]
    pub fn context_batch_size(&self) -> usize {
        self.context_batch_size.clamp(1, 20) as usize
    }
}

/// Loads configuration from environment variables (and an optional
/// `config.toml`/`config.yaml` file in the working directory), matching the
/// teacher's `get_config` layering: file source first, environment overrides
/// on top.
pub fn load_config() -> Result<EngineConfig, ConfigError> {
    let defaults = EngineConfig::default();

    let loader = ConfigLoader::builder()
        .set_default("max_concurrent_jobs", i64::from(defaults.max_concurrent_jobs))?
        .set_default("job_timeout_ms", defaults.job_timeout_ms as i64)?
        .set_default("max_retries", i64::from(defaults.max_retries))?
        .set_default("retry_delay_ms", defaults.retry_delay_ms as i64)?
        .set_default("heartbeat_interval_ms", defaults.heartbeat_interval_ms as i64)?
        .set_default("heartbeat_timeout_ms", defaults.heartbeat_timeout_ms as i64)?
        .set_default("progress_timeout_ms", defaults.progress_timeout_ms as i64)?
        .set_default("cleanup_interval_ms", defaults.cleanup_interval_ms as i64)?
        .set_default(
            "context_embeddings_enabled",
            defaults.context_embeddings_enabled,
        )?
        .set_default("context_model", defaults.context_model.clone())?
        .set_default("context_batch_size", i64::from(defaults.context_batch_size))?
        .set_default("context_max_tokens", i64::from(defaults.context_max_tokens))?
        .set_default("context_temperature", f64::from(defaults.context_temperature))?
        .set_default("max_file_size", defaults.max_file_size as i64)?
        .add_source(File::with_name("config").required(false))
        .add_source(Environment::default())
        .build()?;

    loader.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_specification() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.max_concurrent_jobs, 3);
        assert_eq!(cfg.job_timeout_ms, 7_200_000);
        assert_eq!(cfg.max_retries, 3);
        assert_eq!(cfg.retry_delay_ms, 30_000);
        assert_eq!(cfg.heartbeat_interval_ms, 30_000);
        assert_eq!(cfg.heartbeat_timeout_ms, 300_000);
        assert_eq!(cfg.progress_timeout_ms, 600_000);
        assert_eq!(cfg.cleanup_interval_ms, 180_000);
        assert_eq!(cfg.max_file_size, 100 * 1024 * 1024);
    }

    #[test]
    fn context_batch_size_is_clamped() {
        let mut cfg = EngineConfig::default();
        cfg.context_batch_size = 50;
        assert_eq!(cfg.context_batch_size(), 20);
        cfg.context_batch_size = 0;
        assert_eq!(cfg.context_batch_size(), 1);
    }
}
