//! Engine configuration.

use std::time::Duration;

use manifest_reader::{ReaderConfig, ValidationError};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid import config: {0}")]
    Invalid(String),
    #[error("unparseable import config: {0}")]
    Unparseable(#[from] toml::de::Error),
}

/// Tunables for the import executor and its manifest reader.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ImportConfig {
    /// Bounded retries when the per-owner lock is contended.
    pub max_lock_retries: u32,
    /// Delay between lock retries, in milliseconds.
    pub lock_retry_delay_ms: u64,
    /// Principal stamped into import history records.
    pub generated_by: String,
    pub require_signature: bool,
    pub max_archive_bytes: u64,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            max_lock_retries: 5,
            lock_retry_delay_ms: 20,
            generated_by: "admin".to_string(),
            require_signature: true,
            max_archive_bytes: 16 * 1024 * 1024,
        }
    }
}

impl ImportConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.generated_by.is_empty() {
            return Err(ConfigError::Invalid("generated-by cannot be empty".into()));
        }
        if self.max_archive_bytes == 0 {
            return Err(ConfigError::Invalid(
                "max-archive-bytes cannot be zero".into(),
            ));
        }
        Ok(())
    }

    #[must_use]
    pub const fn lock_retry_delay(&self) -> Duration {
        Duration::from_millis(self.lock_retry_delay_ms)
    }

    pub fn reader_config(&self) -> Result<ReaderConfig, ValidationError> {
        let config = ReaderConfig {
            require_signature: self.require_signature,
            max_archive_bytes: self.max_archive_bytes,
        };
        config.validate()?;
        Ok(config)
    }
}
