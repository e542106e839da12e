//! Configuration loading and validation

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, info};
use thiserror::Error;

use probestation_core::config::SweepError;
use probestation_core::scheduler::GridError;

use super::ScanConfig;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid grid: {}", .0.as_str())]
    Grid(GridError),

    #[error("invalid sweep: {}", .0.as_str())]
    Sweep(SweepError),

    #[error("invalid timing: {0}")]
    Timing(&'static str),

    #[error("wafer name must not be empty")]
    EmptyWaferName,
}

impl From<GridError> for ConfigError {
    fn from(e: GridError) -> Self {
        ConfigError::Grid(e)
    }
}

impl From<SweepError> for ConfigError {
    fn from(e: SweepError) -> Self {
        ConfigError::Sweep(e)
    }
}

impl ScanConfig {
    /// Load and validate a configuration file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        debug!("Reading configuration from {}", path.display());
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let config = Self::from_toml_str(&content)?;
        info!(
            "Loaded configuration: wafer {} ({} devices)",
            config.wafer.name,
            config.wafer.dims().device_count()
        );
        Ok(config)
    }

    /// Parse and validate configuration text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: ScanConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every section
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.wafer.name.trim().is_empty() {
            return Err(ConfigError::EmptyWaferName);
        }
        self.wafer.dims().validate()?;
        self.sweep.validate()?;

        if self.timing.poll_interval_ms == 0 {
            return Err(ConfigError::Timing("poll_interval_ms must be positive"));
        }
        if self.timing.queue_poll_ms == 0 {
            return Err(ConfigError::Timing("queue_poll_ms must be positive"));
        }
        if self.timing.screening_timeout_ms == 0 || self.timing.full_test_timeout_ms == 0 {
            return Err(ConfigError::Timing("measurement timeouts must be positive"));
        }
        Ok(())
    }
}
