// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::constants::{DEFAULT_DIRECTORY, DEFAULT_FLUSH_INTERVAL};
use crate::envelope::{validate_system, ClusterTag};
use crate::errors::ConfigError;

/// Configuration for the collector
#[derive(Debug, Clone, PartialEq)]
pub struct CollectorConfig {
    /// Directory the dated log files are written to, created on startup
    pub directory: PathBuf,
    /// Time between two automatic flushes
    pub flush_interval: Duration,
    /// Whether debug lines are echoed to the console. They are persisted either way.
    pub debug: bool,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from(DEFAULT_DIRECTORY),
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            debug: true,
        }
    }
}

impl CollectorConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let directory = env::var("LOGGER_DIRECTORY")
            .map(PathBuf::from)
            .unwrap_or(defaults.directory);
        let flush_interval = match env::var("LOGGER_FLUSH_INTERVAL_MS") {
            Ok(val) => val
                .trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|_| {
                    ConfigError::Invalid(format!(
                        "LOGGER_FLUSH_INTERVAL_MS must be a number of milliseconds, got '{val}'"
                    ))
                })?,
            Err(_) => defaults.flush_interval,
        };
        let debug = env::var("LOGGER_DEBUG")
            .map(|val| val.to_lowercase() != "false")
            .unwrap_or(defaults.debug);

        let config = Self {
            directory,
            flush_interval,
            debug,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.directory.as_os_str().is_empty() {
            return Err(ConfigError::Invalid(
                "log directory cannot be empty".to_string(),
            ));
        }

        if self.flush_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "flush interval must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Configuration for an emitter
#[derive(Debug, Clone)]
pub struct EmitterConfig {
    /// Name of the producing system, e.g. "gateway"
    pub system: String,
    /// Shard within the system
    pub cluster: ClusterTag,
    /// When false, debug lines are not echoed locally. They are still sent.
    pub debug: bool,
    /// Echo the decorated line on this process' stdout as well
    pub echo: bool,
}

impl EmitterConfig {
    pub fn new(system: impl Into<String>, cluster: impl Into<ClusterTag>) -> Self {
        Self {
            system: system.into(),
            cluster: cluster.into(),
            debug: true,
            echo: false,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_system(&self.system).map_err(ConfigError::Invalid)?;
        if self.cluster.as_str().is_empty() {
            return Err(ConfigError::Invalid("cluster cannot be empty".to_string()));
        }
        Ok(())
    }
}
