// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::{env, path::PathBuf, process::ExitCode};

use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use log_collector::{
    collector::Collector,
    config::CollectorConfig,
    constants::LOGGER_CHANNEL,
    errors::{ConfigError, StartupError},
    transport::{socket_path, ChannelServer},
};

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

#[derive(Debug, Clone, PartialEq)]
struct ServerConfig {
    collector: CollectorConfig,
    socket_dir: PathBuf,
    log_level: String,
}

impl ServerConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let collector = CollectorConfig::from_env()?;
        let socket_dir = env::var("LOGGER_SOCKET_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| env::temp_dir());
        let log_level = env::var("LOGGER_LOG_LEVEL")
            .map(|val| val.to_lowercase())
            .unwrap_or("info".to_string());
        if !LOG_LEVELS.contains(&log_level.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "LOGGER_LOG_LEVEL must be one of {LOG_LEVELS:?}, got {log_level:?}"
            )));
        }
        Ok(Self {
            collector,
            socket_dir,
            log_level,
        })
    }
}

#[tokio::main]
pub async fn main() -> ExitCode {
    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(EnvFilter::new(&config.log_level))
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .without_time()
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {e}");
        return ExitCode::FAILURE;
    }

    debug!("Logging subsystem enabled");

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Log collector failed to start: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(config: ServerConfig) -> Result<(), StartupError> {
    let server = ChannelServer::bind(&config.socket_dir, LOGGER_CHANNEL)?;
    info!(
        "Listening on {}",
        socket_path(&config.socket_dir, LOGGER_CHANNEL).display()
    );

    let handle = Collector::start(config.collector, server).await?;

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutting down, flushing remaining log lines");

    match handle.shutdown().await {
        Ok(bytes) => debug!("Final flush wrote {} bytes", bytes),
        Err(e) => error!("Final flush failed: {}", e),
    }
    Ok(())
}
