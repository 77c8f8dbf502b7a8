// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Error types for the collector and emitter.

use std::path::PathBuf;

/// Configuration was rejected before anything was started.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// The collector could not be started.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to create log directory {}: {source}", path.display())]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to open channel: {0}")]
    Transport(#[from] TransportError),
}

/// At least one file append failed during a flush cycle. The content of that
/// cycle has already been detached from the buffers and is not restored.
#[derive(Debug, thiserror::Error)]
pub enum FlushError {
    #[error("Failed to append to {}: {source}", path.display())]
    Append {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Flush task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Send or receive failure at the channel boundary.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Channel I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode or decode envelope: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("Invalid envelope: {0}")]
    InvalidEnvelope(String),

    #[error("Encoded envelope is {size} bytes, over the {limit} byte datagram limit")]
    Oversized { size: usize, limit: usize },

    #[error("Channel closed")]
    Closed,
}
