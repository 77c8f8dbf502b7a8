// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::{ERROR_FILE_SCOPE, MASTER_CLUSTER_TAG};
use crate::errors::TransportError;
use crate::severity::Severity;

/// Shard or instance identifier within a system, kept as a short display tag.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClusterTag(String);

impl ClusterTag {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_master(&self) -> bool {
        self.0 == MASTER_CLUSTER_TAG
    }
}

// Shard 0 is displayed with the master tag. This is cosmetic only.
macro_rules! impl_from_shard_id {
    ($($t:ty),*) => {
        $(
            impl From<$t> for ClusterTag {
                fn from(id: $t) -> Self {
                    if id == 0 {
                        ClusterTag(MASTER_CLUSTER_TAG.to_string())
                    } else {
                        ClusterTag(id.to_string())
                    }
                }
            }
        )*
    };
}

impl_from_shard_id!(u8, u16, u32, u64, usize, i32);

impl From<&str> for ClusterTag {
    fn from(tag: &str) -> Self {
        ClusterTag(tag.to_string())
    }
}

impl From<String> for ClusterTag {
    fn from(tag: String) -> Self {
        ClusterTag(tag)
    }
}

impl fmt::Display for ClusterTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Checks that `system` can name its own `[<system>]<date>.log` file.
///
/// The name must be non-blank, must not be the shared error scope (in any case,
/// since some filesystems fold case) and must stay a single path component.
pub fn validate_system(system: &str) -> Result<(), String> {
    if system.trim().is_empty() {
        return Err("system must not be empty".to_string());
    }
    if system.eq_ignore_ascii_case(ERROR_FILE_SCOPE) {
        return Err(format!(
            "system '{system}' is reserved for the shared error file"
        ));
    }
    if system.contains(['/', '\\', '\0']) || system.contains("..") {
        return Err(format!(
            "system '{system}' must not contain path separators or '..'"
        ));
    }
    Ok(())
}

/// Unit sent over the channel. Consumed synchronously by the collector on arrival.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEnvelope {
    pub severity: Severity,
    pub system: String,
    pub cluster: ClusterTag,
    pub message: String,
}

impl LogEnvelope {
    pub fn new(
        severity: Severity,
        system: impl Into<String>,
        cluster: impl Into<ClusterTag>,
        message: impl Into<String>,
    ) -> Result<Self, TransportError> {
        let envelope = Self {
            severity,
            system: system.into(),
            cluster: cluster.into(),
            message: message.into(),
        };
        envelope.validate()?;
        Ok(envelope)
    }

    /// Envelopes decoded off the wire bypass `new`, so the receiving side checks again.
    pub fn validate(&self) -> Result<(), TransportError> {
        validate_system(&self.system).map_err(TransportError::InvalidEnvelope)
    }
}
