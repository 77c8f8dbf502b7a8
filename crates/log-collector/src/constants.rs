// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

/// Logical name of the channel producers and the collector meet on.
pub const LOGGER_CHANNEL: &str = "logger";

pub const DEFAULT_DIRECTORY: &str = "./logs";
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(60);

/// Largest encoded envelope carried by one datagram. Clients refuse to send
/// anything larger and the collector drops anything that does not fit.
pub const MAX_DATAGRAM_SIZE: usize = 65_536;

/// Shared file that aggregates error and fatal lines from every system.
pub const ERROR_FILE_SCOPE: &str = "error";

pub const CLUSTER_WIDTH: usize = 2;
pub const SYSTEM_WIDTH: usize = 7;
pub const SEVERITY_WIDTH: usize = 5;

/// Display tag substituted for cluster 0.
pub const MASTER_CLUSTER_TAG: &str = "MA";

pub const TRUNCATION_MARKER: char = '-';

pub const FATAL_EXIT_CODE: i32 = 1;
