// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Writes detached buffer content to dated files.
//!
//! Each system gets `[<system>]<YYYY-MM-DD>.log`. Error and fatal content is also
//! appended to the shared `[error]<YYYY-MM-DD>.log`.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use tokio::io::AsyncWriteExt;
use tokio::task::JoinSet;
use tracing::{debug, error};

use crate::buffer::{PendingEntry, Slot};
use crate::constants::ERROR_FILE_SCOPE;
use crate::errors::FlushError;

/// One append to one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileWrite {
    pub path: PathBuf,
    pub content: String,
}

#[must_use]
pub fn log_file_name(scope: &str, date: NaiveDate) -> String {
    format!("[{scope}]{}.log", date.format("%Y-%m-%d"))
}

/// Maps detached entries to file appends.
///
/// Content bound for the same file is coalesced in entry order, so no two
/// concurrent appends ever target one file. Since `take_pending` yields a
/// system's entries in arrival order, its file receives its lines in the order
/// they were ingested, whatever their severity.
#[must_use]
pub fn plan_writes(directory: &Path, date: NaiveDate, entries: Vec<PendingEntry>) -> Vec<FileWrite> {
    let mut writes: Vec<FileWrite> = Vec::new();
    let mut push = |path: PathBuf, content: &str| {
        match writes.iter_mut().find(|w| w.path == path) {
            Some(write) => write.content.push_str(content),
            None => writes.push(FileWrite {
                path,
                content: content.to_string(),
            }),
        }
    };

    for entry in entries {
        if matches!(entry.slot, Slot::Error | Slot::Fatal) {
            push(
                directory.join(log_file_name(ERROR_FILE_SCOPE, date)),
                &entry.content,
            );
        }
        push(
            directory.join(log_file_name(&entry.system, date)),
            &entry.content,
        );
    }
    writes
}

async fn append(write: FileWrite) -> Result<usize, FlushError> {
    let to_error = |source| FlushError::Append {
        path: write.path.clone(),
        source,
    };
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&write.path)
        .await
        .map_err(to_error)?;
    file.write_all(write.content.as_bytes())
        .await
        .map_err(to_error)?;
    file.flush().await.map_err(to_error)?;
    Ok(write.content.len())
}

#[derive(Debug, Clone)]
pub struct FileFlusher {
    directory: PathBuf,
}

impl FileFlusher {
    #[must_use]
    pub fn new(directory: PathBuf) -> Self {
        Self { directory }
    }

    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Appends every entry for `date` concurrently, one task per file.
    ///
    /// Waits for all appends to settle and reports the first failure. Content of a
    /// failed append is not retried.
    pub async fn flush(
        &self,
        date: NaiveDate,
        entries: Vec<PendingEntry>,
    ) -> Result<usize, FlushError> {
        let writes = plan_writes(&self.directory, date, entries);
        if writes.is_empty() {
            return Ok(0);
        }
        let n_files = writes.len();
        debug!("Flushing to {n_files} files");

        let mut set = JoinSet::new();
        for write in writes {
            set.spawn(append(write));
        }

        let mut written = 0;
        let mut first_error = None;
        while let Some(result) = set.join_next().await {
            match result.map_err(FlushError::from).and_then(|r| r) {
                Ok(bytes) => written += bytes,
                Err(e) => {
                    error!("Flush append failed: {e}");
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => {
                debug!("Flushed {written} bytes to {n_files} files");
                Ok(written)
            }
        }
    }
}
