// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::io::Write;
#[cfg(test)]
use std::sync::{Mutex, PoisonError};

/// Where decorated lines are echoed.
pub(crate) enum Console {
    Stdout,

    /// Captures echoed lines instead of printing them
    #[cfg(test)]
    Capture(Mutex<Vec<String>>),
}

impl Console {
    pub(crate) fn echo(&self, line: &str) {
        match self {
            Console::Stdout => {
                let _ = writeln!(std::io::stdout().lock(), "{line}");
            }
            #[cfg(test)]
            Console::Capture(lines) => lines
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(line.to_string()),
        }
    }

    #[cfg(test)]
    pub(crate) fn capture() -> Self {
        Console::Capture(Mutex::new(Vec::new()))
    }

    #[cfg(test)]
    pub(crate) fn captured(&self) -> Vec<String> {
        match self {
            Console::Capture(lines) => lines
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
            Console::Stdout => Vec::new(),
        }
    }
}

impl std::fmt::Debug for Console {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Console::Stdout => f.write_str("Stdout"),
            #[cfg(test)]
            Console::Capture(_) => f.write_str("Capture"),
        }
    }
}
