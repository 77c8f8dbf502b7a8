// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::severity::{Channel, Severity};

/// Synchronous subscriber receiving the plain formatted line.
pub type Listener = Arc<dyn Fn(&str) + Send + Sync>;

/// Subscribers per channel, kept in registration order. There is no removal.
#[derive(Default)]
pub struct ListenerRegistry {
    listeners: HashMap<Channel, Vec<Listener>>,
}

impl fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: HashMap<&Channel, usize> =
            self.listeners.iter().map(|(k, v)| (k, v.len())).collect();
        f.debug_struct("ListenerRegistry")
            .field("listeners", &counts)
            .finish()
    }
}

impl ListenerRegistry {
    pub fn register(&mut self, channel: Channel, listener: Listener) {
        self.listeners.entry(channel).or_default().push(listener);
    }

    /// Calls the listeners for `severity`, then the "all" listeners. Returns how
    /// many were invoked. A slow listener delays the caller.
    pub fn notify(&self, severity: Severity, line: &str) -> usize {
        let mut invoked = 0;
        for channel in [Channel::Severity(severity), Channel::All] {
            if let Some(listeners) = self.listeners.get(&channel) {
                for listener in listeners {
                    listener(line);
                    invoked += 1;
                }
            }
        }
        invoked
    }

    #[must_use]
    pub fn len(&self, channel: Channel) -> usize {
        self.listeners.get(&channel).map_or(0, Vec::len)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.listeners.values().all(Vec::is_empty)
    }
}
