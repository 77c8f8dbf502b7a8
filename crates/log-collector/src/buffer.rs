// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Per-system accumulation of formatted lines between flushes.
//!
//! Every slot is either empty or a run of complete, newline terminated lines.
//! `take_pending` swaps slots out and leaves them empty, so lines appended after
//! the swap belong to the next flush. A system also remembers the order in which
//! its slots were written, so the detached entries replay its lines in arrival
//! order.

use std::collections::BTreeMap;

use crate::severity::Severity;

/// Which slot of a [`SystemBuffer`] a line lands in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Slot {
    Data,
    Error,
    Fatal,
}

impl Slot {
    #[must_use]
    pub fn for_severity(severity: Severity) -> Self {
        match severity {
            Severity::Error => Slot::Error,
            Severity::Fatal => Slot::Fatal,
            Severity::Debug | Severity::Info | Severity::Warn => Slot::Data,
        }
    }

    fn index(self) -> usize {
        match self {
            Slot::Data => 0,
            Slot::Error => 1,
            Slot::Fatal => 2,
        }
    }
}

#[derive(Debug, Default)]
pub struct SystemBuffer {
    slots: [String; 3],
    // Consecutive appends to one slot, as (slot, bytes)
    runs: Vec<(Slot, usize)>,
}

impl SystemBuffer {
    fn push(&mut self, slot: Slot, line: &str) {
        let content = &mut self.slots[slot.index()];
        content.push_str(line);
        content.push('\n');
        let added = line.len() + 1;
        if let Some((last, len)) = self.runs.last_mut() {
            if *last == slot {
                *len += added;
                return;
            }
        }
        self.runs.push((slot, added));
    }

    fn drain_into(&mut self, system: &str, entries: &mut Vec<PendingEntry>) {
        let slots = std::mem::take(&mut self.slots);
        let mut offsets = [0usize; 3];
        for (slot, len) in self.runs.drain(..) {
            let offset = &mut offsets[slot.index()];
            if let Some(content) = slots[slot.index()].get(*offset..*offset + len) {
                entries.push(PendingEntry {
                    system: system.to_string(),
                    slot,
                    content: content.to_string(),
                });
            }
            *offset += len;
        }
    }

    #[must_use]
    pub fn data(&self) -> &str {
        &self.slots[Slot::Data.index()]
    }

    #[must_use]
    pub fn error(&self) -> &str {
        &self.slots[Slot::Error.index()]
    }

    #[must_use]
    pub fn fatal(&self) -> &str {
        &self.slots[Slot::Fatal.index()]
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }
}

/// Content detached from one slot of one system.
#[derive(Debug, PartialEq, Eq)]
pub struct PendingEntry {
    pub system: String,
    pub slot: Slot,
    pub content: String,
}

/// System name to buffer. Entries are created on first use and never removed.
#[derive(Debug, Default)]
pub struct PendingSet {
    systems: BTreeMap<String, SystemBuffer>,
}

impl PendingSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `line` plus a newline to the slot matching `severity`.
    pub fn append(&mut self, system: &str, severity: Severity, line: &str) {
        self.systems
            .entry(system.to_string())
            .or_default()
            .push(Slot::for_severity(severity), line);
    }

    /// Detaches every non-empty slot, leaving it empty.
    ///
    /// Systems come out in name order. Within a system, entries follow arrival
    /// order: info A, error B, info C yields data A, error B, data C.
    pub fn take_pending(&mut self) -> Vec<PendingEntry> {
        let mut entries = Vec::new();
        for (system, buffer) in &mut self.systems {
            buffer.drain_into(system, &mut entries);
        }
        entries
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.systems.values().all(SystemBuffer::is_empty)
    }

    #[must_use]
    pub fn system_count(&self) -> usize {
        self.systems.len()
    }

    #[must_use]
    pub fn get(&self, system: &str) -> Option<&SystemBuffer> {
        self.systems.get(system)
    }
}
