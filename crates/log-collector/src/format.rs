// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Line formatting for persisted and console output.
//!
//! A plain line looks like:
//!
//! ```text
//! 2024-03-09 14:02:11 | [03] GATEWAY | WARN  | upstream slow
//! ```
//!
//! Cluster, system and severity are fixed width so files stay column aligned.
//! A field longer than its width keeps its first `width - 1` characters followed
//! by a single `-` marker.

use chrono::NaiveDateTime;

use crate::constants::{CLUSTER_WIDTH, SEVERITY_WIDTH, SYSTEM_WIDTH, TRUNCATION_MARKER};
use crate::envelope::ClusterTag;
use crate::severity::Severity;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

mod ansi {
    pub(super) const RESET: &str = "\x1b[0m";
    pub(super) const BRIGHT: &str = "\x1b[1m";
    pub(super) const DIM: &str = "\x1b[2m";
    pub(super) const BLACK: &str = "\x1b[30m";
    pub(super) const RED: &str = "\x1b[31m";
    pub(super) const GREEN: &str = "\x1b[32m";
    pub(super) const YELLOW: &str = "\x1b[33m";
    pub(super) const BLUE: &str = "\x1b[34m";
    pub(super) const CYAN: &str = "\x1b[36m";
    pub(super) const WHITE: &str = "\x1b[37m";
}

/// A formatted log line: `plain` is persisted, `decorated` is console only.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FormattedLine {
    pub plain: String,
    pub decorated: String,
}

fn severity_color(severity: Severity) -> &'static str {
    match severity {
        Severity::Info => ansi::GREEN,
        Severity::Warn => ansi::YELLOW,
        Severity::Error => ansi::RED,
        Severity::Debug => ansi::BLUE,
        Severity::Fatal => ansi::CYAN,
    }
}

#[derive(Clone, Copy)]
enum Pad {
    Left,
    Right,
}

/// Pads `text` to exactly `width` characters, or truncates it with the marker.
fn align(text: &str, width: usize, fill: char, pad: Pad) -> String {
    let len = text.chars().count();
    if len > width {
        let mut truncated: String = text.chars().take(width.saturating_sub(1)).collect();
        truncated.push(TRUNCATION_MARKER);
        return truncated;
    }

    let filler: String = std::iter::repeat(fill).take(width - len).collect();
    match pad {
        Pad::Left => filler + text,
        Pad::Right => text.to_string() + &filler,
    }
}

/// Formats one line. Pure: the same inputs always give the same output.
#[must_use]
pub fn format_line(
    severity: Severity,
    system: &str,
    cluster: &ClusterTag,
    message: &str,
    timestamp: NaiveDateTime,
) -> FormattedLine {
    let date = timestamp.format(TIMESTAMP_FORMAT).to_string();
    let cluster_field = align(cluster.as_str(), CLUSTER_WIDTH, '0', Pad::Left);
    let system_field = align(&system.to_uppercase(), SYSTEM_WIDTH, '-', Pad::Left);
    let severity_field = align(
        &severity.as_str().to_uppercase(),
        SEVERITY_WIDTH,
        ' ',
        Pad::Right,
    );

    let plain = format!("{date} | [{cluster_field}] {system_field} | {severity_field} | {message}");

    let frame = format!("{}{}", ansi::BLACK, ansi::BRIGHT);
    let origin_weight = if cluster.is_master() {
        ansi::BRIGHT
    } else {
        ansi::DIM
    };
    let decorated = format!(
        "{frame}{date} | {origin_weight}{cyan}[{cluster_field}] {system_field} {frame}| {color}{severity_field} {frame}| {white}{message}{reset}",
        cyan = ansi::CYAN,
        color = severity_color(severity),
        white = ansi::WHITE,
        reset = ansi::RESET,
    );

    FormattedLine { plain, decorated }
}
