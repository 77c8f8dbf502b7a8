// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Per-process facade that producers log through.
//!
//! Every call normalizes its value and performs exactly one send to the
//! collector. Nothing is buffered or retried locally: a failed send is returned
//! to the caller.

#[cfg(unix)]
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Local;
use tracing::{debug, trace};

use crate::config::EmitterConfig;
use crate::console::Console;
#[cfg(unix)]
use crate::constants::LOGGER_CHANNEL;
use crate::envelope::LogEnvelope;
use crate::errors::{StartupError, TransportError};
use crate::format::format_line;
use crate::normalize::{normalize, LogValue};
use crate::severity::Severity;
use crate::transport::ChannelClient;

const TRUNCATED_SUFFIX: &str = "\n    ... (truncated)";

#[derive(Debug)]
pub struct Emitter {
    config: EmitterConfig,
    client: ChannelClient,
    terminated: AtomicBool,
    console: Console,
}

impl Emitter {
    pub fn new(config: EmitterConfig, client: ChannelClient) -> Result<Self, StartupError> {
        config.validate()?;
        Ok(Self {
            config,
            client,
            terminated: AtomicBool::new(false),
            console: Console::Stdout,
        })
    }

    /// Opens a client on the "logger" channel whose socket lives in `socket_dir`.
    #[cfg(unix)]
    pub fn connect(config: EmitterConfig, socket_dir: &Path) -> Result<Self, StartupError> {
        let client = ChannelClient::connect(socket_dir, LOGGER_CHANNEL)?;
        Self::new(config, client)
    }

    #[must_use]
    pub fn config(&self) -> &EmitterConfig {
        &self.config
    }

    pub fn info(&self, value: impl Into<LogValue>) -> Result<(), TransportError> {
        self.log(Severity::Info, value.into())
    }

    pub fn warn(&self, value: impl Into<LogValue>) -> Result<(), TransportError> {
        self.log(Severity::Warn, value.into())
    }

    pub fn error(&self, value: impl Into<LogValue>) -> Result<(), TransportError> {
        self.log(Severity::Error, value.into())
    }

    pub fn debug(&self, value: impl Into<LogValue>) -> Result<(), TransportError> {
        self.log(Severity::Debug, value.into())
    }

    fn log(&self, severity: Severity, value: LogValue) -> Result<(), TransportError> {
        if self.is_terminated() {
            trace!("Dropping {} line after fatal termination", severity);
            return Ok(());
        }
        self.transmit(severity, normalize(value))
    }

    /// Sends the final line of a crashing process. Only the fatal hook calls this.
    ///
    /// A report too large for one datagram is cut down until it fits, so that
    /// at least its head reaches the collector. The console gets it whole.
    pub(crate) fn send_fatal(&self, report: String) -> Result<(), TransportError> {
        let mut envelope = self.envelope(Severity::Fatal, report);
        self.echo(&envelope);

        let mut sent = self.client.send(&envelope);
        while let Err(TransportError::Oversized { size, limit }) = sent {
            let keep = envelope.message.len() / 2;
            if keep == 0 {
                break;
            }
            debug!("Fatal report is {} bytes over {}, shortening", size, limit);
            shorten(&mut envelope.message, keep);
            sent = self.client.send(&envelope);
        }
        sent
    }

    pub(crate) fn terminate(&self) {
        self.terminated.store(true, Ordering::SeqCst);
    }

    /// True once the fatal hook has fired; later calls are ignored.
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    fn transmit(&self, severity: Severity, message: String) -> Result<(), TransportError> {
        let envelope = self.envelope(severity, message);
        let sent = self.client.send(&envelope);
        self.echo(&envelope);
        sent
    }

    fn envelope(&self, severity: Severity, message: String) -> LogEnvelope {
        LogEnvelope {
            severity,
            system: self.config.system.clone(),
            cluster: self.config.cluster.clone(),
            message,
        }
    }

    // Fatal lines are always shown, the process is about to go away
    fn echo(&self, envelope: &LogEnvelope) {
        let wanted = match envelope.severity {
            Severity::Fatal => true,
            Severity::Debug => self.config.echo && self.config.debug,
            Severity::Info | Severity::Warn | Severity::Error => self.config.echo,
        };
        if wanted {
            let line = format_line(
                envelope.severity,
                &envelope.system,
                &envelope.cluster,
                &envelope.message,
                Local::now().naive_local(),
            );
            self.console.echo(&line.decorated);
        }
    }
}

/// Truncates `message` to at most `max_len` bytes on a char boundary and marks it.
fn shorten(message: &mut String, max_len: usize) {
    let mut end = max_len.min(message.len());
    while !message.is_char_boundary(end) {
        end -= 1;
    }
    message.truncate(end);
    message.push_str(TRUNCATED_SUFFIX);
}
