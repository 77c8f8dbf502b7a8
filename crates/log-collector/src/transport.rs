// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Adapter over the named "logger" channel.
//!
//! Envelopes travel as one JSON document per datagram. Delivery is best effort and
//! in order per sender; nothing here acknowledges, sequences or retries.

use std::path::{Path, PathBuf};

use tokio::sync::mpsc;
use tracing::{debug, error, trace};

use crate::constants::MAX_DATAGRAM_SIZE;
use crate::envelope::LogEnvelope;
use crate::errors::TransportError;

/// Filesystem location of the unix datagram socket for a named channel.
#[must_use]
pub fn socket_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}.sock"))
}

#[cfg(unix)]
fn decode(buf: &[u8]) -> Result<LogEnvelope, TransportError> {
    let envelope: LogEnvelope = serde_json::from_slice(buf)?;
    envelope.validate()?;
    Ok(envelope)
}

// ChannelReader abstracts the receiving transports.
enum ChannelReader {
    #[cfg(unix)]
    UnixDatagram {
        socket: tokio::net::UnixDatagram,
        path: PathBuf,
    },

    /// Same-process delivery, also what the tests drive the collector with.
    InProcess(mpsc::UnboundedReceiver<LogEnvelope>),

    /// Fails every read, counting the attempts
    #[cfg(test)]
    Failing(std::sync::Arc<std::sync::atomic::AtomicUsize>),
}

/// Receiving end of the channel, owned by the collector.
pub struct ChannelServer {
    reader: ChannelReader,
}

impl ChannelServer {
    /// Binds the unix datagram socket for `name` inside `dir`, replacing a stale socket file.
    #[cfg(unix)]
    pub fn bind(dir: &Path, name: &str) -> Result<Self, TransportError> {
        let path = socket_path(dir, name);
        match std::fs::remove_file(&path) {
            Ok(()) => debug!("Removed stale socket {}", path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        let socket = tokio::net::UnixDatagram::bind(&path)?;
        debug!("Channel '{}' listening on {}", name, path.display());
        Ok(Self {
            reader: ChannelReader::UnixDatagram { socket, path },
        })
    }

    /// Waits for the next well-formed envelope.
    ///
    /// Datagrams that do not decode are logged and skipped. Returns
    /// `TransportError::Closed` once an in-process channel has no senders left.
    pub async fn recv(&mut self) -> Result<LogEnvelope, TransportError> {
        loop {
            match &mut self.reader {
                #[cfg(unix)]
                ChannelReader::UnixDatagram { socket, .. } => {
                    // One spare byte tells a datagram that was cut short
                    let mut buf = vec![0; MAX_DATAGRAM_SIZE + 1];
                    let amt = socket.recv(&mut buf).await?;
                    trace!("Received {} bytes", amt);
                    if amt > MAX_DATAGRAM_SIZE {
                        error!(
                            "Dropping datagram over the {} byte limit",
                            MAX_DATAGRAM_SIZE
                        );
                        continue;
                    }
                    match decode(&buf[..amt]) {
                        Ok(envelope) => return Ok(envelope),
                        Err(e) => error!("Dropping undecodable envelope: {}", e),
                    }
                }
                ChannelReader::InProcess(rx) => {
                    return rx.recv().await.ok_or(TransportError::Closed);
                }
                #[cfg(test)]
                ChannelReader::Failing(attempts) => {
                    attempts.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                    return Err(std::io::Error::other("socket gone").into());
                }
            }
        }
    }
}

impl Drop for ChannelServer {
    fn drop(&mut self) {
        #[cfg(unix)]
        {
            if let ChannelReader::UnixDatagram { path, .. } = &self.reader {
                let _ = std::fs::remove_file(path);
            }
        }
    }
}

/// Sending end held by every emitter. Sends are synchronous so that the fatal
/// hook can use them while the process is going down.
#[derive(Debug)]
pub enum ChannelClient {
    #[cfg(unix)]
    UnixDatagram {
        socket: std::os::unix::net::UnixDatagram,
        target: PathBuf,
    },
    InProcess(mpsc::UnboundedSender<LogEnvelope>),
}

impl ChannelClient {
    /// Opens an unbound datagram socket aimed at the channel `name` in `dir`.
    /// The collector does not have to be up yet.
    #[cfg(unix)]
    pub fn connect(dir: &Path, name: &str) -> Result<Self, TransportError> {
        let socket = std::os::unix::net::UnixDatagram::unbound()?;
        Ok(ChannelClient::UnixDatagram {
            socket,
            target: socket_path(dir, name),
        })
    }

    /// Sends one envelope. Envelopes whose encoding exceeds
    /// [`MAX_DATAGRAM_SIZE`] are refused with `TransportError::Oversized`, on
    /// every transport, so behaviour does not depend on the deployment.
    pub fn send(&self, envelope: &LogEnvelope) -> Result<(), TransportError> {
        envelope.validate()?;
        let payload = serde_json::to_vec(envelope)?;
        if payload.len() > MAX_DATAGRAM_SIZE {
            return Err(TransportError::Oversized {
                size: payload.len(),
                limit: MAX_DATAGRAM_SIZE,
            });
        }
        match self {
            #[cfg(unix)]
            ChannelClient::UnixDatagram { socket, target } => {
                socket.send_to(&payload, target)?;
                Ok(())
            }
            ChannelClient::InProcess(tx) => tx
                .send(envelope.clone())
                .map_err(|_| TransportError::Closed),
        }
    }
}

#[cfg(test)]
impl ChannelServer {
    pub(crate) fn failing(attempts: std::sync::Arc<std::sync::atomic::AtomicUsize>) -> Self {
        Self {
            reader: ChannelReader::Failing(attempts),
        }
    }
}

/// Connected client and server living in the same process.
#[must_use]
pub fn in_process_channel() -> (ChannelClient, ChannelServer) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        ChannelClient::InProcess(tx),
        ChannelServer {
            reader: ChannelReader::InProcess(rx),
        },
    )
}
