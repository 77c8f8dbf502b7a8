// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The collector: receives envelopes on the "logger" channel, buffers formatted
//! lines per system and flushes them to dated files on a timer.
//!
//! Buffer mutations are serialised by one mutex that is held only while a line
//! is appended or while a flush swaps the pending slots out. File I/O always
//! works on already detached content. Whole flush calls are serialised by a
//! separate async mutex, so the timer and manual flushes never interleave.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use chrono::{Local, NaiveDate, NaiveDateTime};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace};

use crate::buffer::PendingSet;
use crate::config::CollectorConfig;
use crate::console::Console;
use crate::envelope::LogEnvelope;
use crate::errors::{ConfigError, FlushError, StartupError, TransportError};
use crate::flusher::FileFlusher;
use crate::format::format_line;
use crate::listeners::{Listener, ListenerRegistry};
use crate::severity::{Channel, Severity};
use crate::transport::ChannelServer;

const RECV_BACKOFF_BASE_MS: u64 = 10;
const MAX_RECV_BACKOFF_EXPONENT: u32 = 5;

pub struct Collector {
    config: CollectorConfig,
    pending: Mutex<PendingSet>,
    listeners: RwLock<ListenerRegistry>,
    flusher: FileFlusher,
    flush_lock: tokio::sync::Mutex<()>,
    console: Console,
}

impl Collector {
    pub fn new(config: CollectorConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let flusher = FileFlusher::new(config.directory.clone());
        Ok(Self {
            config,
            pending: Mutex::new(PendingSet::new()),
            listeners: RwLock::new(ListenerRegistry::default()),
            flusher,
            flush_lock: tokio::sync::Mutex::new(()),
            console: Console::Stdout,
        })
    }

    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.config.directory
    }

    fn pending(&self) -> MutexGuard<'_, PendingSet> {
        // A panicking listener must not take ingestion down with it
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a listener for one severity or for `Channel::All`.
    ///
    /// Listeners only see lines ingested after registration. They run on the
    /// ingestion path and must not register further listeners themselves.
    pub fn on<F>(&self, channel: impl Into<Channel>, handler: F) -> &Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        let listener: Listener = Arc::new(handler);
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .register(channel.into(), listener);
        self
    }

    /// Ingests one envelope stamped with the current local time.
    pub fn ingest(&self, envelope: &LogEnvelope) {
        self.ingest_at(envelope, Local::now().naive_local());
    }

    /// Envelopes whose system could not name its own file are dropped.
    pub fn ingest_at(&self, envelope: &LogEnvelope, timestamp: NaiveDateTime) {
        if let Err(e) = envelope.validate() {
            error!("Dropping envelope: {}", e);
            return;
        }
        let line = format_line(
            envelope.severity,
            &envelope.system,
            &envelope.cluster,
            &envelope.message,
            timestamp,
        );
        trace!("Ingesting {} line from {}", envelope.severity, envelope.system);

        self.pending()
            .append(&envelope.system, envelope.severity, &line.plain);

        if envelope.severity != Severity::Debug || self.config.debug {
            self.console.echo(&line.decorated);
        }

        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .notify(envelope.severity, &line.plain);
    }

    #[must_use]
    pub fn has_pending(&self) -> bool {
        !self.pending().is_empty()
    }

    /// Flushes everything pending into today's files. Returns the bytes written.
    pub async fn save(&self) -> Result<usize, FlushError> {
        self.save_for_date(Local::now().date_naive()).await
    }

    /// Flushes everything pending into the files for `date`.
    ///
    /// Content is detached from the buffers before any write is issued, so lines
    /// ingested meanwhile go to the next flush. On failure the detached content
    /// is not put back.
    pub async fn save_for_date(&self, date: NaiveDate) -> Result<usize, FlushError> {
        let _flush_guard = self.flush_lock.lock().await;

        let entries = self.pending().take_pending();
        if entries.is_empty() {
            trace!("Nothing to flush");
            return Ok(0);
        }
        self.flusher.flush(date, entries).await
    }

    /// Starts a collector: binds ingestion to `server`, creates the output
    /// directory, then starts the flush timer.
    pub async fn start(
        config: CollectorConfig,
        server: ChannelServer,
    ) -> Result<CollectorHandle, StartupError> {
        let collector = Arc::new(Collector::new(config)?);
        let cancel_token = CancellationToken::new();

        // Envelopes may be buffered before the directory exists
        let ingest_task = tokio::spawn(spin(
            Arc::clone(&collector),
            server,
            cancel_token.clone(),
        ));

        let directory = collector.directory().to_path_buf();
        if let Err(source) = tokio::fs::create_dir_all(&directory).await {
            cancel_token.cancel();
            return Err(StartupError::Storage {
                path: directory,
                source,
            });
        }
        info!("Writing logs to {}", directory.display());

        let flush_task = tokio::spawn(flush_loop(
            Arc::clone(&collector),
            collector.config.flush_interval,
            cancel_token.clone(),
        ));

        Ok(CollectorHandle {
            collector,
            cancel_token,
            tasks: vec![ingest_task, flush_task],
        })
    }
}

/// Receives envelopes until cancelled or the channel closes.
///
/// Read failures back off exponentially, from 20ms up to 320ms, so a broken
/// socket does not spin. A successful read resets the backoff.
async fn spin(collector: Arc<Collector>, mut server: ChannelServer, cancel_token: CancellationToken) {
    debug!("Collector ingestion started");
    let mut consecutive_errors: u32 = 0;
    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => break,
            received = server.recv() => match received {
                Ok(envelope) => {
                    consecutive_errors = 0;
                    collector.ingest(&envelope);
                }
                Err(TransportError::Closed) => {
                    debug!("Channel closed, stopping ingestion");
                    break;
                }
                Err(e) => {
                    consecutive_errors = consecutive_errors.saturating_add(1);
                    error!("Failed to receive envelope: {}", e);
                    let backoff_ms =
                        RECV_BACKOFF_BASE_MS << consecutive_errors.min(MAX_RECV_BACKOFF_EXPONENT);
                    tokio::select! {
                        _ = sleep(Duration::from_millis(backoff_ms)) => {}
                        _ = cancel_token.cancelled() => break,
                    }
                }
            },
        }
    }
    debug!("Collector ingestion stopped");
}

async fn flush_loop(collector: Arc<Collector>, period: Duration, cancel_token: CancellationToken) {
    let mut flush_interval = interval(period);
    flush_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    flush_interval.tick().await; // discard first tick, which is instantaneous

    loop {
        tokio::select! {
            _ = flush_interval.tick() => {
                if let Err(e) = collector.save().await {
                    error!("Periodic flush failed: {}", e);
                }
            }
            _ = cancel_token.cancelled() => break,
        }
    }
}

/// Handle to a started collector.
pub struct CollectorHandle {
    collector: Arc<Collector>,
    cancel_token: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl CollectorHandle {
    #[must_use]
    pub fn collector(&self) -> &Arc<Collector> {
        &self.collector
    }

    pub fn on<F>(&self, channel: impl Into<Channel>, handler: F) -> &Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.collector.on(channel, handler);
        self
    }

    pub async fn save(&self) -> Result<usize, FlushError> {
        self.collector.save().await
    }

    /// Stops ingestion and the timer, then flushes what is left.
    pub async fn shutdown(self) -> Result<usize, FlushError> {
        self.cancel_token.cancel();
        for task in self.tasks {
            if let Err(e) = task.await {
                error!("Collector task failed: {}", e);
            }
        }
        self.collector.save().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::in_process_channel;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 9).unwrap()
    }

    fn at() -> NaiveDateTime {
        date().and_hms_opt(8, 30, 0).unwrap()
    }

    fn collector(dir: &TempDir, debug: bool) -> Collector {
        let mut collector = Collector::new(CollectorConfig {
            directory: dir.path().to_path_buf(),
            flush_interval: Duration::from_secs(60),
            debug,
        })
        .unwrap();
        collector.console = Console::capture();
        collector
    }

    fn envelope(severity: Severity, system: &str, message: &str) -> LogEnvelope {
        LogEnvelope::new(severity, system, 1, message).unwrap()
    }

    fn read(dir: &TempDir, name: &str) -> String {
        std::fs::read_to_string(dir.path().join(name)).unwrap_or_default()
    }

    fn echoed(collector: &Collector) -> Vec<String> {
        collector.console.captured()
    }

    #[tokio::test]
    async fn test_no_loss_across_flush_boundary() {
        let dir = TempDir::new().unwrap();
        let collector = collector(&dir, true);

        for i in 0..5 {
            collector.ingest_at(&envelope(Severity::Info, "api", &format!("n{i}")), at());
        }
        collector.save_for_date(date()).await.unwrap();
        for i in 0..3 {
            collector.ingest_at(&envelope(Severity::Info, "api", &format!("m{i}")), at());
        }
        collector.save_for_date(date()).await.unwrap();

        let content = read(&dir, "[api]2024-03-09.log");
        let messages: Vec<&str> = content
            .lines()
            .map(|l| l.rsplit(" | ").next().unwrap())
            .collect();
        assert_eq!(messages, vec!["n0", "n1", "n2", "n3", "n4", "m0", "m1", "m2"]);
    }

    #[tokio::test]
    async fn test_error_lines_duplicated_into_error_file() {
        let dir = TempDir::new().unwrap();
        let collector = collector(&dir, true);

        collector.ingest_at(&envelope(Severity::Info, "api", "fine"), at());
        collector.ingest_at(&envelope(Severity::Warn, "api", "careful"), at());
        collector.ingest_at(&envelope(Severity::Debug, "api", "detail"), at());
        collector.ingest_at(&envelope(Severity::Error, "api", "broken"), at());
        collector.ingest_at(&envelope(Severity::Error, "db", "gone"), at());
        collector.save_for_date(date()).await.unwrap();

        let error_file = read(&dir, "[error]2024-03-09.log");
        assert_eq!(error_file.lines().count(), 2);
        assert!(error_file.contains("| ERROR | broken"));
        assert!(error_file.contains("| ERROR | gone"));
        for quiet in ["fine", "careful", "detail"] {
            assert!(!error_file.contains(quiet));
        }

        let api_file = read(&dir, "[api]2024-03-09.log");
        assert_eq!(api_file.lines().count(), 4);
        assert_eq!(api_file.matches("broken").count(), 1);
        assert!(read(&dir, "[db]2024-03-09.log").contains("gone"));
    }

    #[tokio::test]
    async fn test_reserved_or_path_like_systems_never_reach_files() {
        let dir = TempDir::new().unwrap();
        let collector = collector(&dir, true);

        for system in ["error", "ERROR", "billing/eu", ".."] {
            // Built directly, as a decoded envelope would be
            let envelope = LogEnvelope {
                severity: Severity::Info,
                system: system.to_string(),
                cluster: 1.into(),
                message: "just info".to_string(),
            };
            collector.ingest_at(&envelope, at());
        }
        collector.ingest_at(&envelope(Severity::Error, "billing", "real"), at());

        assert!(collector.save_for_date(date()).await.unwrap() > 0);
        let error_file = read(&dir, "[error]2024-03-09.log");
        assert_eq!(error_file.lines().count(), 1);
        assert!(!error_file.contains("just info"));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 2);
    }

    #[tokio::test]
    async fn test_system_file_keeps_ingestion_order_across_severities() {
        let dir = TempDir::new().unwrap();
        let collector = collector(&dir, true);

        collector.ingest_at(&envelope(Severity::Info, "api", "A"), at());
        collector.ingest_at(&envelope(Severity::Error, "api", "B"), at());
        collector.ingest_at(&envelope(Severity::Info, "api", "C"), at());
        collector.save_for_date(date()).await.unwrap();

        let content = read(&dir, "[api]2024-03-09.log");
        let messages: Vec<&str> = content
            .lines()
            .map(|l| l.rsplit(" | ").next().unwrap())
            .collect();
        assert_eq!(messages, vec!["A", "B", "C"]);
    }

    #[tokio::test]
    async fn test_empty_flush_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let collector = collector(&dir, true);

        assert_eq!(collector.save_for_date(date()).await.unwrap(), 0);

        collector.ingest_at(&envelope(Severity::Info, "api", "x"), at());
        assert!(collector.save_for_date(date()).await.unwrap() > 0);
        assert_eq!(collector.save_for_date(date()).await.unwrap(), 0);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_listener_fan_out_order() {
        let dir = TempDir::new().unwrap();
        let collector = collector(&dir, true);
        let calls = Arc::new(Mutex::new(Vec::new()));

        let (c1, c2, c3) = (Arc::clone(&calls), Arc::clone(&calls), Arc::clone(&calls));
        collector
            .on(Channel::All, move |line: &str| {
                c3.lock().unwrap().push(("all", line.to_string()))
            })
            .on(Severity::Error, move |line: &str| {
                c1.lock().unwrap().push(("error-1", line.to_string()))
            })
            .on(Severity::Error, move |line: &str| {
                c2.lock().unwrap().push(("error-2", line.to_string()))
            });

        collector.ingest_at(&envelope(Severity::Error, "api", "broken"), at());

        let calls = calls.lock().unwrap();
        let names: Vec<&str> = calls.iter().map(|(name, _)| *name).collect();
        assert_eq!(names, vec!["error-1", "error-2", "all"]);
        let expected = "2024-03-09 08:30:00 | [01] ----API | ERROR | broken";
        assert!(calls.iter().all(|(_, line)| line == expected));
    }

    #[tokio::test]
    async fn test_no_replay_for_late_listener() {
        let dir = TempDir::new().unwrap();
        let collector = collector(&dir, true);
        collector.ingest_at(&envelope(Severity::Info, "api", "early"), at());

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        collector.on(Channel::All, move |line: &str| {
            sink.lock().unwrap().push(line.to_string())
        });
        collector.ingest_at(&envelope(Severity::Info, "api", "late"), at());

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].ends_with("late"));
    }

    #[tokio::test]
    async fn test_debug_echo_depends_on_pass_through() {
        let dir = TempDir::new().unwrap();

        let quiet = collector(&dir, false);
        quiet.ingest_at(&envelope(Severity::Debug, "api", "hidden"), at());
        quiet.ingest_at(&envelope(Severity::Info, "api", "shown"), at());
        let lines = echoed(&quiet);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("shown"));
        // Persisted regardless
        assert!(quiet.pending().get("api").unwrap().data().contains("hidden"));

        let loud = collector(&dir, true);
        loud.ingest_at(&envelope(Severity::Debug, "api", "visible"), at());
        assert_eq!(echoed(&loud).len(), 1);
        assert!(echoed(&loud)[0].contains("\x1b[34mDEBUG"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_ingest_and_flush() {
        let dir = TempDir::new().unwrap();
        let collector = Arc::new(collector(&dir, true));

        let producer = Arc::clone(&collector);
        let ingest = tokio::spawn(async move {
            for i in 0..500 {
                producer.ingest_at(&envelope(Severity::Info, "api", &format!("{i}")), at());
                if i % 50 == 0 {
                    tokio::task::yield_now().await;
                }
            }
        });

        let flushes: Vec<_> = (0..4)
            .map(|_| {
                let collector = Arc::clone(&collector);
                tokio::spawn(async move {
                    for _ in 0..5 {
                        collector.save_for_date(date()).await.unwrap();
                        tokio::task::yield_now().await;
                    }
                })
            })
            .collect();

        ingest.await.unwrap();
        for flush in flushes {
            flush.await.unwrap();
        }
        collector.save_for_date(date()).await.unwrap();

        let content = read(&dir, "[api]2024-03-09.log");
        let messages: Vec<String> = content
            .lines()
            .map(|l| l.rsplit(" | ").next().unwrap().to_string())
            .collect();
        let expected: Vec<String> = (0..500).map(|i| i.to_string()).collect();
        assert_eq!(messages, expected);
    }

    #[tokio::test]
    async fn test_failed_flush_drops_batch_but_keeps_collecting() {
        let dir = TempDir::new().unwrap();
        let collector = collector(&dir, true);
        std::fs::create_dir(dir.path().join("[api]2024-03-09.log")).unwrap();

        collector.ingest_at(&envelope(Severity::Info, "api", "lost"), at());
        assert!(collector.save_for_date(date()).await.is_err());
        assert!(!collector.has_pending());

        std::fs::remove_dir(dir.path().join("[api]2024-03-09.log")).unwrap();
        collector.ingest_at(&envelope(Severity::Info, "api", "kept"), at());
        collector.save_for_date(date()).await.unwrap();

        let content = read(&dir, "[api]2024-03-09.log");
        assert!(content.contains("kept"));
        assert!(!content.contains("lost"));
    }

    #[tokio::test]
    async fn test_start_fails_when_directory_cannot_be_created() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"").unwrap();

        let (_client, server) = in_process_channel();
        let result = Collector::start(
            CollectorConfig {
                directory: blocker.join("logs"),
                ..Default::default()
            },
            server,
        )
        .await;

        assert!(matches!(result, Err(StartupError::Storage { .. })));
    }

    #[tokio::test]
    async fn test_start_rejects_invalid_config() {
        let (_client, server) = in_process_channel();
        let result = Collector::start(
            CollectorConfig {
                directory: PathBuf::new(),
                ..Default::default()
            },
            server,
        )
        .await;
        assert!(matches!(result, Err(StartupError::Config(_))));
    }

    #[tokio::test]
    async fn test_started_collector_ingests_and_flushes_on_shutdown() {
        let dir = TempDir::new().unwrap();
        let directory = dir.path().join("nested").join("logs");
        let (client, server) = in_process_channel();

        let handle = Collector::start(
            CollectorConfig {
                directory: directory.clone(),
                flush_interval: Duration::from_secs(3600),
                debug: false,
            },
            server,
        )
        .await
        .unwrap();
        assert!(directory.is_dir());

        client.send(&envelope(Severity::Warn, "api", "slow")).unwrap();
        client.send(&envelope(Severity::Error, "api", "down")).unwrap();
        while handle.collector().pending().get("api").map_or(true, |b| b.error().is_empty()) {
            tokio::task::yield_now().await;
        }

        let written = handle.shutdown().await.unwrap();
        assert!(written > 0);

        let today = Local::now().date_naive().format("%Y-%m-%d").to_string();
        let api = std::fs::read_to_string(directory.join(format!("[api]{today}.log"))).unwrap();
        assert!(api.contains("slow"));
        assert!(api.contains("down"));
        let errors =
            std::fs::read_to_string(directory.join(format!("[error]{today}.log"))).unwrap();
        assert!(errors.contains("down"));
    }

    #[tokio::test]
    async fn test_ingestion_backs_off_on_read_failures() {
        let dir = TempDir::new().unwrap();
        let collector = Arc::new(collector(&dir, true));
        let attempts = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let cancel_token = CancellationToken::new();

        let task = tokio::spawn(spin(
            Arc::clone(&collector),
            ChannelServer::failing(Arc::clone(&attempts)),
            cancel_token.clone(),
        ));
        tokio::time::sleep(Duration::from_millis(200)).await;
        cancel_token.cancel();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();

        let attempts = attempts.load(std::sync::atomic::Ordering::SeqCst);
        assert!((2..=10).contains(&attempts), "{attempts} reads in 200ms");
    }

    #[tokio::test]
    async fn test_flush_timer_survives_failures() {
        let dir = TempDir::new().unwrap();
        let directory = dir.path().join("logs");
        let (client, server) = in_process_channel();

        let handle = Collector::start(
            CollectorConfig {
                directory: directory.clone(),
                flush_interval: Duration::from_millis(20),
                debug: true,
            },
            server,
        )
        .await
        .unwrap();

        std::fs::remove_dir(&directory).unwrap();
        client.send(&envelope(Severity::Info, "api", "lost")).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!handle.collector().has_pending());

        std::fs::create_dir(&directory).unwrap();
        client.send(&envelope(Severity::Info, "api", "after")).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let files: Vec<_> = std::fs::read_dir(&directory)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(files.len(), 1);
        assert!(files[0].starts_with("[api]"));
        let content = std::fs::read_to_string(directory.join(&files[0])).unwrap();
        assert!(content.contains("after"));

        handle.shutdown().await.unwrap();
    }
}
