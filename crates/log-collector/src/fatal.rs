// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Terminal transition for a crashing producer.
//!
//! When a panic escapes (on any thread, including tokio tasks whose panics would
//! otherwise only surface as join errors) or `main` gives up on an error, the
//! hook sends one `fatal` line to the collector and then terminates the process.
//! The send is issued before exit but never awaited for acknowledgement.

use std::backtrace::Backtrace;
use std::panic::PanicHookInfo;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::constants::FATAL_EXIT_CODE;
use crate::emitter::Emitter;
use crate::normalize::{normalize, LogValue};

type Terminator = Box<dyn Fn(i32) + Send + Sync>;

pub struct FatalHook {
    emitter: Arc<Emitter>,
    terminator: Terminator,
    fired: AtomicBool,
}

impl FatalHook {
    #[must_use]
    pub fn new(emitter: Arc<Emitter>) -> Self {
        Self {
            emitter,
            terminator: Box::new(|code| std::process::exit(code)),
            fired: AtomicBool::new(false),
        }
    }

    /// Replaces `std::process::exit`.
    #[must_use]
    pub fn with_terminator<F>(mut self, terminator: F) -> Self
    where
        F: Fn(i32) + Send + Sync + 'static,
    {
        self.terminator = Box::new(terminator);
        self
    }

    /// Registers the hook as the process panic hook. Call once at startup.
    pub fn install(self: Arc<Self>) {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let backtrace = Backtrace::force_capture();
            self.trigger(&render_panic(info, &backtrace));
            // Only reached when the terminator returns
            previous(info);
        }));
    }

    /// Records an error that escaped all handling, then terminates.
    pub fn report_error(&self, error: &(dyn std::error::Error + 'static)) {
        self.trigger(&normalize(LogValue::from_error(error)));
    }

    /// Sends `report` as a fatal line, stops the emitter and terminates.
    /// Fires at most once; later calls do nothing.
    pub fn trigger(&self, report: &str) {
        if self.fired.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Err(e) = self.emitter.send_fatal(format!("\n{report}")) {
            eprintln!("Failed to send fatal log line: {e}");
        }
        self.emitter.terminate();
        (self.terminator)(FATAL_EXIT_CODE);
    }

    #[must_use]
    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }
}

fn panic_message(info: &PanicHookInfo<'_>) -> String {
    if let Some(s) = info.payload().downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = info.payload().downcast_ref::<String>() {
        s.clone()
    } else {
        "Box<dyn Any>".to_string()
    }
}

fn render_panic(info: &PanicHookInfo<'_>, backtrace: &Backtrace) -> String {
    let thread = std::thread::current();
    let mut report = format!(
        "thread '{}' panicked: {}",
        thread.name().unwrap_or("<unnamed>"),
        panic_message(info)
    );
    if let Some(location) = info.location() {
        report.push_str(&format!(
            "\n    at {}:{}:{}",
            location.file(),
            location.line(),
            location.column()
        ));
    }
    report.push('\n');
    report.push_str(&backtrace.to_string());
    report
}
