// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Minimal log aggregation: producer processes emit severity-tagged lines over the
//! "logger" channel, a single collector buffers them per originating system and
//! periodically appends them to dated per-system files.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod buffer;
pub mod collector;
pub mod config;
mod console;
pub mod constants;
pub mod emitter;
pub mod envelope;
pub mod errors;
pub mod fatal;
pub mod flusher;
pub mod format;
pub mod listeners;
pub mod normalize;
pub mod severity;
pub mod transport;
