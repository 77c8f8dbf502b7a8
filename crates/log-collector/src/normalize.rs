// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Turns whatever the application hands to an emitter into the message string
//! that is transmitted to the collector.

use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::Value;

/// Stack attached to an error-shaped value.
#[derive(Clone, Debug, PartialEq)]
pub enum Stack {
    Text(String),
    Structured(Value),
}

/// Any value an emitter accepts.
#[derive(Clone, Debug, PartialEq)]
pub enum LogValue {
    Text(String),
    Number(String),
    Error {
        message: String,
        stack: Option<Stack>,
    },
    Structured(Value),
}

impl LogValue {
    /// Error-shaped value whose stack is the error followed by its `source()` chain.
    pub fn from_error(error: &(dyn std::error::Error + 'static)) -> Self {
        let message = error.to_string();
        let mut stack = message.clone();
        let mut source = error.source();
        while let Some(cause) = source {
            stack.push_str("\n    caused by: ");
            stack.push_str(&cause.to_string());
            source = cause.source();
        }
        LogValue::Error {
            message,
            stack: Some(Stack::Text(stack)),
        }
    }
}

impl From<&str> for LogValue {
    fn from(text: &str) -> Self {
        LogValue::Text(text.to_string())
    }
}

impl From<String> for LogValue {
    fn from(text: String) -> Self {
        LogValue::Text(text)
    }
}

impl From<&String> for LogValue {
    fn from(text: &String) -> Self {
        LogValue::Text(text.clone())
    }
}

impl From<Value> for LogValue {
    fn from(value: Value) -> Self {
        LogValue::Structured(value)
    }
}

macro_rules! impl_from_number {
    ($($t:ty),*) => {
        $(
            impl From<$t> for LogValue {
                fn from(n: $t) -> Self {
                    LogValue::Number(n.to_string())
                }
            }
        )*
    };
}

impl_from_number!(i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64);

/// Pretty JSON with a one space indent. `Value` is a tree, so there is no cycle to guard against.
fn to_indented_json(value: &Value) -> String {
    let mut out = Vec::new();
    let mut serializer =
        serde_json::Serializer::with_formatter(&mut out, PrettyFormatter::with_indent(b" "));
    if value.serialize(&mut serializer).is_err() {
        return value.to_string();
    }
    String::from_utf8(out).unwrap_or_else(|_| value.to_string())
}

/// Normalizes a value into its transmissible message.
#[must_use]
pub fn normalize(value: LogValue) -> String {
    match value {
        LogValue::Text(text) | LogValue::Number(text) => text,
        LogValue::Error {
            stack: Some(Stack::Text(stack)),
            ..
        } => stack,
        LogValue::Error {
            stack: Some(Stack::Structured(stack)),
            ..
        } => to_indented_json(&stack),
        LogValue::Error {
            message,
            stack: None,
        } => message,
        LogValue::Structured(value) => format!("\n\n{}\n", to_indented_json(&value)),
    }
}
