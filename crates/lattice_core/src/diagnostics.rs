//! Runtime diagnostics sink.
//!
//! # Responsibility
//! - Collect user-facing runtime messages about isolated component failures.
//!
//! # Invariants
//! - `MessageHandler::add_message` is fire-and-forget and never fails.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Severity of one runtime message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageLevel {
    Error,
    Warning,
    Info,
}

/// What kind of object the message is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageSource {
    Component,
    Extension,
    Runtime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeMessage {
    pub level: MessageLevel,
    pub text: String,
    pub source: MessageSource,
    /// Identifier of the source object, usually a component name.
    pub source_id: String,
}

impl RuntimeMessage {
    pub fn error(text: impl Into<String>, source: MessageSource, source_id: impl Into<String>) -> Self {
        Self {
            level: MessageLevel::Error,
            text: text.into(),
            source,
            source_id: source_id.into(),
        }
    }

    pub fn warning(
        text: impl Into<String>,
        source: MessageSource,
        source_id: impl Into<String>,
    ) -> Self {
        Self {
            level: MessageLevel::Warning,
            text: text.into(),
            source,
            source_id: source_id.into(),
        }
    }
}

impl Display for RuntimeMessage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:?}] {} ({})", self.level, self.text, self.source_id)
    }
}

/// Sink receiving runtime messages.
pub trait MessageHandler: Send + Sync {
    fn add_message(&self, message: RuntimeMessage);
}

/// In-memory message handler used by default.
#[derive(Debug, Default)]
pub struct MessageCollector {
    messages: Mutex<Vec<RuntimeMessage>>,
}

impl MessageCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<RuntimeMessage> {
        self.messages.lock().clone()
    }

    /// Messages whose `source_id` is `source_id`.
    pub fn messages_for(&self, source_id: &str) -> Vec<RuntimeMessage> {
        self.messages
            .lock()
            .iter()
            .filter(|message| message.source_id == source_id)
            .cloned()
            .collect()
    }

    pub fn errors(&self) -> Vec<RuntimeMessage> {
        self.messages
            .lock()
            .iter()
            .filter(|message| message.level == MessageLevel::Error)
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.messages.lock().clear();
    }
}

impl MessageHandler for MessageCollector {
    fn add_message(&self, message: RuntimeMessage) {
        self.messages.lock().push(message);
    }
}
