//! Diagnostics for the Lexmac engine.
//!
//! # Overview
//!
//! Two kinds of failure are reported here:
//!
//! - **Messages** are node-level diagnostics produced while rewriting (a macro
//!   failed, two macros disagreed, a namespace could not be unimported). They are
//!   written to a [`MessageSink`] and never abort processing.
//! - **Errors** ([`LexmacError`]) are failures of the surrounding pipeline:
//!   unreadable files, syntax errors, bad configuration. They are `miette`
//!   diagnostics so the CLI can render them with source context.
//!
//! # Sinks
//!
//! - [`MessageHolder`] buffers messages, and is what the engine hands to each
//!   macro invocation so that the message policy can filter afterwards.
//! - [`TracingSink`] forwards messages to `tracing`.
//! - [`NullSink`] drops everything.
//!
//! Sinks shared between concurrently processed inputs must be `Send + Sync`;
//! all sinks in this module are.

use std::fmt;
use std::ops::Range;
use std::sync::Arc;

use miette::{Diagnostic, NamedSource, SourceSpan};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ast::Node;

// ============================================================================
// SEVERITY & MESSAGES
// ============================================================================

/// Message severity, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Detail,
    Verbose,
    Debug,
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Detail => "detail",
            Severity::Verbose => "verbose",
            Severity::Debug => "debug",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A diagnostic attached to the node that was being processed.
#[derive(Debug, Clone)]
pub struct Message {
    pub severity: Severity,
    pub context: Node,
    pub text: String,
}

impl Message {
    pub fn new(severity: Severity, context: Node, text: impl Into<String>) -> Self {
        Self {
            severity,
            context,
            text: text.into(),
        }
    }

    pub fn write_to(&self, sink: &dyn MessageSink) {
        sink.write(self.severity, &self.context, self.text.clone());
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.severity, self.text)
    }
}

// ============================================================================
// SINKS
// ============================================================================

/// Destination for diagnostics.
pub trait MessageSink {
    fn write(&self, severity: Severity, context: &Node, text: String);

    /// Lets callers skip formatting messages nobody will see.
    fn is_enabled(&self, severity: Severity) -> bool;
}

impl<T: MessageSink + ?Sized> MessageSink for Arc<T> {
    fn write(&self, severity: Severity, context: &Node, text: String) {
        (**self).write(severity, context, text)
    }

    fn is_enabled(&self, severity: Severity) -> bool {
        (**self).is_enabled(severity)
    }
}

impl<T: MessageSink + ?Sized> MessageSink for &T {
    fn write(&self, severity: Severity, context: &Node, text: String) {
        (**self).write(severity, context, text)
    }

    fn is_enabled(&self, severity: Severity) -> bool {
        (**self).is_enabled(severity)
    }
}

/// Buffers messages in arrival order.
#[derive(Debug)]
pub struct MessageHolder {
    messages: Mutex<Vec<Message>>,
    min_severity: Severity,
}

impl Default for MessageHolder {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageHolder {
    /// A holder that accepts every severity.
    pub fn new() -> Self {
        Self::with_min_severity(Severity::Detail)
    }

    /// A holder that drops messages below `min_severity`.
    pub fn with_min_severity(min_severity: Severity) -> Self {
        Self {
            messages: Mutex::new(Vec::new()),
            min_severity,
        }
    }

    pub fn len(&self) -> usize {
        self.messages.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.lock().is_empty()
    }

    /// A snapshot of all buffered messages.
    pub fn messages(&self) -> Vec<Message> {
        self.messages.lock().clone()
    }

    /// A snapshot of the messages in `range`.
    pub fn slice(&self, range: Range<usize>) -> Vec<Message> {
        self.messages.lock()[range].to_vec()
    }

    /// Highest severity in `range`, if any message is there.
    pub fn max_severity(&self, range: Range<usize>) -> Option<Severity> {
        self.messages.lock()[range].iter().map(|m| m.severity).max()
    }

    /// Number of buffered messages with exactly this severity.
    pub fn count(&self, severity: Severity) -> usize {
        self.messages
            .lock()
            .iter()
            .filter(|m| m.severity == severity)
            .count()
    }

    /// Removes and returns all buffered messages.
    pub fn take(&self) -> Vec<Message> {
        std::mem::take(&mut *self.messages.lock())
    }

    pub fn clear(&self) {
        self.messages.lock().clear();
    }

    /// Replays every buffered message into `sink`.
    pub fn write_to(&self, sink: &dyn MessageSink) {
        for msg in self.messages.lock().iter() {
            msg.write_to(sink);
        }
    }
}

impl MessageSink for MessageHolder {
    fn write(&self, severity: Severity, context: &Node, text: String) {
        if self.is_enabled(severity) {
            self.messages
                .lock()
                .push(Message::new(severity, context.clone(), text));
        }
    }

    fn is_enabled(&self, severity: Severity) -> bool {
        severity >= self.min_severity
    }
}

/// Forwards messages to the `tracing` subscriber.
#[derive(Debug, Clone, Copy)]
pub struct TracingSink {
    pub min_severity: Severity,
}

impl Default for TracingSink {
    fn default() -> Self {
        Self {
            min_severity: Severity::Warning,
        }
    }
}

impl MessageSink for TracingSink {
    fn write(&self, severity: Severity, context: &Node, text: String) {
        if !self.is_enabled(severity) {
            return;
        }
        match severity {
            Severity::Error => tracing::error!(context = %context, "{}", text),
            Severity::Warning => tracing::warn!(context = %context, "{}", text),
            Severity::Debug => tracing::debug!(context = %context, "{}", text),
            Severity::Verbose | Severity::Detail => {
                tracing::trace!(context = %context, severity = %severity, "{}", text)
            }
        }
    }

    fn is_enabled(&self, severity: Severity) -> bool {
        severity >= self.min_severity
    }
}

/// Sink shared by the driver and every worker.
pub type SharedSink = Arc<dyn MessageSink + Send + Sync>;

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl MessageSink for NullSink {
    fn write(&self, _severity: Severity, _context: &Node, _text: String) {}

    fn is_enabled(&self, _severity: Severity) -> bool {
        false
    }
}

// ============================================================================
// ERRORS
// ============================================================================

/// Signal that processing of one input was cancelled (deadline passed, the
/// driver gave up on it, or a macro requested it).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("macro processing was cancelled")]
pub struct Cancelled;

/// Pipeline-level failures.
#[derive(Debug, Error, Diagnostic)]
pub enum LexmacError {
    #[error("Parse error: {message}")]
    #[diagnostic(code(lexmac::parse))]
    Parse {
        message: String,
        #[source_code]
        src: NamedSource<String>,
        #[label("{message}")]
        span: SourceSpan,
    },

    #[error("Failed to read '{path}': {source}")]
    #[diagnostic(code(lexmac::io))]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error: {message}")]
    #[diagnostic(code(lexmac::config), help("see ProcessorConfig for the accepted keys"))]
    Config { message: String },

    #[error("Expansion cancelled")]
    #[diagnostic(code(lexmac::cancelled))]
    Cancelled(#[from] Cancelled),
}

impl LexmacError {
    pub fn config(message: impl Into<String>) -> Self {
        LexmacError::Config {
            message: message.into(),
        }
    }

    pub fn io(path: impl fmt::Display, source: std::io::Error) -> Self {
        LexmacError::Io {
            path: path.to_string(),
            source,
        }
    }
}
