//! Operation reporting.
//!
//! The session manager describes what it does through this narrow interface
//! (start an operation, annotate it, open a nested operation, end it) instead
//! of calling a tracing backend directly. Production wiring uses
//! [`TracingReporter`]; tests use [`RecordingReporter`] to assert on what was
//! reported.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tracing::field::{Empty, display};
use tracing::{Span, debug, info_span, warn};

/// The operations a turn reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// One whole request/response cycle.
    Turn,
    /// The provider call inside a turn.
    Completion,
}

impl Operation {
    /// Returns the span name for this operation.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Turn => "turn",
            Self::Completion => "completion",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How an operation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The operation completed.
    Success,
    /// The operation failed.
    Failure { kind: String, message: String },
}

/// Source of operation reports.
pub trait Reporter: Send + Sync {
    /// Starts a top-level operation.
    fn start(&self, operation: Operation) -> Box<dyn OperationReport>;
}

/// An operation in progress.
///
/// Every report must end with exactly one call to `finish` or `fail`.
pub trait OperationReport: Send + Sync {
    /// Attaches a key/value attribute.
    fn annotate(&mut self, key: &'static str, value: String);

    /// Starts an operation nested inside this one.
    fn child(&self, operation: Operation) -> Box<dyn OperationReport>;

    /// Ends the operation successfully.
    fn finish(self: Box<Self>);

    /// Ends the operation with an error type and message.
    fn fail(self: Box<Self>, kind: &str, message: &str);

    /// Returns the tracing span that work for this operation should run in.
    fn span(&self) -> Span {
        Span::none()
    }
}

/// Reporter backed by `tracing` spans.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl TracingReporter {
    /// Creates a tracing reporter.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Reporter for TracingReporter {
    fn start(&self, operation: Operation) -> Box<dyn OperationReport> {
        Box::new(TracingOperation::new(operation, None))
    }
}

struct TracingOperation {
    operation: Operation,
    span: Span,
    started: Instant,
}

impl TracingOperation {
    fn new(operation: Operation, parent: Option<&Span>) -> Self {
        let span = match (operation, parent) {
            (Operation::Turn, _) => info_span!(
                "turn",
                conversation_id = Empty,
                message_count = Empty,
                reply_chars = Empty,
                error_kind = Empty,
                error_message = Empty,
                elapsed_ms = Empty,
            ),
            (Operation::Completion, Some(parent)) => info_span!(
                parent: parent,
                "completion",
                provider = Empty,
                model = Empty,
                history_len = Empty,
                error_kind = Empty,
                error_message = Empty,
                elapsed_ms = Empty,
            ),
            (Operation::Completion, None) => info_span!(
                "completion",
                provider = Empty,
                model = Empty,
                history_len = Empty,
                error_kind = Empty,
                error_message = Empty,
                elapsed_ms = Empty,
            ),
        };

        Self {
            operation,
            span,
            started: Instant::now(),
        }
    }

    fn record_elapsed(&self) -> u64 {
        let elapsed_ms = self.started.elapsed().as_millis() as u64;
        self.span.record("elapsed_ms", elapsed_ms);
        elapsed_ms
    }
}

impl OperationReport for TracingOperation {
    fn annotate(&mut self, key: &'static str, value: String) {
        self.span.record(key, display(&value));
    }

    fn child(&self, operation: Operation) -> Box<dyn OperationReport> {
        Box::new(TracingOperation::new(operation, Some(&self.span)))
    }

    fn finish(self: Box<Self>) {
        let elapsed_ms = self.record_elapsed();
        debug!(parent: &self.span, operation = %self.operation, elapsed_ms, "Operation finished");
    }

    fn fail(self: Box<Self>, kind: &str, message: &str) {
        let elapsed_ms = self.record_elapsed();
        self.span.record("error_kind", kind);
        self.span.record("error_message", message);
        warn!(
            parent: &self.span,
            operation = %self.operation,
            error_kind = kind,
            error = message,
            elapsed_ms,
            "Operation failed"
        );
    }

    fn span(&self) -> Span {
        self.span.clone()
    }
}

/// A finished or in-progress operation captured by [`RecordingReporter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationRecord {
    /// The operation.
    pub operation: Operation,
    /// Index of the enclosing operation, if nested.
    pub parent: Option<usize>,
    /// Attributes in the order they were recorded.
    pub attributes: Vec<(String, String)>,
    /// How the operation ended; `None` while still open.
    pub outcome: Option<Outcome>,
}

impl OperationRecord {
    /// Returns the last value recorded for `key`.
    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Reporter that keeps every operation in memory.
#[derive(Debug, Clone, Default)]
pub struct RecordingReporter {
    records: Arc<Mutex<Vec<OperationRecord>>>,
}

impl RecordingReporter {
    /// Creates an empty recording reporter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all recorded operations, in start order.
    #[must_use]
    pub fn records(&self) -> Vec<OperationRecord> {
        lock(&self.records).clone()
    }

    /// Returns the recorded operations of one kind, in start order.
    #[must_use]
    pub fn records_of(&self, operation: Operation) -> Vec<OperationRecord> {
        lock(&self.records)
            .iter()
            .filter(|r| r.operation == operation)
            .cloned()
            .collect()
    }
}

impl Reporter for RecordingReporter {
    fn start(&self, operation: Operation) -> Box<dyn OperationReport> {
        Box::new(RecordingOperation::open(
            Arc::clone(&self.records),
            operation,
            None,
        ))
    }
}

fn lock(records: &Mutex<Vec<OperationRecord>>) -> MutexGuard<'_, Vec<OperationRecord>> {
    records.lock().unwrap_or_else(PoisonError::into_inner)
}

struct RecordingOperation {
    records: Arc<Mutex<Vec<OperationRecord>>>,
    index: usize,
}

impl RecordingOperation {
    fn open(
        records: Arc<Mutex<Vec<OperationRecord>>>,
        operation: Operation,
        parent: Option<usize>,
    ) -> Self {
        let index = {
            let mut guard = lock(&records);
            guard.push(OperationRecord {
                operation,
                parent,
                attributes: Vec::new(),
                outcome: None,
            });
            guard.len() - 1
        };
        Self { records, index }
    }

    fn close(&self, outcome: Outcome) {
        lock(&self.records)[self.index].outcome = Some(outcome);
    }
}

impl OperationReport for RecordingOperation {
    fn annotate(&mut self, key: &'static str, value: String) {
        lock(&self.records)[self.index]
            .attributes
            .push((key.to_string(), value));
    }

    fn child(&self, operation: Operation) -> Box<dyn OperationReport> {
        Box::new(RecordingOperation::open(
            Arc::clone(&self.records),
            operation,
            Some(self.index),
        ))
    }

    fn finish(self: Box<Self>) {
        self.close(Outcome::Success);
    }

    fn fail(self: Box<Self>, kind: &str, message: &str) {
        self.close(Outcome::Failure {
            kind: kind.to_string(),
            message: message.to_string(),
        });
    }
}
