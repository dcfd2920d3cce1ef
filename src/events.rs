//! Store log events and their observers
//!
//! The store reports notable conditions (missing data directory, failed
//! writes, unreadable series) as [`LogEvent`]s. Each event goes to `tracing`
//! and then to every registered [`LogSink`]. Sinks are best-effort: they
//! must not block and their failures never reach the store's caller.

use crate::storage::{KeyPath, Sample, Value, ValueType};
use crate::store::Store;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Information,
    Warning,
    Error,
    FailureAudit,
}

impl Severity {
    /// Namespace segment used when recording the event under a key
    pub fn segment(&self) -> &'static str {
        match self {
            Severity::Information => "information",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::FailureAudit => "failure_audit",
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Severity::Error | Severity::FailureAudit)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.segment())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEvent {
    pub severity: Severity,
    pub message: String,
    /// Key the event concerns, if any
    pub path: Option<KeyPath>,
    pub at: DateTime<Utc>,
}

impl LogEvent {
    pub fn new(severity: Severity, message: impl Into<String>, path: Option<KeyPath>) -> Self {
        Self {
            severity,
            message: message.into(),
            path,
            at: Utc::now(),
        }
    }
}

/// Observer of store log events
pub trait LogSink: Send + Sync {
    fn on_event(&self, event: &LogEvent);
}

impl<F> LogSink for F
where
    F: Fn(&LogEvent) + Send + Sync,
{
    fn on_event(&self, event: &LogEvent) {
        self(event)
    }
}

/// Default namespace for recorded failures
pub const ERROR_NAMESPACE: &str = "_errors";

/// Forwards every `Error` and `FailureAudit` event into the store itself,
/// under `<namespace>.<severity>`.
///
/// The sink side only queues; the writes happen in a background task started
/// with [`ErrorKeyDrain::spawn`] once the store exists. Events about keys
/// inside the namespace are ignored so a failing medium cannot feed back
/// into itself.
pub struct ErrorKeyRecorder {
    tx: mpsc::UnboundedSender<LogEvent>,
    namespace: KeyPath,
}

/// Receiving half of an [`ErrorKeyRecorder`]
pub struct ErrorKeyDrain {
    rx: mpsc::UnboundedReceiver<LogEvent>,
    namespace: KeyPath,
}

impl ErrorKeyRecorder {
    pub fn new(namespace: KeyPath) -> (Self, ErrorKeyDrain) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                namespace: namespace.clone(),
            },
            ErrorKeyDrain { rx, namespace },
        )
    }

    pub fn namespace(&self) -> &KeyPath {
        &self.namespace
    }
}

impl LogSink for ErrorKeyRecorder {
    fn on_event(&self, event: &LogEvent) {
        if !event.severity.is_failure() {
            return;
        }
        if event
            .path
            .as_ref()
            .is_some_and(|path| self.namespace.contains(path))
        {
            return;
        }
        // Receiver gone means the drain task ended; nothing left to record to.
        let _ = self.tx.send(event.clone());
    }
}

impl ErrorKeyDrain {
    /// Record queued events into `store` until every recorder is dropped
    pub fn spawn(mut self, store: Arc<Store>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(event) = self.rx.recv().await {
                let path = match self.namespace.child(event.severity.segment()) {
                    Ok(path) => path,
                    Err(e) => {
                        tracing::error!(error = %e, "Invalid error namespace");
                        return;
                    }
                };

                let mut message = event.message.clone();
                if let Some(source) = &event.path {
                    message = format!("[{}] {}", source, message);
                }
                let sample = Sample::new("message", Value::Str(message))
                    .typed(ValueType::String)
                    .at(event.at);

                if let Err(e) = store.write_samples(&path, vec![sample]).await {
                    tracing::debug!(path = %path, error = %e, "Failed to record error event");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_closure_sink() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let captured = Arc::clone(&seen);
        let sink = move |event: &LogEvent| captured.lock().unwrap().push(event.severity);

        sink.on_event(&LogEvent::new(Severity::Warning, "w", None));
        sink.on_event(&LogEvent::new(Severity::Error, "e", None));
        assert_eq!(*seen.lock().unwrap(), vec![Severity::Warning, Severity::Error]);
    }

    #[test]
    fn test_recorder_filters() {
        let namespace = KeyPath::parse(ERROR_NAMESPACE).unwrap();
        let (recorder, mut drain) = ErrorKeyRecorder::new(namespace);

        recorder.on_event(&LogEvent::new(Severity::Information, "info", None));
        recorder.on_event(&LogEvent::new(Severity::Warning, "warn", None));
        recorder.on_event(&LogEvent::new(
            Severity::Error,
            "loop",
            Some(KeyPath::parse("_errors.error").unwrap()),
        ));
        recorder.on_event(&LogEvent::new(
            Severity::FailureAudit,
            "kept",
            Some(KeyPath::parse("plant.temp").unwrap()),
        ));

        let event = drain.rx.try_recv().unwrap();
        assert_eq!(event.message, "kept");
        assert!(drain.rx.try_recv().is_err());
    }

    #[test]
    fn test_severity_segments() {
        assert_eq!(Severity::FailureAudit.segment(), "failure_audit");
        assert!(KeyPath::parse(ERROR_NAMESPACE)
            .unwrap()
            .child(Severity::FailureAudit.segment())
            .is_ok());
        assert!(!Severity::Warning.is_failure());
    }
}
