use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{error, info, warn};

use crate::error::TransformError;

/// Severity classification used for observer callbacks and alerting thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TransformSeverity {
    /// Informational event.
    Info,
    /// A field failed but the event was still emitted.
    Warning,
    /// An event failed.
    Error,
    /// The transformer could not be built.
    Critical,
}

/// Context about a transform step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformContext {
    /// Event tag (empty for configuration-time reports).
    pub tag: String,
    /// Position of the event within the stream, when the report concerns one event.
    pub event_index: Option<usize>,
}

/// Stats reported after a stream has been transformed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransformStats {
    /// Number of events emitted.
    pub events: usize,
    /// Number of field evaluation failures that were tolerated.
    pub field_errors: usize,
}

/// Observer interface for transform outcomes.
///
/// Implementors can record metrics, logs, or trigger alerts.
pub trait TransformObserver: Send + Sync {
    /// Called when a stream has been transformed.
    fn on_success(&self, _ctx: &TransformContext, _stats: TransformStats) {}

    /// Called for every field evaluation failure and for configuration failures.
    fn on_failure(
        &self,
        _ctx: &TransformContext,
        _severity: TransformSeverity,
        _error: &TransformError,
    ) {
    }

    /// Called when a failure meets the alert threshold.
    ///
    /// Default behavior forwards to [`Self::on_failure`].
    fn on_alert(
        &self,
        ctx: &TransformContext,
        severity: TransformSeverity,
        error: &TransformError,
    ) {
        self.on_failure(ctx, severity, error)
    }
}

/// An observer that fans out callbacks to a list of observers.
#[derive(Default)]
pub struct CompositeObserver {
    observers: Vec<Arc<dyn TransformObserver>>,
}

impl CompositeObserver {
    /// Create a new composite observer from a list of observers.
    pub fn new(observers: Vec<Arc<dyn TransformObserver>>) -> Self {
        Self { observers }
    }
}

impl fmt::Debug for CompositeObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeObserver")
            .field("observers_len", &self.observers.len())
            .finish()
    }
}

impl TransformObserver for CompositeObserver {
    fn on_success(&self, ctx: &TransformContext, stats: TransformStats) {
        for o in &self.observers {
            o.on_success(ctx, stats);
        }
    }

    fn on_failure(
        &self,
        ctx: &TransformContext,
        severity: TransformSeverity,
        error: &TransformError,
    ) {
        for o in &self.observers {
            o.on_failure(ctx, severity, error);
        }
    }

    fn on_alert(
        &self,
        ctx: &TransformContext,
        severity: TransformSeverity,
        error: &TransformError,
    ) {
        for o in &self.observers {
            o.on_alert(ctx, severity, error);
        }
    }
}

/// Forwards transform events to `tracing`.
#[derive(Debug, Default)]
pub struct TracingObserver;

impl TransformObserver for TracingObserver {
    fn on_success(&self, ctx: &TransformContext, stats: TransformStats) {
        info!(
            tag = %ctx.tag,
            events = stats.events,
            field_errors = stats.field_errors,
            "transformed stream"
        );
    }

    fn on_failure(
        &self,
        ctx: &TransformContext,
        severity: TransformSeverity,
        error: &TransformError,
    ) {
        match severity {
            TransformSeverity::Info => {
                info!(tag = %ctx.tag, event = ?ctx.event_index, %error, "transform")
            }
            TransformSeverity::Warning => {
                warn!(tag = %ctx.tag, event = ?ctx.event_index, %error, "transform failure")
            }
            TransformSeverity::Error | TransformSeverity::Critical => {
                error!(
                    tag = %ctx.tag,
                    event = ?ctx.event_index,
                    ?severity,
                    %error,
                    "transform failure"
                )
            }
        }
    }

    fn on_alert(
        &self,
        ctx: &TransformContext,
        severity: TransformSeverity,
        error: &TransformError,
    ) {
        error!(tag = %ctx.tag, event = ?ctx.event_index, ?severity, %error, "ALERT");
    }
}

/// Appends transform events to a local log file.
#[derive(Debug)]
pub struct FileObserver {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileObserver {
    /// Create a file observer that appends events to `path`.
    ///
    /// Writes are best-effort; failures to open/write the log file are ignored.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    fn append_line(&self, line: &str) {
        let _guard = self.lock.lock().ok();
        if let Ok(mut f) = OpenOptions::new().create(true).append(true).open(&self.path) {
            let _ = writeln!(f, "{line}");
        }
    }
}

impl TransformObserver for FileObserver {
    fn on_success(&self, ctx: &TransformContext, stats: TransformStats) {
        self.append_line(&format!(
            "{} ok tag={} events={} field_errors={}",
            unix_ts(),
            ctx.tag,
            stats.events,
            stats.field_errors
        ));
    }

    fn on_failure(
        &self,
        ctx: &TransformContext,
        severity: TransformSeverity,
        error: &TransformError,
    ) {
        self.append_line(&format!(
            "{} fail severity={:?} tag={} event={:?} err={}",
            unix_ts(),
            severity,
            ctx.tag,
            ctx.event_index,
            error
        ));
    }

    fn on_alert(
        &self,
        ctx: &TransformContext,
        severity: TransformSeverity,
        error: &TransformError,
    ) {
        self.append_line(&format!(
            "{} ALERT severity={:?} tag={} event={:?} err={}",
            unix_ts(),
            severity,
            ctx.tag,
            ctx.event_index,
            error
        ));
    }
}

fn unix_ts() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
