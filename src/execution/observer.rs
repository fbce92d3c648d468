use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use tracing::debug;

/// Events emitted by the engine while transforming a batch.
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    RunStarted { tag: String, event_count: usize },
    ThrottleWaited { duration: Duration },
    ChunkStarted { start_event: usize, event_count: usize },
    ChunkFinished { output_events: usize, field_errors: usize },
    ChunkFailed { start_event: usize },
    RunFinished {
        elapsed: Duration,
        metrics: ExecutionMetricsSnapshot,
    },
}

/// Observer hook for execution events.
pub trait ExecutionObserver: Send + Sync {
    fn on_event(&self, event: &ExecutionEvent);
}

/// Logs execution events at debug level.
#[derive(Debug, Default)]
pub struct TracingExecutionObserver;

impl ExecutionObserver for TracingExecutionObserver {
    fn on_event(&self, event: &ExecutionEvent) {
        match event {
            ExecutionEvent::RunFinished { elapsed, metrics } => {
                debug!(?elapsed, %metrics, "execution run finished");
            }
            other => debug!(event = ?other, "execution event"),
        }
    }
}

/// Real-time metrics for an execution run.
///
/// The engine updates these counters during execution; callers can snapshot them at any time.
pub struct ExecutionMetrics {
    run_id: AtomicU64,
    elapsed_ns: AtomicU64,

    events_processed: AtomicU64,
    field_errors: AtomicU64,
    chunks_started: AtomicU64,
    chunks_finished: AtomicU64,
    throttle_wait_ns: AtomicU64,

    active_chunks: AtomicUsize,
    max_active_chunks: AtomicUsize,
}

impl ExecutionMetrics {
    pub fn new() -> Self {
        Self {
            run_id: AtomicU64::new(0),
            elapsed_ns: AtomicU64::new(0),
            events_processed: AtomicU64::new(0),
            field_errors: AtomicU64::new(0),
            chunks_started: AtomicU64::new(0),
            chunks_finished: AtomicU64::new(0),
            throttle_wait_ns: AtomicU64::new(0),
            active_chunks: AtomicUsize::new(0),
            max_active_chunks: AtomicUsize::new(0),
        }
    }

    pub(crate) fn begin_run(&self) {
        let _ = self.run_id.fetch_add(1, Ordering::SeqCst);
        self.elapsed_ns.store(0, Ordering::SeqCst);
        self.events_processed.store(0, Ordering::SeqCst);
        self.field_errors.store(0, Ordering::SeqCst);
        self.chunks_started.store(0, Ordering::SeqCst);
        self.chunks_finished.store(0, Ordering::SeqCst);
        self.throttle_wait_ns.store(0, Ordering::SeqCst);
        self.active_chunks.store(0, Ordering::SeqCst);
        self.max_active_chunks.store(0, Ordering::SeqCst);
    }

    pub(crate) fn end_run(&self, elapsed: Duration) {
        self.elapsed_ns.store(saturating_nanos(elapsed), Ordering::SeqCst);
    }

    pub(crate) fn on_events_processed(&self, events: usize, field_errors: usize) {
        let _ = self.events_processed.fetch_add(events as u64, Ordering::SeqCst);
        let _ = self.field_errors.fetch_add(field_errors as u64, Ordering::SeqCst);
    }

    pub(crate) fn on_chunk_start(&self) {
        let _ = self.chunks_started.fetch_add(1, Ordering::SeqCst);
        let now = self.active_chunks.fetch_add(1, Ordering::SeqCst) + 1;
        let _ = self.max_active_chunks.fetch_max(now, Ordering::SeqCst);
    }

    pub(crate) fn on_chunk_end(&self) {
        let _ = self.chunks_finished.fetch_add(1, Ordering::SeqCst);
        let _ = self.active_chunks.fetch_sub(1, Ordering::SeqCst);
    }

    pub(crate) fn on_throttle_wait(&self, d: Duration) {
        let _ = self.throttle_wait_ns.fetch_add(saturating_nanos(d), Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> ExecutionMetricsSnapshot {
        let elapsed_ns = self.elapsed_ns.load(Ordering::SeqCst);
        ExecutionMetricsSnapshot {
            run_id: self.run_id.load(Ordering::SeqCst),
            elapsed: (elapsed_ns > 0).then(|| Duration::from_nanos(elapsed_ns)),
            events_processed: self.events_processed.load(Ordering::SeqCst),
            field_errors: self.field_errors.load(Ordering::SeqCst),
            chunks_started: self.chunks_started.load(Ordering::SeqCst),
            chunks_finished: self.chunks_finished.load(Ordering::SeqCst),
            throttle_wait: Duration::from_nanos(self.throttle_wait_ns.load(Ordering::SeqCst)),
            max_active_chunks: self.max_active_chunks.load(Ordering::SeqCst),
        }
    }
}

impl Default for ExecutionMetrics {
    fn default() -> Self {
        Self::new()
    }
}

fn saturating_nanos(d: Duration) -> u64 {
    d.as_nanos().min(u128::from(u64::MAX)) as u64
}

/// Immutable snapshot of [`ExecutionMetrics`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionMetricsSnapshot {
    pub run_id: u64,
    pub elapsed: Option<Duration>,
    pub events_processed: u64,
    pub field_errors: u64,
    pub chunks_started: u64,
    pub chunks_finished: u64,
    pub throttle_wait: Duration,
    pub max_active_chunks: usize,
}

impl fmt::Display for ExecutionMetricsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "run_id={}, events_processed={}, field_errors={}, chunks={}/{}, ",
            self.run_id,
            self.events_processed,
            self.field_errors,
            self.chunks_finished,
            self.chunks_started,
        )?;
        write!(
            f,
            "max_active_chunks={}, throttle_wait={:?}, elapsed={:?}",
            self.max_active_chunks, self.throttle_wait, self.elapsed
        )
    }
}
