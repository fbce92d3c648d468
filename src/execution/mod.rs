//! Execution engine for transforming large batches of events with configurable parallelism.
//!
//! This module sits "above" [`crate::transform`] and provides:
//!
//! - Parallel (chunked) execution of a [`RecordTransformer`] over one tag's events
//! - Resource limits / throttling (in-flight chunks)
//! - Real-time metrics + observer hooks for monitoring
//!
//! Output order always matches input order.

mod observer;
mod semaphore;

use std::ops::Range;
use std::sync::Arc;
use std::time::Instant;

use rayon::prelude::*;
use rayon::ThreadPool;
use rayon::ThreadPoolBuilder;

use crate::error::TransformResult;
use crate::transform::{RecordTransformer, TransformStats};
use crate::types::Record;

pub use observer::{
    ExecutionEvent, ExecutionMetrics, ExecutionMetricsSnapshot, ExecutionObserver,
    TracingExecutionObserver,
};

use semaphore::Semaphore;

/// Configuration for the [`ExecutionEngine`].
#[derive(Debug, Clone)]
pub struct ExecutionOptions {
    /// Number of worker threads used by the engine.
    ///
    /// If `None`, uses the platform's available parallelism.
    pub num_threads: Option<usize>,
    /// Number of events per chunk. Tag parts and the time cache are shared within a chunk.
    pub chunk_size: usize,
    /// Upper bound on concurrently executing chunks, on top of `num_threads`.
    pub max_in_flight_chunks: usize,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        let n = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
        Self {
            num_threads: Some(n),
            chunk_size: 1_024,
            max_in_flight_chunks: n.max(1),
        }
    }
}

/// Runs a [`RecordTransformer`] over batches of events on a dedicated rayon pool.
pub struct ExecutionEngine {
    pool: ThreadPool,
    opts: ExecutionOptions,
    observer: Option<Arc<dyn ExecutionObserver>>,
    metrics: Arc<ExecutionMetrics>,
}

impl ExecutionEngine {
    /// Create a new engine with the given options.
    ///
    /// # Panics
    ///
    /// Panics if `chunk_size == 0`, `max_in_flight_chunks == 0`, `num_threads == Some(0)`, or the
    /// thread pool cannot be built.
    pub fn new(opts: ExecutionOptions) -> Self {
        assert!(opts.chunk_size > 0, "chunk_size must be > 0");
        assert!(opts.max_in_flight_chunks > 0, "max_in_flight_chunks must be > 0");
        if let Some(n) = opts.num_threads {
            assert!(n > 0, "num_threads must be > 0 when set");
        }

        let n_threads = opts
            .num_threads
            .unwrap_or_else(|| std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1))
            .max(1);

        let pool = ThreadPoolBuilder::new()
            .num_threads(n_threads)
            .thread_name(|i| format!("record-modifier-{i}"))
            .build()
            .expect("failed to build rayon thread pool");

        Self {
            pool,
            opts,
            observer: None,
            metrics: Arc::new(ExecutionMetrics::new()),
        }
    }

    /// Attach an observer for execution events (metrics/logging).
    pub fn with_observer(mut self, observer: Arc<dyn ExecutionObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Get a handle to real-time execution metrics.
    pub fn metrics(&self) -> Arc<ExecutionMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Transform `events` (all carrying `tag`) in parallel chunks.
    ///
    /// Equivalent to [`RecordTransformer::transform_stream`]: one output per input, in input order.
    /// When events fail, the error of the earliest failing event is returned.
    pub fn transform_parallel(
        &self,
        transformer: &RecordTransformer,
        tag: &str,
        events: Vec<(i64, Record)>,
    ) -> TransformResult<Vec<(i64, Record)>> {
        self.pool
            .install(|| self.transform_parallel_impl(transformer, tag, events))
    }

    fn transform_parallel_impl(
        &self,
        transformer: &RecordTransformer,
        tag: &str,
        events: Vec<(i64, Record)>,
    ) -> TransformResult<Vec<(i64, Record)>> {
        let start = Instant::now();
        self.metrics.begin_run();
        self.emit(ExecutionEvent::RunStarted {
            tag: tag.to_string(),
            event_count: events.len(),
        });

        let ranges = chunk_ranges(events.len(), self.opts.chunk_size);
        let mut remaining = events.into_iter();
        let chunks: Vec<(Range<usize>, Vec<(i64, Record)>)> = ranges
            .into_iter()
            .map(|range| {
                let chunk = remaining.by_ref().take(range.len()).collect();
                (range, chunk)
            })
            .collect();

        let sem = Semaphore::new(self.opts.max_in_flight_chunks);
        let per_chunk: Vec<TransformResult<(Vec<(i64, Record)>, usize)>> = chunks
            .into_par_iter()
            .map(|(range, chunk)| {
                let permit = sem.acquire();
                if !permit.waited.is_zero() {
                    self.metrics.on_throttle_wait(permit.waited);
                    self.emit(ExecutionEvent::ThrottleWaited {
                        duration: permit.waited,
                    });
                }

                self.metrics.on_chunk_start();
                self.emit(ExecutionEvent::ChunkStarted {
                    start_event: range.start,
                    event_count: range.len(),
                });

                let result = transformer.transform_batch(tag, chunk, range.start);
                match &result {
                    Ok((out, field_errors)) => {
                        self.metrics.on_events_processed(out.len(), *field_errors);
                        self.emit(ExecutionEvent::ChunkFinished {
                            output_events: out.len(),
                            field_errors: *field_errors,
                        });
                    }
                    Err(_) => self.emit(ExecutionEvent::ChunkFailed {
                        start_event: range.start,
                    }),
                }

                self.metrics.on_chunk_end();
                drop(permit);
                result
            })
            .collect();

        let outcome: TransformResult<(Vec<(i64, Record)>, usize)> = per_chunk
            .into_iter()
            .try_fold((Vec::new(), 0usize), |(mut all, errors), chunk| {
                let (out, field_errors) = chunk?;
                all.extend(out);
                Ok((all, errors + field_errors))
            });

        self.metrics.end_run(start.elapsed());
        self.emit(ExecutionEvent::RunFinished {
            elapsed: start.elapsed(),
            metrics: self.metrics.snapshot(),
        });

        let (out, field_errors) = outcome?;
        transformer.report_success(
            tag,
            TransformStats {
                events: out.len(),
                field_errors,
            },
        );
        Ok(out)
    }

    fn emit(&self, event: ExecutionEvent) {
        if let Some(obs) = &self.observer {
            obs.on_event(&event);
        }
    }
}

fn chunk_ranges(event_count: usize, chunk_size: usize) -> Vec<Range<usize>> {
    let mut out = Vec::with_capacity(event_count.div_ceil(chunk_size));
    let mut start = 0usize;
    while start < event_count {
        let end = (start + chunk_size).min(event_count);
        out.push(start..end);
        start = end;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::{chunk_ranges, ExecutionEngine, ExecutionOptions};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use crate::error::TransformError;
    use crate::execution::{ExecutionEvent, ExecutionObserver};
    use crate::transform::{ErrorPolicy, RecordTransformer, TransformConfig};
    use crate::types::{Record, Value};

    fn events_of_n(n: usize) -> Vec<(i64, Record)> {
        (0..n as i64)
            .map(|i| {
                let mut r = Record::new();
                r.insert("id".to_string(), Value::Int(i));
                (i, r)
            })
            .collect()
    }

    fn transformer() -> RecordTransformer {
        let config = TransformConfig::default()
            .with_field("label", r#"${tag_parts[1]}-${record["id"]}"#)
            .with_field("part", "${tag_parts[2]}");
        RecordTransformer::new(&config).unwrap()
    }

    #[test]
    fn chunk_ranges_cover_every_event() {
        assert!(chunk_ranges(0, 4).is_empty());
        assert_eq!(chunk_ranges(10, 4), vec![0..4, 4..8, 8..10]);
    }

    #[test]
    fn transform_parallel_preserves_order() {
        let engine = ExecutionEngine::new(ExecutionOptions {
            num_threads: Some(4),
            chunk_size: 7,
            max_in_flight_chunks: 4,
        });

        let out = engine
            .transform_parallel(&transformer(), "app.web", events_of_n(200))
            .unwrap();

        assert_eq!(out.len(), 200);
        for (i, (time, record)) in out.iter().enumerate() {
            assert_eq!(*time, i as i64);
            assert_eq!(record["label"], Value::from(format!("web-{i}")));
            assert!(!record.contains_key("part"));
        }
    }

    #[derive(Default)]
    struct ConcurrencyObserver {
        active_chunks: AtomicUsize,
        max_active_chunks: AtomicUsize,
    }

    impl ExecutionObserver for ConcurrencyObserver {
        fn on_event(&self, event: &ExecutionEvent) {
            match event {
                ExecutionEvent::ChunkStarted { .. } => {
                    let now = self.active_chunks.fetch_add(1, Ordering::SeqCst) + 1;
                    let _ = self.max_active_chunks.fetch_max(now, Ordering::SeqCst);
                }
                ExecutionEvent::ChunkFinished { .. } | ExecutionEvent::ChunkFailed { .. } => {
                    let _ = self.active_chunks.fetch_sub(1, Ordering::SeqCst);
                }
                _ => {}
            }
        }
    }

    #[test]
    fn max_in_flight_chunks_throttles_chunk_concurrency() {
        let observer = Arc::new(ConcurrencyObserver::default());
        let obs_trait: Arc<dyn ExecutionObserver> = observer.clone();
        let engine = ExecutionEngine::new(ExecutionOptions {
            num_threads: Some(4),
            chunk_size: 1,
            max_in_flight_chunks: 1,
        })
        .with_observer(obs_trait);

        let out = engine
            .transform_parallel(&transformer(), "app.web", events_of_n(100))
            .unwrap();

        assert_eq!(out.len(), 100);
        assert_eq!(observer.max_active_chunks.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn metrics_are_available_after_run() {
        let engine = ExecutionEngine::new(ExecutionOptions {
            num_threads: Some(2),
            chunk_size: 10,
            max_in_flight_chunks: 2,
        });
        let metrics = engine.metrics();

        let out = engine
            .transform_parallel(&transformer(), "app.web", events_of_n(60))
            .unwrap();
        assert_eq!(out.len(), 60);

        let snap = metrics.snapshot();
        assert_eq!(snap.run_id, 1);
        assert_eq!(snap.events_processed, 60);
        // `part` fails for every event under the default omit policy.
        assert_eq!(snap.field_errors, 60);
        assert_eq!(snap.chunks_started, 6);
        assert_eq!(snap.chunks_finished, 6);
        assert!(snap.max_active_chunks <= 2);
        assert!(snap.elapsed.is_some());
    }

    #[test]
    fn fail_policy_returns_earliest_error() {
        let config = TransformConfig::default()
            .with_field("x", r#"${record["id"]["inner"]}"#)
            .with_error_policy(ErrorPolicy::Fail);
        let transformer = RecordTransformer::new(&config).unwrap();
        let engine = ExecutionEngine::new(ExecutionOptions {
            num_threads: Some(4),
            chunk_size: 3,
            max_in_flight_chunks: 4,
        });

        let err = engine
            .transform_parallel(&transformer, "t", events_of_n(30))
            .unwrap_err();
        assert!(matches!(err, TransformError::Evaluation { ref field, .. } if field == "x"));
    }

    #[test]
    fn empty_batch_is_fine() {
        let engine = ExecutionEngine::new(ExecutionOptions::default());
        let out = engine.transform_parallel(&transformer(), "a.b", Vec::new()).unwrap();
        assert!(out.is_empty());
    }
}
