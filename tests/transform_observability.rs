use std::fs;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use record_modifier::transform::{
    CompositeObserver, ErrorPolicy, FileObserver, RecordTransformer, TransformConfig,
    TransformContext, TransformObserver, TransformOptions, TransformSeverity, TransformStats,
};
use record_modifier::types::Record;
use record_modifier::TransformError;

#[derive(Default)]
struct RecordingObserver {
    successes: Mutex<Vec<TransformStats>>,
    failures: Mutex<Vec<(Option<usize>, TransformSeverity)>>,
    alerts: Mutex<Vec<TransformSeverity>>,
}

impl TransformObserver for RecordingObserver {
    fn on_success(&self, _ctx: &TransformContext, stats: TransformStats) {
        self.successes.lock().unwrap().push(stats);
    }

    fn on_failure(
        &self,
        ctx: &TransformContext,
        severity: TransformSeverity,
        _error: &TransformError,
    ) {
        self.failures.lock().unwrap().push((ctx.event_index, severity));
    }

    fn on_alert(
        &self,
        _ctx: &TransformContext,
        severity: TransformSeverity,
        _error: &TransformError,
    ) {
        self.alerts.lock().unwrap().push(severity);
    }
}

fn options(observer: &Arc<RecordingObserver>, threshold: TransformSeverity) -> TransformOptions {
    let obs: Arc<dyn TransformObserver> = observer.clone();
    TransformOptions::default()
        .with_observer(obs)
        .with_alert_at_or_above(threshold)
}

fn tmp_path(name: &str) -> std::path::PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!("record-modifier-{name}-{nanos}.log"))
}

#[test]
fn config_errors_are_reported_as_critical_alerts() {
    let observer = Arc::new(RecordingObserver::default());
    let config = TransformConfig::default()
        .with_remove_keys("a")
        .with_whitelist_keys("b");

    let opts = options(&observer, TransformSeverity::Critical);
    let err = RecordTransformer::with_options(&config, opts).unwrap_err();
    assert!(matches!(err, TransformError::Config { .. }));

    assert_eq!(
        *observer.failures.lock().unwrap(),
        vec![(None, TransformSeverity::Critical)]
    );
    assert_eq!(*observer.alerts.lock().unwrap(), vec![TransformSeverity::Critical]);
}

#[test]
fn tolerated_field_errors_are_warnings_and_counted() {
    let observer = Arc::new(RecordingObserver::default());
    let config = TransformConfig::default().with_field("p", "${tag_parts[1]}");
    let opts = options(&observer, TransformSeverity::Critical);
    let transformer = RecordTransformer::with_options(&config, opts).unwrap();

    let out = transformer
        .transform_stream("short", vec![(1, Record::new()), (2, Record::new())])
        .unwrap();
    assert_eq!(out.len(), 2);

    assert_eq!(
        *observer.failures.lock().unwrap(),
        vec![
            (Some(0), TransformSeverity::Warning),
            (Some(1), TransformSeverity::Warning)
        ]
    );
    assert!(observer.alerts.lock().unwrap().is_empty());
    assert_eq!(
        *observer.successes.lock().unwrap(),
        vec![TransformStats {
            events: 2,
            field_errors: 2
        }]
    );
}

#[test]
fn fail_policy_reports_errors_and_alerts_at_threshold() {
    let observer = Arc::new(RecordingObserver::default());
    let config = TransformConfig::default()
        .with_field("p", "${tag_parts[1]}")
        .with_error_policy(ErrorPolicy::Fail);
    let opts = options(&observer, TransformSeverity::Error);
    let transformer = RecordTransformer::with_options(&config, opts).unwrap();

    let _ = transformer
        .transform_stream("short", vec![(1, Record::new()), (2, Record::new())])
        .unwrap_err();

    assert_eq!(
        *observer.failures.lock().unwrap(),
        vec![(Some(0), TransformSeverity::Error)]
    );
    assert_eq!(*observer.alerts.lock().unwrap(), vec![TransformSeverity::Error]);
    assert!(observer.successes.lock().unwrap().is_empty());
}

#[test]
fn composite_and_file_observers_fan_out() {
    let path = tmp_path("observer");
    let recording = Arc::new(RecordingObserver::default());
    let composite = CompositeObserver::new(vec![
        recording.clone() as Arc<dyn TransformObserver>,
        Arc::new(FileObserver::new(&path)),
    ]);

    let config = TransformConfig::default().with_field("p", "${tag_parts[3]}");
    let transformer = RecordTransformer::with_options(
        &config,
        TransformOptions::default().with_observer(Arc::new(composite)),
    )
    .unwrap();
    let _ = transformer
        .transform_stream("a.b", vec![(0, Record::new())])
        .unwrap();

    assert_eq!(recording.failures.lock().unwrap().len(), 1);
    assert_eq!(recording.successes.lock().unwrap().len(), 1);

    let log = fs::read_to_string(&path).unwrap();
    let _ = fs::remove_file(&path);
    let lines: Vec<&str> = log.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].contains("fail severity=Warning tag=a.b event=Some(0)"));
    assert!(lines[1].contains("ok tag=a.b events=1 field_errors=1"));
}
