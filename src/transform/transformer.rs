//! The per-event pipeline: inject tag/time keys, expand fields, reduce keys, normalize encoding.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use super::config::{ErrorPolicy, KeyList, TransformConfig};
use super::observability::{TransformContext, TransformObserver, TransformSeverity, TransformStats};
use crate::error::{TransformError, TransformResult};
use crate::processing::{EncodingSpec, KeyPolicy, TimeCache, TimeFormat, TimeFormatter};
use crate::template::{EvalContext, FieldExpander};
use crate::types::{Record, Value};

/// Options that do not change what a transformer produces.
#[derive(Clone)]
pub struct TransformOptions {
    /// Optional observer for failures, alerts and stream stats.
    pub observer: Option<Arc<dyn TransformObserver>>,
    /// Severity threshold at which `on_alert` is invoked.
    pub alert_at_or_above: TransformSeverity,
}

impl fmt::Debug for TransformOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformOptions")
            .field("observer_set", &self.observer.is_some())
            .field("alert_at_or_above", &self.alert_at_or_above)
            .finish()
    }
}

impl Default for TransformOptions {
    fn default() -> Self {
        Self {
            observer: None,
            alert_at_or_above: TransformSeverity::Critical,
        }
    }
}

impl TransformOptions {
    pub fn with_observer(mut self, observer: Arc<dyn TransformObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn with_alert_at_or_above(mut self, severity: TransformSeverity) -> Self {
        self.alert_at_or_above = severity;
        self
    }

    fn notify_failure(
        &self,
        ctx: &TransformContext,
        severity: TransformSeverity,
        err: &TransformError,
    ) {
        if let Some(obs) = self.observer.as_ref() {
            obs.on_failure(ctx, severity, err);
            if severity >= self.alert_at_or_above {
                obs.on_alert(ctx, severity, err);
            }
        }
    }
}

/// A validated, immutable record transformer.
///
/// Built once from a [`TransformConfig`]; safe to share across threads.
///
/// ```rust
/// use record_modifier::transform::{RecordTransformer, TransformConfig};
/// use record_modifier::types::{Record, Value};
///
/// # fn main() -> Result<(), record_modifier::TransformError> {
/// let config = TransformConfig::default()
///     .with_field("foo", "bar")
///     .with_field("tag_wrap", "-${tag_parts[0]}-${tag_parts[1]}-")
///     .with_remove_keys("debug");
/// let transformer = RecordTransformer::new(&config)?;
///
/// let mut record = Record::new();
/// record.insert("debug".to_string(), Value::Bool(true));
/// let out = transformer.transform("test.tag", 0, record)?;
///
/// assert_eq!(out["foo"], Value::from("bar"));
/// assert_eq!(out["tag_wrap"], Value::from("-test-tag-"));
/// assert!(!out.contains_key("debug"));
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct RecordTransformer {
    fields: Vec<FieldExpander>,
    key_policy: KeyPolicy,
    encoding: Option<EncodingSpec>,
    error_policy: ErrorPolicy,
    tag_key: Option<String>,
    time_field: Option<(String, TimeFormatter)>,
    needs_tag_parts: bool,
    options: TransformOptions,
}

/// State shared by the events of one stream call.
struct Pass<'a> {
    tag: &'a str,
    tag_parts: Option<Vec<&'a str>>,
    time_cache: Option<TimeCache<'a>>,
    field_errors: usize,
}

impl RecordTransformer {
    /// Validate `config` and build a transformer.
    pub fn new(config: &TransformConfig) -> TransformResult<Self> {
        Self::with_options(config, TransformOptions::default())
    }

    /// Like [`Self::new`], reporting a configuration failure to the observer as
    /// [`TransformSeverity::Critical`].
    pub fn with_options(
        config: &TransformConfig,
        options: TransformOptions,
    ) -> TransformResult<Self> {
        match Self::build(config, options.clone()) {
            Ok(transformer) => Ok(transformer),
            Err(err) => {
                let ctx = TransformContext {
                    tag: String::new(),
                    event_index: None,
                };
                options.notify_failure(&ctx, TransformSeverity::Critical, &err);
                Err(err)
            }
        }
    }

    fn build(config: &TransformConfig, options: TransformOptions) -> TransformResult<Self> {
        let fields = config
            .record
            .iter()
            .map(|(key, raw)| FieldExpander::new(key.clone(), raw))
            .collect::<TransformResult<Vec<_>>>()?;

        let remove = config.remove_keys.as_ref().map(KeyList::keys);
        let whitelist = config.whitelist_keys.as_ref().map(KeyList::keys);
        let key_policy = KeyPolicy::from_lists(
            remove.as_deref(),
            whitelist.as_deref(),
            config.whitelist_order,
        )?;

        let encoding = config.char_encoding.as_deref().map(EncodingSpec::parse).transpose()?;

        let time_field = match &config.time_key {
            Some(key) => {
                let format = match (&config.time_format, config.time_as_epoch) {
                    (_, true) => TimeFormat::Epoch,
                    (Some(pattern), false) => TimeFormat::Strftime(pattern.clone()),
                    (None, false) => TimeFormat::Iso8601,
                };
                Some((key.clone(), TimeFormatter::new(format, config.localtime)?))
            }
            None => None,
        };

        let needs_tag_parts = fields.iter().any(|f| f.plan().uses_tag_parts());

        debug!(
            fields = fields.len(),
            key_policy = ?key_policy,
            encoding = ?encoding,
            error_policy = ?config.error_policy,
            "built record transformer"
        );

        Ok(Self {
            fields,
            key_policy,
            encoding,
            error_policy: config.error_policy,
            tag_key: config.tag_key.clone(),
            time_field,
            needs_tag_parts,
            options,
        })
    }

    pub fn fields(&self) -> &[FieldExpander] {
        &self.fields
    }

    pub fn key_policy(&self) -> &KeyPolicy {
        &self.key_policy
    }

    pub fn encoding(&self) -> Option<&EncodingSpec> {
        self.encoding.as_ref()
    }

    pub fn error_policy(&self) -> ErrorPolicy {
        self.error_policy
    }

    /// Transform a single event.
    pub fn transform(&self, tag: &str, time: i64, record: Record) -> TransformResult<Record> {
        let mut pass = self.begin(tag);
        self.apply(&mut pass, None, time, record)
    }

    /// Transform a stream of events sharing one tag.
    ///
    /// Output has one entry per input, in input order, with the original timestamps. Under
    /// [`ErrorPolicy::Fail`] the first failing event aborts the call.
    pub fn transform_stream(
        &self,
        tag: &str,
        events: impl IntoIterator<Item = (i64, Record)>,
    ) -> TransformResult<Vec<(i64, Record)>> {
        let (out, field_errors) = self.transform_batch(tag, events, 0)?;
        self.report_success(
            tag,
            TransformStats {
                events: out.len(),
                field_errors,
            },
        );
        Ok(out)
    }

    /// Transform a slice of a larger stream. `first_index` is the position of the first event in
    /// that stream, used in reports.
    pub(crate) fn transform_batch(
        &self,
        tag: &str,
        events: impl IntoIterator<Item = (i64, Record)>,
        first_index: usize,
    ) -> TransformResult<(Vec<(i64, Record)>, usize)> {
        let events = events.into_iter();
        let mut out = Vec::with_capacity(events.size_hint().0);
        let mut pass = self.begin(tag);
        for (offset, (time, record)) in events.enumerate() {
            let record = self.apply(&mut pass, Some(first_index + offset), time, record)?;
            out.push((time, record));
        }
        Ok((out, pass.field_errors))
    }

    pub(crate) fn report_success(&self, tag: &str, stats: TransformStats) {
        if let Some(obs) = self.options.observer.as_ref() {
            let ctx = TransformContext {
                tag: tag.to_string(),
                event_index: None,
            };
            obs.on_success(&ctx, stats);
        }
    }

    fn begin<'a>(&'a self, tag: &'a str) -> Pass<'a> {
        Pass {
            tag,
            tag_parts: self.needs_tag_parts.then(|| tag.split('.').collect()),
            time_cache: self.time_field.as_ref().map(|(_, formatter)| TimeCache::new(formatter)),
            field_errors: 0,
        }
    }

    fn apply(
        &self,
        pass: &mut Pass<'_>,
        event_index: Option<usize>,
        time: i64,
        mut record: Record,
    ) -> TransformResult<Record> {
        if let Some(key) = &self.tag_key {
            record.insert(key.clone(), Value::from(pass.tag));
        }
        if let (Some((key, _)), Some(cache)) = (&self.time_field, pass.time_cache.as_mut()) {
            record.insert(key.clone(), cache.render(time));
        }

        for field in &self.fields {
            let mut ctx = EvalContext::new(pass.tag, time, &record);
            if let Some(parts) = pass.tag_parts.as_deref() {
                ctx = ctx.with_tag_parts(parts);
            }
            match field.evaluate(&ctx) {
                Ok(value) => {
                    record.insert(field.key().to_string(), value);
                }
                Err(source) => {
                    let err = TransformError::Evaluation {
                        field: field.key().to_string(),
                        source,
                    };
                    warn!(
                        tag = %pass.tag,
                        event = ?event_index,
                        field = field.key(),
                        policy = ?self.error_policy,
                        error = %err,
                        "field evaluation failed"
                    );
                    pass.field_errors += 1;

                    let severity = match self.error_policy {
                        ErrorPolicy::Fail => TransformSeverity::Error,
                        ErrorPolicy::Omit | ErrorPolicy::Null => TransformSeverity::Warning,
                    };
                    let ctx = TransformContext {
                        tag: pass.tag.to_string(),
                        event_index,
                    };
                    self.options.notify_failure(&ctx, severity, &err);

                    match self.error_policy {
                        ErrorPolicy::Omit => {}
                        ErrorPolicy::Null => {
                            record.insert(field.key().to_string(), Value::Null);
                        }
                        ErrorPolicy::Fail => return Err(err),
                    }
                }
            }
        }

        let mut record = self.key_policy.reduce(record);
        if let Some(spec) = &self.encoding {
            spec.normalize_record(&mut record);
        }
        Ok(record)
    }
}
