//! Event time rendering for the optional `time_key` field.

use std::fmt::Write as _;

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Local, SecondsFormat, Utc};

use crate::error::{TransformError, TransformResult};
use crate::types::Value;

/// How the event time is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimeFormat {
    /// The epoch seconds as an integer.
    Epoch,
    /// RFC 3339 / ISO 8601, seconds precision.
    Iso8601,
    /// A strftime pattern.
    Strftime(String),
}

/// Renders event times. Immutable; pair it with a [`TimeCache`] per stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeFormatter {
    format: TimeFormat,
    localtime: bool,
}

impl TimeFormatter {
    /// Build a formatter. Invalid strftime patterns are rejected here.
    pub fn new(format: TimeFormat, localtime: bool) -> TransformResult<Self> {
        if let TimeFormat::Strftime(pattern) = &format {
            if StrftimeItems::new(pattern).any(|item| matches!(item, Item::Error)) {
                return Err(TransformError::config(format!(
                    "invalid time_format {pattern:?}"
                )));
            }
        }
        Ok(Self { format, localtime })
    }

    pub fn format(&self) -> &TimeFormat {
        &self.format
    }

    /// Render `time` (epoch seconds) without caching.
    pub fn render(&self, time: i64) -> Value {
        match &self.format {
            TimeFormat::Epoch => Value::Int(time),
            _ => Value::from(self.render_string(time)),
        }
    }

    fn render_string(&self, time: i64) -> String {
        let Some(utc) = DateTime::<Utc>::from_timestamp(time, 0) else {
            return time.to_string();
        };
        match (&self.format, self.localtime) {
            (TimeFormat::Epoch, _) => time.to_string(),
            (TimeFormat::Iso8601, false) => utc.to_rfc3339_opts(SecondsFormat::Secs, true),
            (TimeFormat::Iso8601, true) => utc
                .with_timezone(&Local)
                .to_rfc3339_opts(SecondsFormat::Secs, false),
            (TimeFormat::Strftime(pattern), false) => strftime(&utc, pattern),
            (TimeFormat::Strftime(pattern), true) => strftime(&utc.with_timezone(&Local), pattern),
        }
    }
}

fn strftime<Tz: chrono::TimeZone>(dt: &DateTime<Tz>, pattern: &str) -> String
where
    Tz::Offset: std::fmt::Display,
{
    let mut out = String::new();
    let _ = write!(out, "{}", dt.format(pattern));
    out
}

/// Two-slot cache of rendered times.
///
/// Events in one stream usually share a handful of timestamps; the slot holding the older time is
/// replaced on a miss.
#[derive(Debug)]
pub struct TimeCache<'f> {
    formatter: &'f TimeFormatter,
    slots: [Option<(i64, Value)>; 2],
}

impl<'f> TimeCache<'f> {
    pub fn new(formatter: &'f TimeFormatter) -> Self {
        Self {
            formatter,
            slots: [None, None],
        }
    }

    pub fn render(&mut self, time: i64) -> Value {
        if self.formatter.format == TimeFormat::Epoch {
            return Value::Int(time);
        }
        for (cached_time, value) in self.slots.iter().flatten() {
            if *cached_time == time {
                return value.clone();
            }
        }
        let value = self.formatter.render(time);
        let victim = match &self.slots {
            [None, _] => 0,
            [_, None] => 1,
            [Some((a, _)), Some((b, _))] => usize::from(a >= b),
        };
        self.slots[victim] = Some((time, value.clone()));
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T: i64 = 1_362_052_800; // 2013-02-28T12:00:00Z

    #[test]
    fn epoch_is_an_integer() {
        let f = TimeFormatter::new(TimeFormat::Epoch, false).unwrap();
        assert_eq!(f.render(T), Value::Int(T));
    }

    #[test]
    fn iso8601_utc() {
        let f = TimeFormatter::new(TimeFormat::Iso8601, false).unwrap();
        assert_eq!(f.render(T), Value::from("2013-02-28T12:00:00Z"));
    }

    #[test]
    fn strftime_utc() {
        let format = TimeFormat::Strftime("%Y/%m/%d %H:%M".to_string());
        let f = TimeFormatter::new(format, false).unwrap();
        assert_eq!(f.render(T), Value::from("2013/02/28 12:00"));
    }

    #[test]
    fn invalid_strftime_is_config_error() {
        let err = TimeFormatter::new(TimeFormat::Strftime("%Q %".to_string()), false).unwrap_err();
        assert!(matches!(err, TransformError::Config { .. }));
    }

    #[test]
    fn cache_returns_same_rendering() {
        let f = TimeFormatter::new(TimeFormat::Iso8601, false).unwrap();
        let mut cache = TimeCache::new(&f);
        let a = cache.render(T);
        let b = cache.render(T + 1);
        let c = cache.render(T + 2);
        assert_eq!(cache.render(T + 2), c);
        assert_eq!(cache.render(T), a);
        assert_ne!(a, b);
        assert_eq!(cache.render(T + 1), Value::from("2013-02-28T12:00:01Z"));
    }
}
