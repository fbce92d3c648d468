//! Configuration types for [`super::RecordTransformer`].

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::TransformResult;
use crate::processing::{split_key_list, WhitelistOrder};

/// Configuration for a record transformer.
///
/// Mirrors the options of the record-modifier filter. Validation (template syntax, conflicting key
/// policies, charsets, time format) happens when the transformer is built.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransformConfig {
    /// Output fields in evaluation order: key → template.
    pub record: IndexMap<String, String>,

    /// Fields to delete after expansion (mutually exclusive with `whitelist_keys`).
    pub remove_keys: Option<KeyList>,

    /// Top-level keys to keep after expansion (mutually exclusive with `remove_keys`).
    pub whitelist_keys: Option<KeyList>,

    /// Output order of whitelisted keys.
    pub whitelist_order: WhitelistOrder,

    /// `source` (re-tag only) or `source:target` (transcode).
    pub char_encoding: Option<String>,

    /// What to do when a field expression fails for an event.
    pub error_policy: ErrorPolicy,

    /// Write the event tag under this key before expanding fields.
    pub tag_key: Option<String>,

    /// Write the event time under this key before expanding fields.
    pub time_key: Option<String>,

    /// strftime pattern for `time_key`; ISO 8601 when unset.
    pub time_format: Option<String>,

    /// Write `time_key` as epoch seconds instead of a formatted string.
    pub time_as_epoch: bool,

    /// Format `time_key` in local time instead of UTC.
    pub localtime: bool,
}

impl TransformConfig {
    /// Parse a JSON configuration.
    pub fn from_json_str(input: &str) -> TransformResult<Self> {
        Ok(serde_json::from_str(input)?)
    }

    /// Appends an output field. Fields are evaluated in insertion order.
    pub fn with_field(mut self, key: impl Into<String>, template: impl Into<String>) -> Self {
        self.record.insert(key.into(), template.into());
        self
    }

    pub fn with_remove_keys(mut self, keys: impl Into<KeyList>) -> Self {
        self.remove_keys = Some(keys.into());
        self
    }

    pub fn with_whitelist_keys(mut self, keys: impl Into<KeyList>) -> Self {
        self.whitelist_keys = Some(keys.into());
        self
    }

    pub fn with_whitelist_order(mut self, order: WhitelistOrder) -> Self {
        self.whitelist_order = order;
        self
    }

    pub fn with_char_encoding(mut self, spec: impl Into<String>) -> Self {
        self.char_encoding = Some(spec.into());
        self
    }

    pub fn with_error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.error_policy = policy;
        self
    }

    pub fn with_tag_key(mut self, key: impl Into<String>) -> Self {
        self.tag_key = Some(key.into());
        self
    }

    pub fn with_time_key(mut self, key: impl Into<String>) -> Self {
        self.time_key = Some(key.into());
        self
    }
}

/// A key list given either as a comma-separated string or as a JSON array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeyList {
    Csv(String),
    List(Vec<String>),
}

impl KeyList {
    /// The keys, trimmed, with empty entries dropped.
    pub fn keys(&self) -> Vec<String> {
        match self {
            Self::Csv(list) => split_key_list(list),
            Self::List(items) => items
                .iter()
                .map(|k| k.trim())
                .filter(|k| !k.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }
}

impl From<&str> for KeyList {
    fn from(list: &str) -> Self {
        Self::Csv(list.to_string())
    }
}

impl From<Vec<String>> for KeyList {
    fn from(items: Vec<String>) -> Self {
        Self::List(items)
    }
}

/// Handling of per-event field evaluation errors.
///
/// Every failure is logged and reported to the observer regardless of policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorPolicy {
    /// Leave the failed field unwritten and continue.
    #[default]
    Omit,

    /// Write `null` under the failed field's key and continue.
    Null,

    /// Fail the event; stream calls stop at the first failed event.
    Fail,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_policy_defaults_to_omit() {
        assert_eq!(ErrorPolicy::default(), ErrorPolicy::Omit);
    }

    #[test]
    fn key_list_accepts_csv_and_array() {
        assert_eq!(KeyList::from(" a, b ,,c").keys(), vec!["a", "b", "c"]);
        assert_eq!(
            KeyList::from(vec!["$.a.b".to_string(), " ".to_string()]).keys(),
            vec!["$.a.b"]
        );
    }

    #[test]
    fn config_from_json_preserves_field_order() {
        let config = TransformConfig::from_json_str(
            r#"{
                "record": {"z": "1", "a": "${tag}", "m": "${record[\"z\"]}"},
                "remove_keys": ["hoge", "$.a.b"],
                "char_encoding": "utf-8:cp932",
                "error_policy": "fail",
                "whitelist_order": "input"
            }"#,
        )
        .unwrap();

        assert_eq!(config.record.keys().collect::<Vec<_>>(), vec!["z", "a", "m"]);
        assert_eq!(
            config.remove_keys,
            Some(KeyList::List(vec!["hoge".to_string(), "$.a.b".to_string()]))
        );
        assert_eq!(config.error_policy, ErrorPolicy::Fail);
        assert_eq!(config.whitelist_order, WhitelistOrder::Input);
        assert!(config.whitelist_keys.is_none());
    }

    #[test]
    fn config_rejects_unknown_options() {
        let err = TransformConfig::from_json_str(r#"{"include_tag_key": true}"#).unwrap_err();
        assert!(err.to_string().contains("include_tag_key"));
    }

    #[test]
    fn config_serde_roundtrip() {
        let config = TransformConfig::default()
            .with_field("foo", "bar")
            .with_whitelist_keys("k1,k2")
            .with_error_policy(ErrorPolicy::Null);

        let json = serde_json::to_string(&config).unwrap();
        let parsed = TransformConfig::from_json_str(&json).unwrap();
        assert_eq!(parsed, config);
    }
}
