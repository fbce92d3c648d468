//! Key-set reduction: remove listed keys, or keep only whitelisted ones.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{TransformError, TransformResult};
use crate::template::Index;
use crate::template::expr::resolve_position;
use crate::types::{Record, Value};

/// Output order for whitelisted records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WhitelistOrder {
    /// Follow the order in which the whitelist declares its keys.
    #[default]
    Declaration,
    /// Keep the order the keys had in the incoming record.
    Input,
}

/// Address of a (possibly nested) field.
///
/// A bare key such as `host` or `a.b` addresses a top-level key literally. Accessor syntax starts
/// with `$`: `$.a.b`, `$['a']['b']` and `$.items[0]` address nested maps and arrays; negative
/// array positions count from the end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPath {
    raw: String,
    segments: Vec<Index>,
}

impl KeyPath {
    pub fn parse(raw: &str) -> TransformResult<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(TransformError::config("key path must not be empty"));
        }
        let segments = match raw.strip_prefix('$') {
            Some(accessor) => parse_accessor(accessor).map_err(|message| {
                TransformError::config(format!("invalid key path {raw:?}: {message}"))
            })?,
            None => vec![Index::Key(raw.to_string())],
        };
        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    pub fn segments(&self) -> &[Index] {
        &self.segments
    }

    /// Delete the addressed field, returning it if it was present.
    pub fn remove_from(&self, record: &mut Record) -> Option<Value> {
        let (last, parents) = self.segments.split_last()?;
        let Some((first, rest)) = parents.split_first() else {
            return match last {
                Index::Key(k) => record.shift_remove(k),
                Index::Position(_) => None,
            };
        };
        let Index::Key(first) = first else {
            return None;
        };
        let mut current = record.get_mut(first)?;
        for index in rest {
            current = child_mut(current, index)?;
        }
        match (current, last) {
            (Value::Map(map), Index::Key(k)) => map.shift_remove(k),
            (Value::Array(items), Index::Position(i)) => {
                resolve_position(*i, items.len()).map(|at| items.remove(at))
            }
            _ => None,
        }
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

fn child_mut<'v>(value: &'v mut Value, index: &Index) -> Option<&'v mut Value> {
    match (value, index) {
        (Value::Map(map), Index::Key(k)) => map.get_mut(k),
        (Value::Array(items), Index::Position(i)) => {
            let at = resolve_position(*i, items.len())?;
            items.get_mut(at)
        }
        _ => None,
    }
}

fn parse_accessor(src: &str) -> Result<Vec<Index>, String> {
    let mut segments = Vec::new();
    let mut rest = src;

    while !rest.is_empty() {
        if let Some(after_dot) = rest.strip_prefix('.') {
            let end = after_dot.find(['.', '[']).unwrap_or(after_dot.len());
            let name = &after_dot[..end];
            if name.is_empty() {
                return Err("empty key after '.'".to_string());
            }
            segments.push(Index::Key(name.to_string()));
            rest = &after_dot[end..];
        } else if let Some(after_bracket) = rest.strip_prefix('[') {
            let close = after_bracket
                .find(']')
                .ok_or_else(|| "unclosed '['".to_string())?;
            let inner = after_bracket[..close].trim();
            segments.push(parse_bracket(inner)?);
            rest = &after_bracket[close + 1..];
        } else {
            return Err(format!("unexpected input {rest:?}"));
        }
    }

    if segments.is_empty() {
        return Err("path addresses the whole record".to_string());
    }
    if matches!(segments.first(), Some(Index::Position(_))) {
        return Err("path must start with a key".to_string());
    }
    Ok(segments)
}

fn parse_bracket(inner: &str) -> Result<Index, String> {
    for quote in ['\'', '"'] {
        if let Some(quoted) = inner.strip_prefix(quote) {
            return quoted
                .strip_suffix(quote)
                .map(|k| Index::Key(k.to_string()))
                .ok_or_else(|| format!("unterminated quote in [{inner}]"));
        }
    }
    inner
        .parse::<i64>()
        .map(Index::Position)
        .map_err(|_| format!("expected quoted key or integer in [{inner}]"))
}

/// Split a comma-separated key list, trimming whitespace and dropping empty entries.
pub fn split_key_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect()
}

/// Which keys survive a transform.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum KeyPolicy {
    /// Keep every key.
    #[default]
    None,
    /// Delete the addressed fields.
    Remove(Vec<KeyPath>),
    /// Keep only these top-level keys.
    Whitelist {
        keys: Vec<String>,
        lookup: HashSet<String>,
        order: WhitelistOrder,
    },
}

impl KeyPolicy {
    /// Build a policy from the configured lists.
    ///
    /// Configuring both lists is an error.
    pub fn from_lists(
        remove_keys: Option<&[String]>,
        whitelist_keys: Option<&[String]>,
        order: WhitelistOrder,
    ) -> TransformResult<Self> {
        match (remove_keys, whitelist_keys) {
            (Some(_), Some(_)) => Err(TransformError::config(
                "remove_keys and whitelist_keys are mutually exclusive",
            )),
            (Some(paths), None) => Ok(Self::Remove(
                paths
                    .iter()
                    .map(|p| KeyPath::parse(p))
                    .collect::<TransformResult<Vec<_>>>()?,
            )),
            (None, Some(keys)) => Ok(Self::whitelist(keys.to_vec(), order)),
            (None, None) => Ok(Self::None),
        }
    }

    pub fn whitelist(keys: Vec<String>, order: WhitelistOrder) -> Self {
        let lookup = keys.iter().cloned().collect();
        Self::Whitelist {
            keys,
            lookup,
            order,
        }
    }

    /// Apply the policy.
    ///
    /// `Remove` edits the record in place; `Whitelist` builds a new record.
    pub fn reduce(&self, mut record: Record) -> Record {
        match self {
            Self::None => record,
            Self::Remove(paths) => {
                for path in paths {
                    path.remove_from(&mut record);
                }
                record
            }
            Self::Whitelist {
                keys,
                order: WhitelistOrder::Declaration,
                ..
            } => {
                let mut out = Record::with_capacity(keys.len());
                for key in keys {
                    if let Some(v) = record.swap_remove(key) {
                        out.insert(key.clone(), v);
                    }
                }
                out
            }
            Self::Whitelist {
                lookup,
                order: WhitelistOrder::Input,
                ..
            } => record
                .into_iter()
                .filter(|(k, _)| lookup.contains(k))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(keys: &[&str]) -> Record {
        keys.iter()
            .map(|k| ((*k).to_string(), Value::from("v")))
            .collect()
    }

    fn keys(record: &Record) -> Vec<&str> {
        record.keys().map(String::as_str).collect()
    }

    fn list(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn split_key_list_trims_entries() {
        assert_eq!(split_key_list("k1, k2 ,k3,,"), list(&["k1", "k2", "k3"]));
        assert!(split_key_list(" ").is_empty());
    }

    #[test]
    fn remove_keeps_remaining_order() {
        let policy = KeyPolicy::from_lists(
            Some(list(&["k1", "k2", "k3"]).as_slice()),
            None,
            WhitelistOrder::default(),
        )
        .unwrap();
        let out = policy.reduce(rec(&["k1", "k5", "k2", "k4"]));
        assert_eq!(keys(&out), vec!["k5", "k4"]);
    }

    #[test]
    fn whitelist_follows_declaration_order() {
        let policy = KeyPolicy::whitelist(list(&["k2", "k1", "k3"]), WhitelistOrder::Declaration);
        let out = policy.reduce(rec(&["k1", "k2", "k4", "k5"]));
        assert_eq!(keys(&out), vec!["k2", "k1"]);
    }

    #[test]
    fn whitelist_can_follow_input_order() {
        let policy = KeyPolicy::whitelist(list(&["k2", "k1", "k3"]), WhitelistOrder::Input);
        let out = policy.reduce(rec(&["k1", "k2", "k4", "k5"]));
        assert_eq!(keys(&out), vec!["k1", "k2"]);
    }

    #[test]
    fn remove_and_whitelist_conflict() {
        let err = KeyPolicy::from_lists(
            Some(list(&["a"]).as_slice()),
            Some(list(&["b"]).as_slice()),
            WhitelistOrder::default(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("mutually exclusive"));
    }

    #[test]
    fn bare_keys_are_literal_even_with_dots() {
        let path = KeyPath::parse("a.b").unwrap();
        assert_eq!(path.segments(), &[Index::Key("a.b".to_string())]);
    }

    #[test]
    fn accessor_paths_parse() {
        let path = KeyPath::parse("$.a['b c'][-1].d").unwrap();
        assert_eq!(
            path.segments(),
            &[
                Index::Key("a".to_string()),
                Index::Key("b c".to_string()),
                Index::Position(-1),
                Index::Key("d".to_string()),
            ]
        );
        for bad in ["$", "$.", "$[0]", "$.a[", "$.a[x]", "$a", "$.a['b]", ""] {
            assert!(KeyPath::parse(bad).is_err(), "expected error for {bad:?}");
        }
    }

    #[test]
    fn remove_nested_fields() {
        let json = serde_json::json!({
            "a": {"b": 1, "c": 2},
            "items": [{"x": 1}, {"x": 2, "y": 3}],
            "keep": true
        });
        let Value::Map(mut record) = Value::from_json(json) else {
            panic!("expected map");
        };

        assert_eq!(
            KeyPath::parse("$.a.b").unwrap().remove_from(&mut record),
            Some(Value::Int(1))
        );
        assert_eq!(
            KeyPath::parse("$['items'][-1]['y']").unwrap().remove_from(&mut record),
            Some(Value::Int(3))
        );
        assert_eq!(
            KeyPath::parse("$.items[0]").unwrap().remove_from(&mut record),
            Some(Value::from_json(serde_json::json!({"x": 1})))
        );
        assert_eq!(KeyPath::parse("$.missing.deep").unwrap().remove_from(&mut record), None);
        assert_eq!(KeyPath::parse("$.keep.deep").unwrap().remove_from(&mut record), None);

        assert_eq!(
            Value::Map(record).to_json(),
            serde_json::json!({"a": {"c": 2}, "items": [{"x": 2}], "keep": true})
        );
    }
}
