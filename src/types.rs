//! Core data model for event records.
//!
//! A [`Record`] is an insertion-ordered map from key to [`Value`]. String values are carried as
//! [`Text`]: raw bytes plus the [`Charset`] they are declared to be in. Text buffers are reference
//! counted, so cloning a value (for example when a field copies a nested structure) shares the
//! bytes instead of copying them.

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use encoding_rs::Encoding;
use indexmap::IndexMap;

/// One event's key-value payload.
///
/// Note that `IndexMap` equality ignores order; compare `keys()` when order matters.
pub type Record = IndexMap<String, Value>;

/// Declared character encoding of a [`Text`] value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Charset {
    /// Raw bytes with no declared encoding.
    Binary,
    /// Bytes declared to be in a named encoding.
    Encoded(&'static Encoding),
}

impl Charset {
    /// UTF-8.
    pub fn utf8() -> Self {
        Self::Encoded(encoding_rs::UTF_8)
    }

    /// Look up a charset by label (case-insensitive, surrounding whitespace ignored).
    ///
    /// Accepts the WHATWG encoding labels plus `binary`/`ascii-8bit` and the Windows code page
    /// aliases `cp932`, `cp936`, `cp949` and `cp950`.
    pub fn for_label(label: &str) -> Option<Self> {
        let label = label.trim();
        match label.to_ascii_lowercase().as_str() {
            "binary" | "ascii-8bit" => Some(Self::Binary),
            "cp932" | "ms932" | "windows-31j" => Some(Self::Encoded(encoding_rs::SHIFT_JIS)),
            "cp936" => Some(Self::Encoded(encoding_rs::GBK)),
            "cp949" => Some(Self::Encoded(encoding_rs::EUC_KR)),
            "cp950" => Some(Self::Encoded(encoding_rs::BIG5)),
            _ => Encoding::for_label(label.as_bytes()).map(Self::Encoded),
        }
    }

    /// Canonical name (`BINARY` for raw bytes).
    pub fn name(&self) -> &'static str {
        match self {
            Self::Binary => "BINARY",
            Self::Encoded(enc) => enc.name(),
        }
    }

    /// Whether text can be transcoded *into* this charset.
    ///
    /// UTF-16 and the `replacement` encoding are decode-only.
    pub fn is_encodable(&self) -> bool {
        match self {
            Self::Binary => false,
            Self::Encoded(enc) => enc.output_encoding() == *enc,
        }
    }
}

impl fmt::Display for Charset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A byte string tagged with its declared [`Charset`].
///
/// The byte buffer is shared between clones and never mutated in place: changing the bytes of one
/// holder swaps in a fresh buffer for that holder only.
#[derive(Clone, PartialEq, Eq)]
pub struct Text {
    bytes: Arc<[u8]>,
    charset: Charset,
}

impl Text {
    /// Create a text value from bytes and a declared charset.
    pub fn new(bytes: impl Into<Vec<u8>>, charset: Charset) -> Self {
        Self {
            bytes: Arc::from(bytes.into()),
            charset,
        }
    }

    /// Create a UTF-8 text value.
    pub fn utf8(s: impl Into<String>) -> Self {
        Self::new(s.into().into_bytes(), Charset::utf8())
    }

    /// Create a text value with no declared encoding.
    pub fn binary(bytes: impl Into<Vec<u8>>) -> Self {
        Self::new(bytes, Charset::Binary)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn charset(&self) -> Charset {
        self.charset
    }

    /// Change the declared charset without touching the bytes.
    pub fn set_charset(&mut self, charset: Charset) {
        self.charset = charset;
    }

    /// Replace the bytes with a freshly allocated buffer.
    pub fn replace_bytes(&mut self, bytes: Vec<u8>, charset: Charset) {
        self.bytes = Arc::from(bytes);
        self.charset = charset;
    }

    /// Whether the byte buffer is currently shared with another holder.
    pub fn is_shared(&self) -> bool {
        Arc::strong_count(&self.bytes) > 1
    }

    /// Whether two text values share the same byte buffer.
    pub fn shares_buffer_with(&self, other: &Text) -> bool {
        Arc::ptr_eq(&self.bytes, &other.bytes)
    }

    /// Decode to a Rust string according to the declared charset.
    ///
    /// Binary text is interpreted as UTF-8. Invalid sequences decode to U+FFFD.
    pub fn to_string_lossy(&self) -> Cow<'_, str> {
        match self.charset {
            Charset::Binary => String::from_utf8_lossy(&self.bytes),
            Charset::Encoded(enc) => enc.decode_without_bom_handling(&self.bytes).0,
        }
    }
}

impl fmt::Debug for Text {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}@{}", self.to_string_lossy(), self.charset)
    }
}

impl From<&str> for Text {
    fn from(s: &str) -> Self {
        Self::utf8(s)
    }
}

impl From<String> for Text {
    fn from(s: String) -> Self {
        Self::utf8(s)
    }
}

/// A dynamically typed record value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// Missing value.
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    /// Integers above `i64::MAX`.
    UInt(u64),
    Float(f64),
    Str(Text),
    Array(Vec<Value>),
    Map(Record),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_text(&self) -> Option<&Text> {
        match self {
            Self::Str(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Record> {
        match self {
            Self::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Self::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Short type name used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) | Self::UInt(_) => "integer",
            Self::Float(_) => "float",
            Self::Str(_) => "string",
            Self::Array(_) => "array",
            Self::Map(_) => "map",
        }
    }

    /// Convert a JSON value. JSON strings become UTF-8 text.
    pub fn from_json(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => match (n.as_i64(), n.as_u64()) {
                (Some(i), _) => Self::Int(i),
                (None, Some(u)) => Self::UInt(u),
                (None, None) => Self::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Self::Str(Text::utf8(s)),
            serde_json::Value::Array(items) => {
                Self::Array(items.into_iter().map(Self::from_json).collect())
            }
            serde_json::Value::Object(obj) => Self::Map(record_from_json_map(obj)),
        }
    }

    /// Convert to JSON. Text is decoded lossily; non-finite floats become `null`.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Int(i) => serde_json::Value::from(*i),
            Self::UInt(u) => serde_json::Value::from(*u),
            Self::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Self::Str(t) => serde_json::Value::String(t.to_string_lossy().into_owned()),
            Self::Array(items) => {
                serde_json::Value::Array(items.iter().map(Self::to_json).collect())
            }
            Self::Map(m) => record_to_json(m),
        }
    }
}

/// Renders a non-string value the way it appears inside an interpolated template.
///
/// `Null` renders as the empty string; arrays and maps render as JSON. Strings are decoded
/// lossily here, whereas templates splice their raw bytes.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::UInt(u) => write!(f, "{u}"),
            Self::Float(v) => {
                if v.is_finite() && v.fract() == 0.0 && v.abs() < 1e16 {
                    write!(f, "{v:.1}")
                } else {
                    write!(f, "{v}")
                }
            }
            Self::Str(t) => f.write_str(&t.to_string_lossy()),
            Self::Array(_) | Self::Map(_) => write!(f, "{}", self.to_json()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(Text::utf8(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(Text::utf8(s))
    }
}

impl From<Text> for Value {
    fn from(t: Text) -> Self {
        Self::Str(t)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<u64> for Value {
    fn from(u: u64) -> Self {
        i64::try_from(u).map_or(Self::UInt(u), Self::Int)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::Array(items)
    }
}

impl From<Record> for Value {
    fn from(m: Record) -> Self {
        Self::Map(m)
    }
}

/// Convert a JSON object into a [`Record`], preserving key order.
pub fn record_from_json_map(obj: serde_json::Map<String, serde_json::Value>) -> Record {
    obj.into_iter()
        .map(|(k, v)| (k, Value::from_json(v)))
        .collect()
}

/// Convert a [`Record`] into a JSON object.
pub fn record_to_json(record: &Record) -> serde_json::Value {
    serde_json::Value::Object(
        record
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn charset_lookup_accepts_aliases() {
        assert_eq!(Charset::for_label("utf-8"), Some(Charset::utf8()));
        assert_eq!(Charset::for_label(" UTF8 "), Some(Charset::utf8()));
        assert_eq!(Charset::for_label("binary"), Some(Charset::Binary));
        assert_eq!(Charset::for_label("ASCII-8BIT"), Some(Charset::Binary));
        assert_eq!(
            Charset::for_label("cp932"),
            Some(Charset::Encoded(encoding_rs::SHIFT_JIS))
        );
        assert_eq!(Charset::for_label("no-such-charset"), None);
    }

    #[test]
    fn utf16_is_not_encodable() {
        assert!(!Charset::for_label("utf-16le").unwrap().is_encodable());
        assert!(Charset::for_label("shift_jis").unwrap().is_encodable());
        assert!(!Charset::Binary.is_encodable());
    }

    #[test]
    fn text_clones_share_buffers() {
        let a = Text::utf8("v");
        assert!(!a.is_shared());
        let mut b = a.clone();
        assert!(a.shares_buffer_with(&b));
        assert!(a.is_shared());

        b.replace_bytes(b"w".to_vec(), Charset::Binary);
        assert!(!a.shares_buffer_with(&b));
        assert_eq!(a.as_bytes(), b"v");
        assert_eq!(a.charset(), Charset::utf8());
    }

    #[test]
    fn display_renders_template_strings() {
        assert_eq!(Value::Null.to_string(), "");
        assert_eq!(Value::Int(42).to_string(), "42");
        assert_eq!(Value::Float(1.0).to_string(), "1.0");
        assert_eq!(Value::Float(2.5).to_string(), "2.5");
        assert_eq!(Value::Bool(true).to_string(), "true");
        assert_eq!(Value::from("abc").to_string(), "abc");
        assert_eq!(
            Value::Array(vec![Value::Int(1), Value::from("x")]).to_string(),
            r#"[1,"x"]"#
        );
    }

    #[test]
    fn json_conversion_preserves_order_and_types() {
        let json: serde_json::Value =
            serde_json::from_str(r#"{"z":1,"a":{"n":[true,null,1.5]},"m":"s"}"#).unwrap();
        let v = Value::from_json(json.clone());
        let map = v.as_map().unwrap();
        assert_eq!(map.keys().collect::<Vec<_>>(), vec!["z", "a", "m"]);
        assert_eq!(map["z"], Value::Int(1));
        assert_eq!(v.to_json(), json);
    }

    #[test]
    fn large_json_integers_stay_exact() {
        let json: serde_json::Value = serde_json::from_str("[18446744073709551615, -1]").unwrap();
        let v = Value::from_json(json.clone());
        let items = v.as_array().unwrap();
        assert_eq!(items[0], Value::UInt(u64::MAX));
        assert_eq!(items[0].to_string(), "18446744073709551615");
        assert_eq!(items[1], Value::Int(-1));
        assert_eq!(v.to_json(), json);

        assert_eq!(Value::from(7u64), Value::Int(7));
    }
}
