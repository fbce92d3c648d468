//! Recursive character-encoding normalization of record values.
//!
//! Two modes, selected once by [`EncodingSpec`]:
//!
//! - **set-only** (`char_encoding utf-8`): every string is re-tagged as the source charset; bytes
//!   are left alone.
//! - **convert** (`char_encoding utf-8:cp932`): every string not already in the target charset is
//!   decoded from the source charset and encoded into the target. Invalid input becomes U+FFFD and
//!   characters the target cannot represent become `?`. Conversion never fails.
//!
//! Only values are touched, never keys. Text buffers shared with other holders are left intact;
//! the normalized holder gets its own buffer.

use std::borrow::Cow;

use encoding_rs::{Encoding, EncoderResult};

use crate::error::{TransformError, TransformResult};
use crate::types::{Charset, Record, Text, Value};

/// Character encoding normalization settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodingSpec {
    source: Charset,
    target: Option<Charset>,
}

impl EncodingSpec {
    /// Re-tag strings as `source` without converting.
    pub fn set_only(source: Charset) -> Self {
        Self {
            source,
            target: None,
        }
    }

    /// Transcode strings from `source` into `target`.
    pub fn convert(source: Charset, target: Charset) -> TransformResult<Self> {
        if !target.is_encodable() {
            return Err(TransformError::config(format!(
                "cannot transcode into {target}"
            )));
        }
        Ok(Self {
            source,
            target: Some(target),
        })
    }

    /// Parse `source` or `source:target`.
    pub fn parse(spec: &str) -> TransformResult<Self> {
        let (from, to) = match spec.split_once(':') {
            Some((from, to)) => (from, Some(to)),
            None => (spec, None),
        };
        let source = lookup(from)?;
        match to {
            Some(to) => Self::convert(source, lookup(to)?),
            None => Ok(Self::set_only(source)),
        }
    }

    pub fn source(&self) -> Charset {
        self.source
    }

    pub fn target(&self) -> Option<Charset> {
        self.target
    }

    /// Normalize every string reachable from `record`'s values.
    pub fn normalize_record(&self, record: &mut Record) {
        for value in record.values_mut() {
            self.normalize_value(value);
        }
    }

    /// Normalize `value` in place, recursing through arrays and maps.
    pub fn normalize_value(&self, value: &mut Value) {
        match value {
            Value::Str(text) => self.normalize_text(text),
            Value::Array(items) => items.iter_mut().for_each(|v| self.normalize_value(v)),
            Value::Map(map) => self.normalize_record(map),
            Value::Null
            | Value::Bool(_)
            | Value::Int(_)
            | Value::UInt(_)
            | Value::Float(_) => {}
        }
    }

    fn normalize_text(&self, text: &mut Text) {
        let Some(target) = self.target else {
            text.set_charset(self.source);
            return;
        };
        if text.charset() == target {
            return;
        }
        let Charset::Encoded(to) = target else {
            return;
        };

        let decoded = decode(text.as_bytes(), self.source);
        if let (Cow::Borrowed(_), Charset::Encoded(from)) = (&decoded, self.source) {
            if from == to {
                text.set_charset(target);
                return;
            }
        }
        let bytes = encode(&decoded, to);
        text.replace_bytes(bytes, target);
    }
}

/// Normalize an owned value; see [`EncodingSpec::normalize_value`].
pub fn normalize(mut value: Value, spec: &EncodingSpec) -> Value {
    spec.normalize_value(&mut value);
    value
}

fn lookup(label: &str) -> TransformResult<Charset> {
    Charset::for_label(label)
        .ok_or_else(|| TransformError::config(format!("unknown character encoding {label:?}")))
}

fn decode(bytes: &[u8], from: Charset) -> Cow<'_, str> {
    match from {
        Charset::Encoded(enc) => enc.decode_without_bom_handling(bytes).0,
        // Binary input: only ASCII is meaningful.
        Charset::Binary => match std::str::from_utf8(bytes) {
            Ok(s) if s.is_ascii() => Cow::Borrowed(s),
            _ => Cow::Owned(
                bytes
                    .iter()
                    .map(|&b| if b.is_ascii() { b as char } else { '\u{FFFD}' })
                    .collect(),
            ),
        },
    }
}

fn encode(src: &str, to: &'static Encoding) -> Vec<u8> {
    if to == encoding_rs::UTF_8 {
        return src.as_bytes().to_vec();
    }

    let mut encoder = to.new_encoder();
    let mut out = Vec::with_capacity(
        encoder
            .max_buffer_length_from_utf8_without_replacement(src.len())
            .unwrap_or(src.len() * 2),
    );
    let mut rest = src;
    loop {
        let (result, read) =
            encoder.encode_from_utf8_to_vec_without_replacement(rest, &mut out, true);
        rest = &rest[read..];
        match result {
            EncoderResult::InputEmpty => break,
            EncoderResult::OutputFull => reserve(&mut out, &encoder, rest.len()),
            EncoderResult::Unmappable(_) => {
                reserve(&mut out, &encoder, 1);
                let _ = encoder.encode_from_utf8_to_vec_without_replacement("?", &mut out, false);
            }
        }
    }
    out
}

fn reserve(out: &mut Vec<u8>, encoder: &encoding_rs::Encoder, input_len: usize) {
    let needed = encoder
        .max_buffer_length_from_utf8_without_replacement(input_len)
        .unwrap_or(input_len * 4)
        .max(16);
    out.reserve(needed);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cp932() -> Charset {
        Charset::for_label("cp932").unwrap()
    }

    #[test]
    fn parse_set_only_and_convert() {
        let spec = EncodingSpec::parse("utf-8").unwrap();
        assert_eq!(spec.source(), Charset::utf8());
        assert_eq!(spec.target(), None);

        let spec = EncodingSpec::parse("utf-8:cp932").unwrap();
        assert_eq!(spec.target(), Some(cp932()));
    }

    #[test]
    fn parse_rejects_unknown_and_decode_only_charsets() {
        assert!(EncodingSpec::parse("klingon").is_err());
        assert!(EncodingSpec::parse("utf-8:klingon").is_err());
        assert!(EncodingSpec::parse("utf-8:utf-16le").is_err());
        assert!(EncodingSpec::parse("utf-8:binary").is_err());
    }

    #[test]
    fn set_only_retags_without_touching_bytes() {
        let spec = EncodingSpec::set_only(Charset::utf8());
        let original = Text::binary("ビ".as_bytes());
        let mut value = Value::Str(original.clone());
        spec.normalize_value(&mut value);

        let text = value.as_text().unwrap();
        assert_eq!(text.charset(), Charset::utf8());
        assert_eq!(text.as_bytes(), "ビ".as_bytes());
        assert!(text.shares_buffer_with(&original));
        assert_eq!(original.charset(), Charset::Binary);
    }

    #[test]
    fn convert_transcodes_to_cp932() {
        let spec = EncodingSpec::parse("utf-8:cp932").unwrap();
        let out = normalize(Value::from("ビ"), &spec);
        let text = out.as_text().unwrap();
        assert_eq!(text.charset(), cp932());
        assert_eq!(text.as_bytes(), &[0x83, 0x72]);
        assert_eq!(text.to_string_lossy(), "ビ");
    }

    #[test]
    fn convert_replaces_invalid_and_unmappable() {
        let spec = EncodingSpec::parse("utf-8:cp932").unwrap();
        let out = normalize(Value::Str(Text::binary(vec![b'a', 0xFF, b'b'])), &spec);
        assert_eq!(out.as_text().unwrap().as_bytes(), b"a?b");

        let out = normalize(Value::from("x😀y"), &spec);
        assert_eq!(out.as_text().unwrap().as_bytes(), b"x?y");
    }

    #[test]
    fn convert_into_utf8_uses_replacement_character() {
        let spec = EncodingSpec::parse("utf-8:utf-8").unwrap();
        let out = normalize(Value::Str(Text::binary(vec![b'a', 0xFF])), &spec);
        let text = out.as_text().unwrap();
        assert_eq!(text.charset(), Charset::utf8());
        assert_eq!(text.as_bytes(), "a\u{FFFD}".as_bytes());
    }

    #[test]
    fn convert_is_idempotent() {
        let spec = EncodingSpec::parse("utf-8:cp932").unwrap();
        let once = normalize(Value::Array(vec![Value::from("v"), Value::from("ビ")]), &spec);
        let twice = normalize(once.clone(), &spec);
        assert_eq!(once, twice);
    }

    #[test]
    fn non_strings_pass_through() {
        let spec = EncodingSpec::parse("utf-8:cp932").unwrap();
        for v in [Value::Null, Value::Int(1), Value::Float(1.5), Value::Bool(false)] {
            assert_eq!(normalize(v.clone(), &spec), v);
        }
    }
}
