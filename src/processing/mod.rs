//! Per-record processing steps applied after field expansion.
//!
//! - [`keys`]: remove listed (possibly nested) fields, or keep only whitelisted top-level keys
//! - [`encoding`]: recursive charset re-tagging / transcoding of string values
//! - [`time`]: rendering of the optional time field
//!
//! ## Example: whitelist then transcode
//!
//! ```rust
//! use record_modifier::processing::{EncodingSpec, KeyPolicy, WhitelistOrder};
//! use record_modifier::types::{Record, Value};
//!
//! let policy = KeyPolicy::whitelist(vec!["msg".to_string()], WhitelistOrder::Declaration);
//! let spec = EncodingSpec::parse("utf-8:cp932").unwrap();
//!
//! let mut record = Record::new();
//! record.insert("msg".to_string(), Value::from("ビ"));
//! record.insert("debug".to_string(), Value::Bool(true));
//!
//! let mut out = policy.reduce(record);
//! spec.normalize_record(&mut out);
//!
//! assert_eq!(out.len(), 1);
//! assert_eq!(out["msg"].as_text().unwrap().as_bytes(), &[0x83, 0x72]);
//! ```

pub mod encoding;
pub mod keys;
pub mod time;

pub use encoding::{normalize, EncodingSpec};
pub use keys::{split_key_list, KeyPath, KeyPolicy, WhitelistOrder};
pub use time::{TimeCache, TimeFormat, TimeFormatter};
