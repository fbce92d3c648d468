//! Record transformation: configuration, the transformer itself, JSON event I/O and observability.
//!
//! ## Example: configure from JSON, transform an NDJSON stream
//!
//! ```rust
//! use record_modifier::transform::{events_from_ndjson, RecordTransformer, TransformConfig};
//! use record_modifier::types::Value;
//!
//! # fn main() -> Result<(), record_modifier::TransformError> {
//! let config = TransformConfig::from_json_str(
//!     r#"{"record": {"service": "${tag_parts[1]}"}, "remove_keys": "password"}"#,
//! )?;
//! let transformer = RecordTransformer::new(&config)?;
//!
//! let events = events_from_ndjson(
//!     "[1700000000, {\"user\": \"ann\", \"password\": \"x\"}]\n[1700000001, {\"user\": \"bob\"}]",
//!     0,
//! )?;
//! let out = transformer.transform_stream("app.web", events)?;
//!
//! assert_eq!(out[0].0, 1700000000);
//! assert_eq!(out[0].1["service"], Value::from("web"));
//! assert!(!out[0].1.contains_key("password"));
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod events;
pub mod observability;
mod transformer;

pub use config::{ErrorPolicy, KeyList, TransformConfig};
pub use events::{events_from_ndjson, events_from_path, events_to_ndjson, records_from_ndjson};
pub use observability::{
    CompositeObserver, FileObserver, TracingObserver, TransformContext, TransformObserver,
    TransformSeverity, TransformStats,
};
pub use transformer::{RecordTransformer, TransformOptions};
