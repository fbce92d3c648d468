//! `record-modifier` rewrites tagged log events one record at a time: it adds computed fields,
//! removes or whitelists keys, and normalizes the character encoding of every string value.
//!
//! The primary entrypoint is [`transform::RecordTransformer`], built once from a
//! [`transform::TransformConfig`] and then applied to `(time, record)` events sharing a tag.
//!
//! ## Pipeline
//!
//! For every event, in order:
//!
//! 1. optional `tag_key` / `time_key` injection
//! 2. field expansion in declaration order; later fields can read earlier ones via `record[...]`
//! 3. key reduction ([`processing::KeyPolicy`]: remove listed fields, or keep a whitelist)
//! 4. character-encoding normalization ([`processing::EncodingSpec`])
//!
//! The event's timestamp is passed through unchanged.
//!
//! ## Field templates
//!
//! Field values are strings with `${...}` placeholders over a fixed variable set:
//!
//! - `tag`, `time`, `hostname`
//! - `tag_parts[N]`: the tag split on `.` (negative `N` counts from the end)
//! - `record["key"]["nested"][0]`: the record as it stands so far
//! - `ENV["NAME"]`: an environment variable, or null
//!
//! A value that is exactly one placeholder keeps the expression's type (maps, arrays, numbers);
//! anything else renders to a string. See [`template`].
//!
//! ## Quick example
//!
//! ```rust
//! use record_modifier::transform::{RecordTransformer, TransformConfig};
//! use record_modifier::types::{Record, Value};
//!
//! # fn main() -> Result<(), record_modifier::TransformError> {
//! let config = TransformConfig::default()
//!     .with_field("included_tag", "${tag}")
//!     .with_field("service", "${tag_parts[-1]}")
//!     .with_whitelist_keys("message,included_tag,service");
//! let transformer = RecordTransformer::new(&config)?;
//!
//! let mut record = Record::new();
//! record.insert("message".to_string(), Value::from("hello"));
//! record.insert("secret".to_string(), Value::from("hunter2"));
//!
//! let out = transformer.transform("app.web", 1_700_000_000, record)?;
//! assert_eq!(
//!     out.keys().map(String::as_str).collect::<Vec<_>>(),
//!     ["message", "included_tag", "service"]
//! );
//! assert_eq!(out["service"], Value::from("web"));
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`transform`]: configuration, the transformer, JSON event I/O and observers
//! - [`template`]: template compilation and evaluation
//! - [`processing`]: key reduction, encoding normalization and time rendering
//! - [`execution`]: parallel batch execution with throttling and metrics
//! - [`types`]: record, value and charset-tagged text types
//! - [`error`]: error types

pub mod error;
pub mod execution;
pub mod processing;
pub mod template;
pub mod transform;
pub mod types;

pub use error::{EvalError, TransformError, TransformResult};
pub use transform::{RecordTransformer, TransformConfig};
