//! Field templates: compile once at configuration time, evaluate per event.
//!
//! A configured field value is compiled into a [`FieldPlan`]:
//!
//! - no `${...}` placeholder: [`FieldPlan::Literal`], the raw string itself
//! - exactly one placeholder spanning the whole string: [`FieldPlan::RawExpression`]; the
//!   expression result is used as-is, so `${record["nested"]}` copies a map without stringifying it
//! - anything else: [`FieldPlan::Template`], literal text concatenated with the rendered value of
//!   each placeholder
//!
//! Placeholders resolve against a fixed variable set: `tag`, `time`, `record[...]`,
//! `tag_parts[N]`, `hostname` and `ENV["NAME"]` (see [`expr`]).
//!
//! ```rust
//! use record_modifier::template::{EvalContext, FieldExpander};
//! use record_modifier::types::{Record, Value};
//!
//! let expander = FieldExpander::new("tag_wrap", "-${tag_parts[0]}-${tag_parts[1]}-").unwrap();
//! let record = Record::new();
//! let parts = ["test", "tag"];
//! let ctx = EvalContext::new("test.tag", 0, &record).with_tag_parts(&parts);
//! assert_eq!(expander.evaluate(&ctx).unwrap(), Value::from("-test-tag-"));
//! ```

pub mod expr;
mod lexer;

use tracing::{debug, trace};

use crate::error::{EvalError, TransformError, TransformResult};
use crate::types::{Charset, Record, Text, Value};

pub use expr::{Expr, Index, Root};

use lexer::Span;

/// One piece of a [`FieldPlan::Template`].
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Literal(String),
    Expr(Expr),
}

/// Compiled, immutable representation of one field's value template.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldPlan {
    /// Constant value.
    Literal(Value),
    /// Literal text and placeholders, rendered to a string.
    Template(Vec<Segment>),
    /// A single whole-string placeholder whose value is passed through untouched.
    RawExpression(Expr),
}

impl FieldPlan {
    /// Whether any placeholder refers to `tag_parts`.
    pub fn uses_tag_parts(&self) -> bool {
        match self {
            Self::Literal(_) => false,
            Self::Template(segments) => segments
                .iter()
                .any(|s| matches!(s, Segment::Expr(e) if e.uses_tag_parts())),
            Self::RawExpression(e) => e.uses_tag_parts(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Literal(_) => "literal",
            Self::Template(_) => "template",
            Self::RawExpression(_) => "raw_expression",
        }
    }

    /// Evaluate the plan against one event.
    pub fn evaluate(&self, ctx: &EvalContext<'_>) -> Result<Value, EvalError> {
        match self {
            Self::Literal(v) => Ok(v.clone()),
            Self::RawExpression(e) => e.evaluate(ctx),
            Self::Template(segments) => render(segments, ctx).map(Value::Str),
        }
    }
}

/// Concatenate rendered segments as raw bytes.
///
/// String values are spliced in unchanged, so bytes in a legacy encoding survive until the
/// encoding step converts them. The result is tagged UTF-8 unless a segment carries non-ASCII
/// bytes in another charset: a single such charset is kept, a mix of charsets becomes binary.
fn render(segments: &[Segment], ctx: &EvalContext<'_>) -> Result<Text, EvalError> {
    let mut bytes = Vec::new();
    let mut charset = None;
    for segment in segments {
        match segment {
            Segment::Literal(text) => {
                bytes.extend_from_slice(text.as_bytes());
                charset = merge_charset(charset, text.as_bytes(), Charset::utf8());
            }
            Segment::Expr(e) => match e.evaluate(ctx)? {
                Value::Str(text) => {
                    bytes.extend_from_slice(text.as_bytes());
                    charset = merge_charset(charset, text.as_bytes(), text.charset());
                }
                other => {
                    let rendered = other.to_string();
                    bytes.extend_from_slice(rendered.as_bytes());
                    charset = merge_charset(charset, rendered.as_bytes(), Charset::utf8());
                }
            },
        }
    }
    Ok(Text::new(bytes, charset.unwrap_or_else(Charset::utf8)))
}

fn merge_charset(current: Option<Charset>, part: &[u8], part_charset: Charset) -> Option<Charset> {
    if part.is_ascii() {
        return current;
    }
    match current {
        None => Some(part_charset),
        Some(c) if c == part_charset => Some(c),
        Some(_) => Some(Charset::Binary),
    }
}

/// Parse `raw` into a [`FieldPlan`].
///
/// `key` is only used for error messages.
pub fn compile(key: &str, raw: &str) -> TransformResult<FieldPlan> {
    let spans = lexer::split(raw).map_err(|message| invalid_template(key, raw, &message))?;

    let parse = |content: &str, offset: usize| {
        expr::parse(content).map_err(|message| {
            invalid_template(key, raw, &format!("{message} (placeholder at byte {offset})"))
        })
    };

    match spans.as_slice() {
        [] => Ok(FieldPlan::Literal(Value::from(raw))),
        [Span::Placeholder { content, offset }] => {
            Ok(FieldPlan::RawExpression(parse(content, *offset)?))
        }
        spans if spans.iter().all(|s| matches!(s, Span::Text(_))) => {
            Ok(FieldPlan::Literal(Value::from(raw)))
        }
        spans => {
            let mut segments = Vec::with_capacity(spans.len());
            for span in spans {
                segments.push(match span {
                    Span::Text(text) => Segment::Literal((*text).to_string()),
                    Span::Placeholder { content, offset } => {
                        Segment::Expr(parse(content, *offset)?)
                    }
                });
            }
            Ok(FieldPlan::Template(segments))
        }
    }
}

fn invalid_template(key: &str, raw: &str, message: &str) -> TransformError {
    TransformError::config(format!(
        "invalid template for field '{key}' (value = {raw:?}): {message}"
    ))
}

/// Per-event evaluation context.
#[derive(Debug, Clone, Copy)]
pub struct EvalContext<'a> {
    pub tag: &'a str,
    pub time: i64,
    /// The record as it stands so far, including fields written earlier in the same pass.
    pub record: &'a Record,
    /// `tag` split on `.`; only computed when some plan needs it.
    pub tag_parts: Option<&'a [&'a str]>,
}

impl<'a> EvalContext<'a> {
    pub fn new(tag: &'a str, time: i64, record: &'a Record) -> Self {
        Self {
            tag,
            time,
            record,
            tag_parts: None,
        }
    }

    pub fn with_tag_parts(mut self, parts: &'a [&'a str]) -> Self {
        self.tag_parts = Some(parts);
        self
    }
}

/// A configured output field: its key plus the compiled plan producing its value.
#[derive(Debug, Clone)]
pub struct FieldExpander {
    key: String,
    plan: FieldPlan,
}

impl FieldExpander {
    /// Compile `raw` for field `key`.
    ///
    /// The plan is dry-run once against an empty context. Only syntax errors are reported;
    /// evaluation errors during the dry run (e.g. unbound `tag_parts`) are ignored.
    pub fn new(key: impl Into<String>, raw: &str) -> TransformResult<Self> {
        let key = key.into();
        let plan = compile(&key, raw)?;

        let empty = Record::new();
        if let Err(err) = plan.evaluate(&EvalContext::new("", 0, &empty)) {
            trace!(field = %key, error = %err, "dry run evaluation failed; ignored");
        }

        debug!(field = %key, kind = plan.kind(), "compiled field template");
        Ok(Self { key, plan })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn plan(&self) -> &FieldPlan {
        &self.plan
    }

    /// Evaluate the plan. Writing the value into the record is the caller's job.
    pub fn evaluate(&self, ctx: &EvalContext<'_>) -> Result<Value, EvalError> {
        self.plan.evaluate(ctx)
    }
}
