//! The placeholder expression language.
//!
//! Grammar (whitespace is allowed between tokens):
//!
//! ```text
//! expr    := primary ('[' index ']')*
//! primary := 'tag' | 'time' | 'record' | 'tag_parts' | 'hostname' | 'ENV' '[' string ']'
//!          | string | integer
//! index   := string | integer
//! ```
//!
//! Only `record` (and its nested values) accepts arbitrary index chains. `tag_parts` takes at most
//! one integer index; the other variables and literals cannot be indexed.

use std::borrow::Cow;
use std::fmt;
use std::sync::OnceLock;

use crate::error::EvalError;
use crate::types::{Record, Value};

use super::EvalContext;

/// Where an expression starts.
#[derive(Debug, Clone, PartialEq)]
pub enum Root {
    Tag,
    Time,
    Record,
    TagParts,
    Hostname,
    Env(String),
    Literal(Value),
}

/// One `[...]` accessor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Index {
    Key(String),
    Position(i64),
}

impl fmt::Display for Index {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(k) => write!(f, "{k:?}"),
            Self::Position(i) => write!(f, "{i}"),
        }
    }
}

/// A parsed placeholder expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    root: Root,
    path: Vec<Index>,
}

impl Expr {
    pub fn root(&self) -> &Root {
        &self.root
    }

    pub fn path(&self) -> &[Index] {
        &self.path
    }

    pub fn uses_tag_parts(&self) -> bool {
        self.root == Root::TagParts
    }

    /// Evaluate against one event.
    pub fn evaluate(&self, ctx: &EvalContext<'_>) -> Result<Value, EvalError> {
        match &self.root {
            Root::Tag => Ok(Value::from(ctx.tag)),
            Root::Time => Ok(Value::Int(ctx.time)),
            Root::Hostname => Ok(Value::from(hostname())),
            Root::Env(name) => Ok(std::env::var_os(name)
                .map(|v| Value::from(v.to_string_lossy().into_owned()))
                .unwrap_or(Value::Null)),
            Root::Literal(v) => Ok(v.clone()),
            Root::TagParts => {
                let parts = ctx.tag_parts.ok_or(EvalError::MissingBinding("tag_parts"))?;
                match self.path.first() {
                    None => Ok(Value::Array(parts.iter().map(|p| Value::from(*p)).collect())),
                    Some(Index::Position(i)) => resolve_position(*i, parts.len())
                        .map(|at| Value::from(parts[at]))
                        .ok_or(EvalError::IndexOutOfRange {
                            target: "tag_parts",
                            index: *i,
                            len: parts.len(),
                        }),
                    Some(Index::Key(k)) => Err(EvalError::NotIndexable {
                        target: "tag_parts",
                        index: format!("{k:?}"),
                    }),
                }
            }
            Root::Record => walk_record(ctx.record, &self.path).map(Cow::into_owned),
        }
    }
}

fn walk_record<'r>(record: &'r Record, path: &[Index]) -> Result<Cow<'r, Value>, EvalError> {
    let Some((first, rest)) = path.split_first() else {
        return Ok(Cow::Owned(Value::Map(record.clone())));
    };
    let mut current = match first {
        Index::Key(k) => record.get(k),
        Index::Position(i) => {
            return Err(EvalError::NotIndexable {
                target: "record",
                index: i.to_string(),
            });
        }
    };
    for index in rest {
        let Some(value) = current else {
            return Err(EvalError::NotIndexable {
                target: "null",
                index: index.to_string(),
            });
        };
        current = index_value(value, index)?;
    }
    Ok(current.map(Cow::Borrowed).unwrap_or(Cow::Owned(Value::Null)))
}

/// Apply one accessor to a record value. Missing keys and out-of-range positions yield `None`.
pub(crate) fn index_value<'v>(
    value: &'v Value,
    index: &Index,
) -> Result<Option<&'v Value>, EvalError> {
    match (value, index) {
        (Value::Map(map), Index::Key(k)) => Ok(map.get(k)),
        (Value::Array(items), Index::Position(i)) => {
            Ok(resolve_position(*i, items.len()).map(|at| &items[at]))
        }
        (other, index) => Err(EvalError::NotIndexable {
            target: other.type_name(),
            index: index.to_string(),
        }),
    }
}

/// Translate a possibly negative position into an offset, counting negatives from the end.
pub(crate) fn resolve_position(index: i64, len: usize) -> Option<usize> {
    let len = i64::try_from(len).ok()?;
    let at = if index < 0 { len + index } else { index };
    if (0..len).contains(&at) {
        usize::try_from(at).ok()
    } else {
        None
    }
}

fn hostname() -> &'static str {
    static HOSTNAME: OnceLock<String> = OnceLock::new();
    HOSTNAME.get_or_init(|| gethostname::gethostname().to_string_lossy().trim().to_string())
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Int(i64),
    LBracket,
    RBracket,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ident(s) => write!(f, "identifier '{s}'"),
            Self::Str(s) => write!(f, "string {s:?}"),
            Self::Int(i) => write!(f, "integer {i}"),
            Self::LBracket => f.write_str("'['"),
            Self::RBracket => f.write_str("']'"),
        }
    }
}

fn tokenize(src: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = src.char_indices().peekable();

    while let Some(&(start, c)) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '[' => {
                chars.next();
                tokens.push(Token::LBracket);
            }
            ']' => {
                chars.next();
                tokens.push(Token::RBracket);
            }
            '"' | '\'' => {
                chars.next();
                let mut out = String::new();
                let mut closed = false;
                while let Some((_, ch)) = chars.next() {
                    match ch {
                        '\\' => match chars.next() {
                            Some((_, esc)) => out.push(esc),
                            None => break,
                        },
                        ch if ch == c => {
                            closed = true;
                            break;
                        }
                        ch => out.push(ch),
                    }
                }
                if !closed {
                    return Err(format!("unterminated string literal at byte {start}"));
                }
                tokens.push(Token::Str(out));
            }
            '-' | '0'..='9' => {
                chars.next();
                let mut end = start + c.len_utf8();
                while let Some(&(i, d)) = chars.peek() {
                    if !d.is_ascii_digit() {
                        break;
                    }
                    end = i + d.len_utf8();
                    chars.next();
                }
                let literal = &src[start..end];
                let n = literal
                    .parse::<i64>()
                    .map_err(|_| format!("invalid integer literal '{literal}'"))?;
                tokens.push(Token::Int(n));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut end = start;
                while let Some(&(i, d)) = chars.peek() {
                    if !(d.is_ascii_alphanumeric() || d == '_') {
                        break;
                    }
                    end = i + d.len_utf8();
                    chars.next();
                }
                tokens.push(Token::Ident(src[start..end].to_string()));
            }
            other => return Err(format!("unexpected character '{other}' at byte {start}")),
        }
    }
    Ok(tokens)
}

/// Parse the content of one placeholder.
pub fn parse(src: &str) -> Result<Expr, String> {
    let mut tokens = tokenize(src)?.into_iter();

    let root = match tokens.next() {
        None => return Err("empty placeholder".to_string()),
        Some(Token::Ident(name)) => match name.as_str() {
            "tag" => Root::Tag,
            "time" => Root::Time,
            "record" => Root::Record,
            "tag_parts" => Root::TagParts,
            "hostname" => Root::Hostname,
            "ENV" => match parse_index(&mut tokens)? {
                Some(Index::Key(var)) => Root::Env(var),
                Some(Index::Position(_)) | None => {
                    return Err("ENV must be indexed by a string".to_string());
                }
            },
            other => return Err(format!("unknown variable '{other}'")),
        },
        Some(Token::Str(s)) => Root::Literal(Value::from(s)),
        Some(Token::Int(i)) => Root::Literal(Value::Int(i)),
        Some(other) => return Err(format!("unexpected {other}")),
    };

    let mut path = Vec::new();
    while let Some(index) = parse_index(&mut tokens)? {
        path.push(index);
    }

    match (&root, path.as_slice()) {
        (Root::Record, _) | (_, []) => {}
        (Root::TagParts, [Index::Position(_)]) => {}
        (Root::TagParts, _) => {
            return Err("tag_parts takes a single integer index".to_string());
        }
        _ => return Err("only record and tag_parts can be indexed".to_string()),
    }

    Ok(Expr { root, path })
}

fn parse_index(tokens: &mut impl Iterator<Item = Token>) -> Result<Option<Index>, String> {
    match tokens.next() {
        None => Ok(None),
        Some(Token::LBracket) => {
            let index = match tokens.next() {
                Some(Token::Str(s)) => Index::Key(s),
                Some(Token::Int(i)) => Index::Position(i),
                Some(other) => return Err(format!("unexpected {other} inside '[...]'")),
                None => return Err("unclosed '['".to_string()),
            };
            match tokens.next() {
                Some(Token::RBracket) => Ok(Some(index)),
                Some(other) => Err(format!("expected ']' but found {other}")),
                None => Err("unclosed '['".to_string()),
            }
        }
        Some(other) => Err(format!("unexpected {other} after expression")),
    }
}
