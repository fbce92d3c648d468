//! Splits a raw template into literal text and `${...}` placeholder spans.

/// A piece of a raw template string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Span<'a> {
    /// Literal text copied to the output unchanged.
    Text(&'a str),
    /// The content between `${` and the matching `}`; `offset` is the byte offset of `${`.
    Placeholder { content: &'a str, offset: usize },
}

const OPEN: &str = "${";

/// Tokenize `raw` into alternating text and placeholder spans.
///
/// A closing `}` inside a quoted string literal does not terminate the placeholder. Returns an
/// error message when a placeholder is never closed.
pub(crate) fn split(raw: &str) -> Result<Vec<Span<'_>>, String> {
    let mut spans = Vec::new();
    let mut cursor = 0usize;

    while let Some(found) = raw[cursor..].find(OPEN) {
        let open = cursor + found;
        if open > cursor {
            spans.push(Span::Text(&raw[cursor..open]));
        }
        let content_start = open + OPEN.len();
        let close = find_close(raw.as_bytes(), content_start)
            .ok_or_else(|| format!("unclosed placeholder starting at byte {open}"))?;
        spans.push(Span::Placeholder {
            content: &raw[content_start..close],
            offset: open,
        });
        cursor = close + 1;
    }

    if cursor < raw.len() {
        spans.push(Span::Text(&raw[cursor..]));
    }
    Ok(spans)
}

fn find_close(bytes: &[u8], start: usize) -> Option<usize> {
    let mut quote: Option<u8> = None;
    let mut escaped = false;
    for (i, &b) in bytes.iter().enumerate().skip(start) {
        match quote {
            Some(q) => {
                if escaped {
                    escaped = false;
                } else if b == b'\\' {
                    escaped = true;
                } else if b == q {
                    quote = None;
                }
            }
            None => match b {
                b'"' | b'\'' => quote = Some(b),
                b'}' => return Some(i),
                _ => {}
            },
        }
    }
    None
}
