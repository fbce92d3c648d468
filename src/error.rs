use thiserror::Error;

/// Convenience result type for transform operations.
pub type TransformResult<T> = Result<T, TransformError>;

/// Error type returned by configuration and transform functions.
///
/// Configuration problems are reported once, when a [`crate::transform::RecordTransformer`] is
/// built. Evaluation problems are reported per event.
#[derive(Debug, Error)]
pub enum TransformError {
    /// The configuration is invalid (malformed template, conflicting key policies, unknown charset,
    /// ...). A transformer is never built from an invalid configuration.
    #[error("config error: {message}")]
    Config { message: String },

    /// A field expression failed while processing one event.
    #[error("failed to evaluate field '{field}': {source}")]
    Evaluation {
        field: String,
        #[source]
        source: EvalError,
    },

    /// JSON input (config or events) could not be parsed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Underlying I/O error while reading config or event files.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Event input parsed as JSON but does not have the shape of an event.
    #[error("invalid event at line {line}: {message}")]
    InvalidRecord { line: usize, message: String },
}

impl TransformError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

/// Runtime failure of a single field expression.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    /// An integer index fell outside a sequence (e.g. `tag_parts[3]` on a two-segment tag).
    #[error("index {index} out of range for {target} of length {len}")]
    IndexOutOfRange {
        target: &'static str,
        index: i64,
        len: usize,
    },

    /// The expression referenced a variable the context does not provide.
    #[error("variable '{0}' is not bound")]
    MissingBinding(&'static str),

    /// An index was applied to a value that does not support it.
    #[error("cannot index {target} with {index}")]
    NotIndexable { target: &'static str, index: String },
}
