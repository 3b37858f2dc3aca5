//! Error taxonomy shared by the grid engine, the stores and the demo workflows.

/// Errors surfaced by cache stores and the operations built on them.
#[derive(Debug, thiserror::Error)]
pub enum GridError {
    /// Malformed or out-of-range user input.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The symbol is not a key of the Price cache.
    #[error("unable to find symbol {symbol}, valid values are {valid:?}")]
    UnknownSymbol { symbol: String, valid: Vec<String> },

    /// A bulk or keyed invocation failed part way. Entries already applied
    /// stay applied.
    #[error("mutation of {cache} failed after {applied} entries: {reason}")]
    MutationFailed {
        cache: String,
        applied: usize,
        reason: String,
    },

    /// A processor could not be applied to one entry.
    #[error("processor failed for key {key}: {reason}")]
    EntryFailed { key: String, reason: String },

    /// A change event that does not carry what its kind requires.
    #[error("malformed event: {0}")]
    MalformedEvent(String),

    #[error("transport error: {0}")]
    Transport(#[from] tonic::Status),

    #[error("connection error: {0}")]
    Connect(#[from] tonic::transport::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("session is closed")]
    SessionClosed,
}

impl GridError {
    /// Wrap a per-entry failure observed while draining an invocation.
    pub(crate) fn into_mutation_failure(self, cache: &str, applied: usize) -> Self {
        match self {
            GridError::EntryFailed { key, reason } => GridError::MutationFailed {
                cache: cache.to_string(),
                applied,
                reason: format!("{key}: {reason}"),
            },
            other => other,
        }
    }
}
