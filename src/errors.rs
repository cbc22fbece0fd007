/// Errors a search request can surface to a caller. Everything here maps
/// to a stable machine-readable kind at the RPC boundary; anything else
/// is sanitized into an internal error before leaving the process.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("{0}")]
    Validation(String),

    #[error("scoring mode '{mode}' is not available (available: {})", available.join(", "))]
    UnsupportedMode {
        mode: String,
        available: Vec<String>,
    },

    #[error("internal error: {0}")]
    Internal(String),
}

impl SearchError {
    /// Stable kind string carried in the RPC error payload
    pub fn kind(&self) -> &'static str {
        match self {
            SearchError::Validation(_) => "validation",
            SearchError::UnsupportedMode { .. } => "unsupported_mode",
            SearchError::Internal(_) => "internal",
        }
    }
}
