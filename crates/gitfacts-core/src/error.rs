/// Unified error type for gitfacts.
#[derive(Debug, thiserror::Error)]
pub enum GitfactsError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Wrong object kind: {0}")]
    WrongKind(String),

    #[error("scanner {scanner:?} failed on {file:?}: {source}")]
    Scanner {
        scanner: String,
        file: String,
        #[source]
        source: Box<GitfactsError>,
    },

    #[error("query cancelled")]
    Cancelled,

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Git error: {0}")]
    Git(String),

    #[error("Registry error: {0}")]
    Registry(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl GitfactsError {
    /// Attribute a failure to the scanner and file that produced it.
    ///
    /// Cancellation passes through untouched so callers can still tell it
    /// apart from a genuine scanner failure.
    pub fn in_scanner(self, scanner: &str, file: &str) -> Self {
        match self {
            GitfactsError::Cancelled => GitfactsError::Cancelled,
            other => GitfactsError::Scanner {
                scanner: scanner.to_string(),
                file: file.to_string(),
                source: Box::new(other),
            },
        }
    }

    /// True when this error (or the error it wraps) is a cancellation.
    pub fn is_cancelled(&self) -> bool {
        match self {
            GitfactsError::Cancelled => true,
            GitfactsError::Scanner { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }
}
