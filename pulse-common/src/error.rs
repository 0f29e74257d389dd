//! Error types for the Pulse workspace.

use thiserror::Error;

/// Result type alias using the Pulse error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for Pulse analysis runs.
#[derive(Error, Debug)]
pub enum Error {
    /// An embedding or sentiment capability failed to load.
    ///
    /// Fatal: aborts the whole run.
    #[error("Capability initialization failed ({capability}): {reason}")]
    CapabilityInit { capability: String, reason: String },

    /// Scoring a single item failed. The item is dropped from local runs.
    #[error("Item {index} analysis failed: {reason}")]
    ItemAnalysis { index: usize, reason: String },

    /// Remote service signalled a rate limit
    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),

    /// Remote service quota or billing limit exhausted
    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    /// Remote response could not be parsed, even after repair
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input or request
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// External service error
    #[error("External service error: {0}")]
    External(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Timeout error
    #[error("Operation timed out")]
    Timeout,

    /// Other error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Create a capability initialization error.
    pub fn capability_init(capability: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::CapabilityInit {
            capability: capability.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a per-item analysis error.
    pub fn item(index: usize, reason: impl std::fmt::Display) -> Self {
        Self::ItemAnalysis {
            index,
            reason: reason.to_string(),
        }
    }

    /// Create an error with additional context.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Strip any context wrappers and return the underlying error.
    pub fn root(&self) -> &Error {
        match self {
            Self::WithContext { source, .. } => source.root(),
            other => other,
        }
    }

    /// Check if this error must abort the whole run.
    pub fn is_fatal(&self) -> bool {
        matches!(self.root(), Self::CapabilityInit { .. })
    }

    /// Check if this error must abort the remaining remote batches.
    pub fn is_abort(&self) -> bool {
        matches!(
            self.root(),
            Self::RateLimited(_) | Self::QuotaExceeded(_) | Self::Timeout
        )
    }

    /// Check if this is a rate limit error.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self.root(), Self::RateLimited(_))
    }

    /// Check if this is a quota error.
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self.root(), Self::QuotaExceeded(_))
    }

    /// Check if this is a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self.root(), Self::Timeout)
    }
}

/// Extension trait for adding context to any error type.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().with_context(context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(Error::capability_init("embedding", "missing weights").is_fatal());
        assert!(!Error::item(3, "boom").is_fatal());
        assert!(!Error::RateLimited("slow down".into()).is_fatal());
    }

    #[test]
    fn test_abort_classification() {
        assert!(Error::RateLimited("429".into()).is_abort());
        assert!(Error::QuotaExceeded("billing".into()).is_abort());
        assert!(Error::Timeout.is_abort());
        assert!(!Error::MalformedResponse("not json".into()).is_abort());
        assert!(!Error::External("HTTP 500".into()).is_abort());
    }

    #[test]
    fn test_context_preserves_kind() {
        let err = Error::QuotaExceeded("insufficient_quota".into()).with_context("batch 2");
        assert!(matches!(err, Error::WithContext { .. }));
        assert!(err.is_quota_exceeded());
        assert!(err.is_abort());
        assert!(!err.is_rate_limited());
    }

    #[test]
    fn test_result_ext_wraps_io() {
        let io: std::result::Result<(), std::io::Error> =
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        let err = io.context("reading input").unwrap_err();
        assert!(err.to_string().starts_with("reading input"));
        assert!(matches!(err.root(), Error::Io(_)));
    }
}
