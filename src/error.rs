use thiserror::Error;

pub type Result<T> = std::result::Result<T, LookupError>;

/// Failures surfaced by the lookup pipeline and its collaborators.
///
/// Only `NotFound` is terminal for a request; transport failures are
/// consumed by the cascade as "try the next step".
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LookupError {
    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out")]
    Timeout,

    #[error("no definition found for {word:?}")]
    NotFound { word: String },

    #[error("malformed document: {0}")]
    MalformedDocument(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl LookupError {
    pub fn not_found(word: impl Into<String>) -> Self {
        Self::NotFound { word: word.into() }
    }

    /// Network and timeout failures; the cascade moves on after these.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Timeout)
    }

    /// Short inline message for the overlay.
    pub fn user_message(&self) -> String {
        match self {
            Self::NotFound { .. } => "Definition not found".to_string(),
            other => format!("Error: {other}"),
        }
    }
}

impl From<reqwest::Error> for LookupError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Network(err.to_string())
        }
    }
}

impl From<tokio::time::error::Elapsed> for LookupError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        Self::Timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(LookupError::Timeout.is_transient());
        assert!(LookupError::Network("reset".into()).is_transient());
        assert!(!LookupError::not_found("x").is_transient());
        assert!(!LookupError::MalformedDocument("no parse".into()).is_transient());
    }

    #[test]
    fn user_messages() {
        assert_eq!(
            LookupError::not_found("dom").user_message(),
            "Definition not found"
        );
        assert_eq!(
            LookupError::Timeout.user_message(),
            "Error: request timed out"
        );
    }
}
