//! Error types for Quill.

use thiserror::Error;

/// Primary error type for all Quill operations.
///
/// Note that the coordinator's public entry point never surfaces these to
/// its caller; they are folded into an error-content `AIResponse` there.
#[derive(Error, Debug)]
pub enum QuillError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Tool execution error in {tool_name}: {message}")]
    ToolExecution { tool_name: String, message: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

/// Broad error category for routing remediation hints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Authentication,
    RateLimit,
    Network,
    Server,
    Api,
    Configuration,
    Serialization,
    ToolExecution,
    State,
    Unknown,
}

impl QuillError {
    /// Create an API error from a status code and body.
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Authentication(_) => ErrorCategory::Authentication,
            Self::Network(_) => ErrorCategory::Network,
            Self::Configuration(_) => ErrorCategory::Configuration,
            Self::Serialization(_) => ErrorCategory::Serialization,
            Self::Api { status, .. } => match status {
                401 | 403 => ErrorCategory::Authentication,
                429 => ErrorCategory::RateLimit,
                500..=599 => ErrorCategory::Server,
                _ => ErrorCategory::Api,
            },
            Self::ToolExecution { .. } => ErrorCategory::ToolExecution,
            Self::InvalidState(_) => ErrorCategory::State,
            Self::Stream(_) => ErrorCategory::Network,
            _ => ErrorCategory::Unknown,
        }
    }

    /// Short remediation hint rendered into error responses.
    pub fn remediation_hint(&self) -> &'static str {
        match self.category() {
            ErrorCategory::Authentication => "Check the API key for this provider.",
            ErrorCategory::RateLimit => "The provider is rate limiting; wait and retry.",
            ErrorCategory::Network => "Check your network connection and the base URL.",
            ErrorCategory::Server => "The provider reported a server error; retry later.",
            ErrorCategory::Configuration => {
                "Check AI_MODEL / API_PROVIDER / API_BASE_URL settings."
            }
            ErrorCategory::Serialization => "The provider returned an unexpected payload shape.",
            ErrorCategory::ToolExecution => "A tool failed; inspect its arguments and output.",
            _ => "Retry the request; report the error if it persists.",
        }
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, QuillError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_status_maps_to_category() {
        assert_eq!(
            QuillError::api(401, "bad key").category(),
            ErrorCategory::Authentication
        );
        assert_eq!(
            QuillError::api(429, "slow down").category(),
            ErrorCategory::RateLimit
        );
        assert_eq!(
            QuillError::api(503, "down").category(),
            ErrorCategory::Server
        );
        assert_eq!(QuillError::api(404, "gone").category(), ErrorCategory::Api);
    }

    #[test]
    fn every_category_has_a_hint() {
        let errors = [
            QuillError::Authentication("x".into()),
            QuillError::Configuration("x".into()),
            QuillError::Stream("x".into()),
            QuillError::ToolExecution {
                tool_name: "Write".into(),
                message: "x".into(),
            },
        ];
        for err in errors {
            assert!(!err.remediation_hint().is_empty());
        }
    }
}
