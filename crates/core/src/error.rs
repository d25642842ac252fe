//! Error types for the runbox domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all runbox operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError {
        status_code: u16,
        message: String,
    },

    #[error("Provider server error: {message} (status: {status_code})")]
    ServerError {
        status_code: u16,
        message: String,
    },

    #[error("Rate limited by provider{}", .retry_after_secs.map(|s| format!(", retry after {s}s")).unwrap_or_default())]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

impl ProviderError {
    /// Map a non-success HTTP status and its body onto the error taxonomy.
    pub fn from_http_status(status: u16, body: &str, retry_after_secs: Option<u64>) -> Self {
        match status {
            401 | 403 => Self::AuthenticationFailed(body.to_string()),
            404 => Self::ModelNotFound(body.to_string()),
            408 => Self::Timeout(body.to_string()),
            429 => Self::RateLimited { retry_after_secs },
            400 | 413 | 422 => Self::InvalidRequest(body.to_string()),
            500..=599 => Self::ServerError {
                status_code: status,
                message: body.to_string(),
            },
            _ => Self::ApiError {
                status_code: status,
                message: body.to_string(),
            },
        }
    }

    /// Whether retrying the same request might succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::ServerError { .. } | Self::Timeout(_) | Self::Network(_)
        )
    }
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Tool timed out: {tool_name} after {timeout_secs}s")]
    Timeout { tool_name: String, timeout_secs: u64 },

    #[error("Permission denied: {tool_name}: {reason}")]
    PermissionDenied { tool_name: String, reason: String },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),
}

impl ToolError {
    /// Stable numeric code carried on failed tool results.
    pub fn code(&self) -> i32 {
        match self {
            Self::ExecutionFailed { .. } => 1,
            Self::NotFound(_) => 2,
            Self::InvalidArguments(_) => 3,
            Self::Timeout { .. } => 4,
            Self::PermissionDenied { .. } => 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_displays_correctly() {
        let err = Error::Provider(ProviderError::ApiError {
            status_code: 418,
            message: "I'm a teapot".into(),
        });
        assert!(err.to_string().contains("418"));
        assert!(err.to_string().contains("teapot"));
    }

    #[test]
    fn status_mapping_separates_transient_from_fatal() {
        assert!(ProviderError::from_http_status(429, "", Some(3)).is_transient());
        assert!(ProviderError::from_http_status(503, "busy", None).is_transient());
        assert!(!ProviderError::from_http_status(401, "bad key", None).is_transient());
        assert!(!ProviderError::from_http_status(400, "bad body", None).is_transient());
        assert!(matches!(
            ProviderError::from_http_status(404, "no such model", None),
            ProviderError::ModelNotFound(_)
        ));
    }

    #[test]
    fn rate_limit_message_mentions_delay() {
        let err = ProviderError::RateLimited { retry_after_secs: Some(7) };
        assert!(err.to_string().contains("7s"));
        let err = ProviderError::RateLimited { retry_after_secs: None };
        assert_eq!(err.to_string(), "Rate limited by provider");
    }

    #[test]
    fn tool_error_codes_are_distinct() {
        let codes = [
            ToolError::NotFound("x".into()).code(),
            ToolError::ExecutionFailed { tool_name: "x".into(), reason: "y".into() }.code(),
            ToolError::InvalidArguments("x".into()).code(),
            ToolError::Timeout { tool_name: "x".into(), timeout_secs: 1 }.code(),
            ToolError::PermissionDenied { tool_name: "x".into(), reason: "y".into() }.code(),
        ];
        let mut sorted = codes.to_vec();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted.len(), codes.len());
    }
}
