//! Error types for Conductor
//!
//! This module defines all error types used throughout the runtime.
//! Uses `thiserror` for ergonomic error handling with automatic `Display` and
//! `Error` trait implementations.
//!
//! Tool validation and tool execution failures never escape the executor as
//! `Err`; they are folded into a [`ToolResult`](crate::tools::ToolResult).
//! Protocol, loop and coordination failures surface as the variants below.

use std::fmt;
use thiserror::Error;

// ============================================================================
// Provider Error Classification
// ============================================================================

/// Structured completion-provider error classification.
///
/// Lets the retry layer decide whether a failure is worth another attempt
/// without string matching.
#[derive(Debug)]
pub enum ProviderError {
    /// 401 - Invalid credential
    Auth(String),
    /// 429 - Rate limit or quota exceeded
    RateLimit(String),
    /// 500/502/503/504 - Server-side errors
    ServerError(String),
    /// 400 - Bad request
    InvalidRequest(String),
    /// Connection or read timeout
    Timeout(String),
    /// Catch-all for unrecognized errors
    Unknown(String),
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderError::Auth(msg) => write!(f, "Authentication error: {}", msg),
            ProviderError::RateLimit(msg) => write!(f, "Rate limit error: {}", msg),
            ProviderError::ServerError(msg) => write!(f, "Server error: {}", msg),
            ProviderError::InvalidRequest(msg) => write!(f, "Invalid request: {}", msg),
            ProviderError::Timeout(msg) => write!(f, "Timeout: {}", msg),
            ProviderError::Unknown(msg) => write!(f, "Unknown provider error: {}", msg),
        }
    }
}

impl ProviderError {
    /// Classify an HTTP status code returned by a provider.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            401 | 403 => ProviderError::Auth(message),
            429 => ProviderError::RateLimit(message),
            400 => ProviderError::InvalidRequest(message),
            500 | 502 | 503 | 504 => ProviderError::ServerError(message),
            _ => ProviderError::Unknown(message),
        }
    }

    /// Returns `true` if this error is transient and the request should be retried.
    ///
    /// Retryable errors: RateLimit, ServerError, Timeout.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::RateLimit(_) | ProviderError::ServerError(_) | ProviderError::Timeout(_)
        )
    }

    /// Returns the HTTP status code associated with this error, if applicable.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ProviderError::Auth(_) => Some(401),
            ProviderError::RateLimit(_) => Some(429),
            ProviderError::ServerError(_) => Some(500),
            ProviderError::InvalidRequest(_) => Some(400),
            ProviderError::Timeout(_) => None,
            ProviderError::Unknown(_) => None,
        }
    }
}

impl From<ProviderError> for ConductorError {
    fn from(err: ProviderError) -> Self {
        ConductorError::ProviderTyped(err)
    }
}

// ============================================================================
// Primary Error Type
// ============================================================================

/// The primary error type for Conductor operations.
#[derive(Error, Debug)]
pub enum ConductorError {
    /// Configuration-related errors (invalid config, missing required fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Untyped provider failures.
    #[error("Provider error: {0}")]
    Provider(String),

    /// Structured provider error with classification for retry decisions.
    #[error("Provider error: {0}")]
    ProviderTyped(ProviderError),

    /// A provider payload that could not be interpreted.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Generic tool failure raised by a tool body.
    #[error("Tool error: {0}")]
    Tool(String),

    /// A tool with this name is already registered.
    #[error("Tool already registered: {0}")]
    DuplicateTool(String),

    /// A field listed as required by the input schema is absent.
    #[error("Missing required field: {0}")]
    MissingField(String),

    /// The input carries a field the schema does not allow.
    #[error("Unexpected field: {0}")]
    UnexpectedField(String),

    /// MCP transport and handshake failures.
    #[error("MCP error: {0}")]
    Mcp(String),

    /// A remote server answered a tool call with an error envelope.
    #[error("Remote tool error: {0}")]
    RemoteTool(String),

    /// A pending request, API call, tool batch or session ran out of time.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// The reasoning loop hit its turn limit without a final answer.
    #[error("Max turns reached ({0})")]
    MaxTurnsReached(usize),

    /// The token or cost budget for a session was exhausted.
    #[error("Budget exceeded: {0}")]
    BudgetExceeded(String),

    /// Tasks whose dependencies can never be satisfied.
    #[error("Dependency cycle or missing dependency among tasks: {}", .0.join(", "))]
    DependencyCycle(Vec<String>),

    /// A task batch that cannot be scheduled (e.g. duplicate task names).
    #[error("Invalid task: {0}")]
    InvalidTask(String),

    /// A task in a parallel batch finished with an error.
    #[error("Task '{task}' failed: {message}")]
    TaskFailed { task: String, message: String },

    /// Session management errors (invalid state, persistence failures, etc.)
    #[error("Session error: {0}")]
    Session(String),

    /// Resource not found (agents, sessions, servers, etc.)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Standard I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// A specialized `Result` type for Conductor operations.
pub type Result<T> = std::result::Result<T, ConductorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ConductorError::Config("missing API key".to_string());
        assert_eq!(err.to_string(), "Configuration error: missing API key");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: ConductorError = io_err.into();
        assert!(matches!(err, ConductorError::Io(_)));
    }

    #[test]
    fn test_dependency_cycle_display() {
        let err = ConductorError::DependencyCycle(vec!["a".into(), "b".into()]);
        assert_eq!(
            err.to_string(),
            "Dependency cycle or missing dependency among tasks: a, b"
        );
    }

    #[test]
    fn test_task_failed_display() {
        let err = ConductorError::TaskFailed {
            task: "lint".into(),
            message: "boom".into(),
        };
        assert_eq!(err.to_string(), "Task 'lint' failed: boom");
    }

    #[test]
    fn test_validation_error_display() {
        assert_eq!(
            ConductorError::MissingField("path".into()).to_string(),
            "Missing required field: path"
        );
        assert_eq!(
            ConductorError::UnexpectedField("mode".into()).to_string(),
            "Unexpected field: mode"
        );
    }

    #[test]
    fn test_provider_error_classification() {
        assert!(ProviderError::from_status(429, "slow down").is_retryable());
        assert!(ProviderError::from_status(503, "down").is_retryable());
        assert!(!ProviderError::from_status(401, "bad key").is_retryable());
        assert!(!ProviderError::from_status(400, "bad").is_retryable());
        assert_eq!(ProviderError::RateLimit("x".into()).status_code(), Some(429));
        assert_eq!(ProviderError::Timeout("x".into()).status_code(), None);
    }

    #[test]
    fn test_provider_typed_from() {
        let err: ConductorError = ProviderError::ServerError("oops".into()).into();
        assert_eq!(err.to_string(), "Provider error: Server error: oops");
    }
}
