//! Gateway error types and normalization to user-visible messages.

use thiserror::Error;

/// Errors crossing the command/response boundary.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Transport-level failure (IPC pipe broken, process gone, timeout).
    #[error("Transport error: {0}")]
    Transport(String),

    /// Structured error reported by the backend itself.
    #[error("{message}")]
    Backend {
        code: Option<String>,
        message: String,
        details: Option<String>,
    },

    /// Payload failed to serialize or deserialize.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The backend connection is closed.
    #[error("Connection closed")]
    Closed,
}

impl GatewayError {
    /// Shorthand for a structured backend error with only a message.
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            code: None,
            message: message.into(),
            details: None,
        }
    }

    /// Normalize this error to a single message string for UI-visible
    /// error fields. Structured backend errors surface their message
    /// (with details appended when present); everything else falls back
    /// to the `Display` rendering. Raw transport errors never reach the
    /// rendering layer unwrapped.
    pub fn user_message(&self) -> String {
        match self {
            Self::Backend {
                message,
                details: Some(details),
                ..
            } => format!("{}\n{}", message, details),
            Self::Backend { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }

    /// Whether this failure is plausibly transient and worth retrying.
    /// Backend-reported errors are authoritative and never retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

/// Result type alias using GatewayError.
pub type GatewayResult<T> = Result<T, GatewayError>;
