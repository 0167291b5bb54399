//! Classroom session error types.
//!
//! Every fallible public operation returns [`SessionError`]. Internal details
//! are logged but never surfaced through [`SessionError::client_message`].

use common::token_issuer::TokenError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Coarse error category, carried by `SessionPhase::Errored`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Missing or invalid identity/key material. Fatal, no retry.
    Config,
    /// Token request rejected. Retryable after re-authentication.
    Auth,
    /// Operation conflicts with current state. Transient, user-correctable.
    Busy,
    /// Transport call failed. Retryable by explicit user action.
    Transport,
    /// Bug or lost actor. Not retryable.
    Internal,
}

impl ErrorKind {
    /// Bounded label for logs and metrics.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Config => "config",
            ErrorKind::Auth => "auth",
            ErrorKind::Busy => "busy",
            ErrorKind::Transport => "transport",
            ErrorKind::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classroom session error type.
///
/// Maps to client error codes:
/// - `Config`: `CONFIG_ERROR` (1)
/// - `Auth`: `UNAUTHORIZED` (2)
/// - `Busy`: `CONFLICT` (5)
/// - `Internal`: `INTERNAL_ERROR` (6)
/// - `Transport`: `UNAVAILABLE` (8)
#[derive(Debug, Clone, Error)]
pub enum SessionError {
    /// Identity or key material is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The token issuer refused the participant.
    #[error("Authentication error: {0}")]
    Auth(String),

    /// The operation conflicts with the session's current state.
    #[error("Busy: {0}")]
    Busy(String),

    /// A transport call failed.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Internal error with context.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SessionError {
    /// Category of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            SessionError::Config(_) => ErrorKind::Config,
            SessionError::Auth(_) => ErrorKind::Auth,
            SessionError::Busy(_) => ErrorKind::Busy,
            SessionError::Transport(_) => ErrorKind::Transport,
            SessionError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Returns the client error code for this error.
    #[must_use]
    pub fn error_code(&self) -> i32 {
        match self {
            SessionError::Config(_) => 1,    // CONFIG_ERROR
            SessionError::Auth(_) => 2,      // UNAUTHORIZED
            SessionError::Busy(_) => 5,      // CONFLICT
            SessionError::Internal(_) => 6,  // INTERNAL_ERROR
            SessionError::Transport(_) => 8, // UNAVAILABLE
        }
    }

    /// Whether the caller may retry.
    ///
    /// `Auth` needs re-authentication first, `Busy` needs the conflicting
    /// state to clear and `Transport` needs an explicit user action. There is
    /// no automatic backoff.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SessionError::Auth(_) | SessionError::Busy(_) | SessionError::Transport(_)
        )
    }

    /// Returns a client-safe error message (no internal details).
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            SessionError::Config(_) => "The classroom is not configured correctly".to_string(),
            SessionError::Auth(_) => "Please sign in again to join the classroom".to_string(),
            SessionError::Busy(msg) => msg.clone(),
            SessionError::Transport(_) => {
                "Could not reach the classroom service, please try again".to_string()
            }
            SessionError::Internal(_) => "An internal error occurred".to_string(),
        }
    }
}

impl From<TokenError> for SessionError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::AuthenticationRejected(msg) => SessionError::Auth(msg),
            TokenError::Configuration(msg) => SessionError::Config(msg),
            TokenError::HttpError(msg) | TokenError::InvalidResponse(msg) => {
                SessionError::Transport(msg)
            }
        }
    }
}
