//! Secret types for protecting sensitive values from accidental logging.
//!
//! Re-exports the [`secrecy`] types used for the transport API key and the
//! per-participant session tokens. `SecretString` implements `Debug` with
//! redaction, so any struct deriving `Debug` around it stays safe to log
//! with `{:?}` or through `tracing` fields.
//!
//! Secrets are zeroized on drop.
//!
//! # Example
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! #[derive(Debug)]
//! struct TransportCredentials {
//!     user_id: String,
//!     token: SecretString,
//! }
//!
//! let creds = TransportCredentials {
//!     user_id: "student-1".to_string(),
//!     token: SecretString::from("eyJhbGciOi..."),
//! };
//!
//! // Safe: the token is redacted
//! println!("{:?}", creds);
//!
//! // The raw value is only reachable through expose_secret()
//! let raw: &str = creds.token.expose_secret();
//! ```
//!
//! Use `SecretString` for:
//! - The transport API key
//! - Session tokens returned by the token endpoint
//!
//! # Serde Integration
//!
//! ```rust
//! use serde::Deserialize;
//! use common::secret::SecretString;
//!
//! #[derive(Debug, Deserialize)]
//! struct TokenResponse {
//!     #[serde(rename = "userId")]
//!     user_id: String,
//!     token: SecretString,
//! }
//!
//! let json = r#"{"userId": "student-1", "token": "session-token"}"#;
//! let response: TokenResponse = serde_json::from_str(json).unwrap();
//! println!("{:?}", response);
//! ```

pub use secrecy::{ExposeSecret, SecretBox, SecretString};

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[test]
    fn test_debug_is_redacted() {
        let secret = SecretString::from("api-key-123");
        let debug_str = format!("{secret:?}");

        assert!(debug_str.contains("REDACTED"));
        assert!(!debug_str.contains("api-key-123"));
    }

    #[test]
    fn test_expose_secret_returns_inner_value() {
        let secret = SecretString::from("session-token");
        assert_eq!(secret.expose_secret(), "session-token");
    }

    #[test]
    fn test_struct_with_token_is_safe() {
        #[allow(dead_code)]
        #[derive(Debug)]
        struct Credentials {
            user_id: String,
            token: SecretString,
        }

        let creds = Credentials {
            user_id: "teacher-1".to_string(),
            token: SecretString::from("very-private-token"),
        };

        let debug_str = format!("{creds:?}");

        assert!(debug_str.contains("teacher-1"));
        assert!(debug_str.contains("REDACTED"));
        assert!(!debug_str.contains("very-private-token"));
    }

    #[test]
    fn test_deserialize() {
        #[allow(dead_code)]
        #[derive(Debug, Deserialize)]
        struct TokenResponse {
            #[serde(rename = "userId")]
            user_id: String,
            token: SecretString,
        }

        let json = r#"{"userId": "student-2", "token": "my-session-token"}"#;
        let response: TokenResponse = serde_json::from_str(json).expect("deserialize");

        assert_eq!(response.token.expose_secret(), "my-session-token");

        let debug = format!("{response:?}");
        assert!(!debug.contains("my-session-token"));
        assert!(debug.contains("REDACTED"));
    }
}
