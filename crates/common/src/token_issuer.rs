//! Session token issuance over HTTP.
//!
//! Exchanges a participant identity for a transport session token by calling
//! the application's token endpoint:
//!
//! ```text
//! POST {endpoint}/api/stream/token
//! {"userId": "<participant id>"}
//!
//! 200 {"token": "...", "userId": "...", "apiKey": "..."}
//! 401 when the caller has no authenticated session
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use common::token_issuer::{HttpTokenIssuer, TokenIssuerConfig};
//! use common::types::ParticipantId;
//!
//! let issuer = HttpTokenIssuer::new(TokenIssuerConfig::new("https://app.example".into()))?;
//! let issued = issuer.issue_token(&ParticipantId::from("student-1")).await?;
//! ```
//!
//! # Security
//!
//! - Tokens and API keys are held as `SecretString` and never logged
//! - Response bodies of rejected requests are only logged at trace level
//! - HTTP timeouts prevent hanging connections

use crate::secret::{ExposeSecret, SecretString};
use crate::types::ParticipantId;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument, trace, warn};

/// Default HTTP request timeout.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Default connection timeout for the HTTP client.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Path of the token endpoint relative to the configured base URL.
pub const TOKEN_PATH: &str = "/api/stream/token";

/// Errors that can occur while issuing a session token.
#[derive(Error, Debug, Clone)]
pub enum TokenError {
    /// HTTP client error or unexpected status.
    #[error("HTTP client error: {0}")]
    HttpError(String),

    /// The endpoint refused to issue a token (401, 403).
    #[error("Authentication rejected: {0}")]
    AuthenticationRejected(String),

    /// Token response parsing failed.
    #[error("Invalid token response: {0}")]
    InvalidResponse(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Configuration for the HTTP token issuer.
#[derive(Clone)]
pub struct TokenIssuerConfig {
    /// Base URL of the application serving the token endpoint.
    pub endpoint: String,

    /// HTTP request timeout.
    pub http_timeout: Duration,
}

impl std::fmt::Debug for TokenIssuerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenIssuerConfig")
            .field("endpoint", &self.endpoint)
            .field("http_timeout", &self.http_timeout)
            .finish()
    }
}

impl TokenIssuerConfig {
    /// Create a configuration with the default timeout.
    #[must_use]
    pub fn new(endpoint: String) -> Self {
        Self {
            endpoint,
            http_timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }

    /// Set the HTTP timeout.
    #[must_use]
    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }
}

/// A token issued for one participant.
pub struct IssuedToken {
    /// Session token to hand to the transport.
    pub token: SecretString,
    /// Participant the token was issued for, as echoed by the endpoint.
    pub user_id: ParticipantId,
    /// Transport API key, when the endpoint returns one.
    pub api_key: Option<SecretString>,
}

impl std::fmt::Debug for IssuedToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuedToken")
            .field("token", &"[REDACTED]")
            .field("user_id", &self.user_id)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

#[derive(Serialize)]
struct TokenRequest<'a> {
    #[serde(rename = "userId")]
    user_id: &'a str,
}

#[derive(Deserialize)]
struct TokenResponse {
    token: SecretString,
    #[serde(rename = "userId")]
    user_id: String,
    #[serde(rename = "apiKey", default)]
    api_key: Option<SecretString>,
}

/// Token issuer backed by the application's HTTP token endpoint.
#[derive(Debug, Clone)]
pub struct HttpTokenIssuer {
    config: TokenIssuerConfig,
    http_client: reqwest::Client,
}

impl HttpTokenIssuer {
    /// Build an issuer with its own HTTP client.
    ///
    /// # Errors
    ///
    /// Returns `TokenError::Configuration` if the HTTP client cannot be built
    /// or the endpoint is empty.
    pub fn new(config: TokenIssuerConfig) -> Result<Self, TokenError> {
        if config.endpoint.trim().is_empty() {
            return Err(TokenError::Configuration(
                "token endpoint must not be empty".into(),
            ));
        }

        let http_client = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .build()
            .map_err(|e| TokenError::Configuration(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            config,
            http_client,
        })
    }

    /// Request a session token for `participant_id`.
    ///
    /// # Errors
    ///
    /// - `TokenError::Configuration` for an empty participant id (no request is made)
    /// - `TokenError::AuthenticationRejected` for 401/403
    /// - `TokenError::HttpError` for transport failures and other statuses
    /// - `TokenError::InvalidResponse` for an unparsable body or an empty token
    #[instrument(skip_all, fields(participant_id = %participant_id))]
    pub async fn issue_token(
        &self,
        participant_id: &ParticipantId,
    ) -> Result<IssuedToken, TokenError> {
        if participant_id.is_empty() {
            return Err(TokenError::Configuration(
                "participant id must not be empty".into(),
            ));
        }

        let url = format!(
            "{}{TOKEN_PATH}",
            self.config.endpoint.trim_end_matches('/')
        );

        debug!(
            target: "common.token_issuer",
            url = %url,
            "Requesting session token"
        );

        let response = self
            .http_client
            .post(&url)
            .json(&TokenRequest {
                user_id: participant_id.as_str(),
            })
            .send()
            .await
            .map_err(|e| {
                debug!(target: "common.token_issuer", error = %e, "HTTP request failed");
                TokenError::HttpError(e.to_string())
            })?;

        let status = response.status();

        if status.is_success() {
            let body: TokenResponse = response.json().await.map_err(|e| {
                warn!(target: "common.token_issuer", error = %e, "Failed to parse token response");
                TokenError::InvalidResponse(e.to_string())
            })?;

            if body.token.expose_secret().is_empty() {
                warn!(target: "common.token_issuer", "Token endpoint returned an empty token");
                return Err(TokenError::InvalidResponse("empty token".into()));
            }

            debug!(target: "common.token_issuer", "Session token issued");

            Ok(IssuedToken {
                token: body.token,
                user_id: ParticipantId::new(body.user_id),
                api_key: body.api_key,
            })
        } else if status.as_u16() == 401 || status.as_u16() == 403 {
            let body = response.text().await.unwrap_or_else(|e| {
                trace!(target: "common.token_issuer", error = %e, "Failed to read error response body");
                "<failed to read body>".to_string()
            });
            warn!(
                target: "common.token_issuer",
                status = %status,
                "Token request rejected"
            );
            trace!(
                target: "common.token_issuer",
                body = %body,
                "Token rejection response body"
            );
            Err(TokenError::AuthenticationRejected(format!("Status {status}")))
        } else if status.is_server_error() {
            warn!(
                target: "common.token_issuer",
                status = %status,
                "Token endpoint returned server error"
            );
            Err(TokenError::HttpError(format!("Token endpoint error: {status}")))
        } else {
            warn!(
                target: "common.token_issuer",
                status = %status,
                "Unexpected response from token endpoint"
            );
            Err(TokenError::HttpError(format!("Unexpected status: {status}")))
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn issuer(base_url: &str) -> HttpTokenIssuer {
        HttpTokenIssuer::new(TokenIssuerConfig::new(base_url.to_string())).unwrap()
    }

    #[test]
    fn test_config_defaults() {
        let config = TokenIssuerConfig::new("http://localhost:3000".to_string());
        assert_eq!(config.http_timeout, DEFAULT_HTTP_TIMEOUT);

        let config = config.with_http_timeout(Duration::from_secs(2));
        assert_eq!(config.http_timeout, Duration::from_secs(2));
    }

    #[test]
    fn test_empty_endpoint_is_rejected() {
        let result = HttpTokenIssuer::new(TokenIssuerConfig::new("  ".to_string()));
        assert!(matches!(result, Err(TokenError::Configuration(_))));
    }

    #[test]
    fn test_issued_token_debug_redacts() {
        let issued = IssuedToken {
            token: SecretString::from("raw-session-token"),
            user_id: ParticipantId::from("student-1"),
            api_key: Some(SecretString::from("raw-api-key")),
        };

        let debug_str = format!("{issued:?}");
        assert!(debug_str.contains("student-1"));
        assert!(!debug_str.contains("raw-session-token"));
        assert!(!debug_str.contains("raw-api-key"));
    }

    #[tokio::test]
    async fn test_issue_token_success() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/stream/token"))
            .and(body_json(serde_json::json!({ "userId": "student-1" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "token": "issued-token",
                "userId": "student-1",
                "apiKey": "public-key"
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let issued = issuer(&mock_server.uri())
            .issue_token(&ParticipantId::from("student-1"))
            .await
            .unwrap();

        assert_eq!(issued.token.expose_secret(), "issued-token");
        assert_eq!(issued.user_id, ParticipantId::from("student-1"));
        assert_eq!(
            issued.api_key.as_ref().map(|k| k.expose_secret().to_string()),
            Some("public-key".to_string())
        );
    }

    #[tokio::test]
    async fn test_issue_token_without_api_key() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/stream/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "token": "issued-token",
                "userId": "student-1"
            })))
            .mount(&mock_server)
            .await;

        let issued = issuer(&format!("{}/", mock_server.uri()))
            .issue_token(&ParticipantId::from("student-1"))
            .await
            .unwrap();

        assert!(issued.api_key.is_none());
    }

    #[tokio::test]
    async fn test_unauthorized_maps_to_authentication_rejected() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/stream/token"))
            .respond_with(
                ResponseTemplate::new(401).set_body_json(serde_json::json!({
                    "error": "Unauthorized"
                })),
            )
            .mount(&mock_server)
            .await;

        let result = issuer(&mock_server.uri())
            .issue_token(&ParticipantId::from("student-1"))
            .await;

        assert!(matches!(result, Err(TokenError::AuthenticationRejected(_))));
    }

    #[tokio::test]
    async fn test_server_error_maps_to_http_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/stream/token"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&mock_server)
            .await;

        let result = issuer(&mock_server.uri())
            .issue_token(&ParticipantId::from("student-1"))
            .await;

        assert!(matches!(result, Err(TokenError::HttpError(_))));
    }

    #[tokio::test]
    async fn test_empty_token_is_invalid() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/stream/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "token": "",
                "userId": "student-1"
            })))
            .mount(&mock_server)
            .await;

        let result = issuer(&mock_server.uri())
            .issue_token(&ParticipantId::from("student-1"))
            .await;

        assert!(matches!(result, Err(TokenError::InvalidResponse(_))));
    }

    #[tokio::test]
    async fn test_malformed_body_is_invalid() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/stream/token"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&mock_server)
            .await;

        let result = issuer(&mock_server.uri())
            .issue_token(&ParticipantId::from("student-1"))
            .await;

        assert!(matches!(result, Err(TokenError::InvalidResponse(_))));
    }

    #[tokio::test]
    async fn test_empty_participant_makes_no_request() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&mock_server)
            .await;

        let result = issuer(&mock_server.uri())
            .issue_token(&ParticipantId::from(""))
            .await;

        assert!(matches!(result, Err(TokenError::Configuration(_))));
    }
}
