//! Classroom session configuration.
//!
//! Configuration is loaded from environment variables. The API key is
//! redacted in Debug output.

use common::config::ObservabilityConfig;
use common::secret::SecretString;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Prefix shared by every variable this crate reads.
pub const ENV_PREFIX: &str = "CLASSROOM";

/// Default base URL of the token endpoint.
pub const DEFAULT_TOKEN_ENDPOINT: &str = "http://localhost:3000";

/// Default transport call type.
pub const DEFAULT_CALL_TYPE: &str = "default";

/// Default recording elapsed-time tick in milliseconds.
pub const DEFAULT_RECORDING_TICK_MS: u64 = 1000;

/// Default mailbox capacity for manager actors.
pub const DEFAULT_MAILBOX_CAPACITY: usize = 256;

/// Default token request timeout in seconds.
pub const DEFAULT_TOKEN_TIMEOUT_SECONDS: u64 = 10;

/// Classroom session configuration.
#[derive(Clone)]
pub struct Config {
    /// Transport API key.
    /// Protected by `SecretString` to prevent accidental logging.
    pub api_key: SecretString,

    /// Base URL of the token endpoint (default: `http://localhost:3000`).
    pub token_endpoint: String,

    /// Transport call type passed to `TransportClient::call` (default: "default").
    pub call_type: String,

    /// Interval between recording elapsed-time updates (default: 1s).
    pub recording_tick: Duration,

    /// Mailbox capacity for each manager actor (default: 256).
    pub mailbox_capacity: usize,

    /// Token request timeout (default: 10s).
    pub token_timeout: Duration,

    /// Logging configuration.
    pub observability: ObservabilityConfig,
}

/// Custom Debug implementation that redacts sensitive fields.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("api_key", &"[REDACTED]")
            .field("token_endpoint", &self.token_endpoint)
            .field("call_type", &self.call_type)
            .field("recording_tick", &self.recording_tick)
            .field("mailbox_capacity", &self.mailbox_capacity)
            .field("token_timeout", &self.token_timeout)
            .field("observability", &self.observability)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// See [`Config::from_vars`].
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    ///
    /// # Errors
    ///
    /// - `MissingEnvVar` if `CLASSROOM_API_KEY` is unset or blank
    /// - `InvalidValue` if the recording tick or mailbox capacity is zero
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let api_key = vars
            .get("CLASSROOM_API_KEY")
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar("CLASSROOM_API_KEY".to_string()))?;
        let api_key = SecretString::from(api_key.clone());

        let token_endpoint = vars
            .get("CLASSROOM_TOKEN_ENDPOINT")
            .cloned()
            .unwrap_or_else(|| DEFAULT_TOKEN_ENDPOINT.to_string());

        let call_type = vars
            .get("CLASSROOM_CALL_TYPE")
            .cloned()
            .unwrap_or_else(|| DEFAULT_CALL_TYPE.to_string());

        let recording_tick_ms = vars
            .get("CLASSROOM_RECORDING_TICK_MS")
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_RECORDING_TICK_MS);
        if recording_tick_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "CLASSROOM_RECORDING_TICK_MS must be greater than zero".to_string(),
            ));
        }

        let mailbox_capacity = vars
            .get("CLASSROOM_MAILBOX_CAPACITY")
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(DEFAULT_MAILBOX_CAPACITY);
        if mailbox_capacity == 0 {
            return Err(ConfigError::InvalidValue(
                "CLASSROOM_MAILBOX_CAPACITY must be greater than zero".to_string(),
            ));
        }

        let token_timeout_seconds = vars
            .get("CLASSROOM_TOKEN_TIMEOUT_SECONDS")
            .and_then(|s| s.parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .unwrap_or(DEFAULT_TOKEN_TIMEOUT_SECONDS);

        Ok(Config {
            api_key,
            token_endpoint,
            call_type,
            recording_tick: Duration::from_millis(recording_tick_ms),
            mailbox_capacity,
            token_timeout: Duration::from_secs(token_timeout_seconds),
            observability: ObservabilityConfig::from_vars(ENV_PREFIX, vars),
        })
    }

    /// Configuration with defaults and the given API key.
    #[must_use]
    pub fn with_api_key(api_key: impl Into<String>) -> Self {
        Config {
            api_key: SecretString::from(api_key.into()),
            token_endpoint: DEFAULT_TOKEN_ENDPOINT.to_string(),
            call_type: DEFAULT_CALL_TYPE.to_string(),
            recording_tick: Duration::from_millis(DEFAULT_RECORDING_TICK_MS),
            mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
            token_timeout: Duration::from_secs(DEFAULT_TOKEN_TIMEOUT_SECONDS),
            observability: ObservabilityConfig::default(),
        }
    }
}
