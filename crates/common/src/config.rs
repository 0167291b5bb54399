//! Common configuration types for the classroom session crates.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Default log filter when neither `RUST_LOG` nor the config sets one.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Observability configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error) or a full filter directive
    pub log_level: String,
    /// Enable JSON-formatted logs
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            json_logs: false,
        }
    }
}

impl ObservabilityConfig {
    /// Read `{prefix}_LOG_LEVEL` and `{prefix}_JSON_LOGS` from a variable map.
    ///
    /// Missing or unparsable values fall back to the defaults.
    #[must_use]
    pub fn from_vars(prefix: &str, vars: &HashMap<String, String>) -> Self {
        let log_level = vars
            .get(&format!("{prefix}_LOG_LEVEL"))
            .filter(|s| !s.trim().is_empty())
            .cloned()
            .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string());

        let json_logs = vars
            .get(&format!("{prefix}_JSON_LOGS"))
            .and_then(|s| s.parse().ok())
            .unwrap_or(false);

        Self {
            log_level,
            json_logs,
        }
    }
}
