//! Common data types for the classroom session crates.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of one live session (the transport's call id).
///
/// Opaque to the core: any non-empty string the transport accepts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    /// Create a session ID from an existing call id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh session ID for a room.
    ///
    /// Format: `{room_type}-{room_id}-{unix_millis}` when a room id is given,
    /// `{room_type}-{unix_millis}` otherwise.
    #[must_use]
    pub fn generate(room_type: &str, room_id: Option<&str>) -> Self {
        let timestamp = chrono::Utc::now().timestamp_millis();
        match room_id {
            Some(room_id) => Self(format!("{room_type}-{room_id}-{timestamp}")),
            None => Self(format!("{room_type}-{timestamp}")),
        }
    }

    /// Borrow the raw id.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Identifier of a participant, unique within a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(pub String);

impl ParticipantId {
    /// Create a participant ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw id.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the id is empty (never valid on the wire).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ParticipantId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// A participant as reported by the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    /// Participant ID.
    pub id: ParticipantId,
    /// Display name shown in the classroom UI.
    pub display_name: String,
}

impl Participant {
    /// Create a participant.
    #[must_use]
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: ParticipantId::new(id),
            display_name: display_name.into(),
        }
    }
}
