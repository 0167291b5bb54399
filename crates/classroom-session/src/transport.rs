//! Boundary to the external real-time transport.
//!
//! The transport owns audio/video, call membership, the broadcast custom
//! event channel, reactions and server-side recording. This crate only
//! talks to it through the traits below so the coordination logic can be
//! driven by an in-memory fake in tests.
//!
//! ```text
//! Transport::connect ──► TransportClient ──call()──► CallHandle
//!                              │                        ├─ join / leave
//!                              └─ disconnect            ├─ subscribe (events)
//!                                                       ├─ publish_custom_event / publish_reaction
//!                                                       ├─ start/stop/query recordings
//!                                                       └─ toggle_screen_share / current_sharer
//! ```

use crate::errors::SessionError;
use async_trait::async_trait;
use common::secret::SecretString;
use common::token_issuer::HttpTokenIssuer;
use common::types::{Participant, ParticipantId, SessionId};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;

/// An event delivered by the transport for one call.
///
/// Delivery is at-least-once and ordered per sender only. The transport
/// rebroadcasts custom events and reactions to every participant including
/// the sender.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// A custom broadcast event.
    Custom {
        sender: Participant,
        event_type: String,
        payload: Value,
    },
    /// A reaction with a custom payload.
    Reaction {
        sender: Participant,
        reaction_type: String,
        payload: Value,
    },
    /// The transport confirmed recording has started.
    RecordingStarted,
    /// The transport confirmed recording has stopped.
    RecordingStopped,
    /// A participant started sharing their screen.
    ScreenShareStarted { participant_id: ParticipantId },
    /// A participant stopped sharing their screen.
    ScreenShareStopped { participant_id: ParticipantId },
}

/// A recording entry as returned by the transport's catalog.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RawRecording {
    pub filename: String,
    pub url: String,
    pub start_time: String,
    pub end_time: String,
}

/// Exchanges a participant identity for a transport session token.
#[async_trait]
pub trait TokenIssuer: Send + Sync {
    /// Issue a token for `participant_id`. Fails closed on missing credentials.
    async fn issue_token(&self, participant_id: &ParticipantId)
        -> Result<SecretString, SessionError>;
}

#[async_trait]
impl TokenIssuer for HttpTokenIssuer {
    async fn issue_token(
        &self,
        participant_id: &ParticipantId,
    ) -> Result<SecretString, SessionError> {
        let issued = HttpTokenIssuer::issue_token(self, participant_id).await?;
        Ok(issued.token)
    }
}

/// Factory for transport clients.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Construct a client authenticated as `participant`.
    async fn connect(
        &self,
        api_key: &SecretString,
        participant: &Participant,
        token: &SecretString,
    ) -> Result<Arc<dyn TransportClient>, SessionError>;
}

/// A connected transport client. Owned exclusively by the session lifecycle.
#[async_trait]
pub trait TransportClient: Send + Sync {
    /// Get a handle to the call `session_id` of the given call type.
    fn call(&self, call_type: &str, session_id: &SessionId) -> Arc<dyn CallHandle>;

    /// Disconnect the client. Called exactly once per lifecycle.
    async fn disconnect(&self);
}

/// A handle to one call on the transport.
#[async_trait]
pub trait CallHandle: Send + Sync {
    /// Join the call, creating it first when `create` is set.
    async fn join(&self, create: bool) -> Result<(), SessionError>;

    /// Leave the call.
    async fn leave(&self) -> Result<(), SessionError>;

    /// Open a new event stream for this call.
    fn subscribe(&self) -> mpsc::UnboundedReceiver<TransportEvent>;

    /// Broadcast a custom event.
    async fn publish_custom_event(
        &self,
        event_type: &str,
        payload: Value,
    ) -> Result<(), SessionError>;

    /// Broadcast a reaction with a custom payload.
    async fn publish_reaction(
        &self,
        reaction_type: &str,
        payload: Value,
    ) -> Result<(), SessionError>;

    async fn start_recording(&self) -> Result<(), SessionError>;

    async fn stop_recording(&self) -> Result<(), SessionError>;

    async fn query_recordings(&self) -> Result<Vec<RawRecording>, SessionError>;

    /// Start or stop sharing the local screen.
    async fn toggle_screen_share(&self) -> Result<(), SessionError>;

    /// Participant currently sharing, if any.
    async fn current_sharer(&self) -> Result<Option<ParticipantId>, SessionError>;

    /// Participants currently in the call.
    async fn participants(&self) -> Result<Vec<Participant>, SessionError>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_recording_deserializes_catalog_entry() {
        let json = serde_json::json!({
            "filename": "class-1.mp4",
            "url": "https://cdn.example/class-1.mp4",
            "start_time": "2024-03-01T09:00:00Z",
            "end_time": "2024-03-01T09:45:10Z",
            "session_id": "ignored"
        });

        let recording: RawRecording = serde_json::from_value(json).unwrap();
        assert_eq!(recording.filename, "class-1.mp4");
        assert_eq!(recording.end_time, "2024-03-01T09:45:10Z");
    }
}
