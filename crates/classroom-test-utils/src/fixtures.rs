//! Pre-configured test data fixtures for classroom session testing.
//!
//! Provides builders and test data for:
//! - Participants and their credentials
//! - Session configuration tuned for tests
//! - Wire payloads for hand-raise and chat events
//! - Recording catalog entries

use crate::mock_token_issuer::MockTokenIssuer;
use crate::mock_transport::MockTransport;
use classroom_session::transport::RawRecording;
use classroom_session::{ClassroomSession, Config, Credentials, SessionPhase};
use common::types::{Participant, ParticipantId, SessionId};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Test participant fixture.
#[derive(Debug, Clone)]
pub struct TestParticipant {
    /// Participant ID.
    pub id: String,
    /// Display name.
    pub name: String,
}

impl TestParticipant {
    /// Create a participant whose display name is the capitalized id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        let mut chars = id.chars();
        let name = match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        };
        Self { id, name }
    }

    /// Create a participant with a random ID.
    #[must_use]
    pub fn random() -> Self {
        Self::new(format!("user-{}", Uuid::new_v4()))
    }

    /// Set the display name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    #[must_use]
    pub fn participant_id(&self) -> ParticipantId {
        ParticipantId::new(self.id.clone())
    }

    #[must_use]
    pub fn participant(&self) -> Participant {
        Participant::new(self.id.clone(), self.name.clone())
    }

    #[must_use]
    pub fn credentials(&self) -> Credentials {
        Credentials::new(self.id.clone(), self.name.clone())
    }
}

/// Session id shared by the fixtures below.
pub const TEST_SESSION_ID: &str = "classroom-test-room";

#[must_use]
pub fn test_session_id() -> SessionId {
    SessionId::from(TEST_SESSION_ID)
}

/// Config with a test API key and a 1s recording tick.
#[must_use]
pub fn test_config() -> Arc<Config> {
    let mut config = Config::with_api_key("pk_test_classroom");
    config.recording_tick = Duration::from_secs(1);
    config.mailbox_capacity = 64;
    Arc::new(config)
}

/// A fresh, idle session connected to `transport` with an accepting issuer.
pub async fn idle_session(transport: &MockTransport, who: &TestParticipant) -> ClassroomSession {
    ClassroomSession::new(
        test_config(),
        who.credentials(),
        transport.shared(),
        MockTokenIssuer::accepting().shared(),
    )
    .await
}

/// A session that has joined [`TEST_SESSION_ID`] on `transport`.
///
/// # Panics
///
/// Panics if the join fails.
pub async fn joined_session(transport: &MockTransport, who: &TestParticipant) -> ClassroomSession {
    let session = idle_session(transport, who).await;
    let phase = session
        .join(test_session_id())
        .await
        .expect("join should succeed against the mock transport");
    assert_eq!(phase, SessionPhase::Joined);
    session
}

/// `raised-hand` reaction payload.
#[must_use]
pub fn raised_hand_payload(who: &TestParticipant, timestamp: i64) -> Value {
    json!({
        "userId": who.id,
        "userName": who.name,
        "timestamp": timestamp,
    })
}

/// `lower_hand` payload.
#[must_use]
pub fn lower_hand_payload(participant_id: &str) -> Value {
    json!({ "userId": participant_id })
}

/// `chat_message` payload.
#[must_use]
pub fn chat_payload(id: &str, who: &TestParticipant, message: &str, timestamp: &str) -> Value {
    json!({
        "id": id,
        "user": { "id": who.id, "name": who.name },
        "message": message,
        "timestamp": timestamp,
    })
}

/// A catalog entry.
#[must_use]
pub fn recording(filename: &str, start_time: &str, end_time: &str) -> RawRecording {
    RawRecording {
        filename: filename.to_string(),
        url: format!("https://recordings.test/{filename}"),
        start_time: start_time.to_string(),
        end_time: end_time.to_string(),
    }
}

/// Yield until `predicate` holds on the watched value or `timeout` elapses.
///
/// # Panics
///
/// Panics on timeout, naming `what`.
pub async fn wait_until<T, F>(rx: &mut tokio::sync::watch::Receiver<T>, what: &str, predicate: F)
where
    F: FnMut(&T) -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(predicate))
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {what}"))
        .unwrap_or_else(|_| panic!("watch closed while waiting for {what}"));
}

/// Yield enough times for the manager actors to drain their queues.
///
/// Does not touch the clock, so it is safe under `start_paused`.
pub async fn settle() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}
