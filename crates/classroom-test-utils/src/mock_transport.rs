//! In-memory transport for classroom session tests.
//!
//! One `MockTransport` is one call room. Every session connected through the
//! same instance (or a clone of it) shares the room: custom events and
//! reactions are broadcast to every subscriber, including the sender, just
//! like the real backend.
//!
//! The room can be configured to:
//! - Fail connect, join, publish or recording requests
//! - Hold recording confirmations until the test emits them
//! - Delay leave so concurrent leave paths can be exercised
//!
//! # Example
//!
//! ```rust,ignore
//! use classroom_test_utils::MockTransport;
//!
//! let transport = MockTransport::builder()
//!     .manual_recording_confirmation()
//!     .with_recording(recording("lesson-1.mp4", "2024-03-01T09:00:00Z", "2024-03-01T09:45:00Z"))
//!     .build();
//!
//! // ... toggle recording, then:
//! transport.confirm_recording_started();
//! ```

use async_trait::async_trait;
use classroom_session::transport::{
    CallHandle, RawRecording, Transport, TransportClient, TransportEvent,
};
use classroom_session::SessionError;
use common::secret::SecretString;
use common::types::{Participant, ParticipantId, SessionId};
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// A custom event or reaction published through the mock.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedEvent {
    pub sender: ParticipantId,
    pub event_type: String,
    pub payload: Value,
    pub is_reaction: bool,
}

#[derive(Debug, Clone, Default)]
struct Behavior {
    fail_connect: bool,
    fail_join: bool,
    fail_publish: bool,
    reject_recording: bool,
    manual_recording_confirmation: bool,
    leave_delay: Option<Duration>,
    query_delay: Option<Duration>,
}

#[derive(Debug, Default)]
struct Counters {
    connect: AtomicUsize,
    join: AtomicUsize,
    leave: AtomicUsize,
    disconnect: AtomicUsize,
    start_recording: AtomicUsize,
    stop_recording: AtomicUsize,
    screen_share_toggle: AtomicUsize,
}

#[derive(Debug, Default)]
struct Room {
    behavior: Behavior,
    counters: Counters,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<TransportEvent>>>,
    members: Mutex<Vec<Participant>>,
    sharer: Mutex<Option<ParticipantId>>,
    recording: Mutex<bool>,
    recordings: Mutex<Vec<RawRecording>>,
    published: Mutex<Vec<PublishedEvent>>,
}

impl Room {
    fn broadcast(&self, event: TransportEvent) {
        let mut subscribers = self.subscribers.lock().unwrap();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

/// In-memory call room implementing [`Transport`].
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    room: Arc<Room>,
}

impl MockTransport {
    /// A room that accepts everything and confirms recordings immediately.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new MockTransport builder.
    #[must_use]
    pub fn builder() -> MockTransportBuilder {
        MockTransportBuilder::default()
    }

    /// This room as a trait object for `ClassroomSession::new`.
    #[must_use]
    pub fn shared(&self) -> Arc<dyn Transport> {
        Arc::new(self.clone())
    }

    // Server-side events

    /// Deliver `event` to every subscriber.
    pub fn emit(&self, event: TransportEvent) {
        self.room.broadcast(event);
    }

    /// Deliver a custom event as if `sender` had published it.
    pub fn emit_custom(&self, sender: &Participant, event_type: &str, payload: Value) {
        self.emit(TransportEvent::Custom {
            sender: sender.clone(),
            event_type: event_type.to_string(),
            payload,
        });
    }

    /// Deliver a reaction as if `sender` had published it.
    pub fn emit_reaction(&self, sender: &Participant, reaction_type: &str, payload: Value) {
        self.emit(TransportEvent::Reaction {
            sender: sender.clone(),
            reaction_type: reaction_type.to_string(),
            payload,
        });
    }

    /// Confirm a pending (or unsolicited) recording start.
    pub fn confirm_recording_started(&self) {
        *self.room.recording.lock().unwrap() = true;
        self.emit(TransportEvent::RecordingStarted);
    }

    /// Confirm a pending (or unsolicited) recording stop.
    pub fn confirm_recording_stopped(&self) {
        *self.room.recording.lock().unwrap() = false;
        self.emit(TransportEvent::RecordingStopped);
    }

    /// A remote participant starts sharing.
    pub fn start_remote_share(&self, participant_id: &ParticipantId) {
        *self.room.sharer.lock().unwrap() = Some(participant_id.clone());
        self.emit(TransportEvent::ScreenShareStarted {
            participant_id: participant_id.clone(),
        });
    }

    /// A remote participant stops sharing.
    pub fn stop_remote_share(&self, participant_id: &ParticipantId) {
        {
            let mut sharer = self.room.sharer.lock().unwrap();
            if sharer.as_ref() == Some(participant_id) {
                *sharer = None;
            }
        }
        self.emit(TransportEvent::ScreenShareStopped {
            participant_id: participant_id.clone(),
        });
    }

    /// Add a finished recording to the catalog.
    pub fn add_recording(&self, recording: RawRecording) {
        self.room.recordings.lock().unwrap().push(recording);
    }

    // Inspection

    /// Custom events and reactions published by sessions, in order.
    pub fn published(&self) -> Vec<PublishedEvent> {
        self.room.published.lock().unwrap().clone()
    }

    /// Published events of one type.
    pub fn published_of(&self, event_type: &str) -> Vec<PublishedEvent> {
        self.published()
            .into_iter()
            .filter(|event| event.event_type == event_type)
            .collect()
    }

    pub fn members(&self) -> Vec<Participant> {
        self.room.members.lock().unwrap().clone()
    }

    pub fn current_sharer(&self) -> Option<ParticipantId> {
        self.room.sharer.lock().unwrap().clone()
    }

    pub fn is_recording(&self) -> bool {
        *self.room.recording.lock().unwrap()
    }

    pub fn connect_count(&self) -> usize {
        self.room.counters.connect.load(Ordering::SeqCst)
    }

    pub fn join_count(&self) -> usize {
        self.room.counters.join.load(Ordering::SeqCst)
    }

    pub fn leave_count(&self) -> usize {
        self.room.counters.leave.load(Ordering::SeqCst)
    }

    pub fn disconnect_count(&self) -> usize {
        self.room.counters.disconnect.load(Ordering::SeqCst)
    }

    pub fn start_recording_count(&self) -> usize {
        self.room.counters.start_recording.load(Ordering::SeqCst)
    }

    pub fn stop_recording_count(&self) -> usize {
        self.room.counters.stop_recording.load(Ordering::SeqCst)
    }

    pub fn screen_share_toggle_count(&self) -> usize {
        self.room.counters.screen_share_toggle.load(Ordering::SeqCst)
    }
}

/// Builder for MockTransport configuration.
#[derive(Debug, Default)]
pub struct MockTransportBuilder {
    behavior: Behavior,
    recordings: Vec<RawRecording>,
}

impl MockTransportBuilder {
    /// Fail every `connect` with a transport error.
    #[must_use]
    pub fn fail_connect(mut self) -> Self {
        self.behavior.fail_connect = true;
        self
    }

    /// Fail every `join` with a transport error.
    #[must_use]
    pub fn fail_join(mut self) -> Self {
        self.behavior.fail_join = true;
        self
    }

    /// Fail every custom event and reaction publish.
    #[must_use]
    pub fn fail_publish(mut self) -> Self {
        self.behavior.fail_publish = true;
        self
    }

    /// Fail every recording start/stop request.
    #[must_use]
    pub fn reject_recording(mut self) -> Self {
        self.behavior.reject_recording = true;
        self
    }

    /// Accept recording requests without confirming them; the test calls
    /// `confirm_recording_started` / `confirm_recording_stopped`.
    #[must_use]
    pub fn manual_recording_confirmation(mut self) -> Self {
        self.behavior.manual_recording_confirmation = true;
        self
    }

    /// Sleep this long inside `leave`.
    #[must_use]
    pub fn leave_delay(mut self, delay: Duration) -> Self {
        self.behavior.leave_delay = Some(delay);
        self
    }

    /// Sleep this long inside `query_recordings`.
    #[must_use]
    pub fn query_delay(mut self, delay: Duration) -> Self {
        self.behavior.query_delay = Some(delay);
        self
    }

    /// Seed the recording catalog.
    #[must_use]
    pub fn with_recording(mut self, recording: RawRecording) -> Self {
        self.recordings.push(recording);
        self
    }

    /// Build the MockTransport.
    #[must_use]
    pub fn build(self) -> MockTransport {
        MockTransport {
            room: Arc::new(Room {
                behavior: self.behavior,
                recordings: Mutex::new(self.recordings),
                ..Room::default()
            }),
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(
        &self,
        _api_key: &SecretString,
        participant: &Participant,
        _token: &SecretString,
    ) -> Result<Arc<dyn TransportClient>, SessionError> {
        self.room.counters.connect.fetch_add(1, Ordering::SeqCst);

        if self.room.behavior.fail_connect {
            return Err(SessionError::Transport(
                "Mock transport refused the connection".to_string(),
            ));
        }

        Ok(Arc::new(MockClient {
            participant: participant.clone(),
            room: Arc::clone(&self.room),
        }))
    }
}

/// A client connected to the mock room.
#[derive(Debug)]
pub struct MockClient {
    participant: Participant,
    room: Arc<Room>,
}

#[async_trait]
impl TransportClient for MockClient {
    fn call(&self, _call_type: &str, _session_id: &SessionId) -> Arc<dyn CallHandle> {
        Arc::new(MockCall {
            participant: self.participant.clone(),
            room: Arc::clone(&self.room),
        })
    }

    async fn disconnect(&self) {
        self.room.counters.disconnect.fetch_add(1, Ordering::SeqCst);
    }
}

/// One participant's handle to the mock room.
#[derive(Debug)]
pub struct MockCall {
    participant: Participant,
    room: Arc<Room>,
}

impl MockCall {
    fn record_publish(&self, event_type: &str, payload: &Value, is_reaction: bool) {
        self.room.published.lock().unwrap().push(PublishedEvent {
            sender: self.participant.id.clone(),
            event_type: event_type.to_string(),
            payload: payload.clone(),
            is_reaction,
        });
    }
}

#[async_trait]
impl CallHandle for MockCall {
    async fn join(&self, _create: bool) -> Result<(), SessionError> {
        self.room.counters.join.fetch_add(1, Ordering::SeqCst);

        if self.room.behavior.fail_join {
            return Err(SessionError::Transport(
                "Mock transport failed to join the call".to_string(),
            ));
        }

        let mut members = self.room.members.lock().unwrap();
        if !members.iter().any(|m| m.id == self.participant.id) {
            members.push(self.participant.clone());
        }
        Ok(())
    }

    async fn leave(&self) -> Result<(), SessionError> {
        if let Some(delay) = self.room.behavior.leave_delay {
            tokio::time::sleep(delay).await;
        }

        self.room.counters.leave.fetch_add(1, Ordering::SeqCst);
        self.room
            .members
            .lock()
            .unwrap()
            .retain(|m| m.id != self.participant.id);
        Ok(())
    }

    fn subscribe(&self) -> mpsc::UnboundedReceiver<TransportEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.room.subscribers.lock().unwrap().push(tx);
        rx
    }

    async fn publish_custom_event(
        &self,
        event_type: &str,
        payload: Value,
    ) -> Result<(), SessionError> {
        if self.room.behavior.fail_publish {
            return Err(SessionError::Transport("Mock publish failed".to_string()));
        }

        self.record_publish(event_type, &payload, false);
        self.room.broadcast(TransportEvent::Custom {
            sender: self.participant.clone(),
            event_type: event_type.to_string(),
            payload,
        });
        Ok(())
    }

    async fn publish_reaction(
        &self,
        reaction_type: &str,
        payload: Value,
    ) -> Result<(), SessionError> {
        if self.room.behavior.fail_publish {
            return Err(SessionError::Transport("Mock publish failed".to_string()));
        }

        self.record_publish(reaction_type, &payload, true);
        self.room.broadcast(TransportEvent::Reaction {
            sender: self.participant.clone(),
            reaction_type: reaction_type.to_string(),
            payload,
        });
        Ok(())
    }

    async fn start_recording(&self) -> Result<(), SessionError> {
        self.room
            .counters
            .start_recording
            .fetch_add(1, Ordering::SeqCst);

        if self.room.behavior.reject_recording {
            return Err(SessionError::Transport(
                "Mock transport rejected the recording request".to_string(),
            ));
        }

        if !self.room.behavior.manual_recording_confirmation {
            *self.room.recording.lock().unwrap() = true;
            self.room.broadcast(TransportEvent::RecordingStarted);
        }
        Ok(())
    }

    async fn stop_recording(&self) -> Result<(), SessionError> {
        self.room
            .counters
            .stop_recording
            .fetch_add(1, Ordering::SeqCst);

        if self.room.behavior.reject_recording {
            return Err(SessionError::Transport(
                "Mock transport rejected the recording request".to_string(),
            ));
        }

        if !self.room.behavior.manual_recording_confirmation {
            *self.room.recording.lock().unwrap() = false;
            self.room.broadcast(TransportEvent::RecordingStopped);
        }
        Ok(())
    }

    async fn query_recordings(&self) -> Result<Vec<RawRecording>, SessionError> {
        if let Some(delay) = self.room.behavior.query_delay {
            tokio::time::sleep(delay).await;
        }

        Ok(self.room.recordings.lock().unwrap().clone())
    }

    async fn toggle_screen_share(&self) -> Result<(), SessionError> {
        self.room
            .counters
            .screen_share_toggle
            .fetch_add(1, Ordering::SeqCst);

        let event = {
            let mut sharer = self.room.sharer.lock().unwrap();
            match sharer.as_ref() {
                None => {
                    *sharer = Some(self.participant.id.clone());
                    TransportEvent::ScreenShareStarted {
                        participant_id: self.participant.id.clone(),
                    }
                }
                Some(current) if *current == self.participant.id => {
                    *sharer = None;
                    TransportEvent::ScreenShareStopped {
                        participant_id: self.participant.id.clone(),
                    }
                }
                Some(current) => {
                    return Err(SessionError::Busy(format!(
                        "{current} is already sharing"
                    )));
                }
            }
        };

        self.room.broadcast(event);
        Ok(())
    }

    async fn current_sharer(&self) -> Result<Option<ParticipantId>, SessionError> {
        Ok(self.room.sharer.lock().unwrap().clone())
    }

    async fn participants(&self) -> Result<Vec<Participant>, SessionError> {
        Ok(self.room.members.lock().unwrap().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> Participant {
        Participant::new("alice", "Alice")
    }

    async fn call_for(transport: &MockTransport, participant: &Participant) -> Arc<dyn CallHandle> {
        let client = transport
            .connect(
                &SecretString::from("key".to_string()),
                participant,
                &SecretString::from("token".to_string()),
            )
            .await
            .unwrap();
        client.call("default", &SessionId::from("room"))
    }

    #[tokio::test]
    async fn test_broadcast_reaches_sender() {
        let transport = MockTransport::new();
        let call = call_for(&transport, &alice()).await;
        let mut events = call.subscribe();

        call.publish_custom_event("chat_message", serde_json::json!({"message": "hi"}))
            .await
            .unwrap();

        match events.recv().await.unwrap() {
            TransportEvent::Custom {
                sender, event_type, ..
            } => {
                assert_eq!(sender.id, alice().id);
                assert_eq!(event_type, "chat_message");
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(transport.published_of("chat_message").len(), 1);
    }

    #[tokio::test]
    async fn test_screen_share_is_exclusive() {
        let transport = MockTransport::new();
        let bob = Participant::new("bob", "Bob");
        let alice_call = call_for(&transport, &alice()).await;
        let bob_call = call_for(&transport, &bob).await;

        alice_call.toggle_screen_share().await.unwrap();
        assert!(bob_call.toggle_screen_share().await.is_err());
        assert_eq!(transport.current_sharer(), Some(alice().id));

        alice_call.toggle_screen_share().await.unwrap();
        assert_eq!(transport.current_sharer(), None);
    }

    #[tokio::test]
    async fn test_builder_failures() {
        let transport = MockTransport::builder().fail_connect().build();
        let result = transport
            .connect(
                &SecretString::from("key".to_string()),
                &alice(),
                &SecretString::from("token".to_string()),
            )
            .await;
        assert!(result.is_err());
        assert_eq!(transport.connect_count(), 1);

        let transport = MockTransport::builder().fail_join().build();
        let call = call_for(&transport, &alice()).await;
        assert!(call.join(true).await.is_err());
        assert!(transport.members().is_empty());
    }
}
