//! Chat relay.
//!
//! Sending appends the message locally first (local echo) and then
//! broadcasts it. Because the transport rebroadcasts to the sender too,
//! receipts from the local participant are discarded; remote re-deliveries
//! are dropped by `(sender, id)`. Messages are kept in arrival order and
//! never reordered.

use super::messages::ChatMessageCommand;
use crate::channel::{ChannelEvent, EventChannel, EventKind, Subscription, CHAT_MESSAGE_EVENT};
use crate::lifecycle::SessionPhase;
use crate::observability::metrics;
use chrono::{DateTime, Utc};
use common::types::{Participant, ParticipantId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace, warn};

/// One chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    /// Unique per sender: `{unix_millis}-{random suffix}`.
    pub id: String,
    pub sender_id: ParticipantId,
    pub sender_name: String,
    /// Text exactly as entered, including line breaks.
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    /// Build a message from `sender` with a fresh id.
    #[must_use]
    pub fn compose(sender: &Participant, text: impl Into<String>) -> Self {
        let timestamp = Utc::now();
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        let suffix: String = suffix.chars().take(8).collect();
        Self {
            id: format!("{}-{suffix}", timestamp.timestamp_millis()),
            sender_id: sender.id.clone(),
            sender_name: sender.display_name.clone(),
            text: text.into(),
            timestamp,
        }
    }
}

/// Sender block of the `chat_message` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatUser {
    pub id: ParticipantId,
    pub name: String,
}

/// Wire form of the `chat_message` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatPayload {
    pub id: String,
    pub user: ChatUser,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl From<&ChatMessage> for ChatPayload {
    fn from(message: &ChatMessage) -> Self {
        Self {
            id: message.id.clone(),
            user: ChatUser {
                id: message.sender_id.clone(),
                name: message.sender_name.clone(),
            },
            message: message.text.clone(),
            timestamp: message.timestamp,
        }
    }
}

impl From<ChatPayload> for ChatMessage {
    fn from(payload: ChatPayload) -> Self {
        Self {
            id: payload.id,
            sender_id: payload.user.id,
            sender_name: payload.user.name,
            text: payload.message,
            timestamp: payload.timestamp,
        }
    }
}

/// Outcome of receiving a broadcast message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Receipt {
    Appended,
    /// Our own broadcast coming back.
    LocalEcho,
    /// Already in the transcript.
    Duplicate,
}

/// Append-only transcript.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    messages: Vec<ChatMessage>,
    seen: HashSet<(ParticipantId, String)>,
}

impl Transcript {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a locally sent message. Returns `false` if its id was used.
    pub fn append_local(&mut self, message: ChatMessage) -> bool {
        if !self
            .seen
            .insert((message.sender_id.clone(), message.id.clone()))
        {
            return false;
        }
        self.messages.push(message);
        true
    }

    /// Apply a received broadcast.
    pub fn receive(&mut self, message: ChatMessage, local_id: &ParticipantId) -> Receipt {
        if &message.sender_id == local_id {
            return Receipt::LocalEcho;
        }
        if !self
            .seen
            .insert((message.sender_id.clone(), message.id.clone()))
        {
            return Receipt::Duplicate;
        }
        self.messages.push(message);
        Receipt::Appended
    }

    #[must_use]
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        self.seen.clear();
    }
}

/// Handle to a `ChatActor`.
#[derive(Clone, Debug)]
pub struct ChatHandle {
    sender: mpsc::Sender<ChatMessageCommand>,
    channel: EventChannel,
    local: Participant,
    phase_rx: watch::Receiver<SessionPhase>,
    snapshot_rx: watch::Receiver<Vec<ChatMessage>>,
}

impl ChatHandle {
    /// Send `text` to everyone in the session.
    ///
    /// Whitespace-only input and calls outside a joined session are ignored
    /// and return `None`. Otherwise the message is appended locally before
    /// the broadcast; broadcast failures are logged and swallowed.
    #[instrument(skip_all, fields(participant_id = %self.local.id))]
    pub async fn send(&self, text: &str) -> Option<ChatMessage> {
        if text.trim().is_empty() {
            trace!(target: "classroom.chat", "Ignoring blank message");
            return None;
        }
        if *self.phase_rx.borrow() != SessionPhase::Joined {
            debug!(target: "classroom.chat", "Not joined, message not sent");
            return None;
        }

        let message = ChatMessage::compose(&self.local, text);

        let (tx, rx) = oneshot::channel();
        let command = ChatMessageCommand::AppendLocal {
            message: message.clone(),
            respond_to: tx,
        };
        if self.sender.send(command).await.is_err() || rx.await.is_err() {
            debug!(target: "classroom.chat", "Chat actor gone, message not sent");
            return None;
        }

        let payload = match serde_json::to_value(ChatPayload::from(&message)) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(target: "classroom.chat", error = %e, "Failed to encode chat message");
                return Some(message);
            }
        };

        if let Err(e) = self.channel.publish(CHAT_MESSAGE_EVENT, payload).await {
            warn!(
                target: "classroom.chat",
                participant_id = %self.local.id,
                message_id = %message.id,
                error = %e,
                "Chat broadcast failed"
            );
        }

        Some(message)
    }

    /// Current transcript.
    #[must_use]
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.snapshot_rx.borrow().clone()
    }

    /// Receiver notified on every transcript change.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<Vec<ChatMessage>> {
        self.snapshot_rx.clone()
    }
}

/// Actor owning the transcript for one session.
pub struct ChatActor {
    local: Participant,
    events: Subscription,
    receiver: mpsc::Receiver<ChatMessageCommand>,
    phase_rx: watch::Receiver<SessionPhase>,
    cancel_token: CancellationToken,
    transcript: Transcript,
    snapshot_tx: watch::Sender<Vec<ChatMessage>>,
}

impl ChatActor {
    /// Spawn the actor, subscribed to chat events on `channel`.
    pub async fn spawn(
        local: Participant,
        channel: EventChannel,
        phase_rx: watch::Receiver<SessionPhase>,
        cancel_token: CancellationToken,
        mailbox_capacity: usize,
    ) -> (ChatHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(mailbox_capacity);
        let (snapshot_tx, snapshot_rx) = watch::channel(Vec::new());
        let events = channel.subscribe(EventKind::ChatMessage).await;

        let actor = Self {
            local: local.clone(),
            events,
            receiver,
            phase_rx: phase_rx.clone(),
            cancel_token,
            transcript: Transcript::new(),
            snapshot_tx,
        };

        let task_handle = tokio::spawn(actor.run());

        let handle = ChatHandle {
            sender,
            channel,
            local,
            phase_rx,
            snapshot_rx,
        };

        (handle, task_handle)
    }

    #[instrument(
        skip_all,
        name = "classroom.actor.chat",
        fields(participant_id = %self.local.id)
    )]
    async fn run(mut self) {
        debug!(target: "classroom.chat", "ChatActor started");

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    debug!(target: "classroom.chat", "ChatActor received cancellation signal");
                    if !self.transcript.messages().is_empty() {
                        self.transcript.clear();
                        self.publish_snapshot();
                    }
                    break;
                }

                changed = self.phase_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let phase = *self.phase_rx.borrow_and_update();
                    if phase.is_terminal() && !self.transcript.messages().is_empty() {
                        self.transcript.clear();
                        self.publish_snapshot();
                    }
                }

                event = self.events.recv() => match event {
                    Some(event) => self.handle_event(event),
                    None => break,
                },

                msg = self.receiver.recv() => match msg {
                    Some(ChatMessageCommand::AppendLocal { message, respond_to }) => {
                        if self.transcript.append_local(message) {
                            self.publish_snapshot();
                        }
                        let _ = respond_to.send(());
                    }
                    None => break,
                },
            }
        }

        info!(
            target: "classroom.chat",
            participant_id = %self.local.id,
            messages = self.transcript.messages().len(),
            "ChatActor stopped"
        );
    }

    fn handle_event(&mut self, event: ChannelEvent) {
        if !self.phase_rx.borrow().accepts_events() {
            trace!(target: "classroom.chat", "Dropping event outside a live session");
            return;
        }

        let payload: ChatPayload = match serde_json::from_value(event.payload) {
            Ok(payload) => payload,
            Err(e) => {
                debug!(target: "classroom.chat", error = %e, "Malformed chat payload");
                return;
            }
        };

        match self.transcript.receive(payload.into(), &self.local.id) {
            Receipt::Appended => self.publish_snapshot(),
            Receipt::LocalEcho => {
                trace!(target: "classroom.chat", "Discarding local echo");
            }
            Receipt::Duplicate => {
                metrics::record_duplicate_event(EventKind::ChatMessage.label());
                trace!(target: "classroom.chat", "Discarding re-delivered message");
            }
        }
    }

    fn publish_snapshot(&self) {
        self.snapshot_tx
            .send_replace(self.transcript.messages().to_vec());
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    fn msg(sender: &str, id: &str, text: &str) -> ChatMessage {
        ChatMessage {
            id: id.to_string(),
            sender_id: ParticipantId::from(sender),
            sender_name: sender.to_string(),
            text: text.to_string(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_compose_generates_unique_ids() {
        let me = Participant::new("me", "Me");
        let a = ChatMessage::compose(&me, "one");
        let b = ChatMessage::compose(&me, "two");

        assert_ne!(a.id, b.id);
        let (millis, suffix) = a.id.split_once('-').unwrap();
        assert!(millis.parse::<i64>().is_ok());
        assert_eq!(suffix.len(), 8);
    }

    #[test]
    fn test_local_echo_is_discarded() {
        let me = ParticipantId::from("me");
        let mut transcript = Transcript::new();
        let sent = msg("me", "1", "hello");

        assert!(transcript.append_local(sent.clone()));
        assert_eq!(transcript.receive(sent, &me), Receipt::LocalEcho);
        assert_eq!(transcript.messages().len(), 1);
    }

    #[test]
    fn test_remote_redelivery_is_discarded() {
        let me = ParticipantId::from("me");
        let mut transcript = Transcript::new();

        assert_eq!(
            transcript.receive(msg("ana", "1", "hi"), &me),
            Receipt::Appended
        );
        assert_eq!(
            transcript.receive(msg("ana", "1", "hi"), &me),
            Receipt::Duplicate
        );
        // Same id from another sender is a different message.
        assert_eq!(
            transcript.receive(msg("ben", "1", "yo"), &me),
            Receipt::Appended
        );
        assert_eq!(transcript.messages().len(), 2);
    }

    #[test]
    fn test_arrival_order_is_kept() {
        let me = ParticipantId::from("me");
        let mut transcript = Transcript::new();
        let mut late = msg("ana", "2", "second");
        late.timestamp = Utc::now() - chrono::Duration::seconds(30);

        transcript.receive(msg("ben", "1", "first"), &me);
        transcript.receive(late, &me);

        let texts: Vec<&str> = transcript.messages().iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "second"]);
    }

    #[test]
    fn test_payload_wire_format_keeps_multiline_text() {
        let message = msg("ana", "1700000000000-abcd1234", "line one\nline two\n");
        let json = serde_json::to_value(ChatPayload::from(&message)).unwrap();

        assert_eq!(json["user"]["id"], "ana");
        assert_eq!(json["message"], "line one\nline two\n");

        let back: ChatPayload = serde_json::from_value(json).unwrap();
        assert_eq!(ChatMessage::from(back), message);
    }
}
