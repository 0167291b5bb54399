//! Event channel adapter.
//!
//! Wraps the transport's broadcast primitives (custom events, reactions,
//! recording and screen-share notifications) into one typed publish/subscribe
//! interface scoped to a single session.
//!
//! ```text
//! CallHandle::subscribe ──► pump task ──normalize──► EventKind ──fan-out──► Subscription(s)
//! ```
//!
//! Delivery keeps the transport's guarantees: at-least-once, ordered per
//! sender only. The adapter does not deduplicate. Subscriptions outlive
//! attach/detach; events only flow while a call is attached.

use crate::errors::SessionError;
use crate::observability::metrics;
use crate::transport::{CallHandle, RawRecording, TransportEvent};
use common::types::{Participant, ParticipantId};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, trace, warn};

/// Reaction type used to raise a hand.
pub const RAISED_HAND_REACTION: &str = "raised-hand";

/// Custom event lowering one participant's hand.
pub const LOWER_HAND_EVENT: &str = "lower_hand";

/// Custom event clearing the whole hand-raise queue.
pub const CLEAR_HAND_QUEUE_EVENT: &str = "clear_hand_queue";

/// Custom event carrying a chat message.
pub const CHAT_MESSAGE_EVENT: &str = "chat_message";

/// Kind tag of a normalized channel event.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKind {
    RaiseHand,
    LowerHand,
    ClearHandQueue,
    ChatMessage,
    RecordingStarted,
    RecordingStopped,
    ScreenShareStarted,
    ScreenShareStopped,
    /// Any other custom event, by wire name.
    Custom(String),
    /// Any other reaction, by reaction type.
    Reaction(String),
}

impl EventKind {
    /// Kind for a custom event wire name.
    #[must_use]
    pub fn from_custom(event_type: &str) -> Self {
        match event_type {
            LOWER_HAND_EVENT => EventKind::LowerHand,
            CLEAR_HAND_QUEUE_EVENT => EventKind::ClearHandQueue,
            CHAT_MESSAGE_EVENT => EventKind::ChatMessage,
            other => EventKind::Custom(other.to_string()),
        }
    }

    /// Kind for a reaction type.
    #[must_use]
    pub fn from_reaction(reaction_type: &str) -> Self {
        match reaction_type {
            RAISED_HAND_REACTION => EventKind::RaiseHand,
            other => EventKind::Reaction(other.to_string()),
        }
    }

    /// Bounded label for metrics.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            EventKind::RaiseHand => "raise_hand",
            EventKind::LowerHand => "lower_hand",
            EventKind::ClearHandQueue => "clear_hand_queue",
            EventKind::ChatMessage => "chat_message",
            EventKind::RecordingStarted => "recording_started",
            EventKind::RecordingStopped => "recording_stopped",
            EventKind::ScreenShareStarted => "screen_share_started",
            EventKind::ScreenShareStopped => "screen_share_stopped",
            EventKind::Custom(_) => "custom",
            EventKind::Reaction(_) => "reaction",
        }
    }
}

/// A transport event normalized into one stream tagged by kind.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelEvent {
    pub kind: EventKind,
    /// Participant the event originates from. For screen-share events this is
    /// the sharer and carries no display name.
    pub sender: Option<Participant>,
    pub payload: Value,
}

impl From<TransportEvent> for ChannelEvent {
    fn from(event: TransportEvent) -> Self {
        match event {
            TransportEvent::Custom {
                sender,
                event_type,
                payload,
            } => ChannelEvent {
                kind: EventKind::from_custom(&event_type),
                sender: Some(sender),
                payload,
            },
            TransportEvent::Reaction {
                sender,
                reaction_type,
                payload,
            } => ChannelEvent {
                kind: EventKind::from_reaction(&reaction_type),
                sender: Some(sender),
                payload,
            },
            TransportEvent::RecordingStarted => ChannelEvent {
                kind: EventKind::RecordingStarted,
                sender: None,
                payload: Value::Null,
            },
            TransportEvent::RecordingStopped => ChannelEvent {
                kind: EventKind::RecordingStopped,
                sender: None,
                payload: Value::Null,
            },
            TransportEvent::ScreenShareStarted { participant_id } => ChannelEvent {
                kind: EventKind::ScreenShareStarted,
                sender: Some(sharer(participant_id)),
                payload: Value::Null,
            },
            TransportEvent::ScreenShareStopped { participant_id } => ChannelEvent {
                kind: EventKind::ScreenShareStopped,
                sender: Some(sharer(participant_id)),
                payload: Value::Null,
            },
        }
    }
}

fn sharer(id: ParticipantId) -> Participant {
    Participant {
        id,
        display_name: String::new(),
    }
}

type Registry = HashMap<EventKind, Vec<mpsc::UnboundedSender<ChannelEvent>>>;

/// A live subscription to one or more event kinds.
///
/// Dropping it (or calling [`Subscription::unsubscribe`]) stops delivery;
/// the registry prunes the closed sender on the next dispatch.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    receiver: mpsc::UnboundedReceiver<ChannelEvent>,
}

impl Subscription {
    /// Receive the next event. `None` once the channel is gone.
    pub async fn recv(&mut self) -> Option<ChannelEvent> {
        self.receiver.recv().await
    }

    /// Stop receiving events.
    pub fn unsubscribe(self) {
        trace!(target: "classroom.channel", subscription_id = self.id, "Unsubscribed");
    }
}

struct Attachment {
    call: Arc<dyn CallHandle>,
    pump_token: CancellationToken,
}

/// Typed publish/subscribe over one session's call.
///
/// Cloning yields another handle to the same channel.
#[derive(Clone)]
pub struct EventChannel {
    attachment: Arc<RwLock<Option<Attachment>>>,
    registry: Arc<Mutex<Registry>>,
    next_subscription_id: Arc<AtomicU64>,
}

impl Default for EventChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventChannel")
            .field(
                "next_subscription_id",
                &self.next_subscription_id.load(Ordering::Relaxed),
            )
            .finish_non_exhaustive()
    }
}

impl EventChannel {
    /// Create a detached channel.
    #[must_use]
    pub fn new() -> Self {
        Self {
            attachment: Arc::new(RwLock::new(None)),
            registry: Arc::new(Mutex::new(HashMap::new())),
            next_subscription_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Attach to a joined call and start pumping its events to subscribers.
    ///
    /// Replaces any previous attachment.
    pub async fn attach(&self, call: Arc<dyn CallHandle>) {
        let mut events = call.subscribe();
        let pump_token = CancellationToken::new();

        let previous = self.attachment.write().await.replace(Attachment {
            call,
            pump_token: pump_token.clone(),
        });
        if let Some(previous) = previous {
            previous.pump_token.cancel();
        }

        let registry = Arc::clone(&self.registry);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = pump_token.cancelled() => break,
                    event = events.recv() => match event {
                        Some(event) => dispatch(&registry, ChannelEvent::from(event)).await,
                        None => {
                            debug!(target: "classroom.channel", "Transport event stream closed");
                            break;
                        }
                    },
                }
            }
        });

        debug!(target: "classroom.channel", "Event channel attached");
    }

    /// Stop delivering events and drop the call handle.
    ///
    /// Events arriving afterwards are discarded.
    pub async fn detach(&self) {
        if let Some(attachment) = self.attachment.write().await.take() {
            attachment.pump_token.cancel();
            debug!(target: "classroom.channel", "Event channel detached");
        }
    }

    /// Whether a call is attached.
    pub async fn is_attached(&self) -> bool {
        self.attachment.read().await.is_some()
    }

    /// Subscribe to one event kind.
    pub async fn subscribe(&self, kind: EventKind) -> Subscription {
        self.subscribe_all(&[kind]).await
    }

    /// Subscribe to several kinds through one ordered stream.
    pub async fn subscribe_all(&self, kinds: &[EventKind]) -> Subscription {
        let (sender, receiver) = mpsc::unbounded_channel();
        let id = self.next_subscription_id.fetch_add(1, Ordering::Relaxed);

        let mut registry = self.registry.lock().await;
        for kind in kinds {
            registry.entry(kind.clone()).or_default().push(sender.clone());
        }

        trace!(
            target: "classroom.channel",
            subscription_id = id,
            kinds = kinds.len(),
            "Subscribed"
        );

        Subscription { id, receiver }
    }

    /// Subscribe to a reaction type.
    pub async fn on_reaction(&self, reaction_type: &str) -> Subscription {
        self.subscribe(EventKind::from_reaction(reaction_type)).await
    }

    /// Broadcast a custom event to every participant, including the sender.
    #[instrument(skip_all, fields(event_type = %event_type))]
    pub async fn publish(&self, event_type: &str, payload: Value) -> Result<(), SessionError> {
        let call = self.call().await?;
        let label = EventKind::from_custom(event_type).label();
        let start = Instant::now();
        let result = call.publish_custom_event(event_type, payload).await;
        metrics::record_transport_latency("publish_custom_event", start.elapsed());
        metrics::record_publish(label, result.is_ok());
        result
    }

    /// Broadcast a reaction with a custom payload.
    #[instrument(skip_all, fields(reaction_type = %reaction_type))]
    pub async fn publish_reaction(
        &self,
        reaction_type: &str,
        payload: Value,
    ) -> Result<(), SessionError> {
        let call = self.call().await?;
        let label = EventKind::from_reaction(reaction_type).label();
        let start = Instant::now();
        let result = call.publish_reaction(reaction_type, payload).await;
        metrics::record_transport_latency("publish_reaction", start.elapsed());
        metrics::record_publish(label, result.is_ok());
        result
    }

    pub async fn start_recording(&self) -> Result<(), SessionError> {
        let call = self.call().await?;
        timed("start_recording", call.start_recording()).await
    }

    pub async fn stop_recording(&self) -> Result<(), SessionError> {
        let call = self.call().await?;
        timed("stop_recording", call.stop_recording()).await
    }

    pub async fn query_recordings(&self) -> Result<Vec<RawRecording>, SessionError> {
        let call = self.call().await?;
        timed("query_recordings", call.query_recordings()).await
    }

    pub async fn toggle_screen_share(&self) -> Result<(), SessionError> {
        let call = self.call().await?;
        timed("toggle_screen_share", call.toggle_screen_share()).await
    }

    pub async fn current_sharer(&self) -> Result<Option<ParticipantId>, SessionError> {
        let call = self.call().await?;
        timed("current_sharer", call.current_sharer()).await
    }

    pub async fn participants(&self) -> Result<Vec<Participant>, SessionError> {
        let call = self.call().await?;
        timed("participants", call.participants()).await
    }

    async fn call(&self) -> Result<Arc<dyn CallHandle>, SessionError> {
        self.attachment
            .read()
            .await
            .as_ref()
            .map(|attachment| Arc::clone(&attachment.call))
            .ok_or_else(|| SessionError::Busy("The session is not joined".to_string()))
    }
}

async fn timed<T>(
    operation: &'static str,
    fut: impl std::future::Future<Output = Result<T, SessionError>>,
) -> Result<T, SessionError> {
    let start = Instant::now();
    let result = fut.await;
    metrics::record_transport_latency(operation, start.elapsed());
    if let Err(e) = &result {
        warn!(
            target: "classroom.channel",
            operation = operation,
            error = %e,
            "Transport call failed"
        );
    }
    result
}

async fn dispatch(registry: &Mutex<Registry>, event: ChannelEvent) {
    metrics::record_channel_event(event.kind.label());

    let mut registry = registry.lock().await;
    let Some(subscribers) = registry.get_mut(&event.kind) else {
        trace!(
            target: "classroom.channel",
            kind = event.kind.label(),
            "No subscribers for event"
        );
        return;
    };

    subscribers.retain(|subscriber| subscriber.send(event.clone()).is_ok());
}
