//! Hand-raise queue manager.
//!
//! Keeps an ordered, deduplicated queue of participants waiting to speak.
//! Every participant materializes the queue from the same broadcasts:
//!
//! - `raised-hand` reaction for P: ignored if P is queued, else appended
//! - `lower_hand` for P: P removed
//! - `clear_hand_queue`: queue emptied
//!
//! After each mutation positions are recomputed: entries sorted by raise
//! timestamp (ties by participant id) and numbered 1..N.

use super::messages::HandRaiseMessage;
use crate::channel::{
    ChannelEvent, EventChannel, EventKind, Subscription, CLEAR_HAND_QUEUE_EVENT,
    LOWER_HAND_EVENT, RAISED_HAND_REACTION,
};
use crate::lifecycle::SessionPhase;
use crate::observability::metrics;
use common::types::{Participant, ParticipantId};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace, warn};

/// One participant waiting to speak.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HandRaiseEntry {
    pub participant_id: ParticipantId,
    pub display_name: String,
    /// Client timestamp of the raise, Unix milliseconds.
    pub raised_at: i64,
    /// 1-based rank in the queue.
    pub position: usize,
}

/// Ordered hand-raise queue.
///
/// At most one entry per participant; positions are dense and 1-based.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandRaiseQueue {
    entries: Vec<HandRaiseEntry>,
}

impl HandRaiseQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `participant`. Returns `false` if they were already queued.
    pub fn raise(&mut self, participant: Participant, raised_at: i64) -> bool {
        if self.contains(&participant.id) {
            return false;
        }
        self.entries.push(HandRaiseEntry {
            participant_id: participant.id,
            display_name: participant.display_name,
            raised_at,
            position: 0,
        });
        self.recompute_positions();
        true
    }

    /// Remove `participant_id`. Returns `false` if they were not queued.
    pub fn lower(&mut self, participant_id: &ParticipantId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| &e.participant_id != participant_id);
        if self.entries.len() == before {
            return false;
        }
        self.recompute_positions();
        true
    }

    /// Empty the queue. Returns the number of removed entries.
    pub fn clear(&mut self) -> usize {
        let removed = self.entries.len();
        self.entries.clear();
        removed
    }

    #[must_use]
    pub fn contains(&self, participant_id: &ParticipantId) -> bool {
        self.entries.iter().any(|e| &e.participant_id == participant_id)
    }

    #[must_use]
    pub fn entries(&self) -> &[HandRaiseEntry] {
        &self.entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn recompute_positions(&mut self) {
        self.entries.sort_by(|a, b| {
            a.raised_at
                .cmp(&b.raised_at)
                .then_with(|| a.participant_id.cmp(&b.participant_id))
        });
        for (index, entry) in self.entries.iter_mut().enumerate() {
            entry.position = index + 1;
        }
    }
}

/// Reactive view of the queue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HandQueueSnapshot {
    pub entries: Vec<HandRaiseEntry>,
    /// Whether the local participant is in the queue.
    pub local_hand_raised: bool,
}

/// Payload of the `raised-hand` reaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RaiseHandPayload {
    pub user_id: ParticipantId,
    pub user_name: String,
    /// Unix milliseconds. Receivers fall back to receipt time when absent.
    #[serde(default)]
    pub timestamp: Option<i64>,
}

/// Payload of the `lower_hand` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LowerHandPayload {
    pub user_id: ParticipantId,
}

/// Handle to a `HandRaiseActor`.
#[derive(Clone, Debug)]
pub struct HandRaiseHandle {
    sender: mpsc::Sender<HandRaiseMessage>,
    channel: EventChannel,
    local: Participant,
    snapshot_rx: watch::Receiver<HandQueueSnapshot>,
}

impl HandRaiseHandle {
    /// Raise the local participant's hand.
    ///
    /// No-op if the local participant is already queued. Publish failures
    /// are logged and swallowed.
    #[instrument(skip_all, fields(participant_id = %self.local.id))]
    pub async fn raise_hand(&self) {
        if self.snapshot_rx.borrow().local_hand_raised {
            debug!(
                target: "classroom.hand_raise",
                participant_id = %self.local.id,
                "Hand already raised, ignoring"
            );
            return;
        }

        let payload = RaiseHandPayload {
            user_id: self.local.id.clone(),
            user_name: self.local.display_name.clone(),
            timestamp: Some(chrono::Utc::now().timestamp_millis()),
        };

        self.publish_swallowing(
            "raise",
            self.channel
                .publish_reaction(RAISED_HAND_REACTION, to_value(&payload)),
        )
        .await;
    }

    /// Lower a hand: the local participant's when `participant_id` is
    /// `None`, otherwise the given participant's (moderator action).
    ///
    /// No-op for a participant who is not queued. Publish failures are
    /// logged and swallowed.
    #[instrument(skip_all, fields(participant_id = %self.local.id))]
    pub async fn lower_hand(&self, participant_id: Option<&ParticipantId>) {
        let target = participant_id.unwrap_or(&self.local.id).clone();

        let queued = self
            .snapshot_rx
            .borrow()
            .entries
            .iter()
            .any(|e| e.participant_id == target);
        if !queued {
            debug!(
                target: "classroom.hand_raise",
                target_id = %target,
                "Participant not in queue, ignoring lower"
            );
            return;
        }

        let payload = LowerHandPayload { user_id: target };
        self.publish_swallowing(
            "lower",
            self.channel.publish(LOWER_HAND_EVENT, to_value(&payload)),
        )
        .await;
    }

    /// Clear the queue for everyone.
    ///
    /// The local queue is emptied even if the broadcast fails.
    #[instrument(skip_all, fields(participant_id = %self.local.id))]
    pub async fn clear_queue(&self) {
        self.publish_swallowing(
            "clear",
            self.channel
                .publish(CLEAR_HAND_QUEUE_EVENT, serde_json::json!({})),
        )
        .await;

        if self.sender.send(HandRaiseMessage::ClearLocal).await.is_err() {
            debug!(target: "classroom.hand_raise", "Hand-raise actor gone, skipping local clear");
        }
    }

    /// Current queue.
    #[must_use]
    pub fn snapshot(&self) -> HandQueueSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    /// Receiver notified on every queue change.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<HandQueueSnapshot> {
        self.snapshot_rx.clone()
    }

    async fn publish_swallowing(
        &self,
        action: &'static str,
        publish: impl std::future::Future<Output = Result<(), crate::errors::SessionError>>,
    ) {
        if let Err(e) = publish.await {
            warn!(
                target: "classroom.hand_raise",
                participant_id = %self.local.id,
                action = action,
                error = %e,
                "Hand-raise broadcast failed"
            );
        }
    }
}

fn to_value<T: Serialize>(payload: &T) -> serde_json::Value {
    serde_json::to_value(payload).unwrap_or(serde_json::Value::Null)
}

/// Actor owning the hand-raise queue for one session.
pub struct HandRaiseActor {
    local: Participant,
    events: Subscription,
    receiver: mpsc::Receiver<HandRaiseMessage>,
    phase_rx: watch::Receiver<SessionPhase>,
    cancel_token: CancellationToken,
    queue: HandRaiseQueue,
    snapshot_tx: watch::Sender<HandQueueSnapshot>,
}

impl HandRaiseActor {
    /// Spawn the actor, subscribed to hand-raise events on `channel`.
    pub async fn spawn(
        local: Participant,
        channel: EventChannel,
        phase_rx: watch::Receiver<SessionPhase>,
        cancel_token: CancellationToken,
        mailbox_capacity: usize,
    ) -> (HandRaiseHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(mailbox_capacity);
        let (snapshot_tx, snapshot_rx) = watch::channel(HandQueueSnapshot::default());

        let events = channel
            .subscribe_all(&[
                EventKind::RaiseHand,
                EventKind::LowerHand,
                EventKind::ClearHandQueue,
            ])
            .await;

        let actor = Self {
            local: local.clone(),
            events,
            receiver,
            phase_rx,
            cancel_token,
            queue: HandRaiseQueue::new(),
            snapshot_tx,
        };

        let task_handle = tokio::spawn(actor.run());

        let handle = HandRaiseHandle {
            sender,
            channel,
            local,
            snapshot_rx,
        };

        (handle, task_handle)
    }

    #[instrument(
        skip_all,
        name = "classroom.actor.hand_raise",
        fields(participant_id = %self.local.id)
    )]
    async fn run(mut self) {
        debug!(target: "classroom.hand_raise", "HandRaiseActor started");

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    debug!(target: "classroom.hand_raise", "HandRaiseActor received cancellation signal");
                    self.discard();
                    break;
                }

                changed = self.phase_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let phase = *self.phase_rx.borrow_and_update();
                    if phase.is_terminal() {
                        self.discard();
                    }
                }

                event = self.events.recv() => match event {
                    Some(event) => self.handle_event(event),
                    None => break,
                },

                msg = self.receiver.recv() => match msg {
                    Some(HandRaiseMessage::ClearLocal) => {
                        if self.queue.clear() > 0 {
                            self.publish_snapshot();
                        }
                    }
                    None => break,
                },
            }
        }

        info!(
            target: "classroom.hand_raise",
            participant_id = %self.local.id,
            "HandRaiseActor stopped"
        );
    }

    fn handle_event(&mut self, event: ChannelEvent) {
        if !self.phase_rx.borrow().accepts_events() {
            trace!(target: "classroom.hand_raise", "Dropping event outside a live session");
            return;
        }

        let changed = match event.kind {
            EventKind::RaiseHand => self.apply_raise(event),
            EventKind::LowerHand => self.apply_lower(event),
            EventKind::ClearHandQueue => self.queue.clear() > 0,
            _ => false,
        };

        if changed {
            self.publish_snapshot();
        }
    }

    fn apply_raise(&mut self, event: ChannelEvent) -> bool {
        let payload: RaiseHandPayload = match serde_json::from_value(event.payload) {
            Ok(payload) => payload,
            Err(e) => {
                debug!(target: "classroom.hand_raise", error = %e, "Malformed raise payload");
                return false;
            }
        };

        let raised_at = payload
            .timestamp
            .unwrap_or_else(|| chrono::Utc::now().timestamp_millis());
        let participant = Participant {
            id: payload.user_id,
            display_name: payload.user_name,
        };
        let participant_id = participant.id.clone();

        if self.queue.raise(participant, raised_at) {
            debug!(
                target: "classroom.hand_raise",
                raised_by = %participant_id,
                queue_len = self.queue.len(),
                "Hand raised"
            );
            true
        } else {
            metrics::record_duplicate_event(EventKind::RaiseHand.label());
            trace!(
                target: "classroom.hand_raise",
                raised_by = %participant_id,
                "Duplicate raise ignored"
            );
            false
        }
    }

    fn apply_lower(&mut self, event: ChannelEvent) -> bool {
        match serde_json::from_value::<LowerHandPayload>(event.payload) {
            Ok(payload) => self.queue.lower(&payload.user_id),
            Err(e) => {
                debug!(target: "classroom.hand_raise", error = %e, "Malformed lower payload");
                false
            }
        }
    }

    fn discard(&mut self) {
        if self.queue.clear() > 0 {
            self.publish_snapshot();
        }
    }

    fn publish_snapshot(&self) {
        metrics::set_hand_queue_depth(self.queue.len());
        self.snapshot_tx.send_replace(HandQueueSnapshot {
            entries: self.queue.entries().to_vec(),
            local_hand_raised: self.queue.contains(&self.local.id),
        });
    }
}
