//! Screen-share arbiter.
//!
//! At most one participant shares at a time. The local view is a fast-fail
//! check only; the transport's own exclusivity decides.

use super::messages::ScreenShareMessage;
use crate::channel::{ChannelEvent, EventChannel, EventKind, Subscription};
use crate::errors::SessionError;
use crate::lifecycle::SessionPhase;
use crate::observability::metrics;
use common::types::{Participant, ParticipantId};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace};

/// Reactive view of who is sharing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScreenShareState {
    pub active_sharer: Option<ParticipantId>,
    pub local_is_sharing: bool,
}

impl ScreenShareState {
    fn with_sharer(sharer: Option<ParticipantId>, local: &ParticipantId) -> Self {
        let local_is_sharing = sharer.as_ref() == Some(local);
        Self {
            active_sharer: sharer,
            local_is_sharing,
        }
    }
}

/// Handle to a `ScreenShareActor`.
#[derive(Clone, Debug)]
pub struct ScreenShareHandle {
    sender: mpsc::Sender<ScreenShareMessage>,
    channel: EventChannel,
    local: Participant,
    snapshot_rx: watch::Receiver<ScreenShareState>,
}

impl ScreenShareHandle {
    /// Stop sharing if the local participant shares, start if nobody does.
    ///
    /// # Errors
    ///
    /// - `Busy` when another participant is sharing (the transport is not
    ///   contacted) or the session is not joined
    /// - the transport's error when the toggle fails (state unchanged)
    #[instrument(skip_all, fields(participant_id = %self.local.id))]
    pub async fn toggle(&self) -> Result<(), SessionError> {
        let state = self.snapshot_rx.borrow().clone();

        if let Some(sharer) = state.active_sharer.as_ref() {
            if !state.local_is_sharing {
                debug!(
                    target: "classroom.screen_share",
                    sharer = %sharer,
                    "Another participant is sharing, rejecting"
                );
                metrics::record_toggle("screen_share", "busy");
                return Err(SessionError::Busy(
                    "Another participant is already sharing their screen".to_string(),
                ));
            }
        }

        match self.channel.toggle_screen_share().await {
            Ok(()) => {
                metrics::record_toggle("screen_share", "success");
                debug!(
                    target: "classroom.screen_share",
                    stopping = state.local_is_sharing,
                    "Screen share toggled"
                );
                Ok(())
            }
            Err(e) => {
                let status = if matches!(e, SessionError::Busy(_)) {
                    "busy"
                } else {
                    "error"
                };
                metrics::record_toggle("screen_share", status);
                Err(e)
            }
        }
    }

    /// Re-read the current sharer from the transport.
    ///
    /// # Errors
    ///
    /// Returns the transport's error; local state is kept.
    #[instrument(skip_all)]
    pub async fn refresh(&self) -> Result<Option<ParticipantId>, SessionError> {
        let sharer = self.channel.current_sharer().await?;
        self.sender
            .send(ScreenShareMessage::Sync {
                sharer: sharer.clone(),
            })
            .await
            .map_err(|e| SessionError::Internal(format!("channel send failed: {e}")))?;
        Ok(sharer)
    }

    #[must_use]
    pub fn snapshot(&self) -> ScreenShareState {
        self.snapshot_rx.borrow().clone()
    }

    #[must_use]
    pub fn watch(&self) -> watch::Receiver<ScreenShareState> {
        self.snapshot_rx.clone()
    }
}

/// Actor tracking the active sharer for one session.
pub struct ScreenShareActor {
    local: Participant,
    events: Subscription,
    receiver: mpsc::Receiver<ScreenShareMessage>,
    phase_rx: watch::Receiver<SessionPhase>,
    cancel_token: CancellationToken,
    snapshot_tx: watch::Sender<ScreenShareState>,
}

impl ScreenShareActor {
    /// Spawn the actor, subscribed to screen-share notifications on `channel`.
    pub async fn spawn(
        local: Participant,
        channel: EventChannel,
        phase_rx: watch::Receiver<SessionPhase>,
        cancel_token: CancellationToken,
        mailbox_capacity: usize,
    ) -> (ScreenShareHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(mailbox_capacity);
        let (snapshot_tx, snapshot_rx) = watch::channel(ScreenShareState::default());
        let events = channel
            .subscribe_all(&[EventKind::ScreenShareStarted, EventKind::ScreenShareStopped])
            .await;

        let actor = Self {
            local: local.clone(),
            events,
            receiver,
            phase_rx,
            cancel_token,
            snapshot_tx,
        };

        let task_handle = tokio::spawn(actor.run());

        let handle = ScreenShareHandle {
            sender,
            channel,
            local,
            snapshot_rx,
        };

        (handle, task_handle)
    }

    #[instrument(
        skip_all,
        name = "classroom.actor.screen_share",
        fields(participant_id = %self.local.id)
    )]
    async fn run(mut self) {
        debug!(target: "classroom.screen_share", "ScreenShareActor started");

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    debug!(target: "classroom.screen_share", "ScreenShareActor received cancellation signal");
                    self.set_sharer(None);
                    break;
                }

                changed = self.phase_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let phase = *self.phase_rx.borrow_and_update();
                    if phase.is_terminal() {
                        self.set_sharer(None);
                    }
                }

                event = self.events.recv() => match event {
                    Some(event) => self.handle_event(event),
                    None => break,
                },

                msg = self.receiver.recv() => match msg {
                    Some(ScreenShareMessage::Sync { sharer }) => {
                        if self.phase_rx.borrow().accepts_events() {
                            self.set_sharer(sharer);
                        }
                    }
                    None => break,
                },
            }
        }

        info!(
            target: "classroom.screen_share",
            participant_id = %self.local.id,
            "ScreenShareActor stopped"
        );
    }

    fn handle_event(&mut self, event: ChannelEvent) {
        if !self.phase_rx.borrow().accepts_events() {
            trace!(target: "classroom.screen_share", "Dropping event outside a live session");
            return;
        }
        let Some(participant) = event.sender else {
            return;
        };

        match event.kind {
            EventKind::ScreenShareStarted => {
                debug!(
                    target: "classroom.screen_share",
                    sharer = %participant.id,
                    "Screen share started"
                );
                self.set_sharer(Some(participant.id));
            }
            EventKind::ScreenShareStopped => {
                let current = self.snapshot_tx.borrow().active_sharer.clone();
                if current.as_ref() == Some(&participant.id) {
                    debug!(
                        target: "classroom.screen_share",
                        sharer = %participant.id,
                        "Screen share stopped"
                    );
                    self.set_sharer(None);
                } else {
                    trace!(
                        target: "classroom.screen_share",
                        sharer = %participant.id,
                        "Stop for a participant who is not sharing"
                    );
                }
            }
            _ => {}
        }
    }

    fn set_sharer(&self, sharer: Option<ParticipantId>) {
        let next = ScreenShareState::with_sharer(sharer, &self.local.id);
        self.snapshot_tx.send_if_modified(|state| {
            if *state == next {
                false
            } else {
                *state = next;
                true
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_marks_local_sharer() {
        let me = ParticipantId::from("me");

        let state = ScreenShareState::with_sharer(Some(ParticipantId::from("me")), &me);
        assert!(state.local_is_sharing);

        let state = ScreenShareState::with_sharer(Some(ParticipantId::from("other")), &me);
        assert!(!state.local_is_sharing);
        assert_eq!(state.active_sharer, Some(ParticipantId::from("other")));

        assert_eq!(ScreenShareState::with_sharer(None, &me), ScreenShareState::default());
    }
}
