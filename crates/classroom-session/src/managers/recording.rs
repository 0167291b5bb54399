//! Recording coordinator.
//!
//! `NotRecording ⇄ Recording`. A toggle only asks the transport to start or
//! stop; the status changes when the transport confirms with
//! `recording_started` / `recording_stopped`. While a request is in flight
//! the snapshot is marked `awaiting_confirmation` and further toggles are
//! rejected with `Busy`.
//!
//! The elapsed counter starts at 0 on confirmation and is refreshed once per
//! tick from a monotonic start instant, so a delayed tick never drifts.

use super::messages::RecordingMessage;
use crate::channel::{ChannelEvent, EventChannel, EventKind, Subscription};
use crate::errors::SessionError;
use crate::lifecycle::SessionPhase;
use crate::observability::metrics;
use crate::transport::RawRecording;
use chrono::DateTime;
use serde::Serialize;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace, warn};

/// Whether the session is being recorded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordingStatus {
    #[default]
    NotRecording,
    Recording,
}

/// A finished recording from the transport's catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordingArtifact {
    pub filename: String,
    pub url: String,
    pub start_time: String,
    pub end_time: String,
    /// `max(0, end - start)` in whole seconds; 0 if either time is unparsable.
    pub duration_seconds: u64,
}

impl From<RawRecording> for RecordingArtifact {
    fn from(raw: RawRecording) -> Self {
        let duration_seconds = recording_duration(&raw.start_time, &raw.end_time);
        Self {
            filename: raw.filename,
            url: raw.url,
            start_time: raw.start_time,
            end_time: raw.end_time,
            duration_seconds,
        }
    }
}

fn recording_duration(start: &str, end: &str) -> u64 {
    match (
        DateTime::parse_from_rfc3339(start),
        DateTime::parse_from_rfc3339(end),
    ) {
        (Ok(start), Ok(end)) => u64::try_from((end - start).num_seconds()).unwrap_or(0),
        _ => 0,
    }
}

/// Reactive view of the recording state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecordingSnapshot {
    pub status: RecordingStatus,
    /// A start/stop request is waiting for the transport's confirmation.
    pub awaiting_confirmation: bool,
    pub elapsed_seconds: u64,
    pub artifacts: Vec<RecordingArtifact>,
}

/// Format an elapsed counter as `MM:SS`.
#[must_use]
pub fn format_elapsed(seconds: u64) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

/// Format an artifact duration as `{m}m {s}s`.
#[must_use]
pub fn format_duration(seconds: u64) -> String {
    format!("{}m {}s", seconds / 60, seconds % 60)
}

/// Handle to a `RecordingActor`.
#[derive(Clone, Debug)]
pub struct RecordingHandle {
    sender: mpsc::Sender<RecordingMessage>,
    channel: EventChannel,
    snapshot_rx: watch::Receiver<RecordingSnapshot>,
}

impl RecordingHandle {
    /// Ask the transport to start or stop recording, depending on the
    /// current status.
    ///
    /// The status itself only changes on the transport's confirmation.
    ///
    /// # Errors
    ///
    /// - `Busy` when not joined or a request is already awaiting confirmation
    /// - the transport's error when start/stop fails (state unchanged)
    #[instrument(skip_all)]
    pub async fn toggle(&self) -> Result<(), SessionError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(RecordingMessage::BeginToggle { respond_to: tx })
            .await
            .map_err(|e| SessionError::Internal(format!("channel send failed: {e}")))?;

        let status = match rx.await {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                metrics::record_toggle("recording", "busy");
                return Err(e);
            }
            Err(e) => {
                return Err(SessionError::Internal(format!(
                    "response receive failed: {e}"
                )))
            }
        };

        let result = match status {
            RecordingStatus::NotRecording => self.channel.start_recording().await,
            RecordingStatus::Recording => self.channel.stop_recording().await,
        };

        match result {
            Ok(()) => {
                metrics::record_toggle("recording", "success");
                debug!(
                    target: "classroom.recording",
                    from = ?status,
                    "Recording toggle requested, awaiting confirmation"
                );
                Ok(())
            }
            Err(e) => {
                metrics::record_toggle("recording", "error");
                warn!(target: "classroom.recording", error = %e, "Recording toggle failed");
                let _ = self.sender.send(RecordingMessage::ToggleFailed).await;
                Err(e)
            }
        }
    }

    /// Query the transport's recording catalog and replace the artifact
    /// list wholesale.
    ///
    /// # Errors
    ///
    /// Returns the transport's error; the previous list is kept.
    #[instrument(skip_all)]
    pub async fn fetch_artifacts(&self) -> Result<Vec<RecordingArtifact>, SessionError> {
        let recordings = self.channel.query_recordings().await?;
        let artifacts: Vec<RecordingArtifact> =
            recordings.into_iter().map(RecordingArtifact::from).collect();

        debug!(
            target: "classroom.recording",
            count = artifacts.len(),
            "Fetched recording artifacts"
        );

        self.sender
            .send(RecordingMessage::ReplaceArtifacts {
                artifacts: artifacts.clone(),
            })
            .await
            .map_err(|e| SessionError::Internal(format!("channel send failed: {e}")))?;

        Ok(artifacts)
    }

    #[must_use]
    pub fn snapshot(&self) -> RecordingSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    /// Receiver notified on every change, including each elapsed tick.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<RecordingSnapshot> {
        self.snapshot_rx.clone()
    }
}

/// Actor owning the recording state for one session.
pub struct RecordingActor {
    events: Subscription,
    receiver: mpsc::Receiver<RecordingMessage>,
    phase_rx: watch::Receiver<SessionPhase>,
    cancel_token: CancellationToken,
    tick: Duration,
    state: RecordingSnapshot,
    started_at: Option<Instant>,
    ticker: Option<Interval>,
    snapshot_tx: watch::Sender<RecordingSnapshot>,
}

impl RecordingActor {
    /// Spawn the actor, subscribed to recording confirmations on `channel`.
    pub async fn spawn(
        channel: EventChannel,
        phase_rx: watch::Receiver<SessionPhase>,
        cancel_token: CancellationToken,
        tick: Duration,
        mailbox_capacity: usize,
    ) -> (RecordingHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(mailbox_capacity);
        let (snapshot_tx, snapshot_rx) = watch::channel(RecordingSnapshot::default());
        let events = channel
            .subscribe_all(&[EventKind::RecordingStarted, EventKind::RecordingStopped])
            .await;

        let actor = Self {
            events,
            receiver,
            phase_rx,
            cancel_token,
            tick,
            state: RecordingSnapshot::default(),
            started_at: None,
            ticker: None,
            snapshot_tx,
        };

        let task_handle = tokio::spawn(actor.run());

        let handle = RecordingHandle {
            sender,
            channel,
            snapshot_rx,
        };

        (handle, task_handle)
    }

    #[instrument(skip_all, name = "classroom.actor.recording")]
    async fn run(mut self) {
        debug!(target: "classroom.recording", "RecordingActor started");

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    debug!(target: "classroom.recording", "RecordingActor received cancellation signal");
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

                () = next_tick(&mut self.ticker) => {
                    if let Some(started_at) = self.started_at {
                        self.state.elapsed_seconds = started_at.elapsed().as_secs();
                        self.publish_snapshot();
                    }
                }

                event = self.events.recv() => match event {
                    Some(event) => self.handle_event(&event),
                    None => break,
                },

                msg = self.receiver.recv() => match msg {
                    Some(message) => self.handle_message(message),
                    None => break,
                },
            }
        }

        info!(
            target: "classroom.recording",
            status = ?self.state.status,
            "RecordingActor stopped"
        );
    }

    fn handle_message(&mut self, message: RecordingMessage) {
        match message {
            RecordingMessage::BeginToggle { respond_to } => {
                let reply = if *self.phase_rx.borrow() != SessionPhase::Joined {
                    Err(SessionError::Busy("The session is not joined".to_string()))
                } else if self.state.awaiting_confirmation {
                    Err(SessionError::Busy(
                        "A recording request is already pending".to_string(),
                    ))
                } else {
                    self.state.awaiting_confirmation = true;
                    self.publish_snapshot();
                    Ok(self.state.status)
                };
                let _ = respond_to.send(reply);
            }

            RecordingMessage::ToggleFailed => {
                if self.state.awaiting_confirmation {
                    self.state.awaiting_confirmation = false;
                    self.publish_snapshot();
                }
            }

            RecordingMessage::ReplaceArtifacts { artifacts } => {
                if !self.phase_rx.borrow().accepts_events() {
                    trace!(target: "classroom.recording", "Dropping artifact fetch for a closed session");
                    return;
                }
                self.state.artifacts = artifacts;
                self.publish_snapshot();
            }
        }
    }

    fn handle_event(&mut self, event: &ChannelEvent) {
        if !self.phase_rx.borrow().accepts_events() {
            trace!(target: "classroom.recording", "Dropping event outside a live session");
            return;
        }

        match event.kind {
            EventKind::RecordingStarted => {
                self.state.awaiting_confirmation = false;
                if self.state.status == RecordingStatus::Recording {
                    metrics::record_duplicate_event(event.kind.label());
                } else {
                    let now = Instant::now();
                    let mut ticker = tokio::time::interval_at(now + self.tick, self.tick);
                    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

                    self.state.status = RecordingStatus::Recording;
                    self.state.elapsed_seconds = 0;
                    self.started_at = Some(now);
                    self.ticker = Some(ticker);
                    info!(target: "classroom.recording", "Recording started");
                }
                self.publish_snapshot();
            }

            EventKind::RecordingStopped => {
                self.state.awaiting_confirmation = false;
                if self.state.status == RecordingStatus::NotRecording {
                    metrics::record_duplicate_event(event.kind.label());
                } else {
                    info!(
                        target: "classroom.recording",
                        elapsed_seconds = self.started_at.map(|s| s.elapsed().as_secs()),
                        "Recording stopped"
                    );
                }
                self.stop_clock();
                self.publish_snapshot();
            }

            _ => {}
        }
    }

    fn stop_clock(&mut self) {
        self.state.status = RecordingStatus::NotRecording;
        self.state.elapsed_seconds = 0;
        self.started_at = None;
        self.ticker = None;
    }

    fn discard(&mut self) {
        self.stop_clock();
        self.state = RecordingSnapshot::default();
        self.publish_snapshot();
    }

    fn publish_snapshot(&self) {
        self.snapshot_tx.send_replace(self.state.clone());
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn raw(start: &str, end: &str) -> RawRecording {
        RawRecording {
            filename: "lesson.mp4".to_string(),
            url: "https://cdn.example/lesson.mp4".to_string(),
            start_time: start.to_string(),
            end_time: end.to_string(),
        }
    }

    #[test]
    fn test_artifact_duration_in_whole_seconds() {
        let artifact = RecordingArtifact::from(raw(
            "2024-03-01T09:00:00.000Z",
            "2024-03-01T09:45:10.900Z",
        ));
        assert_eq!(artifact.duration_seconds, 45 * 60 + 10);
    }

    #[test]
    fn test_artifact_duration_never_negative() {
        let artifact = RecordingArtifact::from(raw("2024-03-01T10:00:00Z", "2024-03-01T09:00:00Z"));
        assert_eq!(artifact.duration_seconds, 0);
    }

    #[test]
    fn test_artifact_duration_zero_on_bad_timestamp() {
        let artifact = RecordingArtifact::from(raw("yesterday", "2024-03-01T09:00:00Z"));
        assert_eq!(artifact.duration_seconds, 0);
    }

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(0), "00:00");
        assert_eq!(format_elapsed(65), "01:05");
        assert_eq!(format_elapsed(6000), "100:00");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0), "0m 0s");
        assert_eq!(format_duration(2710), "45m 10s");
    }
}
