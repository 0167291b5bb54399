//! Mailbox message types for the manager actors.
//!
//! Handles perform transport calls themselves and only send state changes
//! to their actor; request/reply uses `tokio::sync::oneshot`.

use super::chat::ChatMessage;
use super::recording::{RecordingArtifact, RecordingStatus};
use crate::errors::SessionError;
use common::types::ParticipantId;
use tokio::sync::oneshot;

/// Messages sent to `HandRaiseActor`.
#[derive(Debug)]
pub enum HandRaiseMessage {
    /// Empty the queue locally after this participant published a clear.
    ClearLocal,
}

/// Messages sent to `ChatActor`.
#[derive(Debug)]
pub enum ChatMessageCommand {
    /// Append a message sent by the local participant (local echo).
    AppendLocal {
        message: ChatMessage,
        /// Acknowledged once the transcript snapshot includes the message.
        respond_to: oneshot::Sender<()>,
    },
}

/// Messages sent to `RecordingActor`.
#[derive(Debug)]
pub enum RecordingMessage {
    /// Claim the single in-flight toggle slot.
    BeginToggle {
        /// Current status, or `Busy` when not joined or already awaiting.
        respond_to: oneshot::Sender<Result<RecordingStatus, SessionError>>,
    },

    /// The start/stop request failed; release the toggle slot.
    ToggleFailed,

    /// Replace the artifact catalog wholesale.
    ReplaceArtifacts { artifacts: Vec<RecordingArtifact> },
}

/// Messages sent to `ScreenShareActor`.
#[derive(Debug)]
pub enum ScreenShareMessage {
    /// Adopt the transport's view of the current sharer.
    Sync { sharer: Option<ParticipantId> },
}
