//! Stateful managers, one actor per concern.
//!
//! ```text
//! EventChannel ──subscriptions──► HandRaiseActor   ──watch──► HandQueueSnapshot
//!                              ├► ChatActor        ──watch──► Vec<ChatMessage>
//!                              ├► RecordingActor   ──watch──► RecordingSnapshot
//!                              └► ScreenShareActor ──watch──► ScreenShareState
//!
//! SessionLifecycle ──watch<SessionPhase>──► every actor
//! ```
//!
//! Each actor owns its state and is the only writer. Handles perform the
//! network calls through the channel and report state changes through the
//! actor's mailbox, so event delivery never waits on the transport.
//! Actors apply events only while the session is live and discard their
//! state when the phase becomes terminal.

pub mod chat;
pub mod hand_raise;
pub mod messages;
pub mod recording;
pub mod screen_share;

pub use chat::{ChatActor, ChatHandle, ChatMessage, Transcript};
pub use hand_raise::{
    HandQueueSnapshot, HandRaiseActor, HandRaiseEntry, HandRaiseHandle, HandRaiseQueue,
};
pub use messages::*;
pub use recording::{
    format_duration, format_elapsed, RecordingActor, RecordingArtifact, RecordingHandle,
    RecordingSnapshot, RecordingStatus,
};
pub use screen_share::{ScreenShareActor, ScreenShareHandle, ScreenShareState};
