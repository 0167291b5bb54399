//! Classroom Session Library
//!
//! Real-time session core for the live classroom: one participant's view of
//! a shared call, with the collaboration features layered on top of it:
//!
//! - Session lifecycle (initialize, create/join, leave, teardown)
//! - Raise-hand queue with a deterministic, shared ordering
//! - Chat with local echo and duplicate suppression
//! - Recording toggle with elapsed-time ticker and artifact listing
//! - Single-presenter screen sharing
//!
//! # Architecture
//!
//! ```text
//! ClassroomSession (one per joined call)
//! ├── SessionLifecycle (phase state machine, owns the transport client)
//! ├── EventChannel (typed pub/sub over the call's custom events)
//! └── manager actors, each fed by the channel and the phase watch
//!     ├── HandRaiseActor
//!     ├── ChatActor
//!     ├── RecordingActor
//!     └── ScreenShareActor
//! ```
//!
//! The video transport and the token endpoint sit behind the
//! [`transport::Transport`] and [`transport::TokenIssuer`] traits so the
//! embedding application (and the test utilities) can supply their own.
//!
//! # Modules
//!
//! - [`session`] - The façade the UI talks to
//! - [`lifecycle`] - Phase state machine
//! - [`channel`] - Event fan-out and publish
//! - [`managers`] - Per-feature actors
//! - [`config`] - Configuration from environment
//! - [`errors`] - Error types with stable codes

pub mod channel;
pub mod config;
pub mod errors;
pub mod lifecycle;
pub mod managers;
pub mod observability;
pub mod session;
pub mod transport;

pub use config::Config;
pub use errors::{ErrorKind, SessionError};
pub use lifecycle::{Credentials, SessionInfo, SessionPhase};
pub use session::ClassroomSession;
