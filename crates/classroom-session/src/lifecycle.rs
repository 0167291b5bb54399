//! Session lifecycle controller.
//!
//! Owns the create/join/leave state machine and the transport client:
//!
//! ```text
//! Idle ─► Initializing ─► Ready ─► Creating ─┐
//!                                 └► Joining ─┴► Joined ─► Leaving ─► Left
//!
//! any non-terminal phase ──failure──► Errored(kind)
//! ```
//!
//! `Left` and `Errored` are terminal for an instance. Every transition is
//! published on a `watch` channel; managers treat it as their only source of
//! truth for the current phase.
//!
//! # Concurrency
//!
//! - `initialize` and `create_or_join` are serialized by an operation lock.
//! - `leave` claims `Joined → Leaving` atomically on the phase channel; only
//!   the claiming caller invokes the transport leave, the others wait for
//!   the phase to move past `Leaving`.
//! - `teardown` runs at most once; concurrent callers wait for the first.

use crate::channel::EventChannel;
use crate::config::Config;
use crate::errors::{ErrorKind, SessionError};
use crate::observability::metrics;
use crate::transport::{CallHandle, TokenIssuer, Transport, TransportClient};
use common::secret::ExposeSecret;
use common::types::{Participant, ParticipantId, SessionId};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{watch, Mutex, OnceCell, RwLock};
use tracing::{debug, info, instrument, warn};

/// Lifecycle phase of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Idle,
    Initializing,
    Ready,
    Creating,
    Joining,
    Joined,
    Leaving,
    Left,
    Errored(ErrorKind),
}

impl SessionPhase {
    /// Bounded label for logs and metrics.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            SessionPhase::Idle => "idle",
            SessionPhase::Initializing => "initializing",
            SessionPhase::Ready => "ready",
            SessionPhase::Creating => "creating",
            SessionPhase::Joining => "joining",
            SessionPhase::Joined => "joined",
            SessionPhase::Leaving => "leaving",
            SessionPhase::Left => "left",
            SessionPhase::Errored(_) => "errored",
        }
    }

    /// `Left` and `Errored` end the instance.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionPhase::Left | SessionPhase::Errored(_))
    }

    /// Whether managers apply channel events in this phase.
    ///
    /// The channel attaches just before `Joined` is published, so events
    /// racing the transition are kept.
    #[must_use]
    pub fn accepts_events(&self) -> bool {
        matches!(
            self,
            SessionPhase::Creating | SessionPhase::Joining | SessionPhase::Joined
        )
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionPhase::Errored(kind) => write!(f, "errored ({kind})"),
            other => f.write_str(other.label()),
        }
    }
}

/// Identity of the local participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub participant_id: ParticipantId,
    pub display_name: String,
}

impl Credentials {
    #[must_use]
    pub fn new(participant_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            participant_id: ParticipantId::new(participant_id),
            display_name: display_name.into(),
        }
    }

    /// The local participant these credentials describe.
    #[must_use]
    pub fn participant(&self) -> Participant {
        Participant {
            id: self.participant_id.clone(),
            display_name: self.display_name.clone(),
        }
    }
}

/// Point-in-time view of the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionInfo {
    pub session_id: Option<SessionId>,
    pub phase: SessionPhase,
    pub local_participant: Participant,
    pub participant_count: usize,
}

/// The create/join/leave state machine for one session.
pub struct SessionLifecycle {
    config: Arc<Config>,
    local: Participant,
    transport: Arc<dyn Transport>,
    token_issuer: Arc<dyn TokenIssuer>,
    channel: EventChannel,
    phase_tx: watch::Sender<SessionPhase>,
    op_lock: Mutex<()>,
    client: RwLock<Option<Arc<dyn TransportClient>>>,
    call: RwLock<Option<Arc<dyn CallHandle>>>,
    session_id: RwLock<Option<SessionId>>,
    torn_down: OnceCell<()>,
}

impl fmt::Debug for SessionLifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionLifecycle")
            .field("local", &self.local)
            .field("phase", &*self.phase_tx.borrow())
            .finish_non_exhaustive()
    }
}

impl SessionLifecycle {
    /// Create an idle lifecycle. Nothing touches the transport until
    /// [`SessionLifecycle::initialize`].
    #[must_use]
    pub fn new(
        config: Arc<Config>,
        credentials: &Credentials,
        transport: Arc<dyn Transport>,
        token_issuer: Arc<dyn TokenIssuer>,
        channel: EventChannel,
    ) -> Self {
        let (phase_tx, _) = watch::channel(SessionPhase::Idle);
        Self {
            config,
            local: credentials.participant(),
            transport,
            token_issuer,
            channel,
            phase_tx,
            op_lock: Mutex::new(()),
            client: RwLock::new(None),
            call: RwLock::new(None),
            session_id: RwLock::new(None),
            torn_down: OnceCell::new(),
        }
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        *self.phase_tx.borrow()
    }

    /// Receiver notified on every transition.
    #[must_use]
    pub fn watch_phase(&self) -> watch::Receiver<SessionPhase> {
        self.phase_tx.subscribe()
    }

    /// The local participant.
    #[must_use]
    pub fn local_participant(&self) -> &Participant {
        &self.local
    }

    /// Exchange the local identity for a token and construct the transport
    /// client. `Idle → Initializing → Ready`.
    ///
    /// Calling it again once `Ready` is a no-op.
    ///
    /// # Errors
    ///
    /// - `Config` when the participant id or API key is empty
    /// - `Auth` when the token issuer rejects the participant
    /// - `Transport` when the token request or connect fails
    /// - `Busy` when called from any phase other than `Idle` or `Ready`
    ///
    /// Every error except `Busy` moves the session to `Errored`.
    #[instrument(skip_all, name = "classroom.lifecycle.initialize", fields(participant_id = %self.local.id))]
    pub async fn initialize(&self) -> Result<SessionPhase, SessionError> {
        let _guard = self.op_lock.lock().await;

        match self.phase() {
            SessionPhase::Idle => {}
            SessionPhase::Ready => return Ok(SessionPhase::Ready),
            other => {
                return Err(SessionError::Busy(format!(
                    "Cannot initialize a session that is {other}"
                )))
            }
        }

        self.transition(SessionPhase::Initializing);

        if self.local.id.is_empty() {
            return Err(self.fail(SessionError::Config(
                "participant id is required".to_string(),
            )));
        }
        if self.config.api_key.expose_secret().trim().is_empty() {
            return Err(self.fail(SessionError::Config("API key is required".to_string())));
        }

        let start = Instant::now();
        let token = match self.token_issuer.issue_token(&self.local.id).await {
            Ok(token) => token,
            Err(e) => return Err(self.fail(e)),
        };
        metrics::record_transport_latency("issue_token", start.elapsed());

        let start = Instant::now();
        let client = match self
            .transport
            .connect(&self.config.api_key, &self.local, &token)
            .await
        {
            Ok(client) => client,
            Err(e) => return Err(self.fail(e)),
        };
        metrics::record_transport_latency("connect", start.elapsed());

        *self.client.write().await = Some(client);
        self.transition(SessionPhase::Ready);
        Ok(SessionPhase::Ready)
    }

    /// Create (when `create` is set) or join `session_id`.
    /// `Ready → Creating/Joining → Joined`.
    ///
    /// Re-entry while `Joined` to the same id is a no-op.
    ///
    /// # Errors
    ///
    /// - `Config` for an empty session id (phase unchanged)
    /// - `Busy` while `Leaving`, when joined to a different id, or from any
    ///   phase other than `Ready`
    /// - `Transport` when the transport join fails (session moves to `Errored`)
    #[instrument(
        skip_all,
        name = "classroom.lifecycle.create_or_join",
        fields(session_id = %session_id, create = create)
    )]
    pub async fn create_or_join(
        &self,
        session_id: SessionId,
        create: bool,
    ) -> Result<SessionPhase, SessionError> {
        let _guard = self.op_lock.lock().await;

        match self.phase() {
            SessionPhase::Ready => {}
            SessionPhase::Joined => {
                return if self.session_id.read().await.as_ref() == Some(&session_id) {
                    debug!(
                        target: "classroom.lifecycle",
                        session_id = %session_id,
                        "Already joined, ignoring"
                    );
                    Ok(SessionPhase::Joined)
                } else {
                    Err(SessionError::Busy(
                        "Already joined to another session".to_string(),
                    ))
                };
            }
            SessionPhase::Leaving => {
                return Err(SessionError::Busy(
                    "The session is still leaving".to_string(),
                ))
            }
            other => {
                return Err(SessionError::Busy(format!(
                    "Cannot join a session that is {other}"
                )))
            }
        }

        if session_id.as_str().trim().is_empty() {
            return Err(SessionError::Config("session id is required".to_string()));
        }

        let Some(client) = self.client.read().await.clone() else {
            return Err(self.fail(SessionError::Internal(
                "transport client missing in Ready phase".to_string(),
            )));
        };

        self.transition(if create {
            SessionPhase::Creating
        } else {
            SessionPhase::Joining
        });

        let call = client.call(&self.config.call_type, &session_id);

        let start = Instant::now();
        if let Err(e) = call.join(create).await {
            return Err(self.fail(e));
        }
        metrics::record_transport_latency("join", start.elapsed());

        *self.call.write().await = Some(Arc::clone(&call));
        *self.session_id.write().await = Some(session_id);
        self.channel.attach(call).await;

        self.transition(SessionPhase::Joined);
        Ok(SessionPhase::Joined)
    }

    /// Leave the call. `Joined → Leaving → Left`.
    ///
    /// Only the first concurrent caller invokes the transport leave; the
    /// others wait until the phase moves past `Leaving`. Outside `Joined`
    /// and `Leaving` this is a silent no-op. Returns the resulting phase.
    #[instrument(skip_all, name = "classroom.lifecycle.leave")]
    pub async fn leave(&self) -> SessionPhase {
        let claimed = self.phase_tx.send_if_modified(|phase| {
            if *phase == SessionPhase::Joined {
                *phase = SessionPhase::Leaving;
                true
            } else {
                false
            }
        });

        if claimed {
            metrics::record_phase_transition(SessionPhase::Leaving.label());
            info!(target: "classroom.lifecycle", phase = "leaving", "Session phase changed");

            self.channel.detach().await;

            let call = self.call.write().await.take();
            if let Some(call) = call {
                let start = Instant::now();
                if let Err(e) = call.leave().await {
                    warn!(
                        target: "classroom.lifecycle",
                        error = %e,
                        "Transport leave failed, treating session as left"
                    );
                }
                metrics::record_transport_latency("leave", start.elapsed());
            }

            self.transition(SessionPhase::Left);
            return SessionPhase::Left;
        }

        let mut rx = self.phase_tx.subscribe();
        if let Ok(phase) = rx.wait_for(|phase| *phase != SessionPhase::Leaving).await {
            return *phase;
        }
        self.phase()
    }

    /// Release the transport client. Runs at most once per instance;
    /// concurrent callers wait for the first to finish.
    ///
    /// Waits for an in-flight initialize/join, leaves a still-joined call or
    /// waits for a leave already in progress, disconnects the client and moves a non-terminal session to `Left`.
    #[instrument(skip_all, name = "classroom.lifecycle.teardown")]
    pub async fn teardown(&self) {
        self.torn_down
            .get_or_init(|| async {
                let _guard = self.op_lock.lock().await;

                if matches!(self.phase(), SessionPhase::Joined | SessionPhase::Leaving) {
                    self.leave().await;
                }

                self.channel.detach().await;
                self.call.write().await.take();

                let client = self.client.write().await.take();
                if let Some(client) = client {
                    let start = Instant::now();
                    client.disconnect().await;
                    metrics::record_transport_latency("disconnect", start.elapsed());
                    debug!(target: "classroom.lifecycle", "Transport client disconnected");
                }

                if !self.phase().is_terminal() {
                    self.transition(SessionPhase::Left);
                }
            })
            .await;
    }

    /// Current session snapshot. The participant count is queried from the
    /// transport while joined and is 0 otherwise.
    pub async fn session_info(&self) -> SessionInfo {
        let phase = self.phase();
        let participant_count = if phase == SessionPhase::Joined {
            match self.channel.participants().await {
                Ok(participants) => participants.len(),
                Err(e) => {
                    debug!(target: "classroom.lifecycle", error = %e, "Participant query failed");
                    0
                }
            }
        } else {
            0
        };

        SessionInfo {
            session_id: self.session_id.read().await.clone(),
            phase,
            local_participant: self.local.clone(),
            participant_count,
        }
    }

    fn transition(&self, phase: SessionPhase) {
        self.phase_tx.send_replace(phase);
        metrics::record_phase_transition(phase.label());
        info!(
            target: "classroom.lifecycle",
            participant_id = %self.local.id,
            phase = %phase,
            "Session phase changed"
        );
    }

    fn fail(&self, error: SessionError) -> SessionError {
        warn!(
            target: "classroom.lifecycle",
            participant_id = %self.local.id,
            error = %error,
            "Session lifecycle failed"
        );
        self.transition(SessionPhase::Errored(error.kind()));
        error
    }
}
