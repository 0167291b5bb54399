//! `ClassroomSession` - the façade the embedding UI talks to.
//!
//! Composes the lifecycle controller, the event channel and the four
//! manager actors for one session. Everything is owned by the instance;
//! nothing is global.
//!
//! # Leave ordering
//!
//! 1. Local recording/screen-share publishing is left to the transport's
//!    leave semantics
//! 2. `SessionLifecycle::leave`
//! 3. `SessionLifecycle::teardown`
//! 4. Manager actors are stopped and their state discarded
//! 5. `wait_closed` resolves, only once the session is `Left`
//!
//! Explicit `leave` and drop-time cleanup may race; both paths go through
//! the idempotent lifecycle operations.

use crate::channel::EventChannel;
use crate::config::Config;
use crate::errors::SessionError;
use crate::lifecycle::{Credentials, SessionInfo, SessionLifecycle, SessionPhase};
use crate::managers::{
    ChatActor, ChatHandle, ChatMessage, HandQueueSnapshot, HandRaiseActor, HandRaiseHandle,
    RecordingActor, RecordingArtifact, RecordingHandle, RecordingSnapshot, ScreenShareActor,
    ScreenShareHandle, ScreenShareState,
};
use crate::transport::{TokenIssuer, Transport};
use common::types::{Participant, ParticipantId, SessionId};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// One live classroom session for the local participant.
pub struct ClassroomSession {
    config: Arc<Config>,
    credentials: Credentials,
    transport: Arc<dyn Transport>,
    token_issuer: Arc<dyn TokenIssuer>,
    lifecycle: Arc<SessionLifecycle>,
    hand_raise: HandRaiseHandle,
    chat: ChatHandle,
    recording: RecordingHandle,
    screen_share: ScreenShareHandle,
    cancel_token: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    closed_tx: watch::Sender<bool>,
}

impl std::fmt::Debug for ClassroomSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassroomSession")
            .field("config", &self.config)
            .field("lifecycle", &self.lifecycle)
            .finish_non_exhaustive()
    }
}

impl ClassroomSession {
    /// Build an idle session and spawn its manager actors.
    ///
    /// Nothing touches the transport until [`ClassroomSession::initialize`]
    /// (or the first `create`/`join`).
    pub async fn new(
        config: Arc<Config>,
        credentials: Credentials,
        transport: Arc<dyn Transport>,
        token_issuer: Arc<dyn TokenIssuer>,
    ) -> Self {
        let channel = EventChannel::new();
        let lifecycle = Arc::new(SessionLifecycle::new(
            Arc::clone(&config),
            &credentials,
            Arc::clone(&transport),
            Arc::clone(&token_issuer),
            channel.clone(),
        ));

        let local = credentials.participant();
        let cancel_token = CancellationToken::new();
        let capacity = config.mailbox_capacity;

        let (hand_raise, hand_raise_task) = HandRaiseActor::spawn(
            local.clone(),
            channel.clone(),
            lifecycle.watch_phase(),
            cancel_token.child_token(),
            capacity,
        )
        .await;

        let (chat, chat_task) = ChatActor::spawn(
            local.clone(),
            channel.clone(),
            lifecycle.watch_phase(),
            cancel_token.child_token(),
            capacity,
        )
        .await;

        let (recording, recording_task) = RecordingActor::spawn(
            channel.clone(),
            lifecycle.watch_phase(),
            cancel_token.child_token(),
            config.recording_tick,
            capacity,
        )
        .await;

        let (screen_share, screen_share_task) = ScreenShareActor::spawn(
            local,
            channel,
            lifecycle.watch_phase(),
            cancel_token.child_token(),
            capacity,
        )
        .await;

        let (closed_tx, _) = watch::channel(false);

        Self {
            config,
            credentials,
            transport,
            token_issuer,
            lifecycle,
            hand_raise,
            chat,
            recording,
            screen_share,
            cancel_token,
            tasks: Mutex::new(vec![
                hand_raise_task,
                chat_task,
                recording_task,
                screen_share_task,
            ]),
            closed_tx,
        }
    }

    /// Exchange the local identity for a token and connect. `Idle → Ready`.
    ///
    /// # Errors
    ///
    /// See [`SessionLifecycle::initialize`].
    pub async fn initialize(&self) -> Result<SessionPhase, SessionError> {
        self.lifecycle.initialize().await
    }

    /// Create `session_id` on the transport and join it.
    ///
    /// Initializes first when still `Idle`.
    ///
    /// # Errors
    ///
    /// See [`SessionLifecycle::create_or_join`].
    pub async fn create(&self, session_id: SessionId) -> Result<SessionPhase, SessionError> {
        self.enter(session_id, true).await
    }

    /// Join an existing `session_id`.
    ///
    /// Initializes first when still `Idle`.
    ///
    /// # Errors
    ///
    /// See [`SessionLifecycle::create_or_join`].
    pub async fn join(&self, session_id: SessionId) -> Result<SessionPhase, SessionError> {
        self.enter(session_id, false).await
    }

    #[instrument(skip_all, name = "classroom.session.enter", fields(session_id = %session_id, create = create))]
    async fn enter(&self, session_id: SessionId, create: bool) -> Result<SessionPhase, SessionError> {
        if self.lifecycle.phase() == SessionPhase::Idle {
            self.lifecycle.initialize().await?;
        }

        self.lifecycle.create_or_join(session_id, create).await?;

        if let Err(e) = self.recording.fetch_artifacts().await {
            warn!(target: "classroom.session", error = %e, "Initial recording fetch failed");
        }
        if let Err(e) = self.screen_share.refresh().await {
            warn!(target: "classroom.session", error = %e, "Initial screen-share sync failed");
        }

        // A concurrent leave may have landed during the initial sync
        Ok(self.lifecycle.phase())
    }

    /// Leave the session and release everything it holds.
    ///
    /// Safe to call concurrently and repeatedly; returns the final phase
    /// (`Left`, or `Errored` for a session that failed earlier).
    #[instrument(skip_all, name = "classroom.session.leave")]
    pub async fn leave(&self) -> SessionPhase {
        self.lifecycle.leave().await;
        self.lifecycle.teardown().await;

        self.cancel_token.cancel();
        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().await.drain(..).collect();
        for task in tasks {
            if let Err(e) = task.await {
                warn!(target: "classroom.session", error = %e, "Manager task ended abnormally");
            }
        }

        let phase = self.lifecycle.phase();
        let notified = self.closed_tx.send_if_modified(|closed| {
            if *closed {
                false
            } else {
                *closed = true;
                true
            }
        });
        if notified {
            info!(
                target: "classroom.session",
                participant_id = %self.credentials.participant_id,
                phase = %phase,
                "Session closed"
            );
        }

        phase
    }

    /// Resolves once [`ClassroomSession::leave`] has finished.
    pub async fn wait_closed(&self) {
        let mut rx = self.closed_tx.subscribe();
        let _ = rx.wait_for(|closed| *closed).await;
    }

    /// Replace an errored session with a freshly initialized one.
    ///
    /// Tears this instance down first.
    ///
    /// # Errors
    ///
    /// - `Busy` when this session is not `Errored`
    /// - the new session's initialization error
    #[instrument(skip_all, name = "classroom.session.retry")]
    pub async fn retry(&self) -> Result<ClassroomSession, SessionError> {
        let phase = self.lifecycle.phase();
        if !matches!(phase, SessionPhase::Errored(_)) {
            return Err(SessionError::Busy(format!(
                "Only a failed session can be retried, this one is {phase}"
            )));
        }

        self.leave().await;

        info!(
            target: "classroom.session",
            participant_id = %self.credentials.participant_id,
            "Retrying session with fresh state"
        );

        let fresh = ClassroomSession::new(
            Arc::clone(&self.config),
            self.credentials.clone(),
            Arc::clone(&self.transport),
            Arc::clone(&self.token_issuer),
        )
        .await;
        fresh.initialize().await?;
        Ok(fresh)
    }

    // Reactive reads

    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        self.lifecycle.phase()
    }

    #[must_use]
    pub fn watch_phase(&self) -> watch::Receiver<SessionPhase> {
        self.lifecycle.watch_phase()
    }

    pub async fn session_info(&self) -> SessionInfo {
        self.lifecycle.session_info().await
    }

    #[must_use]
    pub fn local_participant(&self) -> &Participant {
        self.lifecycle.local_participant()
    }

    #[must_use]
    pub fn hand_queue(&self) -> HandQueueSnapshot {
        self.hand_raise.snapshot()
    }

    #[must_use]
    pub fn watch_hand_queue(&self) -> watch::Receiver<HandQueueSnapshot> {
        self.hand_raise.watch()
    }

    #[must_use]
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.chat.messages()
    }

    #[must_use]
    pub fn watch_messages(&self) -> watch::Receiver<Vec<ChatMessage>> {
        self.chat.watch()
    }

    #[must_use]
    pub fn recording(&self) -> RecordingSnapshot {
        self.recording.snapshot()
    }

    #[must_use]
    pub fn watch_recording(&self) -> watch::Receiver<RecordingSnapshot> {
        self.recording.watch()
    }

    #[must_use]
    pub fn screen_share(&self) -> ScreenShareState {
        self.screen_share.snapshot()
    }

    #[must_use]
    pub fn watch_screen_share(&self) -> watch::Receiver<ScreenShareState> {
        self.screen_share.watch()
    }

    // Intents

    pub async fn raise_hand(&self) {
        self.hand_raise.raise_hand().await;
    }

    /// Lower the local hand, or another participant's when `participant_id`
    /// is given. Who may lower other hands is up to the embedding application.
    pub async fn lower_hand(&self, participant_id: Option<&ParticipantId>) {
        self.hand_raise.lower_hand(participant_id).await;
    }

    pub async fn clear_queue(&self) {
        self.hand_raise.clear_queue().await;
    }

    /// Returns the sent message, or `None` for blank input or when not joined.
    pub async fn send_message(&self, text: &str) -> Option<ChatMessage> {
        self.chat.send(text).await
    }

    /// # Errors
    ///
    /// See [`RecordingHandle::toggle`].
    pub async fn toggle_recording(&self) -> Result<(), SessionError> {
        self.recording.toggle().await
    }

    /// # Errors
    ///
    /// See [`RecordingHandle::fetch_artifacts`].
    pub async fn fetch_artifacts(&self) -> Result<Vec<RecordingArtifact>, SessionError> {
        self.recording.fetch_artifacts().await
    }

    /// # Errors
    ///
    /// See [`ScreenShareHandle::toggle`].
    pub async fn toggle_screen_share(&self) -> Result<(), SessionError> {
        self.screen_share.toggle().await
    }
}

impl Drop for ClassroomSession {
    fn drop(&mut self) {
        self.cancel_token.cancel();

        if *self.closed_tx.borrow() {
            return;
        }

        // Dropped without leave: finish the cleanup in the background.
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let lifecycle = Arc::clone(&self.lifecycle);
                runtime.spawn(async move {
                    lifecycle.leave().await;
                    lifecycle.teardown().await;
                });
                debug!(target: "classroom.session", "Session dropped, cleanup spawned");
            }
            Err(_) => {
                warn!(
                    target: "classroom.session",
                    "Session dropped outside a runtime, transport client not disconnected"
                );
            }
        }
    }
}
