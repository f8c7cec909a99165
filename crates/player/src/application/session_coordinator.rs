//! Session coordinator
//!
//! Owns one game session end to end: the transport, the reduced game state,
//! and narration. A single loop consumes transport events in delivery order,
//! runs the reducer, publishes the new state, and feeds narration.
//!
//! UI layers hold a [`SessionCoordinator`] handle: control calls go in, state
//! comes out through watch channels and the [`EventBus`].

use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};

use sleuth_domain::{GameState, PlaybackHandle, ScriptId, SessionId};
use sleuth_shared::{ClientMessage, InboundEnvelope, OutboundPayload, ProtocolError, ServerMessage};

use super::narration::{NarrationConfig, NarrationService};
use crate::infrastructure::audio::AudioPlaybackEngine;
use crate::infrastructure::messaging::{ConnectionState, EventBus, SessionEvent};
use crate::infrastructure::websocket::{
    SendError, SessionTransport, TransportConfig, TransportEvent,
};
use crate::ports::outbound::{
    AudioError, AudioOutputFactory, RandomProvider, SocketConnector, SpeechSynthesisPort,
    TimeProvider,
};
use crate::state::reducer::{self, Change};

/// Speaker used when narrating the end-of-game message.
pub const GAME_ENDED_SPEAKER: &str = "Narrator";

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Not connected")]
    NotConnected,

    #[error("Invalid outbound message: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Failed to send: {0}")]
    Send(SendError),

    #[error("Session has been shut down")]
    Closed,
}

impl From<SendError> for SessionError {
    fn from(error: SendError) -> Self {
        match error {
            SendError::NotConnected => SessionError::NotConnected,
            SendError::TransportStopped => SessionError::Closed,
            other => SessionError::Send(other),
        }
    }
}

/// Adapters the coordinator is assembled from.
#[derive(Clone)]
pub struct SessionDependencies {
    pub connector: Arc<dyn SocketConnector>,
    pub synthesizer: Arc<dyn SpeechSynthesisPort>,
    pub audio: Arc<dyn AudioOutputFactory>,
    pub clock: Arc<dyn TimeProvider>,
    pub random: Arc<dyn RandomProvider>,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub transport: TransportConfig,
    pub narration: NarrationConfig,
}

enum CoordinatorCommand {
    StartGame(ScriptId),
    Shutdown { done: oneshot::Sender<()> },
}

/// Handle to a running session. Cheap to clone.
#[derive(Clone)]
pub struct SessionCoordinator {
    commands: mpsc::UnboundedSender<CoordinatorCommand>,
    transport: SessionTransport,
    narration: NarrationService,
    state: watch::Receiver<Option<Arc<GameState>>>,
    events: EventBus,
}

impl SessionCoordinator {
    pub fn spawn(deps: SessionDependencies, config: SessionConfig) -> Self {
        let (transport, transport_events) = SessionTransport::spawn(
            deps.connector,
            config.transport,
            deps.clock.clone(),
            deps.random,
        );
        let engine = Arc::new(AudioPlaybackEngine::new(deps.audio));
        let narration =
            NarrationService::spawn(engine, deps.synthesizer, deps.clock, config.narration);

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(None);
        let events = EventBus::new();

        let session_loop = SessionLoop {
            transport: transport.clone(),
            narration: narration.clone(),
            state: state_tx,
            events: events.clone(),
            pending_start: None,
        };
        tokio::spawn(session_loop.run(
            transport_events,
            commands_rx,
            narration.watch_playback(),
        ));

        Self {
            commands: commands_tx,
            transport,
            narration,
            state: state_rx,
            events,
        }
    }

    // =========================================================================
    // Control
    // =========================================================================

    /// Connect if needed, then ask the server to start `script_id`.
    ///
    /// The start request is sent once the socket is open.
    pub fn start_game(&self, script_id: ScriptId) {
        if self
            .commands
            .send(CoordinatorCommand::StartGame(script_id))
            .is_err()
        {
            tracing::warn!("start_game called after shutdown");
        }
    }

    /// Open the socket without starting a script (fresh or held session id).
    pub fn connect(&self) {
        self.transport.connect(None, None);
    }

    /// Reconnect to an existing session, e.g. after a page reload.
    pub fn resume_session(&self, session_id: SessionId) {
        self.transport.connect(Some(session_id), None);
    }

    pub async fn next_phase(&self) -> Result<(), SessionError> {
        self.send(OutboundPayload::try_from(ClientMessage::NextPhase)?)
            .await
    }

    /// Silence narration locally and ask the server to reset the game.
    pub async fn reset_game(&self) -> Result<(), SessionError> {
        self.narration.clear();
        self.send(OutboundPayload::try_from(ClientMessage::ResetGame)?)
            .await
    }

    /// Send an arbitrary JSON object, tagged with the current session id.
    pub async fn send_message(&self, payload: Value) -> Result<(), SessionError> {
        self.send(OutboundPayload::from_value(payload)?).await
    }

    pub fn set_narration_enabled(&self, enabled: bool) {
        self.narration.set_enabled(enabled);
    }

    pub fn is_narration_enabled(&self) -> bool {
        self.narration.is_enabled()
    }

    /// Create (or resume) the audio output. Call from a user action.
    pub fn initialize_audio(&self) -> Result<(), AudioError> {
        self.narration.initialize_audio()
    }

    /// Disconnect and stop narration. Further control calls fail or no-op.
    pub async fn shutdown(&self) {
        let (done, wait) = oneshot::channel();
        if self
            .commands
            .send(CoordinatorCommand::Shutdown { done })
            .is_ok()
        {
            let _ = wait.await;
        }
    }

    async fn send(&self, payload: OutboundPayload) -> Result<(), SessionError> {
        let kind = payload.kind().unwrap_or("unknown").to_string();
        self.transport.send(payload).await.map_err(|e| {
            tracing::warn!(kind = %kind, "Outbound message not sent: {}", e);
            SessionError::from(e)
        })
    }

    // =========================================================================
    // Observation
    // =========================================================================

    pub fn state(&self) -> Option<Arc<GameState>> {
        self.state.borrow().clone()
    }

    pub fn watch_state(&self) -> watch::Receiver<Option<Arc<GameState>>> {
        self.state.clone()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.transport.state()
    }

    pub fn is_connected(&self) -> bool {
        self.transport.observer().is_connected()
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.transport.session_id()
    }

    pub fn playback(&self) -> Option<PlaybackHandle> {
        self.narration.playback()
    }

    pub fn current_speaking_character(&self) -> Option<String> {
        self.narration.current_speaking_character()
    }

    pub fn current_speech_text(&self) -> Option<String> {
        self.narration.current_speech_text()
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }
}

struct SessionLoop {
    transport: SessionTransport,
    narration: NarrationService,
    state: watch::Sender<Option<Arc<GameState>>>,
    events: EventBus,
    /// Script to start once the socket reports open.
    pending_start: Option<ScriptId>,
}

impl SessionLoop {
    async fn run(
        mut self,
        mut transport_events: mpsc::Receiver<TransportEvent>,
        mut commands: mpsc::UnboundedReceiver<CoordinatorCommand>,
        mut playback: watch::Receiver<Option<PlaybackHandle>>,
    ) {
        let mut watching_playback = true;
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(CoordinatorCommand::StartGame(script_id)) => self.start_game(script_id),
                    Some(CoordinatorCommand::Shutdown { done }) => {
                        self.shutdown(&mut transport_events).await;
                        let _ = done.send(());
                        break;
                    }
                    None => {
                        self.shutdown(&mut transport_events).await;
                        break;
                    }
                },
                event = transport_events.recv() => match event {
                    Some(event) => self.on_transport_event(event).await,
                    None => break,
                },
                changed = playback.changed(), if watching_playback => {
                    if changed.is_err() {
                        watching_playback = false;
                        continue;
                    }
                    let handle = playback.borrow_and_update().clone();
                    self.events.dispatch(SessionEvent::NarrationChanged(handle)).await;
                }
            }
        }
        tracing::debug!("Session loop stopped");
    }

    fn start_game(&mut self, script_id: ScriptId) {
        tracing::info!(script_id = %script_id, "Starting game");
        self.pending_start = Some(script_id);
        if self.transport.state() == ConnectionState::Open {
            self.send_pending_start();
        } else {
            self.transport.connect(None, Some(script_id));
        }
    }

    /// Never waits on the transport: this loop is what drains its events.
    fn send_pending_start(&mut self) {
        let Some(script_id) = self.pending_start.take() else {
            return;
        };
        let payload = match OutboundPayload::try_from(ClientMessage::StartGame { script_id }) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!("Failed to build start_game: {}", e);
                return;
            }
        };
        tracing::debug!(script_id = %script_id, "Queueing start_game");
        self.transport.send_detached(payload);
    }

    async fn on_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Connected { session_id } => {
                self.events
                    .dispatch(SessionEvent::Connected { session_id })
                    .await;
                self.send_pending_start();
            }
            TransportEvent::Disconnected { intentional } => {
                self.events
                    .dispatch(SessionEvent::Disconnected { intentional })
                    .await;
            }
            TransportEvent::Envelope(envelope) => self.on_envelope(envelope).await,
        }
    }

    async fn on_envelope(&mut self, envelope: InboundEnvelope) {
        let current = self.state.borrow().clone();
        let reduction = reducer::apply(current.as_ref(), &envelope.message);

        if reduction.change == Change::EventBeforeSnapshot {
            tracing::warn!(
                session_id = ?envelope.session_id,
                "Narrative event arrived before any game state; not applied"
            );
        }
        if reduction.is_changed() {
            tracing::debug!(
                kind = envelope.message.kind(),
                events = reduction.state.as_ref().map_or(0, |s| s.events.len()),
                "Game state updated"
            );
            self.state.send_replace(reduction.state.clone());
            self.events
                .dispatch(SessionEvent::StateChanged(reduction.state))
                .await;
        }

        match envelope.message {
            ServerMessage::NarrativeEvent(event) => {
                if !event.content.trim().is_empty() {
                    self.narration
                        .enqueue(event.character, event.content, event.voice_id);
                }
            }
            ServerMessage::GameEnded { message } => {
                tracing::info!("Game ended");
                if !message.trim().is_empty() {
                    self.narration
                        .enqueue(GAME_ENDED_SPEAKER, message.clone(), None);
                }
                self.events.dispatch(SessionEvent::GameEnded { message }).await;
            }
            ServerMessage::GameReset => {
                tracing::info!("Game reset by server");
                self.narration.clear();
            }
            ServerMessage::Error { message } => {
                tracing::error!("Server error: {}", message);
                self.events
                    .dispatch(SessionEvent::ServerError { message })
                    .await;
            }
            ServerMessage::GameStateSnapshot(_) | ServerMessage::PhaseChanged { .. } => {}
        }
    }

    async fn shutdown(&mut self, transport_events: &mut mpsc::Receiver<TransportEvent>) {
        tracing::info!("Shutting down session");
        self.pending_start = None;

        // The actor may be blocked emitting into a full channel; keep draining
        // until it acknowledges the disconnect.
        let disconnect = self.transport.disconnect();
        tokio::pin!(disconnect);
        loop {
            tokio::select! {
                _ = &mut disconnect => break,
                event = transport_events.recv() => {
                    if event.is_none() {
                        break;
                    }
                }
            }
        }
        self.narration.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use chrono::{TimeZone, Utc};
    use serde_json::json;

    use super::*;
    use crate::application::narration::testing::ScriptedSynthesizer;
    use crate::infrastructure::audio::{ClockedOutput, ClockedOutputFactory};
    use crate::infrastructure::websocket::transport::testing::{FakeConnector, ServerSocket};
    use crate::infrastructure::websocket::{ReconnectPolicy, EVENT_BUFFER};
    use crate::ports::outbound::platform::{MockRandomProvider, MockTimeProvider};

    const GENERATED: &str = "session_1700000000000_zzz";

    struct Harness {
        coordinator: SessionCoordinator,
        sockets: mpsc::UnboundedReceiver<ServerSocket>,
        synthesizer: Arc<ScriptedSynthesizer>,
    }

    fn harness() -> Harness {
        let mut clock = MockTimeProvider::new();
        clock.expect_now().returning(|| {
            Utc.timestamp_millis_opt(1_700_000_000_000)
                .single()
                .expect("valid ts")
        });
        let mut random = MockRandomProvider::new();
        random.expect_random_u64().returning(|| 46_655);

        let (connector, sockets) = FakeConnector::new();
        let synthesizer = Arc::new(ScriptedSynthesizer::new(1, 24_000));
        let coordinator = SessionCoordinator::spawn(
            SessionDependencies {
                connector: Arc::new(connector),
                synthesizer: synthesizer.clone(),
                audio: Arc::new(ClockedOutputFactory::new(Arc::new(ClockedOutput::new()))),
                clock: Arc::new(clock),
                random: Arc::new(random),
            },
            SessionConfig {
                transport: TransportConfig {
                    url: "ws://game.test/ws".to_string(),
                    reconnect: ReconnectPolicy::default(),
                },
                narration: NarrationConfig::default(),
            },
        );
        Harness {
            coordinator,
            sockets,
            synthesizer,
        }
    }

    async fn wait_for_events(coordinator: &SessionCoordinator, count: usize) -> Arc<GameState> {
        let mut state = coordinator.watch_state();
        let snapshot = state
            .wait_for(|s| s.as_ref().is_some_and(|s| s.events.len() >= count))
            .await
            .expect("state published");
        snapshot.clone().expect("state")
    }

    fn frame(value: Value) -> String {
        value.to_string()
    }

    #[tokio::test(start_paused = true)]
    async fn start_game_connects_then_sends_start() {
        let mut h = harness();

        h.coordinator.start_game(ScriptId::new(7));
        let mut socket = h.sockets.recv().await.expect("socket");
        let sent: Value =
            serde_json::from_str(&socket.received.recv().await.expect("frame")).expect("json");

        assert_eq!(
            sent,
            json!({"type": "start_game", "script_id": 7, "session_id": GENERATED})
        );
        assert!(socket.url.ends_with("script_id=7"));
        assert!(h.coordinator.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn narrative_event_updates_state_and_narrates() {
        let mut h = harness();
        h.coordinator.initialize_audio().expect("audio");
        h.coordinator.resume_session(SessionId::from("s1"));
        let socket = h.sockets.recv().await.expect("socket");

        socket
            .send_text(&frame(json!({
                "type": "game_state",
                "data": {"phase": "intro", "events": [], "session_id": "s1"}
            })))
            .await;
        socket
            .send_text(&frame(json!({
                "type": "ai_action",
                "data": {"character": "Detective", "action": "Let's begin.", "session_id": "s1"}
            })))
            .await;

        let state = wait_for_events(&h.coordinator, 1).await;
        assert_eq!(state.phase.as_str(), "intro");
        assert_eq!(state.events[0].character, "Detective");
        assert_eq!(state.events[0].content, "Let's begin.");

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(
            h.coordinator.current_speaking_character().as_deref(),
            Some("Detective")
        );
        assert_eq!(
            h.coordinator.current_speech_text().as_deref(),
            Some("Let's begin.")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn foreign_session_frames_are_ignored() {
        let mut h = harness();
        h.coordinator.initialize_audio().expect("audio");
        h.coordinator.resume_session(SessionId::from("s1"));
        let socket = h.sockets.recv().await.expect("socket");

        socket
            .send_text(&frame(json!({
                "type": "game_state",
                "data": {"phase": "intro", "session_id": "s1"}
            })))
            .await;
        socket
            .send_text(&frame(json!({
                "type": "ai_action",
                "data": {"character": "Impostor", "content": "Ignore me.", "session_id": "s2"}
            })))
            .await;
        socket
            .send_text(&frame(json!({
                "type": "ai_action",
                "data": {"character": "Maid", "content": "I saw nothing.", "session_id": "s1"}
            })))
            .await;

        let state = wait_for_events(&h.coordinator, 1).await;
        assert_eq!(state.events.len(), 1);
        assert_eq!(state.events[0].character, "Maid");

        tokio::time::sleep(Duration::from_secs(3)).await;
        let speakers: Vec<String> = h
            .synthesizer
            .requests()
            .into_iter()
            .map(|r| r.character)
            .collect();
        assert_eq!(speakers, vec!["Maid"]);
    }

    #[tokio::test(start_paused = true)]
    async fn game_reset_clears_state_and_narration() {
        let mut h = harness();
        h.coordinator.initialize_audio().expect("audio");
        h.coordinator.resume_session(SessionId::from("s1"));
        let socket = h.sockets.recv().await.expect("socket");

        socket
            .send_text(&frame(json!({"type": "game_state", "data": {"phase": "intro"}})))
            .await;
        socket
            .send_text(&frame(json!({
                "type": "ai_action",
                "data": {"character": "Butler", "content": "Dinner is served."}
            })))
            .await;
        wait_for_events(&h.coordinator, 1).await;
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(h.coordinator.playback().is_some());

        socket.send_text(r#"{"type":"game_reset"}"#).await;
        let mut state = h.coordinator.watch_state();
        state.wait_for(Option::is_none).await.expect("reset");
        tokio::time::sleep(Duration::from_millis(1)).await;

        assert!(h.coordinator.state().is_none());
        assert!(h.coordinator.playback().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn game_ended_is_narrated_and_published() {
        let mut h = harness();
        h.coordinator.initialize_audio().expect("audio");
        let seen = Arc::new(Mutex::new(Vec::new()));
        {
            let seen = seen.clone();
            h.coordinator
                .events()
                .subscribe(move |event| seen.lock().expect("lock").push(event))
                .await;
        }
        h.coordinator.resume_session(SessionId::from("s1"));
        let socket = h.sockets.recv().await.expect("socket");

        socket
            .send_text(&frame(json!({
                "type": "game_ended",
                "message": "The butler did it."
            })))
            .await;
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert_eq!(
            h.coordinator.current_speaking_character().as_deref(),
            Some(GAME_ENDED_SPEAKER)
        );
        let seen = seen.lock().expect("lock").clone();
        assert!(seen.contains(&SessionEvent::Connected {
            session_id: SessionId::from("s1")
        }));
        assert!(seen.contains(&SessionEvent::GameEnded {
            message: "The butler did it.".into()
        }));
        assert!(seen
            .iter()
            .any(|e| matches!(e, SessionEvent::NarrationChanged(Some(_)))));
    }

    #[tokio::test(start_paused = true)]
    async fn control_calls_before_connect_report_not_connected() {
        let h = harness();

        assert!(matches!(
            h.coordinator.next_phase().await,
            Err(SessionError::NotConnected)
        ));
        assert!(matches!(
            h.coordinator.send_message(json!({"type": "vote"})).await,
            Err(SessionError::NotConnected)
        ));
        assert!(matches!(
            h.coordinator.send_message(json!([1, 2])).await,
            Err(SessionError::Protocol(ProtocolError::NotAnObject))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn send_message_is_tagged_with_the_session() {
        let mut h = harness();
        h.coordinator.resume_session(SessionId::from("s1"));
        let mut socket = h.sockets.recv().await.expect("socket");
        while !h.coordinator.is_connected() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        h.coordinator
            .send_message(json!({"type": "accuse", "suspect": "Butler", "session_id": "forged"}))
            .await
            .expect("sent");

        let sent: Value =
            serde_json::from_str(&socket.received.recv().await.expect("frame")).expect("json");
        assert_eq!(
            sent,
            json!({"type": "accuse", "suspect": "Butler", "session_id": "s1"})
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn start_game_while_open_survives_an_event_backlog() {
        let mut h = harness();
        let backlog = EVENT_BUFFER * 4;
        let applied = Arc::new(AtomicUsize::new(0));
        {
            let applied = applied.clone();
            h.coordinator
                .events()
                .subscribe(move |event| {
                    if matches!(event, SessionEvent::StateChanged(Some(_))) {
                        // Slow UI: the loop falls behind the transport
                        std::thread::sleep(Duration::from_millis(1));
                        applied.fetch_add(1, Ordering::SeqCst);
                    }
                })
                .await;
        }
        h.coordinator.resume_session(SessionId::from("s1"));
        let mut socket = h.sockets.recv().await.expect("socket");

        socket
            .send_text(&frame(json!({
                "type": "game_state",
                "data": {"phase": "intro", "events": [], "session_id": "s1"}
            })))
            .await;
        for i in 0..backlog {
            socket
                .send_text(&frame(json!({
                    "type": "ai_action",
                    "data": {"character": "Inspector", "content": format!("Clue {i}"), "session_id": "s1"}
                })))
                .await;
        }

        h.coordinator.start_game(ScriptId::new(7));
        tokio::time::timeout(Duration::from_secs(20), h.coordinator.next_phase())
            .await
            .expect("next_phase returned")
            .expect("next_phase sent");

        let state = tokio::time::timeout(
            Duration::from_secs(20),
            wait_for_events(&h.coordinator, backlog),
        )
        .await
        .expect("backlog applied");
        assert_eq!(state.events.len(), backlog);
        tokio::time::timeout(Duration::from_secs(5), async {
            while applied.load(Ordering::SeqCst) < backlog + 1 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("every state change dispatched");

        let mut kinds = Vec::new();
        for _ in 0..2 {
            let sent: Value =
                serde_json::from_str(&socket.received.recv().await.expect("frame")).expect("json");
            kinds.push(sent["type"].as_str().expect("type").to_string());
        }
        kinds.sort();
        assert_eq!(kinds, vec!["next_phase", "start_game"]);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_disconnects() {
        let mut h = harness();
        h.coordinator.start_game(ScriptId::new(1));
        let _socket = h.sockets.recv().await.expect("socket");
        while !h.coordinator.is_connected() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        h.coordinator.shutdown().await;

        assert_eq!(h.coordinator.connection_state(), ConnectionState::Disconnected);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(h.sockets.try_recv().is_err());
    }
}
