//! Session transport - owns the game socket for one logical session.
//!
//! The transport runs as a single actor task. Every socket it opens is tagged
//! with a generation number; events from a socket whose generation is no longer
//! the registered one are ignored, so a socket closed by `disconnect()` (or
//! replaced by a newer one) can never trigger a reconnect or deliver frames.
//!
//! Inbound frames are decoded and fenced against the held session id before
//! they are forwarded to the consumer's event channel.

use std::sync::atomic::AtomicU8;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use sleuth_domain::{ScriptId, SessionId};
use sleuth_shared::{InboundEnvelope, OutboundPayload};

use super::core::{BackoffState, ReconnectPolicy};
use super::shared::EVENT_BUFFER;
use super::socket_url::build_socket_url;
use crate::infrastructure::messaging::{
    set_connection_state, ConnectionState, ConnectionStateObserver,
};
use crate::ports::outbound::{
    RandomProvider, SocketConnection, SocketConnector, SocketEvent, TimeProvider, TransportError,
};

/// Why an outbound frame was not sent.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SendError {
    #[error("Not connected")]
    NotConnected,

    #[error("Failed to encode outbound frame: {0}")]
    Encode(String),

    #[error("Transport task has stopped")]
    TransportStopped,
}

/// What the transport reports to its consumer.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Connected { session_id: SessionId },
    Disconnected { intentional: bool },
    Envelope(InboundEnvelope),
}

#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Base `ws://` / `wss://` URL; session and script are appended per connection.
    pub url: String,
    pub reconnect: ReconnectPolicy,
}

enum TransportCommand {
    Connect {
        session_id: Option<SessionId>,
        context_id: Option<ScriptId>,
    },
    Disconnect {
        done: oneshot::Sender<()>,
    },
    Send {
        payload: OutboundPayload,
        /// `None` when nobody waits for the outcome; failures are only logged.
        reply: Option<oneshot::Sender<Result<(), SendError>>>,
    },
}

enum Internal {
    Opened {
        generation: u64,
        connection: SocketConnection,
    },
    ConnectFailed {
        generation: u64,
        error: TransportError,
    },
    Socket {
        generation: u64,
        event: SocketEvent,
    },
}

/// Handle to the transport actor. Cheap to clone.
#[derive(Clone)]
pub struct SessionTransport {
    commands: mpsc::UnboundedSender<TransportCommand>,
    state: ConnectionStateObserver,
    session: watch::Receiver<Option<SessionId>>,
}

impl SessionTransport {
    /// Spawn the transport actor.
    ///
    /// Returns the handle and the receiving end of the single event channel the
    /// actor feeds. The actor stops when every handle is dropped.
    pub fn spawn(
        connector: Arc<dyn SocketConnector>,
        config: TransportConfig,
        clock: Arc<dyn TimeProvider>,
        random: Arc<dyn RandomProvider>,
    ) -> (Self, mpsc::Receiver<TransportEvent>) {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let (session_tx, session_rx) = watch::channel(None);
        let state = Arc::new(AtomicU8::new(ConnectionState::Disconnected.to_u8()));

        let actor = TransportActor {
            connector,
            config,
            clock,
            random,
            state: Arc::clone(&state),
            session: session_tx,
            events: events_tx,
            internal_tx,
            generation: 0,
            socket: None,
            connecting: None,
            context_id: None,
            reconnect: None,
            backoff: BackoffState::default(),
        };
        tokio::spawn(actor.run(commands_rx, internal_rx));

        let handle = Self {
            commands: commands_tx,
            state: ConnectionStateObserver::new(state),
            session: session_rx,
        };
        (handle, events_rx)
    }

    /// Open the socket for `session_id` (or the held / a fresh id).
    ///
    /// Returns immediately; a no-op while a socket is connecting or open.
    pub fn connect(&self, session_id: Option<SessionId>, context_id: Option<ScriptId>) {
        if self
            .commands
            .send(TransportCommand::Connect {
                session_id,
                context_id,
            })
            .is_err()
        {
            tracing::warn!("Connect requested after transport stopped");
        }
    }

    /// Close the socket and cancel any pending reconnect.
    pub async fn disconnect(&self) {
        let (done, wait) = oneshot::channel();
        if self
            .commands
            .send(TransportCommand::Disconnect { done })
            .is_ok()
        {
            let _ = wait.await;
        }
    }

    /// Send `payload` tagged with the current session id.
    pub async fn send(&self, payload: OutboundPayload) -> Result<(), SendError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(TransportCommand::Send {
                payload,
                reply: Some(reply),
            })
            .map_err(|_| SendError::TransportStopped)?;
        response.await.map_err(|_| SendError::TransportStopped)?
    }

    /// Queue `payload` for sending without waiting for the outcome.
    ///
    /// Safe to call from the task that drains the event channel: it never
    /// waits on the actor, which may itself be waiting on that channel.
    pub fn send_detached(&self, payload: OutboundPayload) {
        if self
            .commands
            .send(TransportCommand::Send {
                payload,
                reply: None,
            })
            .is_err()
        {
            tracing::warn!("Send requested after transport stopped");
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state.state()
    }

    pub fn observer(&self) -> ConnectionStateObserver {
        self.state.clone()
    }

    /// Session id currently used for fencing.
    pub fn session_id(&self) -> Option<SessionId> {
        self.session.borrow().clone()
    }

    pub fn watch_session(&self) -> watch::Receiver<Option<SessionId>> {
        self.session.clone()
    }
}

struct ActiveSocket {
    generation: u64,
    outgoing: mpsc::Sender<String>,
    pump: JoinHandle<()>,
}

struct PendingReconnect {
    deadline: Instant,
    session_id: Option<SessionId>,
    context_id: Option<ScriptId>,
}

struct TransportActor {
    connector: Arc<dyn SocketConnector>,
    config: TransportConfig,
    clock: Arc<dyn TimeProvider>,
    random: Arc<dyn RandomProvider>,
    state: Arc<AtomicU8>,
    session: watch::Sender<Option<SessionId>>,
    events: mpsc::Sender<TransportEvent>,
    internal_tx: mpsc::UnboundedSender<Internal>,
    /// Bumped for every connection attempt and on disconnect.
    generation: u64,
    socket: Option<ActiveSocket>,
    connecting: Option<JoinHandle<()>>,
    context_id: Option<ScriptId>,
    /// At most one reconnect is ever pending.
    reconnect: Option<PendingReconnect>,
    backoff: BackoffState,
}

impl TransportActor {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<TransportCommand>,
        mut internal: mpsc::UnboundedReceiver<Internal>,
    ) {
        loop {
            let deadline = self.reconnect.as_ref().map(|pending| pending.deadline);
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
                Some(message) = internal.recv() => self.handle_internal(message).await,
                _ = wait_until(deadline) => self.fire_reconnect(),
            }
        }

        tracing::debug!("Transport handle dropped, shutting down");
        self.reconnect = None;
        self.close_socket();
        self.set_state(ConnectionState::Disconnected);
    }

    async fn handle_command(&mut self, command: TransportCommand) {
        match command {
            TransportCommand::Connect {
                session_id,
                context_id,
            } => self.connect(session_id, context_id),
            TransportCommand::Disconnect { done } => {
                self.disconnect().await;
                let _ = done.send(());
            }
            TransportCommand::Send { payload, reply } => {
                let kind = payload.kind().map(str::to_string);
                let result = self.send(payload).await;
                match reply {
                    Some(reply) => {
                        let _ = reply.send(result);
                    }
                    None => {
                        if let Err(e) = result {
                            tracing::warn!(kind = ?kind, "Queued frame not sent: {}", e);
                        }
                    }
                }
            }
        }
    }

    async fn handle_internal(&mut self, message: Internal) {
        match message {
            Internal::Opened {
                generation,
                connection,
            } => self.on_open(generation, connection).await,
            Internal::ConnectFailed { generation, error } => {
                self.on_connect_failed(generation, error).await
            }
            Internal::Socket { generation, event } => match event {
                SocketEvent::Text(text) => self.on_frame(generation, &text).await,
                SocketEvent::Error(error) => self.on_socket_error(generation, &error),
                SocketEvent::Closed => self.on_close(generation).await,
            },
        }
    }

    fn current_state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(std::sync::atomic::Ordering::SeqCst))
    }

    fn set_state(&self, state: ConnectionState) {
        set_connection_state(&self.state, state);
    }

    fn current_session(&self) -> Option<SessionId> {
        self.session.borrow().clone()
    }

    fn connect(&mut self, session_id: Option<SessionId>, context_id: Option<ScriptId>) {
        if self.current_state().is_active() {
            tracing::debug!("Connect ignored, socket already connecting or open");
            return;
        }

        self.reconnect = None;
        self.close_socket();

        let session_id = session_id
            .or_else(|| self.current_session())
            .unwrap_or_else(|| SessionId::generate(self.clock.now(), self.random.random_u64()));

        // Stored before the socket opens so the first frames are fenced correctly
        self.session.send_replace(Some(session_id.clone()));
        self.context_id = context_id;
        self.generation += 1;
        let generation = self.generation;

        let url = match build_socket_url(&self.config.url, &session_id, context_id) {
            Ok(url) => url,
            Err(e) => {
                tracing::error!(error = %e, "Cannot connect, socket URL is invalid");
                return;
            }
        };

        tracing::info!(
            session_id = %session_id,
            generation,
            "Connecting to game server"
        );
        self.set_state(ConnectionState::Connecting);

        let connector = Arc::clone(&self.connector);
        let internal = self.internal_tx.clone();
        self.connecting = Some(tokio::spawn(async move {
            let message = match connector.connect(&url).await {
                Ok(connection) => Internal::Opened {
                    generation,
                    connection,
                },
                Err(error) => Internal::ConnectFailed { generation, error },
            };
            let _ = internal.send(message);
        }));
    }

    async fn on_open(&mut self, generation: u64, connection: SocketConnection) {
        if generation != self.generation {
            tracing::debug!(generation, "Dropping socket from a superseded attempt");
            return;
        }
        self.connecting = None;

        let SocketConnection {
            outgoing,
            mut incoming,
        } = connection;
        let internal = self.internal_tx.clone();
        let pump = tokio::spawn(async move {
            let mut saw_close = false;
            while let Some(event) = incoming.recv().await {
                saw_close |= event == SocketEvent::Closed;
                if internal.send(Internal::Socket { generation, event }).is_err() {
                    return;
                }
            }
            // Adapter went away without saying so
            if !saw_close {
                let _ = internal.send(Internal::Socket {
                    generation,
                    event: SocketEvent::Closed,
                });
            }
        });

        self.socket = Some(ActiveSocket {
            generation,
            outgoing,
            pump,
        });
        self.backoff.reset();
        self.set_state(ConnectionState::Open);

        let Some(session_id) = self.current_session() else {
            return;
        };
        tracing::info!(session_id = %session_id, "Game socket open");
        self.emit(TransportEvent::Connected { session_id }).await;
    }

    async fn on_connect_failed(&mut self, generation: u64, error: TransportError) {
        if generation != self.generation {
            return;
        }
        self.connecting = None;
        tracing::warn!(error = %error, "Failed to connect to game server");
        self.set_state(ConnectionState::Disconnected);
        self.emit(TransportEvent::Disconnected { intentional: false })
            .await;
        self.schedule_reconnect();
    }

    async fn on_frame(&mut self, generation: u64, text: &str) {
        if !self.is_registered(generation) {
            return;
        }

        let envelope = match InboundEnvelope::decode(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(error = %e, "Dropping malformed frame");
                return;
            }
        };

        match (&envelope.session_id, self.current_session()) {
            (Some(incoming), Some(current)) if *incoming != current => {
                tracing::warn!(
                    incoming = %incoming,
                    current = %current,
                    kind = envelope.message.kind(),
                    "Discarding frame from stale session"
                );
                return;
            }
            (Some(incoming), None) => {
                tracing::info!(session_id = %incoming, "Adopting server-assigned session id");
                self.session.send_replace(Some(incoming.clone()));
            }
            _ => {}
        }

        self.emit(TransportEvent::Envelope(envelope)).await;
    }

    fn on_socket_error(&mut self, generation: u64, error: &str) {
        if !self.is_registered(generation) {
            return;
        }
        // The close that follows drives the reconnect
        tracing::warn!(error, "Game socket error");
        self.set_state(ConnectionState::Disconnected);
    }

    async fn on_close(&mut self, generation: u64) {
        if !self.is_registered(generation) {
            tracing::debug!(generation, "Ignoring close of an unregistered socket");
            return;
        }

        self.close_socket();
        self.set_state(ConnectionState::Disconnected);
        tracing::info!("Game socket closed unexpectedly");
        self.emit(TransportEvent::Disconnected { intentional: false })
            .await;
        self.schedule_reconnect();
    }

    async fn disconnect(&mut self) {
        if self.reconnect.take().is_some() {
            tracing::debug!("Cancelled pending reconnect");
        }
        let had_socket = self.socket.is_some() || self.connecting.is_some();
        self.set_state(ConnectionState::Closing);
        self.generation += 1;
        self.close_socket();
        self.set_state(ConnectionState::Disconnected);
        if had_socket {
            tracing::info!("Disconnected from game server");
        }
        self.emit(TransportEvent::Disconnected { intentional: true })
            .await;
    }

    async fn send(&mut self, payload: OutboundPayload) -> Result<(), SendError> {
        let kind = payload.kind().map(str::to_string);
        let (Some(socket), Some(session_id), ConnectionState::Open) =
            (self.socket.as_ref(), self.current_session(), self.current_state())
        else {
            tracing::warn!(kind = ?kind, "Cannot send, not connected");
            return Err(SendError::NotConnected);
        };

        let text = payload
            .encode(&session_id)
            .map_err(|e| SendError::Encode(e.to_string()))?;
        socket
            .outgoing
            .send(text)
            .await
            .map_err(|_| SendError::NotConnected)?;
        tracing::debug!(kind = ?kind, session_id = %session_id, "Sent frame");
        Ok(())
    }

    fn schedule_reconnect(&mut self) {
        let delay = self.backoff.next_delay_and_advance(&self.config.reconnect);
        tracing::info!(
            delay_ms = delay.as_millis() as u64,
            attempt = self.backoff.attempts(),
            "Scheduling reconnect"
        );
        self.reconnect = Some(PendingReconnect {
            deadline: Instant::now() + delay,
            session_id: self.current_session(),
            context_id: self.context_id,
        });
    }

    fn fire_reconnect(&mut self) {
        let Some(pending) = self.reconnect.take() else {
            return;
        };
        tracing::info!("Reconnecting to game server");
        self.connect(pending.session_id, pending.context_id);
    }

    fn is_registered(&self, generation: u64) -> bool {
        self.socket
            .as_ref()
            .is_some_and(|socket| socket.generation == generation)
    }

    /// Forget the current socket; dropping `outgoing` closes it.
    fn close_socket(&mut self) {
        if let Some(socket) = self.socket.take() {
            socket.pump.abort();
        }
        if let Some(connecting) = self.connecting.take() {
            connecting.abort();
        }
    }

    async fn emit(&self, event: TransportEvent) {
        if self.events.send(event).await.is_err() {
            tracing::debug!("Transport event dropped, consumer is gone");
        }
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory socket connector for transport and coordinator tests.

    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use tokio::sync::mpsc;

    use crate::ports::outbound::{SocketConnection, SocketConnector, SocketEvent, TransportError};

    /// Server side of one fake socket.
    pub struct ServerSocket {
        pub url: String,
        pub received: mpsc::Receiver<String>,
        pub push: mpsc::Sender<SocketEvent>,
    }

    impl ServerSocket {
        pub async fn send_text(&self, text: &str) {
            self.push
                .send(SocketEvent::Text(text.to_string()))
                .await
                .expect("transport listening");
        }

        pub async fn close(&self) {
            self.push
                .send(SocketEvent::Closed)
                .await
                .expect("transport listening");
        }
    }

    pub struct FakeConnector {
        failures: Mutex<VecDeque<TransportError>>,
        attempts: Mutex<Vec<String>>,
        sockets: mpsc::UnboundedSender<ServerSocket>,
    }

    impl FakeConnector {
        pub fn new() -> (Self, mpsc::UnboundedReceiver<ServerSocket>) {
            let (sockets, accepted) = mpsc::unbounded_channel();
            (
                Self {
                    failures: Mutex::new(VecDeque::new()),
                    attempts: Mutex::new(Vec::new()),
                    sockets,
                },
                accepted,
            )
        }

        /// The next `connect` call fails with `error`.
        pub fn fail_next(&self, error: TransportError) {
            self.failures.lock().expect("lock").push_back(error);
        }

        pub fn attempts(&self) -> Vec<String> {
            self.attempts.lock().expect("lock").clone()
        }
    }

    #[async_trait]
    impl SocketConnector for FakeConnector {
        async fn connect(&self, url: &str) -> Result<SocketConnection, TransportError> {
            self.attempts.lock().expect("lock").push(url.to_string());
            if let Some(error) = self.failures.lock().expect("lock").pop_front() {
                return Err(error);
            }

            let (outgoing, received) = mpsc::channel(16);
            let (push, incoming) = mpsc::channel(16);
            let _ = self.sockets.send(ServerSocket {
                url: url.to_string(),
                received,
                push,
            });
            Ok(SocketConnection { outgoing, incoming })
        }
    }
}
