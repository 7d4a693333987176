//! `QuizServer` builder and accept loop.
//!
//! This is the entry point for running a quiz server. It ties together
//! all the layers: transport → hub → game engine.

use std::future::Future;
use std::sync::Arc;

use quizhub_game::{GameEngine, QuestionBank, QuizConfig};
use quizhub_protocol::RoomId;
use quizhub_room::{HubConfig, HubHandle, MemoryStore, RoomHub, RoomStore};
use quizhub_transport::{TransportError, WebSocketTransport};

use crate::QuizhubError;
use crate::handler::handle_connection;

/// Builder for configuring and starting a quiz server.
///
/// # Example
///
/// ```rust,ignore
/// use quizhub::prelude::*;
///
/// let server = QuizServer::builder()
///     .bind("0.0.0.0:8080")
///     .questions(QuestionBank::load("questions.json").await?)
///     .store(Arc::new(JsonFileStore::open("db.json").await?))
///     .build()
///     .await?;
/// server.run().await
/// ```
pub struct QuizServerBuilder<S: RoomStore = MemoryStore> {
    bind_addr: String,
    hub_config: HubConfig,
    quiz_config: QuizConfig,
    questions: Option<QuestionBank>,
    store: Arc<S>,
}

impl QuizServerBuilder<MemoryStore> {
    /// Creates a new builder with default settings and an in-memory
    /// room store.
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            hub_config: HubConfig::default(),
            quiz_config: QuizConfig::default(),
            questions: None,
            store: Arc::new(MemoryStore::new()),
        }
    }
}

impl Default for QuizServerBuilder<MemoryStore> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: RoomStore> QuizServerBuilder<S> {
    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    /// Sets queue sizes and connection timings.
    pub fn hub_config(mut self, config: HubConfig) -> Self {
        self.hub_config = config;
        self
    }

    /// Sets the game rules.
    pub fn quiz_config(mut self, config: QuizConfig) -> Self {
        self.quiz_config = config;
        self
    }

    /// Sets the questions games are drawn from. Required.
    pub fn questions(mut self, bank: QuestionBank) -> Self {
        self.questions = Some(bank);
        self
    }

    /// Sets where room records (and so room hosts) are looked up.
    pub fn store<T: RoomStore>(self, store: Arc<T>) -> QuizServerBuilder<T> {
        QuizServerBuilder {
            bind_addr: self.bind_addr,
            hub_config: self.hub_config,
            quiz_config: self.quiz_config,
            questions: self.questions,
            store,
        }
    }

    /// Binds the listener and wires the hub to the game engine.
    pub async fn build(self) -> Result<QuizServer<S>, QuizhubError> {
        let bank = self.questions.ok_or(QuizhubError::MissingQuestions)?;
        let transport = WebSocketTransport::bind(&self.bind_addr).await?;

        let hub_config = self.hub_config.validated();
        let (hub, handle) = RoomHub::new(hub_config.clone(), self.store);
        let engine = GameEngine::new(self.quiz_config, bank, handle.clone());
        let hub = hub.with_processor(Arc::new(engine.clone()));

        Ok(QuizServer {
            transport,
            hub,
            handle,
            engine,
            config: hub_config,
        })
    }
}

/// A quiz server ready to accept connections.
///
/// Grab [`engine`](Self::engine) or [`hub`](Self::hub) before calling
/// [`run`](Self::run) to drive games and inspect rooms while it runs.
pub struct QuizServer<S: RoomStore = MemoryStore> {
    transport: WebSocketTransport,
    hub: RoomHub<S, GameEngine>,
    handle: HubHandle,
    engine: GameEngine,
    config: HubConfig,
}

impl QuizServer<MemoryStore> {
    /// Creates a new builder.
    pub fn builder() -> QuizServerBuilder<MemoryStore> {
        QuizServerBuilder::new()
    }
}

impl<S: RoomStore> QuizServer<S> {
    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    /// The game engine. Clones share state with the running server.
    pub fn engine(&self) -> GameEngine {
        self.engine.clone()
    }

    /// A handle to the room hub.
    pub fn hub(&self) -> HubHandle {
        self.handle.clone()
    }

    /// Starts a game in `room_id` with everyone currently connected.
    /// Returns the number of players.
    pub async fn start_game(&self, room_id: RoomId) -> Result<usize, QuizhubError> {
        Ok(self.engine.start_game(room_id).await?)
    }

    /// Runs the server until the process is terminated.
    pub async fn run(self) -> Result<(), QuizhubError> {
        self.run_until(std::future::pending()).await
    }

    /// Runs the server until `shutdown` completes, then stops the hub.
    /// Closing the hub closes every connection's queue, so clients get a
    /// close frame.
    pub async fn run_until(self, shutdown: impl Future<Output = ()>) -> Result<(), QuizhubError> {
        let QuizServer {
            transport,
            hub,
            handle,
            config,
            ..
        } = self;
        let hub_task = hub.spawn();
        tracing::info!(addr = ?transport.local_addr().ok(), "quiz server running");

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                accepted = transport.accept() => match accepted {
                    Ok(pending) => {
                        let hub = handle.clone();
                        let config = config.clone();
                        tokio::spawn(async move {
                            let addr = pending.peer_addr();
                            match pending.upgrade().await {
                                Ok(conn) => handle_connection(conn, hub, config).await,
                                Err(TransportError::Rejected(reason)) => {
                                    tracing::info!(%addr, %reason, "connection rejected");
                                }
                                Err(e) => {
                                    tracing::debug!(%addr, error = %e, "handshake failed");
                                }
                            }
                        });
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "accept failed");
                    }
                },
                () = &mut shutdown => break,
            }
        }

        tracing::info!("quiz server shutting down");
        handle.shutdown()?;
        if let Err(e) = hub_task.await {
            tracing::error!(error = %e, "hub task failed");
        }
        Ok(())
    }
}
