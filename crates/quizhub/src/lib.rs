//! # Quizhub
//!
//! Real-time multiplayer quiz server.
//!
//! Clients connect over WebSocket to `/ws/{roomId}?userId={userId}` and
//! join that room. A host starts a game; every member then sees the same
//! questions, the first answer to each question closes it for everyone,
//! and after the last question the room gets a ranked scoreboard. When
//! the room's host disconnects the room is closed for everyone.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use quizhub::prelude::*;
//!
//! # async fn run() -> Result<(), QuizhubError> {
//! let server = QuizServer::builder()
//!     .bind("0.0.0.0:8080")
//!     .questions(QuestionBank::load("questions.json").await?)
//!     .build()
//!     .await?;
//! let engine = server.engine();
//! tokio::spawn(server.run());
//! // later, from an admin surface:
//! engine.start_game(RoomId::from("room-1")).await?;
//! # Ok(())
//! # }
//! ```

mod error;
mod handler;
mod server;

pub use error::QuizhubError;
pub use server::{QuizServer, QuizServerBuilder};

/// Everything needed to embed a quiz server.
pub mod prelude {
    pub use crate::{QuizServer, QuizServerBuilder, QuizhubError};
    pub use quizhub_game::{GameEngine, GameError, GameSnapshot, Question, QuestionBank, QuizConfig};
    pub use quizhub_protocol::{PlayerResult, RoomId, ServerMessage, UserId};
    pub use quizhub_room::{
        HubConfig, HubHandle, JsonFileStore, MemoryStore, PlayerRecord, RoomRecord, RoomSettings,
        RoomStore, StoreError,
    };
}
