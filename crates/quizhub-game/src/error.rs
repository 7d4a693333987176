//! Error types for the game engine.

use quizhub_room::HubError;

/// Errors from loading questions or starting a game.
#[derive(Debug, thiserror::Error)]
pub enum GameError {
    /// The question file couldn't be read.
    #[error("failed to read question bank: {0}")]
    Read(#[from] std::io::Error),

    /// The question file isn't a JSON array of questions.
    #[error("invalid question bank: {0}")]
    Parse(#[source] serde_json::Error),

    /// The bank has no questions to ask.
    #[error("question bank is empty")]
    EmptyBank,

    /// The room hub is no longer running.
    #[error(transparent)]
    Hub(#[from] HubError),
}
