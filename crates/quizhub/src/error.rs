//! Unified error type for the Quizhub server.

use quizhub_game::GameError;
use quizhub_protocol::ProtocolError;
use quizhub_room::{HubError, StoreError};
use quizhub_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant auto-generates `From` impls,
/// so the `?` operator converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum QuizhubError {
    /// A transport-level error (bind, accept, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The room hub stopped.
    #[error(transparent)]
    Hub(#[from] HubError),

    /// The room store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Loading questions or starting a game failed.
    #[error(transparent)]
    Game(#[from] GameError),

    /// The server was built without a question bank.
    #[error("no question bank configured")]
    MissingQuestions,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_transport_error() {
        let err = TransportError::ConnectionClosed("gone".into());
        let err: QuizhubError = err.into();
        assert!(matches!(err, QuizhubError::Transport(_)));
        assert!(err.to_string().contains("gone"));
    }

    #[test]
    fn test_from_protocol_error() {
        let err = ProtocolError::UnknownType("chat".into());
        let err: QuizhubError = err.into();
        assert!(matches!(err, QuizhubError::Protocol(_)));
    }

    #[test]
    fn test_from_hub_and_store_errors() {
        let err: QuizhubError = HubError::Stopped.into();
        assert!(matches!(err, QuizhubError::Hub(_)));

        let err: QuizhubError = StoreError::Unavailable("db".into()).into();
        assert!(matches!(err, QuizhubError::Store(_)));
    }

    #[test]
    fn test_from_game_error() {
        let err: QuizhubError = GameError::EmptyBank.into();
        assert!(matches!(err, QuizhubError::Game(_)));
        assert_eq!(err.to_string(), "question bank is empty");
    }
}
