//! Transport layer for Quizhub.
//!
//! Provides the [`FrameSource`] and [`FrameSink`] traits that the
//! connection pumps are written against, plus the WebSocket
//! implementation that produces them.
//!
//! A client connects with `GET /ws/{roomId}?userId={userId}`. The room
//! and user are captured during the upgrade handshake as
//! [`ConnectParams`]; a request without either is refused with
//! `400 Bad Request` before the socket is upgraded.
//!
//! # Feature Flags
//!
//! - `websocket` (default): WebSocket transport via `tokio-tungstenite`

mod error;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
#[cfg(feature = "websocket")]
pub use websocket::{
    PendingConnection, WebSocketConnection, WebSocketReceiver,
    WebSocketSender, WebSocketTransport,
};

use std::fmt;
use std::future::Future;

/// Opaque identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Room and user a client asked for in its upgrade request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectParams {
    /// Room identifier taken from the request path.
    pub room_id: String,
    /// User identifier taken from the `userId` query parameter.
    pub user_id: String,
}

impl ConnectParams {
    /// Parses the request target of an upgrade request.
    ///
    /// The room is the path after an optional `ws/` prefix and must be a
    /// single non-empty segment. The user comes from `userId` in the
    /// query string (percent-decoded).
    pub fn parse(path: &str, query: Option<&str>) -> Result<Self, TransportError> {
        let trimmed = path.trim_matches('/');
        let room = match trimmed.strip_prefix("ws") {
            Some(rest) if rest.is_empty() || rest.starts_with('/') => {
                rest.trim_start_matches('/')
            }
            _ => trimmed,
        };
        if room.is_empty() || room.contains('/') {
            return Err(TransportError::Rejected(format!(
                "path {path:?} does not name a room"
            )));
        }

        let user_id = query
            .into_iter()
            .flat_map(|q| q.split('&'))
            .filter_map(|pair| pair.split_once('='))
            .find(|(key, _)| *key == "userId")
            .map(|(_, value)| decode_component(value))
            .transpose()?
            .filter(|value| !value.is_empty())
            .ok_or_else(|| {
                TransportError::Rejected(
                    "userId query parameter is required".into(),
                )
            })?;

        Ok(Self {
            room_id: decode_component(room)?,
            user_id,
        })
    }
}

/// URL-decodes one path or query component. `+` is read as a space.
fn decode_component(raw: &str) -> Result<String, TransportError> {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|decoded| decoded.into_owned())
        .map_err(|e| {
            TransportError::Rejected(format!("{raw:?} is not valid UTF-8: {e}"))
        })
}

/// A frame read from the client side of a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// The payload of a text frame. Binary frames are not surfaced.
    Data(Vec<u8>),
    /// A liveness signal: a pong to one of our pings, or a client ping.
    Pong,
}

/// The read half of a connection.
pub trait FrameSource: Send + 'static {
    /// The error type for read operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Receives the next frame from the remote peer.
    ///
    /// Returns `Ok(None)` when the peer closed the connection.
    fn recv(
        &mut self,
    ) -> impl Future<Output = Result<Option<Frame>, Self::Error>> + Send;
}

/// The write half of a connection.
pub trait FrameSink: Send + 'static {
    /// The error type for write operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Sends one text frame.
    fn send_text(
        &mut self,
        data: &[u8],
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Sends a ping frame.
    fn ping(&mut self) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Sends a close frame and shuts the write side down.
    fn close(&mut self) -> impl Future<Output = Result<(), Self::Error>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_new_and_into_inner() {
        let id = ConnectionId::new(42);
        assert_eq!(id.into_inner(), 42);
    }

    #[test]
    fn test_connection_id_display() {
        assert_eq!(ConnectionId::new(7).to_string(), "conn-7");
    }

    #[test]
    fn test_parse_ws_prefixed_path() {
        let params =
            ConnectParams::parse("/ws/room-1", Some("userId=alice")).unwrap();
        assert_eq!(params.room_id, "room-1");
        assert_eq!(params.user_id, "alice");
    }

    #[test]
    fn test_parse_bare_room_path() {
        let params = ConnectParams::parse("/lobby", Some("x=1&userId=bob")).unwrap();
        assert_eq!(params.room_id, "lobby");
        assert_eq!(params.user_id, "bob");
    }

    #[test]
    fn test_parse_percent_decodes_user() {
        let params =
            ConnectParams::parse("/ws/r", Some("userId=J%C3%BCrgen+K")).unwrap();
        assert_eq!(params.user_id, "Jürgen K");
    }

    #[test]
    fn test_parse_rejects_missing_user() {
        let err = ConnectParams::parse("/ws/r", None).unwrap_err();
        assert!(matches!(err, TransportError::Rejected(_)));

        let err = ConnectParams::parse("/ws/r", Some("userId=")).unwrap_err();
        assert!(err.to_string().contains("userId"));
    }

    #[test]
    fn test_parse_rejects_missing_room() {
        assert!(ConnectParams::parse("/ws/", Some("userId=a")).is_err());
        assert!(ConnectParams::parse("/", Some("userId=a")).is_err());
        assert!(ConnectParams::parse("/ws/a/b", Some("userId=a")).is_err());
    }

    #[test]
    fn test_parse_decodes_room_segment() {
        let params = ConnectParams::parse("/ws/team%20a", Some("userId=x")).unwrap();
        assert_eq!(params.room_id, "team a");
    }

    #[test]
    fn test_parse_rejects_invalid_utf8_user() {
        let err = ConnectParams::parse("/ws/r", Some("userId=%FF%FE")).unwrap_err();
        assert!(matches!(err, TransportError::Rejected(_)));
    }
}
