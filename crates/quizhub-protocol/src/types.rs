//! Core protocol types for Quizhub's wire format.
//!
//! Everything here is either serialized to a client ([`ServerMessage`],
//! [`PlayerResult`]) or decoded from one ([`InboundEnvelope`],
//! [`ClientMessage`]). [`RoutedMessage`] is the one exception: it pairs a
//! server message with its room for internal dispatch and is never
//! serialized as a whole.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ProtocolError;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// Identifier of a room, taken from the connection path.
///
/// A newtype wrapper so a `RoomId` can't be passed where a `UserId` is
/// expected, even though both are strings underneath.
/// `#[serde(transparent)]` serializes it as the bare string.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    /// Creates a room id from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrows the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RoomId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for RoomId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Identifier of a participant, taken from the `userId` query parameter.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Creates a user id from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrows the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for UserId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Scores keyed by user. A `BTreeMap` so the scoreboard serializes in a
/// stable order.
pub type Scoreboard = BTreeMap<UserId, u32>;

// ---------------------------------------------------------------------------
// Server → client
// ---------------------------------------------------------------------------

/// One line of the final ranking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerResult {
    pub user_id: UserId,
    pub score: u32,
    pub rank: u32,
}

/// Messages the server broadcasts to every connection in a room.
///
/// `#[serde(tag = "type", content = "payload")]` produces "adjacently
/// tagged" JSON:
///   `{ "type": "user_joined", "payload": { "userId": "alice" } }`
///
/// Variant names become snake_case tags; field names inside a payload
/// are camelCase, which is what the browser client reads.
///
/// There is deliberately no way to put a question's answer into
/// `QuestionStart`: it carries the statement and choices only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerMessage {
    /// A connection for `user_id` registered with the room.
    #[serde(rename_all = "camelCase")]
    UserJoined { user_id: UserId },

    /// A non-host participant disconnected.
    #[serde(rename_all = "camelCase")]
    UserLeft { user_id: UserId },

    /// The host disconnected and the room is being torn down.
    RoomClosed { message: String },

    /// A new question window opened.
    #[serde(rename_all = "camelCase")]
    QuestionStart {
        question_number: u32,
        question: String,
        choices: Vec<String>,
    },

    /// The question window closed on `user_id`'s answer.
    #[serde(rename_all = "camelCase")]
    AnswerResult {
        user_id: UserId,
        is_correct: bool,
        correct_answer: String,
        scores: Scoreboard,
    },

    /// Final ranking, best first.
    GameOver(Vec<PlayerResult>),
}

impl ServerMessage {
    /// The wire `type` tag, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UserJoined { .. } => "user_joined",
            Self::UserLeft { .. } => "user_left",
            Self::RoomClosed { .. } => "room_closed",
            Self::QuestionStart { .. } => "question_start",
            Self::AnswerResult { .. } => "answer_result",
            Self::GameOver(_) => "game_over",
        }
    }
}

/// A server message addressed to every member of one room.
///
/// The room id is dispatch metadata: the hub uses it to find recipients
/// and serializes only `message`.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutedMessage {
    pub room_id: RoomId,
    pub message: ServerMessage,
}

impl RoutedMessage {
    pub fn new(room_id: RoomId, message: ServerMessage) -> Self {
        Self { room_id, message }
    }
}

// ---------------------------------------------------------------------------
// Client → server
// ---------------------------------------------------------------------------

/// The outer shape of every client frame, before the payload is
/// interpreted.
///
/// Decoding happens in two steps so that "not an envelope at all" and
/// "an envelope of a type we don't handle" can be told apart and logged
/// differently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

/// Payload of an `answer` frame.
#[derive(Deserialize)]
struct AnswerPayload {
    answer: String,
}

/// Messages a client may send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    /// The user's pick for the current question.
    Answer { answer: String },
}

impl ClientMessage {
    /// Interprets a decoded envelope.
    ///
    /// # Errors
    /// - `UnknownType` if `kind` is not a client message type.
    /// - `InvalidPayload` if the payload doesn't match the type.
    pub fn from_envelope(envelope: InboundEnvelope) -> Result<Self, ProtocolError> {
        match envelope.kind.as_str() {
            "answer" => {
                let payload = envelope.payload.unwrap_or(serde_json::Value::Null);
                let AnswerPayload { answer } = serde_json::from_value(payload)
                    .map_err(|source| ProtocolError::InvalidPayload {
                        kind: envelope.kind.clone(),
                        source,
                    })?;
                Ok(Self::Answer { answer })
            }
            _ => Err(ProtocolError::UnknownType(envelope.kind)),
        }
    }

    /// Decodes a raw client frame.
    pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        let envelope: InboundEnvelope =
            serde_json::from_slice(data).map_err(ProtocolError::Decode)?;
        Self::from_envelope(envelope)
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    //! The browser client parses these exact JSON shapes, so the tests
    //! pin the serde attributes down.

    use super::*;
    use serde_json::json;

    fn to_value(msg: &ServerMessage) -> serde_json::Value {
        serde_json::to_value(msg).unwrap()
    }

    #[test]
    fn test_ids_serialize_as_plain_strings() {
        assert_eq!(serde_json::to_string(&UserId::from("alice")).unwrap(), "\"alice\"");
        assert_eq!(serde_json::to_string(&RoomId::from("r1")).unwrap(), "\"r1\"");
        assert_eq!(RoomId::from("r1").to_string(), "r1");
    }

    #[test]
    fn test_user_joined_shape() {
        let msg = ServerMessage::UserJoined { user_id: "alice".into() };
        assert_eq!(
            to_value(&msg),
            json!({ "type": "user_joined", "payload": { "userId": "alice" } })
        );
    }

    #[test]
    fn test_user_left_shape() {
        let msg = ServerMessage::UserLeft { user_id: "bob".into() };
        assert_eq!(
            to_value(&msg),
            json!({ "type": "user_left", "payload": { "userId": "bob" } })
        );
    }

    #[test]
    fn test_room_closed_shape() {
        let msg = ServerMessage::RoomClosed { message: "bye".into() };
        assert_eq!(
            to_value(&msg),
            json!({ "type": "room_closed", "payload": { "message": "bye" } })
        );
    }

    #[test]
    fn test_question_start_shape_has_no_answer() {
        let msg = ServerMessage::QuestionStart {
            question_number: 3,
            question: "2 + 2?".into(),
            choices: vec!["3".into(), "4".into()],
        };
        let value = to_value(&msg);
        assert_eq!(
            value,
            json!({
                "type": "question_start",
                "payload": { "questionNumber": 3, "question": "2 + 2?", "choices": ["3", "4"] }
            })
        );
        assert!(value["payload"].get("answer").is_none());
    }

    #[test]
    fn test_answer_result_shape() {
        let mut scores = Scoreboard::new();
        scores.insert("alice".into(), 10);
        scores.insert("bob".into(), 0);
        let msg = ServerMessage::AnswerResult {
            user_id: "alice".into(),
            is_correct: true,
            correct_answer: "4".into(),
            scores,
        };
        assert_eq!(
            to_value(&msg),
            json!({
                "type": "answer_result",
                "payload": {
                    "userId": "alice",
                    "isCorrect": true,
                    "correctAnswer": "4",
                    "scores": { "alice": 10, "bob": 0 }
                }
            })
        );
    }

    #[test]
    fn test_game_over_payload_is_a_list() {
        let msg = ServerMessage::GameOver(vec![PlayerResult {
            user_id: "alice".into(),
            score: 30,
            rank: 1,
        }]);
        assert_eq!(
            to_value(&msg),
            json!({
                "type": "game_over",
                "payload": [ { "userId": "alice", "score": 30, "rank": 1 } ]
            })
        );
        assert_eq!(msg.kind(), "game_over");
    }

    #[test]
    fn test_decode_answer() {
        let msg = ClientMessage::decode(br#"{"type":"answer","payload":{"answer":"4"}}"#)
            .unwrap();
        assert_eq!(msg, ClientMessage::Answer { answer: "4".into() });
    }

    #[test]
    fn test_decode_answer_ignores_extra_fields() {
        let msg = ClientMessage::decode(
            br#"{"type":"answer","payload":{"answer":"B","questionNumber":2}}"#,
        )
        .unwrap();
        assert_eq!(msg, ClientMessage::Answer { answer: "B".into() });
    }

    #[test]
    fn test_decode_garbage_is_decode_error() {
        let err = ClientMessage::decode(b"not json at all").unwrap_err();
        assert!(matches!(err, ProtocolError::Decode(_)));

        let err = ClientMessage::decode(br#"{"answer":"4"}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::Decode(_)), "missing type tag");
    }

    #[test]
    fn test_decode_unknown_type() {
        let err = ClientMessage::decode(br#"{"type":"chat","payload":"hi"}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownType(ref t) if t == "chat"));
    }

    #[test]
    fn test_decode_answer_with_wrong_shape() {
        for raw in [
            &br#"{"type":"answer"}"#[..],
            br#"{"type":"answer","payload":{"answer":4}}"#,
            br#"{"type":"answer","payload":"4"}"#,
        ] {
            let err = ClientMessage::decode(raw).unwrap_err();
            assert!(
                matches!(err, ProtocolError::InvalidPayload { ref kind, .. } if kind == "answer"),
                "{}",
                String::from_utf8_lossy(raw)
            );
        }
    }
}
