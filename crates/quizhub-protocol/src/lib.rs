//! Wire protocol for Quizhub.
//!
//! This crate defines the "language" that quiz clients and the server
//! speak:
//!
//! - **Types** ([`ServerMessage`], [`ClientMessage`], [`PlayerResult`],
//!   etc.): the messages that travel on the wire.
//! - **Routing** ([`RoutedMessage`]): a server message paired with the
//!   room it is addressed to. The room never reaches the wire.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how messages are
//!   converted to/from bytes.
//! - **Errors** ([`ProtocolError`]): what can go wrong while decoding.
//!
//! # Wire format
//!
//! Every frame is a JSON object `{"type": "...", "payload": ...}`, with
//! `payload` omitted when a message carries none.
//!
//! ```text
//! Transport (bytes) → Protocol (ClientMessage) → Game engine
//! Game engine → Protocol (RoutedMessage) → Hub → Transport (bytes)
//! ```

mod codec;
mod error;
mod types;

pub use codec::{Codec, JsonCodec};
pub use error::ProtocolError;
pub use types::{
    ClientMessage, InboundEnvelope, PlayerResult, RoomId, RoutedMessage,
    Scoreboard, ServerMessage, UserId,
};
