//! Room membership and fan-out for Quizhub.
//!
//! A single [`RoomHub`] task owns the map of rooms to live connections
//! (actor model). Connections and the game engine talk to it through a
//! cloneable [`HubHandle`].
//!
//! # Key types
//!
//! - [`RoomHub`]: the actor; register/unregister/broadcast/inbound
//! - [`HubHandle`]: send events to the hub, query membership
//! - [`ClientHandle`] / [`ClientKey`]: a connection as the hub sees it
//! - [`MessageProcessor`]: where inbound client frames go (the game engine)
//! - [`RoomStore`]: persisted room records, consulted for the host
//! - [`HubConfig`]: queue sizes and connection timings

mod config;
mod error;
mod hub;
mod store;

pub use config::HubConfig;
pub use error::{HubError, StoreError};
pub use hub::{
    ClientHandle, ClientKey, HubHandle, MessageProcessor, NoProcessor,
    OutboundFrame, OutboundReceiver, RoomHub,
};
pub use store::{
    JsonFileStore, MemoryStore, PlayerRecord, RoomRecord, RoomSettings,
    RoomStore,
};
