//! The room hub: a single Tokio task that owns room membership.
//!
//! Every change to "who is in which room" happens inside [`RoomHub::run`],
//! one event at a time. Connections and the game engine never touch the
//! membership map directly; they send events through a [`HubHandle`].
//! A client leaving and a broadcast headed to that client are just two
//! events processed in arrival order, so there is no lock ordering to
//! get wrong.
//!
//! Other tasks may *read* membership (e.g. the game engine seeding
//! scores) through the handle. They get a consistent snapshot, not
//! necessarily one that reflects events still queued.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use quizhub_protocol::{Codec, JsonCodec, RoomId, RoutedMessage, ServerMessage, UserId};
use quizhub_transport::ConnectionId;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;

use crate::{HubConfig, HubError, RoomStore};

/// One serialized message, shared by every recipient of a broadcast.
pub type OutboundFrame = Arc<[u8]>;

/// Receiving end of a connection's outbound queue. Yields `None` once
/// the hub has dropped the connection.
pub type OutboundReceiver = mpsc::Receiver<OutboundFrame>;

type Rooms = HashMap<RoomId, HashMap<ConnectionId, ClientHandle>>;

// ---------------------------------------------------------------------------
// Client identity and handle
// ---------------------------------------------------------------------------

/// Who a connection is. Cheap to clone; used to address the hub.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientKey {
    pub id: ConnectionId,
    pub room_id: RoomId,
    pub user_id: UserId,
}

/// A connection as the hub holds it: its identity plus the sending side
/// of its outbound queue.
///
/// Not `Clone`: the hub owns the only sender, so dropping the handle is
/// what closes the queue and stops the connection's write pump.
#[derive(Debug)]
pub struct ClientHandle {
    key: ClientKey,
    sender: mpsc::Sender<OutboundFrame>,
}

impl ClientHandle {
    /// Creates a handle and the queue its write pump will drain.
    pub fn new(key: ClientKey, capacity: usize) -> (Self, OutboundReceiver) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { key, sender }, receiver)
    }

    pub fn key(&self) -> &ClientKey {
        &self.key
    }
}

// ---------------------------------------------------------------------------
// MessageProcessor
// ---------------------------------------------------------------------------

/// Receives client frames relayed by the hub.
///
/// The game engine implements this. It is awaited from inside the hub
/// loop, so an implementation must never wait on the hub itself. Send
/// through a [`HubHandle`] (which never blocks) and return.
pub trait MessageProcessor: Send + Sync + 'static {
    fn process_message(
        &self,
        room_id: RoomId,
        user_id: UserId,
        data: Vec<u8>,
    ) -> impl Future<Output = ()> + Send;
}

/// Placeholder processor type for a hub built without one. Inbound
/// frames are dropped.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProcessor;

impl MessageProcessor for NoProcessor {
    async fn process_message(&self, room_id: RoomId, user_id: UserId, _data: Vec<u8>) {
        tracing::trace!(%room_id, %user_id, "no processor configured, frame dropped");
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Events consumed by the hub loop, strictly in arrival order.
#[derive(Debug)]
pub(crate) enum HubEvent {
    Register(ClientHandle),
    Unregister(ClientKey),
    Broadcast(RoutedMessage),
    Inbound { client: ClientKey, data: Vec<u8> },
    Shutdown,
}

// ---------------------------------------------------------------------------
// HubHandle
// ---------------------------------------------------------------------------

/// Handle to a running hub. Cheap to clone.
///
/// The event queue is unbounded: the hub loop re-submits events to
/// itself (join announcements, back-pressure disconnects), and a bounded
/// queue would let it block on its own input.
#[derive(Debug, Clone)]
pub struct HubHandle {
    events: mpsc::UnboundedSender<HubEvent>,
    rooms: Arc<RwLock<Rooms>>,
}

impl HubHandle {
    fn submit(&self, event: HubEvent) -> Result<(), HubError> {
        self.events.send(event).map_err(|_| HubError::Stopped)
    }

    /// Adds a connection to its room.
    pub fn register(&self, client: ClientHandle) -> Result<(), HubError> {
        self.submit(HubEvent::Register(client))
    }

    /// Removes a connection. Unknown connections are ignored.
    pub fn unregister(&self, client: ClientKey) -> Result<(), HubError> {
        self.submit(HubEvent::Unregister(client))
    }

    /// Sends `message` to every member of its room, as membership stands
    /// when the hub dequeues it.
    pub fn broadcast(&self, message: RoutedMessage) -> Result<(), HubError> {
        self.submit(HubEvent::Broadcast(message))
    }

    /// Relays a raw client frame to the message processor.
    pub fn inbound(&self, client: ClientKey, data: Vec<u8>) -> Result<(), HubError> {
        self.submit(HubEvent::Inbound { client, data })
    }

    /// Stops the hub loop after the events already queued.
    pub fn shutdown(&self) -> Result<(), HubError> {
        self.submit(HubEvent::Shutdown)
    }

    /// User ids currently in `room_id` (empty if the room doesn't exist).
    ///
    /// A user with two open connections appears twice.
    pub async fn members(&self, room_id: &RoomId) -> Vec<UserId> {
        let rooms = self.rooms.read().await;
        let mut users: Vec<UserId> = rooms
            .get(room_id)
            .map(|room| room.values().map(|c| c.key.user_id.clone()).collect())
            .unwrap_or_default();
        users.sort();
        users
    }

    /// Number of live connections in `room_id`.
    pub async fn connection_count(&self, room_id: &RoomId) -> usize {
        self.rooms.read().await.get(room_id).map_or(0, HashMap::len)
    }

    /// Returns `true` if the hub currently tracks `room_id`.
    pub async fn contains_room(&self, room_id: &RoomId) -> bool {
        self.rooms.read().await.contains_key(room_id)
    }

    /// Number of rooms with at least one connection.
    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    /// Ids of all rooms with at least one connection.
    pub async fn room_ids(&self) -> Vec<RoomId> {
        let mut ids: Vec<RoomId> = self.rooms.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }
}

// ---------------------------------------------------------------------------
// RoomHub
// ---------------------------------------------------------------------------

/// The hub actor. Build it with [`RoomHub::new`], optionally attach a
/// processor, then [`spawn`](RoomHub::spawn) it.
pub struct RoomHub<S: RoomStore, P: MessageProcessor = NoProcessor> {
    config: HubConfig,
    store: Arc<S>,
    processor: Option<Arc<P>>,
    codec: JsonCodec,
    rooms: Arc<RwLock<Rooms>>,
    receiver: mpsc::UnboundedReceiver<HubEvent>,
    /// The loop's own handle, for re-submitting events.
    handle: HubHandle,
}

impl<S: RoomStore> RoomHub<S, NoProcessor> {
    /// Creates a hub with no processor and returns it together with a
    /// handle. Events sent before the hub is spawned are queued.
    pub fn new(config: HubConfig, store: Arc<S>) -> (Self, HubHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let rooms = Arc::new(RwLock::new(HashMap::new()));
        let handle = HubHandle {
            events: tx,
            rooms: Arc::clone(&rooms),
        };
        let hub = Self {
            config: config.validated(),
            store,
            processor: None,
            codec: JsonCodec,
            rooms,
            receiver: rx,
            handle: handle.clone(),
        };
        (hub, handle)
    }
}

impl<S: RoomStore, P: MessageProcessor> RoomHub<S, P> {
    /// Attaches the processor that inbound client frames are relayed to.
    pub fn with_processor<Q: MessageProcessor>(self, processor: Arc<Q>) -> RoomHub<S, Q> {
        RoomHub {
            config: self.config,
            store: self.store,
            processor: Some(processor),
            codec: self.codec,
            rooms: self.rooms,
            receiver: self.receiver,
            handle: self.handle,
        }
    }

    /// Returns another handle to this hub.
    pub fn handle(&self) -> HubHandle {
        self.handle.clone()
    }

    /// Runs the loop on a new Tokio task.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Processes events until [`HubHandle::shutdown`] is called.
    pub async fn run(mut self) {
        tracing::info!("room hub started");

        while let Some(event) = self.receiver.recv().await {
            match event {
                HubEvent::Register(client) => self.handle_register(client).await,
                HubEvent::Unregister(client) => self.handle_unregister(client).await,
                HubEvent::Broadcast(message) => self.handle_broadcast(message).await,
                HubEvent::Inbound { client, data } => self.handle_inbound(client, data).await,
                HubEvent::Shutdown => {
                    tracing::info!("room hub shutting down");
                    break;
                }
            }
        }

        // Dropping the handles closes every outbound queue.
        self.rooms.write().await.clear();
        tracing::info!("room hub stopped");
    }

    async fn handle_register(&mut self, client: ClientHandle) {
        let key = client.key.clone();
        let members = {
            let mut rooms = self.rooms.write().await;
            let room = rooms.entry(key.room_id.clone()).or_default();
            room.insert(key.id, client);
            room.len()
        };
        tracing::info!(
            room_id = %key.room_id,
            user_id = %key.user_id,
            conn_id = %key.id,
            members,
            "client registered"
        );

        // Queued rather than delivered inline so it takes its turn behind
        // anything already waiting.
        self.resubmit(HubEvent::Broadcast(RoutedMessage::new(
            key.room_id,
            ServerMessage::UserJoined { user_id: key.user_id },
        )));
    }

    async fn handle_unregister(&mut self, client: ClientKey) {
        let is_member = self
            .rooms
            .read()
            .await
            .get(&client.room_id)
            .is_some_and(|room| room.contains_key(&client.id));
        if !is_member {
            tracing::trace!(conn_id = %client.id, "unregister of unknown connection");
            return;
        }

        // Resolve the host before touching membership. A failed lookup
        // only disables the room-closing branch.
        let departing_host = match self.store.read(&client.room_id).await {
            Ok(Some(record)) => record.is_host(&client.user_id),
            Ok(None) => false,
            Err(e) => {
                tracing::error!(
                    room_id = %client.room_id,
                    error = %e,
                    "host check failed; treating departure as a regular leave"
                );
                false
            }
        };

        let mut rooms = self.rooms.write().await;
        let Some(room) = rooms.get_mut(&client.room_id) else {
            return;
        };
        // Dropping the handle closes the departing connection's queue.
        drop(room.remove(&client.id));
        tracing::info!(
            room_id = %client.room_id,
            user_id = %client.user_id,
            conn_id = %client.id,
            "client unregistered"
        );

        if departing_host {
            let remaining = rooms.remove(&client.room_id).unwrap_or_default();
            drop(rooms);
            tracing::info!(
                room_id = %client.room_id,
                user_id = %client.user_id,
                remaining = remaining.len(),
                "host left; closing room"
            );
            self.close_room(&client.room_id, remaining).await;
        } else if room.is_empty() {
            rooms.remove(&client.room_id);
            tracing::info!(room_id = %client.room_id, "room emptied");
        } else {
            drop(rooms);
            self.resubmit(HubEvent::Broadcast(RoutedMessage::new(
                client.room_id,
                ServerMessage::UserLeft { user_id: client.user_id },
            )));
        }
    }

    /// Tells the remaining members why, then drops their handles so their
    /// write pumps send a close frame and exit.
    async fn close_room(&self, room_id: &RoomId, remaining: HashMap<ConnectionId, ClientHandle>) {
        let notice = ServerMessage::RoomClosed {
            message: self.config.host_left_message.clone(),
        };
        match self.codec.encode(&notice) {
            Ok(bytes) => {
                let frame: OutboundFrame = bytes.into();
                for (conn_id, client) in &remaining {
                    if let Err(e) = client.sender.try_send(Arc::clone(&frame)) {
                        tracing::warn!(
                            %room_id,
                            %conn_id,
                            error = %e,
                            "member missed room_closed, closing its queue anyway"
                        );
                    }
                }
            }
            Err(e) => {
                tracing::error!(%room_id, error = %e, "failed to encode room_closed");
            }
        }
        drop(remaining);

        if let Err(e) = self.store.delete(room_id).await {
            tracing::error!(%room_id, error = %e, "failed to delete room from store");
        }
    }

    async fn handle_broadcast(&mut self, routed: RoutedMessage) {
        let RoutedMessage { room_id, message } = routed;

        let bytes = match self.codec.encode(&message) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(%room_id, kind = message.kind(), error = %e, "failed to encode broadcast");
                return;
            }
        };
        let frame: OutboundFrame = bytes.into();

        let mut unresponsive = Vec::new();
        {
            let rooms = self.rooms.read().await;
            let Some(room) = rooms.get(&room_id) else {
                tracing::debug!(%room_id, kind = message.kind(), "broadcast to unknown room dropped");
                return;
            };
            for client in room.values() {
                if client.sender.try_send(Arc::clone(&frame)).is_err() {
                    tracing::warn!(
                        %room_id,
                        user_id = %client.key.user_id,
                        conn_id = %client.key.id,
                        "send buffer full; disconnecting"
                    );
                    unresponsive.push(client.key.clone());
                }
            }
            tracing::debug!(
                %room_id,
                kind = message.kind(),
                recipients = room.len(),
                "broadcast"
            );
        }

        // Never removed inline: the removal is an event like any other.
        for client in unresponsive {
            self.resubmit(HubEvent::Unregister(client));
        }
    }

    async fn handle_inbound(&mut self, client: ClientKey, data: Vec<u8>) {
        match &self.processor {
            Some(processor) => {
                processor
                    .process_message(client.room_id, client.user_id, data)
                    .await;
            }
            None => {
                tracing::debug!(
                    room_id = %client.room_id,
                    user_id = %client.user_id,
                    "no processor configured, frame dropped"
                );
            }
        }
    }

    fn resubmit(&self, event: HubEvent) {
        // Cannot fail while `self.receiver` is alive.
        let _ = self.handle.events.send(event);
    }
}
