//! Per-connection handler: the read and write pumps.
//!
//! Each upgraded connection is split in two. The read pump runs on the
//! connection's own task and forwards client frames to the hub; the
//! write pump runs on a second task and drains the connection's
//! outbound queue onto the socket, pinging the client while idle.
//!
//! Teardown always goes through the hub: whichever pump stops first,
//! the connection is unregistered, the hub drops its queue, and the
//! write pump sends a close frame on its way out.

use std::time::Duration;

use quizhub_protocol::{RoomId, UserId};
use quizhub_room::{ClientHandle, ClientKey, HubConfig, HubHandle, OutboundReceiver};
use quizhub_transport::{Frame, FrameSink, FrameSource, WebSocketConnection};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

/// Serves an upgraded WebSocket connection until either side goes away.
pub(crate) async fn handle_connection(
    mut conn: WebSocketConnection,
    hub: HubHandle,
    config: HubConfig,
) {
    let params = conn.params().clone();
    let key = ClientKey {
        id: conn.id(),
        room_id: RoomId::new(params.room_id),
        user_id: UserId::new(params.user_id),
    };
    conn.set_max_message_size(Some(config.max_message_size));
    let (sink, source) = conn.split();
    run_connection(sink, source, key, hub, &config).await;
}

/// Registers the connection, runs both pumps, and unregisters it.
pub(crate) async fn run_connection<S, R>(
    mut sink: S,
    mut source: R,
    key: ClientKey,
    hub: HubHandle,
    config: &HubConfig,
) where
    S: FrameSink,
    R: FrameSource,
{
    let (client, outbound) = ClientHandle::new(key.clone(), config.send_buffer);
    if let Err(e) = hub.register(client) {
        tracing::warn!(conn_id = %key.id, error = %e, "hub unavailable, closing connection");
        let _ = time::timeout(config.write_wait, sink.close()).await;
        return;
    }
    tracing::info!(
        conn_id = %key.id,
        room_id = %key.room_id,
        user_id = %key.user_id,
        "client connected"
    );

    let mut writer = tokio::spawn(write_pump(
        sink,
        outbound,
        key.clone(),
        config.write_wait,
        config.ping_period,
    ));

    let writer_done = read_pump(&mut source, &key, &hub, config.pong_wait, &mut writer).await;

    if let Err(e) = hub.unregister(key.clone()) {
        tracing::debug!(conn_id = %key.id, error = %e, "unregister after hub stopped");
    }
    if !writer_done {
        let _ = writer.await;
    }
    tracing::info!(
        conn_id = %key.id,
        room_id = %key.room_id,
        user_id = %key.user_id,
        "client disconnected"
    );
}

/// Forwards client frames to the hub until the client goes quiet, the
/// socket fails, or the write pump stops. Returns `true` in the last
/// case (the writer has already been awaited).
async fn read_pump<R: FrameSource>(
    source: &mut R,
    key: &ClientKey,
    hub: &HubHandle,
    pong_wait: Duration,
    writer: &mut JoinHandle<()>,
) -> bool {
    loop {
        tokio::select! {
            // The deadline restarts with every frame, pongs included.
            result = time::timeout(pong_wait, source.recv()) => match result {
                Ok(Ok(Some(Frame::Data(data)))) => {
                    if hub.inbound(key.clone(), data).is_err() {
                        return false;
                    }
                }
                Ok(Ok(Some(Frame::Pong))) => {
                    tracing::trace!(conn_id = %key.id, "pong");
                }
                Ok(Ok(None)) => {
                    tracing::debug!(conn_id = %key.id, "client closed connection");
                    return false;
                }
                Ok(Err(e)) => {
                    tracing::debug!(conn_id = %key.id, error = %e, "read failed");
                    return false;
                }
                Err(_) => {
                    tracing::info!(conn_id = %key.id, ?pong_wait, "client timed out");
                    return false;
                }
            },
            _ = &mut *writer => {
                tracing::debug!(conn_id = %key.id, "write side stopped");
                return true;
            }
        }
    }
}

/// Writes queued frames and periodic pings. Exits (sending a close
/// frame) when the hub drops the queue or a write fails or stalls.
async fn write_pump<S: FrameSink>(
    mut sink: S,
    mut outbound: OutboundReceiver,
    key: ClientKey,
    write_wait: Duration,
    ping_period: Duration,
) {
    let mut ticker = time::interval_at(Instant::now() + ping_period, ping_period);

    loop {
        tokio::select! {
            frame = outbound.recv() => {
                let Some(frame) = frame else {
                    tracing::debug!(conn_id = %key.id, "outbound queue closed");
                    break;
                };
                match time::timeout(write_wait, sink.send_text(&frame)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        tracing::debug!(conn_id = %key.id, error = %e, "write failed");
                        break;
                    }
                    Err(_) => {
                        tracing::info!(conn_id = %key.id, "write timed out");
                        break;
                    }
                }
            }
            _ = ticker.tick() => {
                match time::timeout(write_wait, sink.ping()).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        tracing::debug!(conn_id = %key.id, error = %e, "ping failed");
                        break;
                    }
                    Err(_) => {
                        tracing::info!(conn_id = %key.id, "ping timed out");
                        break;
                    }
                }
            }
        }
    }

    let _ = time::timeout(write_wait, sink.close()).await;
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use quizhub_room::{MemoryStore, RoomHub};
    use quizhub_transport::{ConnectionId, TransportError};
    use tokio::sync::mpsc;

    use super::*;

    #[derive(Debug, PartialEq)]
    enum Sent {
        Text(String),
        Ping,
        Close,
    }

    struct MockSink {
        sent: mpsc::UnboundedSender<Sent>,
    }

    impl MockSink {
        fn push(&self, event: Sent) -> Result<(), TransportError> {
            self.sent
                .send(event)
                .map_err(|_| TransportError::ConnectionClosed("test dropped".into()))
        }
    }

    impl FrameSink for MockSink {
        type Error = TransportError;

        async fn send_text(&mut self, data: &[u8]) -> Result<(), TransportError> {
            self.push(Sent::Text(String::from_utf8_lossy(data).into_owned()))
        }

        async fn ping(&mut self) -> Result<(), TransportError> {
            self.push(Sent::Ping)
        }

        async fn close(&mut self) -> Result<(), TransportError> {
            self.push(Sent::Close)
        }
    }

    /// Yields whatever the test feeds it; `None` once the feeder drops.
    struct MockSource {
        frames: mpsc::UnboundedReceiver<Result<Frame, TransportError>>,
    }

    impl FrameSource for MockSource {
        type Error = TransportError;

        async fn recv(&mut self) -> Result<Option<Frame>, TransportError> {
            self.frames.recv().await.transpose()
        }
    }

    struct Peer {
        feed: mpsc::UnboundedSender<Result<Frame, TransportError>>,
        sent: mpsc::UnboundedReceiver<Sent>,
        task: JoinHandle<()>,
    }

    fn start_hub() -> HubHandle {
        let (hub, handle) = RoomHub::new(HubConfig::default(), Arc::new(MemoryStore::new()));
        hub.spawn();
        handle
    }

    fn connect(hub: &HubHandle, user: &str) -> Peer {
        connect_with(hub, user, HubConfig::default())
    }

    fn connect_with(hub: &HubHandle, user: &str, config: HubConfig) -> Peer {
        let (feed, frames) = mpsc::unbounded_channel();
        let (sent_tx, sent) = mpsc::unbounded_channel();
        let key = ClientKey {
            id: ConnectionId::new(1),
            room_id: RoomId::from("r1"),
            user_id: UserId::from(user),
        };
        let hub = hub.clone();
        let task = tokio::spawn(async move {
            run_connection(
                MockSink { sent: sent_tx },
                MockSource { frames },
                key,
                hub,
                &config,
            )
            .await;
        });
        Peer { feed, sent, task }
    }

    async fn next_sent(sent: &mut mpsc::UnboundedReceiver<Sent>) -> Sent {
        time::timeout(Duration::from_secs(600), sent.recv())
            .await
            .expect("timed out")
            .expect("sink dropped")
    }

    #[tokio::test(start_paused = true)]
    async fn test_outbound_then_close_when_client_leaves() {
        let hub = start_hub();
        let mut peer = connect(&hub, "alice");

        match next_sent(&mut peer.sent).await {
            Sent::Text(text) => assert!(text.contains("user_joined")),
            other => panic!("expected user_joined, got {other:?}"),
        }

        drop(peer.feed);
        assert_eq!(next_sent(&mut peer.sent).await, Sent::Close);
        peer.task.await.unwrap();
        assert!(hub.members(&RoomId::from("r1")).await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_client_is_pinged_then_dropped() {
        let hub = start_hub();
        let mut peer = connect(&hub, "alice");
        let started = Instant::now();

        assert!(matches!(next_sent(&mut peer.sent).await, Sent::Text(_)));
        assert_eq!(next_sent(&mut peer.sent).await, Sent::Ping);
        assert_eq!(started.elapsed(), Duration::from_secs(54));

        assert_eq!(next_sent(&mut peer.sent).await, Sent::Close);
        assert_eq!(started.elapsed(), Duration::from_secs(60));
        peer.task.await.unwrap();
        assert!(hub.members(&RoomId::from("r1")).await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_pongs_keep_connection_alive() {
        let hub = start_hub();
        let peer = connect(&hub, "alice");

        for _ in 0..4 {
            time::sleep(Duration::from_secs(50)).await;
            peer.feed.send(Ok(Frame::Pong)).unwrap();
        }
        assert_eq!(hub.members(&RoomId::from("r1")).await, vec![UserId::from("alice")]);

        drop(peer.feed);
        peer.task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_error_disconnects() {
        let hub = start_hub();
        let mut peer = connect(&hub, "alice");
        assert!(matches!(next_sent(&mut peer.sent).await, Sent::Text(_)));

        peer.feed
            .send(Err(TransportError::MessageTooLarge { size: 600, limit: 512 }))
            .unwrap();
        assert_eq!(next_sent(&mut peer.sent).await, Sent::Close);
        peer.task.await.unwrap();
        assert!(hub.members(&RoomId::from("r1")).await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stopped_hub_closes_immediately() {
        let (hub, handle) = RoomHub::new(HubConfig::default(), Arc::new(MemoryStore::new()));
        drop(hub);

        let mut peer = connect(&handle, "alice");
        assert_eq!(next_sent(&mut peer.sent).await, Sent::Close);
        peer.task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_timings_are_clamped_before_pumps_start() {
        let config = HubConfig {
            write_wait: Duration::ZERO,
            pong_wait: Duration::from_nanos(1),
            ping_period: Duration::ZERO,
            ..HubConfig::default()
        }
        .validated();
        let hub = start_hub();
        let mut peer = connect_with(&hub, "alice", config);

        assert!(matches!(next_sent(&mut peer.sent).await, Sent::Text(_)));
        let mut pings = 0;
        loop {
            match next_sent(&mut peer.sent).await {
                Sent::Ping => pings += 1,
                Sent::Close => break,
                other => panic!("unexpected {other:?}"),
            }
        }
        assert!(pings > 0);
        peer.task.await.expect("pumps must not panic");
        assert!(hub.members(&RoomId::from("r1")).await.is_empty());
    }
}
