//! WebSocket transport implementation using `tokio-tungstenite`.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::handshake::server::{
    ErrorResponse, Request, Response,
};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message;

use crate::{ConnectParams, ConnectionId, Frame, FrameSink, FrameSource, TransportError};

/// Counter for generating unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

type WsStream = tokio_tungstenite::WebSocketStream<TcpStream>;

fn io_error(kind: std::io::ErrorKind, e: impl std::error::Error + Send + Sync + 'static) -> std::io::Error {
    std::io::Error::new(kind, e)
}

/// A WebSocket listener that accepts TCP connections for upgrading.
pub struct WebSocketTransport {
    listener: TcpListener,
}

impl WebSocketTransport {
    /// Binds a new WebSocket transport to the given address.
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(TransportError::AcceptFailed)?;
        tracing::info!(addr, "WebSocket transport listening");
        Ok(Self { listener })
    }

    /// Returns the local address the listener is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Waits for the next TCP connection.
    ///
    /// The WebSocket handshake is not performed here so a slow client
    /// cannot stall the accept loop; call
    /// [`PendingConnection::upgrade`] from the connection's own task.
    pub async fn accept(&self) -> Result<PendingConnection, TransportError> {
        let (stream, addr) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::AcceptFailed)?;
        Ok(PendingConnection { stream, addr })
    }
}

/// An accepted TCP stream that has not completed the WebSocket handshake.
pub struct PendingConnection {
    stream: TcpStream,
    addr: SocketAddr,
}

impl PendingConnection {
    /// The remote peer's address.
    pub fn peer_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Performs the WebSocket handshake.
    ///
    /// The request target is parsed into [`ConnectParams`]; requests
    /// without a room or `userId` are answered with `400 Bad Request`
    /// and never upgraded.
    pub async fn upgrade(self) -> Result<WebSocketConnection, TransportError> {
        let mut params: Option<ConnectParams> = None;
        let mut rejection: Option<String> = None;

        let callback = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
            match ConnectParams::parse(req.uri().path(), req.uri().query()) {
                Ok(p) => {
                    params = Some(p);
                    Ok(resp)
                }
                Err(e) => {
                    let reason = e.to_string();
                    let mut err = ErrorResponse::new(Some(reason.clone()));
                    *err.status_mut() = StatusCode::BAD_REQUEST;
                    rejection = Some(reason);
                    Err(err)
                }
            }
        };

        let result = tokio_tungstenite::accept_hdr_async(self.stream, callback).await;
        let ws = match result {
            Ok(ws) => ws,
            Err(e) => {
                if let Some(reason) = rejection {
                    tracing::debug!(addr = %self.addr, %reason, "upgrade rejected");
                    return Err(TransportError::Rejected(reason));
                }
                return Err(TransportError::AcceptFailed(io_error(
                    std::io::ErrorKind::ConnectionRefused,
                    e,
                )));
            }
        };

        let params = params.ok_or_else(|| {
            TransportError::Rejected("handshake produced no parameters".into())
        })?;

        let id = ConnectionId::new(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed));
        tracing::debug!(
            %id,
            addr = %self.addr,
            room_id = %params.room_id,
            user_id = %params.user_id,
            "accepted WebSocket connection"
        );

        Ok(WebSocketConnection {
            id,
            params,
            ws,
            max_message_size: None,
        })
    }
}

/// A single upgraded WebSocket connection.
///
/// Call [`split`](Self::split) to obtain independently owned read and
/// write halves for the two connection pumps.
pub struct WebSocketConnection {
    id: ConnectionId,
    params: ConnectParams,
    ws: WsStream,
    max_message_size: Option<usize>,
}

impl WebSocketConnection {
    /// Returns the unique identifier for this connection.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Room and user captured during the handshake.
    pub fn params(&self) -> &ConnectParams {
        &self.params
    }

    /// Limits the size of data frames the read half will accept.
    pub fn set_max_message_size(&mut self, limit: Option<usize>) {
        self.max_message_size = limit;
    }

    /// Splits the connection into its write and read halves.
    pub fn split(self) -> (WebSocketSender, WebSocketReceiver) {
        let (sink, stream) = self.ws.split();
        (
            WebSocketSender { id: self.id, sink },
            WebSocketReceiver {
                id: self.id,
                stream,
                max_message_size: self.max_message_size,
            },
        )
    }
}

/// Write half of a [`WebSocketConnection`].
pub struct WebSocketSender {
    id: ConnectionId,
    sink: SplitSink<WsStream, Message>,
}

impl WebSocketSender {
    /// The connection this half belongs to.
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl FrameSink for WebSocketSender {
    type Error = TransportError;

    async fn send_text(&mut self, data: &[u8]) -> Result<(), Self::Error> {
        let text = String::from_utf8_lossy(data).into_owned();
        self.sink
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| TransportError::SendFailed(io_error(std::io::ErrorKind::BrokenPipe, e)))
    }

    async fn ping(&mut self) -> Result<(), Self::Error> {
        self.sink
            .send(Message::Ping(Vec::new().into()))
            .await
            .map_err(|e| TransportError::SendFailed(io_error(std::io::ErrorKind::BrokenPipe, e)))
    }

    async fn close(&mut self) -> Result<(), Self::Error> {
        // A close frame may already have gone out from the other half's
        // teardown; tungstenite reports that as an error we can ignore.
        let _ = self.sink.send(Message::Close(None)).await;
        self.sink
            .close()
            .await
            .map_err(|e| TransportError::SendFailed(io_error(std::io::ErrorKind::BrokenPipe, e)))
    }
}

/// Read half of a [`WebSocketConnection`].
pub struct WebSocketReceiver {
    id: ConnectionId,
    stream: SplitStream<WsStream>,
    max_message_size: Option<usize>,
}

impl WebSocketReceiver {
    /// The connection this half belongs to.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    fn check_size(&self, size: usize) -> Result<(), TransportError> {
        match self.max_message_size {
            Some(limit) if size > limit => {
                Err(TransportError::MessageTooLarge { size, limit })
            }
            _ => Ok(()),
        }
    }
}

impl FrameSource for WebSocketReceiver {
    type Error = TransportError;

    async fn recv(&mut self) -> Result<Option<Frame>, Self::Error> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    self.check_size(text.len())?;
                    return Ok(Some(Frame::Data(text.as_bytes().to_vec())));
                }
                Some(Ok(Message::Binary(data))) => {
                    tracing::debug!(len = data.len(), "dropping binary frame");
                    continue;
                }
                // Client pings are auto-answered but still count as liveness.
                Some(Ok(Message::Pong(_) | Message::Ping(_))) => {
                    return Ok(Some(Frame::Pong));
                }
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                Some(Ok(Message::Frame(_))) => continue,
                Some(Err(e)) => {
                    return Err(TransportError::ReceiveFailed(io_error(
                        std::io::ErrorKind::ConnectionReset,
                        e,
                    )));
                }
            }
        }
    }
}
