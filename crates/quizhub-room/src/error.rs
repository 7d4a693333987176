//! Error types for the room layer.

/// Errors returned by [`HubHandle`](crate::HubHandle) operations.
#[derive(Debug, thiserror::Error)]
pub enum HubError {
    /// The hub's processing loop has stopped; the event was not queued.
    #[error("room hub is not running")]
    Stopped,
}

/// Errors from a [`RoomStore`](crate::RoomStore) backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Reading or writing the backing file failed.
    #[error("store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// The stored data could not be parsed (or re-serialized).
    #[error("store data is corrupt: {0}")]
    Corrupt(#[source] serde_json::Error),

    /// The backend refused the request for another reason.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}
