//! Room-record persistence, as seen by the hub.
//!
//! The HTTP layer creates and joins rooms; the hub only needs two things
//! from whatever stores them: look a room up to find out who its host
//! is, and delete it when that host leaves. [`RoomStore`] is that
//! narrow interface.
//!
//! Two backends ship with the crate:
//!
//! - [`MemoryStore`]: a map behind a lock, for tests and embedding.
//! - [`JsonFileStore`]: a single JSON document on disk shaped
//!   `{"rooms": {"<roomId>": RoomRecord}}`.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};

use quizhub_protocol::{RoomId, UserId};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::StoreError;

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// Game settings chosen when the room was created.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomSettings {
    #[serde(default)]
    pub difficulty: String,
    #[serde(default)]
    pub language: String,
}

/// A player entry in a stored room.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerRecord {
    pub name: String,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub is_ready: bool,
}

/// Everything persisted about one room.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomRecord {
    pub room_id: String,
    /// Key into `players` of the room's creator.
    pub host_id: String,
    #[serde(default)]
    pub settings: RoomSettings,
    #[serde(default)]
    pub players: HashMap<String, PlayerRecord>,
    #[serde(default)]
    pub game_state: String,
    /// RFC 3339 timestamp, kept opaque.
    #[serde(default)]
    pub created_at: String,
}

impl RoomRecord {
    /// Returns `true` if `user_id` is the host of this room.
    ///
    /// Connections identify themselves by player *name*, so the host is
    /// the player entry under `host_id` whose name matches.
    pub fn is_host(&self, user_id: &UserId) -> bool {
        self.players
            .get(&self.host_id)
            .is_some_and(|host| host.name == user_id.as_str())
    }
}

// ---------------------------------------------------------------------------
// RoomStore
// ---------------------------------------------------------------------------

/// Read/delete access to persisted rooms.
pub trait RoomStore: Send + Sync + 'static {
    /// Looks a room up. `Ok(None)` means it isn't stored.
    fn read(
        &self,
        room_id: &RoomId,
    ) -> impl Future<Output = Result<Option<RoomRecord>, StoreError>> + Send;

    /// Removes a room. Deleting a room that isn't stored is not an error.
    fn delete(
        &self,
        room_id: &RoomId,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// An in-process [`RoomStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    rooms: Mutex<HashMap<RoomId, RoomRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores (or replaces) a record under its `room_id`.
    pub async fn insert(&self, record: RoomRecord) {
        let room_id = RoomId::new(record.room_id.clone());
        self.rooms.lock().await.insert(room_id, record);
    }

    /// Returns `true` if the room is stored.
    pub async fn contains(&self, room_id: &RoomId) -> bool {
        self.rooms.lock().await.contains_key(room_id)
    }
}

impl RoomStore for MemoryStore {
    async fn read(&self, room_id: &RoomId) -> Result<Option<RoomRecord>, StoreError> {
        Ok(self.rooms.lock().await.get(room_id).cloned())
    }

    async fn delete(&self, room_id: &RoomId) -> Result<(), StoreError> {
        self.rooms.lock().await.remove(room_id);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// JsonFileStore
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Serialize, Deserialize)]
struct RoomsDocument {
    #[serde(default)]
    rooms: HashMap<String, RoomRecord>,
}

/// A [`RoomStore`] backed by one JSON file.
///
/// Every operation re-reads the file so edits made by the HTTP layer
/// (which shares the file) are seen immediately. The lock only orders
/// this process's own reads and writes.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileStore {
    /// Opens the store, creating an empty document if the file is
    /// missing.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if !tokio::fs::try_exists(&path).await? {
            write_document(&path, &RoomsDocument::default()).await?;
            tracing::info!(path = %path.display(), "created empty room store");
        }
        Ok(Self {
            path,
            lock: Mutex::new(()),
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stores (or replaces) a record under its `room_id`.
    pub async fn write(&self, record: RoomRecord) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let mut doc = read_document(&self.path).await?;
        doc.rooms.insert(record.room_id.clone(), record);
        write_document(&self.path, &doc).await
    }
}

impl RoomStore for JsonFileStore {
    async fn read(&self, room_id: &RoomId) -> Result<Option<RoomRecord>, StoreError> {
        let _guard = self.lock.lock().await;
        let mut doc = read_document(&self.path).await?;
        Ok(doc.rooms.remove(room_id.as_str()))
    }

    async fn delete(&self, room_id: &RoomId) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let mut doc = read_document(&self.path).await?;
        if doc.rooms.remove(room_id.as_str()).is_none() {
            tracing::debug!(%room_id, "delete of room that is not stored");
            return Ok(());
        }
        write_document(&self.path, &doc).await
    }
}

async fn read_document(path: &Path) -> Result<RoomsDocument, StoreError> {
    let data = tokio::fs::read(path).await?;
    serde_json::from_slice(&data).map_err(StoreError::Corrupt)
}

/// Writes a sibling temp file and renames it over `path`, so readers
/// see either the old document or the new one.
async fn write_document(path: &Path, doc: &RoomsDocument) -> Result<(), StoreError> {
    let data = serde_json::to_vec_pretty(doc).map_err(StoreError::Corrupt)?;
    let staging = staging_path(path);
    tokio::fs::write(&staging, data).await?;
    if let Err(e) = tokio::fs::rename(&staging, path).await {
        let _ = tokio::fs::remove_file(&staging).await;
        return Err(e.into());
    }
    Ok(())
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(room: &str, host_key: &str, host_name: &str) -> RoomRecord {
        let mut players = HashMap::new();
        players.insert(
            host_key.to_string(),
            PlayerRecord {
                name: host_name.to_string(),
                ..PlayerRecord::default()
            },
        );
        RoomRecord {
            room_id: room.to_string(),
            host_id: host_key.to_string(),
            players,
            ..RoomRecord::default()
        }
    }

    #[test]
    fn test_is_host_matches_host_player_name() {
        let rec = record("r1", "p-1", "alice");
        assert!(rec.is_host(&UserId::from("alice")));
        assert!(!rec.is_host(&UserId::from("p-1")), "matches name, not key");
        assert!(!rec.is_host(&UserId::from("bob")));
    }

    #[test]
    fn test_is_host_false_when_host_entry_missing() {
        let mut rec = record("r1", "p-1", "alice");
        rec.host_id = "p-2".into();
        assert!(!rec.is_host(&UserId::from("alice")));
    }

    #[test]
    fn test_record_parses_stored_shape() {
        let json = r#"{
            "roomId": "r1",
            "hostId": "h",
            "settings": { "difficulty": "easy", "language": "go" },
            "players": { "h": { "name": "alice", "score": 0, "isReady": true } },
            "gameState": "waiting",
            "createdAt": "2025-01-01T00:00:00Z"
        }"#;
        let rec: RoomRecord = serde_json::from_str(json).unwrap();
        assert_eq!(rec.settings.language, "go");
        assert!(rec.players["h"].is_ready);
        assert!(rec.is_host(&UserId::from("alice")));
    }

    #[tokio::test]
    async fn test_memory_store_read_and_delete() {
        let store = MemoryStore::new();
        store.insert(record("r1", "h", "alice")).await;

        let room = RoomId::from("r1");
        assert!(store.read(&room).await.unwrap().is_some());
        store.delete(&room).await.unwrap();
        assert!(store.read(&room).await.unwrap().is_none());
        // Second delete is fine.
        store.delete(&room).await.unwrap();
    }

    #[tokio::test]
    async fn test_json_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db.json");

        let store = JsonFileStore::open(&path).await.unwrap();
        let room = RoomId::from("r1");
        assert!(store.read(&room).await.unwrap().is_none());

        store.write(record("r1", "h", "alice")).await.unwrap();
        let rec = store.read(&room).await.unwrap().unwrap();
        assert_eq!(rec.host_id, "h");

        store.delete(&room).await.unwrap();
        assert!(store.read(&room).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_json_file_store_corrupt_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        tokio::fs::write(file.path(), b"{ not json").await.unwrap();

        let store = JsonFileStore::open(file.path()).await.unwrap();
        let err = store.read(&RoomId::from("r1")).await.unwrap_err();
        assert!(matches!(err, StoreError::Corrupt(_)));
    }

    #[tokio::test]
    async fn test_json_file_store_replaces_file_whole() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db.json");
        let store = JsonFileStore::open(&path).await.unwrap();
        store.write(record("r1", "h", "alice")).await.unwrap();
        store.write(record("r2", "h", "bob")).await.unwrap();

        store.delete(&RoomId::from("r1")).await.unwrap();

        let doc: RoomsDocument =
            serde_json::from_slice(&tokio::fs::read(&path).await.unwrap()).unwrap();
        assert_eq!(doc.rooms.keys().collect::<Vec<_>>(), vec!["r2"]);
        assert!(!staging_path(&path).exists(), "staging file renamed away");
        let mut entries = std::fs::read_dir(dir.path()).unwrap();
        assert!(entries.next().is_some() && entries.next().is_none());
    }
}
