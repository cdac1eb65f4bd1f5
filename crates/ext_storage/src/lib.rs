//! Session storage for Harbor apps
//!
//! SQLite-backed key-value store at `<data_dir>/.harbor/<app-identifier>/storage.db`.
//! The port bridge persists the session token under [`SESSION_KEY`].

use ext_ipc::{IpcError, SessionProvider};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

/// Well-known key holding the session token
pub const SESSION_KEY: &str = "session";

// ============================================================================
// Error Types with Structured Codes
// ============================================================================

/// Error codes for storage operations (8100-8109)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum StorageErrorCode {
    /// Generic storage error
    Generic = 8100,
    /// Serialization error
    SerializationError = 8102,
    /// Deserialization error
    DeserializationError = 8103,
    /// Database error
    DatabaseError = 8104,
    /// Invalid key
    InvalidKey = 8106,
    /// Connection failed
    ConnectionFailed = 8108,
}

/// Custom error type for storage operations
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("[{code}] Storage error: {message}")]
    Generic { code: u32, message: String },

    #[error("[{code}] Serialization error: {message}")]
    SerializationError { code: u32, message: String },

    #[error("[{code}] Deserialization error: {message}")]
    DeserializationError { code: u32, message: String },

    #[error("[{code}] Database error: {message}")]
    DatabaseError { code: u32, message: String },

    #[error("[{code}] Invalid key: {message}")]
    InvalidKey { code: u32, message: String },

    #[error("[{code}] Connection failed: {message}")]
    ConnectionFailed { code: u32, message: String },
}

impl StorageError {
    pub fn generic(message: impl Into<String>) -> Self {
        Self::Generic {
            code: StorageErrorCode::Generic as u32,
            message: message.into(),
        }
    }

    pub fn serialization_error(message: impl Into<String>) -> Self {
        Self::SerializationError {
            code: StorageErrorCode::SerializationError as u32,
            message: message.into(),
        }
    }

    pub fn deserialization_error(message: impl Into<String>) -> Self {
        Self::DeserializationError {
            code: StorageErrorCode::DeserializationError as u32,
            message: message.into(),
        }
    }

    pub fn database_error(message: impl Into<String>) -> Self {
        Self::DatabaseError {
            code: StorageErrorCode::DatabaseError as u32,
            message: message.into(),
        }
    }

    pub fn invalid_key(message: impl Into<String>) -> Self {
        Self::InvalidKey {
            code: StorageErrorCode::InvalidKey as u32,
            message: message.into(),
        }
    }

    pub fn connection_failed(message: impl Into<String>) -> Self {
        Self::ConnectionFailed {
            code: StorageErrorCode::ConnectionFailed as u32,
            message: message.into(),
        }
    }
}

impl From<rusqlite::Error> for StorageError {
    fn from(e: rusqlite::Error) -> Self {
        Self::database_error(e.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        Self::serialization_error(e.to_string())
    }
}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        Self::generic(e.to_string())
    }
}

impl From<StorageError> for IpcError {
    fn from(e: StorageError) -> Self {
        IpcError::session_store(e.to_string())
    }
}

// ============================================================================
// Store
// ============================================================================

pub struct SqliteSessionStore {
    db_path: Option<PathBuf>,
    connection: Mutex<Connection>,
}

impl SqliteSessionStore {
    /// Open the store for `app_identifier` under the user data directory
    pub fn open_default(app_identifier: &str) -> Result<Self, StorageError> {
        if app_identifier.is_empty()
            || app_identifier.contains(['/', '\\'])
            || app_identifier == ".."
        {
            return Err(StorageError::invalid_key(format!(
                "Invalid app identifier: {:?}",
                app_identifier
            )));
        }

        let storage_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".harbor")
            .join(app_identifier);
        std::fs::create_dir_all(&storage_dir)?;

        Self::open(storage_dir.join("storage.db"))
    }

    pub fn open(db_path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let db_path = db_path.as_ref().to_path_buf();
        let conn = Connection::open(&db_path)
            .map_err(|e| StorageError::connection_failed(e.to_string()))?;
        Self::init(conn, Some(db_path))
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| StorageError::connection_failed(e.to_string()))?;
        Self::init(conn, None)
    }

    fn init(conn: Connection, db_path: Option<PathBuf>) -> Result<Self, StorageError> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS kv_store (
                key TEXT PRIMARY KEY NOT NULL,
                value TEXT NOT NULL,
                created_at INTEGER DEFAULT (strftime('%s', 'now')),
                updated_at INTEGER DEFAULT (strftime('%s', 'now'))
            )",
            [],
        )?;

        debug!(path = ?db_path, "Opened session store");
        Ok(Self {
            db_path,
            connection: Mutex::new(conn),
        })
    }

    /// Backing file, `None` for in-memory stores
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
        self.connection
            .lock()
            .map_err(|_| StorageError::generic("storage connection poisoned"))
    }

    pub fn get(&self, key: &str) -> Result<Option<serde_json::Value>, StorageError> {
        debug!(key = %key, "storage.get");

        let conn = self.conn()?;
        let result: Result<String, rusqlite::Error> = conn.query_row(
            "SELECT value FROM kv_store WHERE key = ?",
            [key],
            |row| row.get(0),
        );

        match result {
            Ok(value_str) => serde_json::from_str(&value_str)
                .map(Some)
                .map_err(|e| StorageError::deserialization_error(e.to_string())),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StorageError::from(e)),
        }
    }

    pub fn set(&self, key: &str, value: &serde_json::Value) -> Result<(), StorageError> {
        debug!(key = %key, "storage.set");

        if key.is_empty() {
            return Err(StorageError::invalid_key("Key cannot be empty"));
        }

        let value_str = serde_json::to_string(value)?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO kv_store (key, value, updated_at) VALUES (?, ?, strftime('%s', 'now'))
             ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = strftime('%s', 'now')",
            rusqlite::params![key, value_str],
        )?;

        Ok(())
    }
}

impl SessionProvider for SqliteSessionStore {
    fn load(&self) -> Result<Option<String>, IpcError> {
        match self.get(SESSION_KEY)? {
            None => Ok(None),
            Some(serde_json::Value::String(session)) => Ok(Some(session)),
            Some(other) => Err(StorageError::deserialization_error(format!(
                "session is not a string: {}",
                other
            ))
            .into()),
        }
    }

    fn store(&self, session: &str) -> Result<(), IpcError> {
        self.set(SESSION_KEY, &serde_json::Value::String(session.to_string()))?;
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use ext_ipc::{BridgeCommand, BridgeEvent, ClipboardProvider, InitPayload, PortBridge};
    use std::sync::Arc;
    use std::time::Duration;

    struct NoClipboard;

    impl ClipboardProvider for NoClipboard {
        fn write_text(&self, _text: &str) -> Result<(), IpcError> {
            Err(IpcError::clipboard("unavailable"))
        }
    }

    #[test]
    fn test_error_codes() {
        let err = StorageError::invalid_key("empty");
        match err {
            StorageError::InvalidKey { code, message } => {
                assert_eq!(code, StorageErrorCode::InvalidKey as u32);
                assert!(message.contains("empty"));
            }
            _ => panic!("Wrong error type"),
        }

        let ipc: IpcError = StorageError::database_error("disk full").into();
        assert!(matches!(ipc, IpcError::SessionStore { .. }));
        assert!(ipc.to_string().contains("8104"));
    }

    #[test]
    fn test_absent_session() {
        let store = SqliteSessionStore::open_in_memory().unwrap();
        assert_eq!(store.load().unwrap(), None);
        assert!(store.db_path().is_none());
    }

    #[test]
    fn test_store_overwrites_session() {
        let store = SqliteSessionStore::open_in_memory().unwrap();
        store.store("first").unwrap();
        store.store("second").unwrap();
        assert_eq!(store.load().unwrap(), Some("second".to_string()));
    }

    #[test]
    fn test_non_string_session_rejected() {
        let store = SqliteSessionStore::open_in_memory().unwrap();
        store.set(SESSION_KEY, &serde_json::json!({"token": 1})).unwrap();
        assert!(matches!(store.load(), Err(IpcError::SessionStore { .. })));
    }

    #[test]
    fn test_kv_roundtrip() {
        let store = SqliteSessionStore::open_in_memory().unwrap();
        assert_eq!(store.get("theme").unwrap(), None);
        store.set("theme", &serde_json::json!("dark")).unwrap();
        assert_eq!(store.get("theme").unwrap(), Some(serde_json::json!("dark")));
        assert!(matches!(
            store.set("", &serde_json::json!(1)),
            Err(StorageError::InvalidKey { .. })
        ));
    }

    #[test]
    fn test_invalid_app_identifier() {
        assert!(matches!(
            SqliteSessionStore::open_default("../escape"),
            Err(StorageError::InvalidKey { .. })
        ));
        assert!(SqliteSessionStore::open_default("").is_err());
    }

    #[tokio::test]
    async fn test_session_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("storage.db");

        {
            let store = Arc::new(SqliteSessionStore::open(&db_path).unwrap());
            let (events_tx, _events_rx) = tokio::sync::mpsc::channel::<BridgeEvent>(4);
            let bridge = PortBridge::spawn(store.clone(), Arc::new(NoClipboard), events_tx);

            assert_eq!(bridge.init_payload(), InitPayload { session: None });
            bridge
                .dispatch(BridgeCommand::StoreSession("abc123".to_string()))
                .unwrap();

            for _ in 0..100 {
                if store.load().unwrap().is_some() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        }

        let reopened = Arc::new(SqliteSessionStore::open(&db_path).unwrap());
        let (events_tx, _events_rx) = tokio::sync::mpsc::channel::<BridgeEvent>(4);
        let bridge = PortBridge::spawn(reopened, Arc::new(NoClipboard), events_tx);
        let payload = bridge.init_payload();
        assert_eq!(payload.session.as_deref(), Some("abc123"));
        assert_eq!(
            serde_json::to_string(&payload).unwrap(),
            r#"{"session":"abc123"}"#
        );
    }
}
