//! Session persistence.
//!
//! The session record is four independent string keys. Backends implement
//! [`SessionStore`]; the [`PersistenceAdapter`] wraps one and turns every
//! backend failure into a logged no-op.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::{Mutex, RwLock};

use crate::error::StoreError;

pub const KEY_CONNECTED: &str = "wallet_connected";
pub const KEY_LAST_ACCOUNT: &str = "last_connected_account";
pub const KEY_PREFERRED_NETWORK: &str = "preferred_network";
pub const KEY_CONNECTED_AT: &str = "connection_timestamp";

/// Every key owned by the session record.
pub const SESSION_KEYS: [&str; 4] = [
    KEY_CONNECTED,
    KEY_LAST_ACCOUNT,
    KEY_PREFERRED_NETWORK,
    KEY_CONNECTED_AT,
];

/// A durable string-keyed store.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    async fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// Process-local store, mostly for tests and embedders without disk access.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.values.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.values
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.values.write().await.remove(key);
        Ok(())
    }
}

/// Store backed by a single JSON object on disk.
///
/// Each operation re-reads the file so several processes sharing the path
/// see each other's writes, last writer wins per key.
pub struct FileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> Result<HashMap<String, String>, StoreError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(data) if data.trim().is_empty() => Ok(HashMap::new()),
            Ok(data) => Ok(serde_json::from_str(&data)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_all(&self, values: &HashMap<String, String>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(values)?;
        tokio::fs::write(&self.path, json).await?;
        Ok(())
    }
}

#[async_trait]
impl SessionStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.read_all().await?.remove(key))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut values = self.read_all().await?;
        values.insert(key.to_string(), value.to_string());
        self.write_all(&values).await
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut values = self.read_all().await?;
        if values.remove(key).is_some() {
            self.write_all(&values).await?;
        }
        Ok(())
    }
}

/// The persisted session as read back at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersistedSession {
    pub connected: bool,
    pub last_account: Option<String>,
    pub preferred_network: Option<String>,
    pub connected_at: Option<DateTime<Utc>>,
}

impl PersistedSession {
    /// A reconnect is worth attempting only with both the flag and an account.
    pub fn wants_reconnect(&self) -> bool {
        self.connected && self.last_account.is_some()
    }
}

/// Best-effort access to the session record.
pub struct PersistenceAdapter {
    store: std::sync::Arc<dyn SessionStore>,
}

impl PersistenceAdapter {
    pub fn new(store: std::sync::Arc<dyn SessionStore>) -> Self {
        Self { store }
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        match self.store.get(key).await {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("Failed to read session key '{}': {}", key, e);
                None
            }
        }
    }

    pub async fn set(&self, key: &str, value: &str) {
        if let Err(e) = self.store.set(key, value).await {
            tracing::warn!("Failed to write session key '{}': {}", key, e);
        }
    }

    pub async fn remove(&self, key: &str) {
        if let Err(e) = self.store.remove(key).await {
            tracing::warn!("Failed to remove session key '{}': {}", key, e);
        }
    }

    /// Write the full record after a successful connect.
    pub async fn save_session(&self, account: &str, network: &str, connected_at: DateTime<Utc>) {
        self.set(KEY_CONNECTED, "true").await;
        self.set(KEY_LAST_ACCOUNT, account).await;
        self.set(KEY_PREFERRED_NETWORK, network).await;
        self.set(KEY_CONNECTED_AT, &connected_at.timestamp_millis().to_string())
            .await;
    }

    /// Remove every key of the record.
    pub async fn clear_session(&self) {
        for key in SESSION_KEYS {
            self.remove(key).await;
        }
    }

    pub async fn load_record(&self) -> PersistedSession {
        let connected = self.get(KEY_CONNECTED).await.as_deref() == Some("true");
        let last_account = self.get(KEY_LAST_ACCOUNT).await;
        let preferred_network = self.get(KEY_PREFERRED_NETWORK).await;
        let connected_at = self
            .get(KEY_CONNECTED_AT)
            .await
            .and_then(|raw| raw.parse::<i64>().ok())
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single());

        PersistedSession {
            connected,
            last_account,
            preferred_network,
            connected_at,
        }
    }
}
