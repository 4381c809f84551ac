//! Inbound message spool access.
//!
//! The upstream receiving service drops each accepted message into object
//! storage under its message id; the forwarder only ever reads from that
//! spool. [`MessageStore`] is the seam, with a filesystem backend for
//! deployments and an in-memory backend for tests and embedding.

use std::collections::HashMap;
use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::RwLock;

use thiserror::Error;
use tracing::debug;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Boxed future type for store operations, enabling object safety.
pub type StoreFuture<'a> = Pin<Box<dyn Future<Output = StoreResult<Vec<u8>>> + Send + 'a>>;

/// Errors that can occur while fetching stored messages.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No message is stored under the requested id.
    #[error("message '{0}' not found")]
    NotFound(String),
    /// The backend failed to read the message.
    #[error("storage i/o error: {0}")]
    Io(#[from] io::Error),
}

/// Read access to the inbound message spool.
pub trait MessageStore: Send + Sync {
    /// Fetches the raw bytes of a stored message by its id.
    fn fetch<'a>(&'a self, message_id: &'a str) -> StoreFuture<'a>;

    /// Returns the name of this store backend.
    fn name(&self) -> &str;
}

/// Message store reading `{base}/{message_id}.eml` files.
#[derive(Debug, Clone)]
pub struct FileMessageStore {
    base: PathBuf,
}

impl FileMessageStore {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    fn message_path(&self, message_id: &str) -> PathBuf {
        self.base.join(format!("{}.eml", safe_id(message_id)))
    }
}

impl MessageStore for FileMessageStore {
    fn fetch<'a>(&'a self, message_id: &'a str) -> StoreFuture<'a> {
        Box::pin(async move {
            let path = self.message_path(message_id);
            debug!(path = %path.display(), "Fetching message from spool");
            match tokio::fs::read(&path).await {
                Ok(bytes) => Ok(bytes),
                Err(error) if error.kind() == io::ErrorKind::NotFound => {
                    Err(StoreError::NotFound(message_id.to_string()))
                }
                Err(error) => Err(StoreError::Io(error)),
            }
        })
    }

    fn name(&self) -> &str {
        "file"
    }
}

/// In-memory message store keyed by message id.
#[derive(Debug, Default)]
pub struct MemoryMessageStore {
    messages: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryMessageStore {
    /// Creates a new empty MemoryMessageStore.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores raw message bytes under a message id.
    pub fn insert(&self, message_id: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.messages
            .write()
            .unwrap()
            .insert(message_id.into(), bytes.into());
    }

    /// Returns the number of stored messages.
    pub fn message_count(&self) -> usize {
        self.messages.read().unwrap().len()
    }
}

impl MessageStore for MemoryMessageStore {
    fn fetch<'a>(&'a self, message_id: &'a str) -> StoreFuture<'a> {
        Box::pin(async move {
            self.messages
                .read()
                .unwrap()
                .get(message_id)
                .cloned()
                .ok_or_else(|| StoreError::NotFound(message_id.to_string()))
        })
    }

    fn name(&self) -> &str {
        "memory"
    }
}

/// Normalizes a message id to a safe file name component.
fn safe_id(message_id: &str) -> String {
    message_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[tokio::test]
    async fn test_file_store_fetch() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("abc123.eml");
        tokio::fs::write(&path, b"From: a@b.com\r\n\r\nBody")
            .await
            .unwrap();

        let store = FileMessageStore::new(temp_dir.path());
        let bytes = store.fetch("abc123").await.unwrap();
        assert_eq!(bytes, b"From: a@b.com\r\n\r\nBody");
        assert_eq!(store.name(), "file");
    }

    #[tokio::test]
    async fn test_file_store_missing_message() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileMessageStore::new(temp_dir.path());

        let result = store.fetch("missing").await;
        assert!(matches!(result, Err(StoreError::NotFound(id)) if id == "missing"));
    }

    #[tokio::test]
    async fn test_file_store_sanitizes_id() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("___etc_passwd.eml");
        tokio::fs::write(&path, b"safe").await.unwrap();

        let store = FileMessageStore::new(temp_dir.path());
        let bytes = store.fetch("../etc/passwd").await.unwrap();
        assert_eq!(bytes, b"safe");
    }

    #[tokio::test]
    async fn test_memory_store_roundtrip() {
        let store = MemoryMessageStore::new();
        store.insert("id-1", b"raw bytes".to_vec());

        assert_eq!(store.message_count(), 1);
        assert_eq!(store.fetch("id-1").await.unwrap(), b"raw bytes");
        assert!(matches!(
            store.fetch("id-2").await,
            Err(StoreError::NotFound(_))
        ));
        assert_eq!(store.name(), "memory");
    }
}
