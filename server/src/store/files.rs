//! Backing storage for payment-proof files.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::utils::error::{AppError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

#[async_trait]
pub trait FileStore: Send + Sync {
    /// Persists the bytes under a freshly generated key and returns the key.
    async fn save(&self, bytes: &[u8], content_type: &str) -> Result<String>;

    async fn load(&self, storage_key: &str) -> Result<Vec<u8>>;

    /// Removing a key that does not exist is not an error.
    async fn delete(&self, storage_key: &str) -> Result<()>;
}

/// Extension used for stored files. Derived from the accepted MIME type only.
pub fn extension_for(content_type: &str) -> &'static str {
    match content_type {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/png" => "png",
        "application/pdf" => "pdf",
        _ => "bin",
    }
}

fn new_storage_key(content_type: &str) -> String {
    format!("payment-{}.{}", Uuid::new_v4(), extension_for(content_type))
}

fn check_key(storage_key: &str) -> Result<()> {
    let valid = !storage_key.is_empty()
        && storage_key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_'))
        && !storage_key.starts_with('.');
    if valid {
        Ok(())
    } else {
        Err(AppError::validation(
            "storage_key",
            format!("Invalid storage key '{}'", storage_key),
        ))
    }
}

/// Stores files in a local directory, one file per key.
#[derive(Debug, Clone)]
pub struct LocalFileStore {
    root: PathBuf,
}

impl LocalFileStore {
    /// Creates the upload directory if needed.
    pub async fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&root).await?;
        tracing::info!(path = %root.display(), "Payment proof directory ready");
        Ok(Self { root })
    }

    fn path_for(&self, storage_key: &str) -> Result<PathBuf> {
        check_key(storage_key)?;
        Ok(self.root.join(storage_key))
    }
}

#[async_trait]
impl FileStore for LocalFileStore {
    async fn save(&self, bytes: &[u8], content_type: &str) -> Result<String> {
        let key = new_storage_key(content_type);
        let path = self.path_for(&key)?;
        tokio::fs::write(&path, bytes).await?;
        Ok(key)
    }

    async fn load(&self, storage_key: &str) -> Result<Vec<u8>> {
        let path = self.path_for(storage_key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(AppError::NotFound(format!(
                "Stored file '{}' is missing",
                storage_key
            ))),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, storage_key: &str) -> Result<()> {
        let path = self.path_for(storage_key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Keeps files in memory. Used by tests and local runs.
#[derive(Clone, Default)]
pub struct MemoryFileStore {
    files: Arc<RwLock<HashMap<String, StoredFile>>>,
}

impl MemoryFileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.files.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.files.read().await.is_empty()
    }

    pub async fn contains(&self, storage_key: &str) -> bool {
        self.files.read().await.contains_key(storage_key)
    }
}

#[async_trait]
impl FileStore for MemoryFileStore {
    async fn save(&self, bytes: &[u8], content_type: &str) -> Result<String> {
        let key = new_storage_key(content_type);
        self.files.write().await.insert(
            key.clone(),
            StoredFile {
                bytes: bytes.to_vec(),
                content_type: content_type.to_string(),
            },
        );
        Ok(key)
    }

    async fn load(&self, storage_key: &str) -> Result<Vec<u8>> {
        self.files
            .read()
            .await
            .get(storage_key)
            .map(|f| f.bytes.clone())
            .ok_or_else(|| AppError::NotFound(format!("Stored file '{}' is missing", storage_key)))
    }

    async fn delete(&self, storage_key: &str) -> Result<()> {
        self.files.write().await.remove(storage_key);
        Ok(())
    }
}
